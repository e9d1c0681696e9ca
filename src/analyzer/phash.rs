//! Perceptual fingerprints for approximate duplicate detection across
//! non-adjacent frames.

use image_hasher::{HashAlg, HasherConfig, ImageHash};

use crate::frame::Frame;

/// Coarse perceptual hash of a frame, base64-encoded.
pub fn compute_phash(frame: &Frame) -> String {
    let hasher = HasherConfig::new()
        .hash_alg(HashAlg::DoubleGradient)
        .hash_size(8, 8)
        .to_hasher();

    hasher
        .hash_image(&image::DynamicImage::ImageRgb8(frame.clone()))
        .to_base64()
}

/// Hamming distance between two hashes from [`compute_phash`].
/// Undecodable input compares as maximally distant.
pub fn hash_distance(lhs: &str, rhs: &str) -> u32 {
    let Ok(h1) = ImageHash::<Vec<u8>>::from_base64(lhs) else {
        return u32::MAX;
    };
    let Ok(h2) = ImageHash::<Vec<u8>>::from_base64(rhs) else {
        return u32::MAX;
    };
    h1.dist(&h2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn identical_frames_have_zero_distance() {
        let frame = Frame::from_fn(64, 64, |x, y| Rgb([(x % 256) as u8, (y % 256) as u8, 0]));
        let a = compute_phash(&frame);
        let b = compute_phash(&frame);
        assert_eq!(hash_distance(&a, &b), 0);
    }

    #[test]
    fn very_different_frames_are_far_apart() {
        let a = Frame::from_fn(64, 64, |x, _| Rgb([if x < 32 { 0 } else { 255 }; 3]));
        let b = Frame::from_fn(64, 64, |_, y| Rgb([if y < 32 { 255 } else { 0 }; 3]));
        let dist = hash_distance(&compute_phash(&a), &compute_phash(&b));
        assert!(dist > 0, "orthogonal gradients should not collide");
    }

    #[test]
    fn garbage_input_is_maximally_distant() {
        assert_eq!(hash_distance("not base64!!", "also not"), u32::MAX);
    }
}
