//! Frame type used across capture, analysis and recording.

use image::{GrayImage, RgbImage};

/// One captured frame: an RGB pixel grid with no identity beyond capture order.
pub type Frame = RgbImage;

/// Single-channel intensity view used for all frame comparisons.
pub fn to_gray(frame: &Frame) -> GrayImage {
    image::imageops::grayscale(frame)
}

/// Mean absolute per-pixel intensity difference on the 0-255 scale.
/// Caller guarantees equal dimensions.
pub fn mean_abs_diff(a: &GrayImage, b: &GrayImage) -> f64 {
    debug_assert_eq!(a.dimensions(), b.dimensions());
    let total: u64 = a
        .as_raw()
        .iter()
        .zip(b.as_raw().iter())
        .map(|(&x, &y)| x.abs_diff(y) as u64)
        .sum();
    total as f64 / a.as_raw().len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    #[test]
    fn mean_abs_diff_of_identical_is_zero() {
        let img = GrayImage::from_pixel(8, 8, Luma([42]));
        assert_eq!(mean_abs_diff(&img, &img), 0.0);
    }

    #[test]
    fn mean_abs_diff_of_flat_frames_is_the_level_gap() {
        let a = GrayImage::from_pixel(16, 16, Luma([10]));
        let b = GrayImage::from_pixel(16, 16, Luma([210]));
        assert_eq!(mean_abs_diff(&a, &b), 200.0);
        assert_eq!(mean_abs_diff(&b, &a), 200.0);
    }
}
