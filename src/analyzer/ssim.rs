//! Windowed structural similarity between two equally-sized gray frames.
//!
//! Mean of local SSIM over a 7x7 uniform window, K1=0.01, K2=0.03 and a
//! dynamic range of 255, the classic defaults, so scores line up with
//! what operators expect from other tooling. Returns values in [-1, 1];
//! exactly 1.0 for identical inputs.

use image::GrayImage;

const WIN: usize = 7;
const K1: f64 = 0.01;
const K2: f64 = 0.03;
const L: f64 = 255.0;

/// Structural similarity score for two frames of identical dimensions.
///
/// Panics in debug builds on a dimension mismatch; the caller gates on
/// dimensions before scoring.
pub fn ssim(a: &GrayImage, b: &GrayImage) -> f64 {
    debug_assert_eq!(a.dimensions(), b.dimensions());

    let (w, h) = a.dimensions();
    let (w, h) = (w as usize, h as usize);

    let x: Vec<f64> = a.as_raw().iter().map(|&p| p as f64).collect();
    let y: Vec<f64> = b.as_raw().iter().map(|&p| p as f64).collect();

    // Frames smaller than the window get a single whole-image window.
    if w < WIN || h < WIN {
        return local_ssim_from_sums(
            x.iter().sum(),
            y.iter().sum(),
            dot(&x, &x),
            dot(&y, &y),
            dot(&x, &y),
            (w * h) as f64,
        );
    }

    let sx = box_sum(&x, w, h);
    let sy = box_sum(&y, w, h);
    let sxx = box_sum(&product(&x, &x), w, h);
    let syy = box_sum(&product(&y, &y), w, h);
    let sxy = box_sum(&product(&x, &y), w, h);

    let n = (WIN * WIN) as f64;
    let count = sx.len();
    let mut acc = 0.0;
    for i in 0..count {
        acc += local_ssim_from_sums(sx[i], sy[i], sxx[i], syy[i], sxy[i], n);
    }
    acc / count as f64
}

fn local_ssim_from_sums(sx: f64, sy: f64, sxx: f64, syy: f64, sxy: f64, n: f64) -> f64 {
    let c1 = (K1 * L) * (K1 * L);
    let c2 = (K2 * L) * (K2 * L);

    let ux = sx / n;
    let uy = sy / n;
    // Sample (n-1) normalization, matching the reference formulation.
    let norm = if n > 1.0 { n / (n - 1.0) } else { 1.0 };
    let vx = norm * (sxx / n - ux * ux);
    let vy = norm * (syy / n - uy * uy);
    let vxy = norm * (sxy / n - ux * uy);

    ((2.0 * ux * uy + c1) * (2.0 * vxy + c2)) / ((ux * ux + uy * uy + c1) * (vx + vy + c2))
}

fn product(a: &[f64], b: &[f64]) -> Vec<f64> {
    a.iter().zip(b).map(|(x, y)| x * y).collect()
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Sliding WIN x WIN sums over fully-contained windows, separable passes.
/// Output is (w - WIN + 1) * (h - WIN + 1) values in row-major order.
fn box_sum(data: &[f64], w: usize, h: usize) -> Vec<f64> {
    let ow = w - WIN + 1;
    let oh = h - WIN + 1;

    // Horizontal pass: per-row windowed sums.
    let mut rows = vec![0.0; ow * h];
    for r in 0..h {
        let line = &data[r * w..(r + 1) * w];
        let mut acc: f64 = line[..WIN].iter().sum();
        rows[r * ow] = acc;
        for c in 1..ow {
            acc += line[c + WIN - 1] - line[c - 1];
            rows[r * ow + c] = acc;
        }
    }

    // Vertical pass over the row sums.
    let mut out = vec![0.0; ow * oh];
    for c in 0..ow {
        let mut acc: f64 = (0..WIN).map(|r| rows[r * ow + c]).sum();
        out[c] = acc;
        for r in 1..oh {
            acc += rows[(r + WIN - 1) * ow + c] - rows[(r - 1) * ow + c];
            out[r * ow + c] = acc;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn gradient(w: u32, h: u32) -> GrayImage {
        GrayImage::from_fn(w, h, |x, y| Luma([((x * 7 + y * 13) % 251) as u8]))
    }

    #[test]
    fn identical_frames_score_exactly_one() {
        let img = gradient(32, 24);
        assert_eq!(ssim(&img, &img), 1.0);
    }

    #[test]
    fn score_is_symmetric() {
        let a = gradient(32, 32);
        let b = GrayImage::from_fn(32, 32, |x, y| Luma([((x * 3 + y * 5) % 200) as u8]));
        let ab = ssim(&a, &b);
        let ba = ssim(&b, &a);
        assert!((ab - ba).abs() < 1e-12, "ssim not symmetric: {ab} vs {ba}");
    }

    #[test]
    fn flat_black_vs_flat_white_scores_near_zero() {
        let black = GrayImage::from_pixel(32, 32, Luma([0]));
        let white = GrayImage::from_pixel(32, 32, Luma([255]));
        let score = ssim(&black, &white);
        assert!(score < 0.01, "expected near-zero score, got {score}");
    }

    #[test]
    fn brightness_shift_keeps_structure() {
        // Source stays below 180 so the +60 shift never clips.
        let a = GrayImage::from_fn(32, 32, |x, y| Luma([((x * 7 + y * 13) % 180) as u8]));
        let b = GrayImage::from_fn(32, 32, |x, y| Luma([a.get_pixel(x, y)[0] + 60]));
        let score = ssim(&a, &b);
        assert!(score > 0.5, "structure should survive a flat shift, got {score}");
        assert!(score < 1.0);
    }

    #[test]
    fn tiny_frames_use_a_single_window() {
        let a = GrayImage::from_pixel(3, 3, Luma([128]));
        assert_eq!(ssim(&a, &a), 1.0);
    }
}
