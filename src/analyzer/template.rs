//! Template search via zero-mean normalized cross-correlation.

use image::GrayImage;

/// One location where the template scored at or above the threshold.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TemplateMatch {
    pub x: u32,
    pub y: u32,
    pub confidence: f64,
}

/// All positions where the zero-mean normalized cross-correlation of
/// `template` against `frame` meets `threshold`. Scores are in [-1, 1];
/// flat (zero-variance) regions never match.
pub fn match_template(frame: &GrayImage, template: &GrayImage, threshold: f64) -> Vec<TemplateMatch> {
    let (fw, fh) = frame.dimensions();
    let (tw, th) = template.dimensions();
    if tw == 0 || th == 0 || tw > fw || th > fh {
        return Vec::new();
    }

    let tpx: Vec<f64> = template.as_raw().iter().map(|&p| p as f64).collect();
    let t_mean = tpx.iter().sum::<f64>() / tpx.len() as f64;
    let t_centered: Vec<f64> = tpx.iter().map(|p| p - t_mean).collect();
    let t_norm_sq: f64 = t_centered.iter().map(|p| p * p).sum();
    if t_norm_sq == 0.0 {
        return Vec::new();
    }

    let fpx = frame.as_raw();
    let mut matches = Vec::new();

    for y in 0..=(fh - th) {
        for x in 0..=(fw - tw) {
            let mut patch_sum = 0.0;
            for ty in 0..th {
                let row = ((y + ty) * fw + x) as usize;
                for tx in 0..tw as usize {
                    patch_sum += fpx[row + tx] as f64;
                }
            }
            let patch_mean = patch_sum / tpx.len() as f64;

            let mut cross = 0.0;
            let mut patch_norm_sq = 0.0;
            for ty in 0..th {
                let row = ((y + ty) * fw + x) as usize;
                let trow = (ty * tw) as usize;
                for tx in 0..tw as usize {
                    let p = fpx[row + tx] as f64 - patch_mean;
                    cross += p * t_centered[trow + tx];
                    patch_norm_sq += p * p;
                }
            }

            if patch_norm_sq == 0.0 {
                continue;
            }
            let confidence = cross / (t_norm_sq * patch_norm_sq).sqrt();
            if confidence >= threshold {
                matches.push(TemplateMatch { x, y, confidence });
            }
        }
    }

    matches
}
