//! Canny-style edge extraction, exposed for downstream policies.

use image::GrayImage;

const LOW_THRESHOLD: f64 = 100.0;
const HIGH_THRESHOLD: f64 = 200.0;

/// Binary edge map of `frame`: 255 on edges, 0 elsewhere.
///
/// 3x3 Sobel gradients with L1 magnitude, non-maximum suppression along the
/// quantized gradient direction, then double-threshold hysteresis at 100/200.
pub fn detect_edges(frame: &GrayImage) -> GrayImage {
    let (w, h) = frame.dimensions();
    let mut out = GrayImage::new(w, h);
    if w < 3 || h < 3 {
        return out;
    }
    let (w, h) = (w as usize, h as usize);
    let px = frame.as_raw();

    let at = |x: usize, y: usize| px[y * w + x] as f64;

    let mut mag = vec![0.0f64; w * h];
    let mut dir = vec![0u8; w * h]; // 0: horizontal, 1: diag /, 2: vertical, 3: diag \
    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let gx = (at(x + 1, y - 1) + 2.0 * at(x + 1, y) + at(x + 1, y + 1))
                - (at(x - 1, y - 1) + 2.0 * at(x - 1, y) + at(x - 1, y + 1));
            let gy = (at(x - 1, y + 1) + 2.0 * at(x, y + 1) + at(x + 1, y + 1))
                - (at(x - 1, y - 1) + 2.0 * at(x, y - 1) + at(x + 1, y - 1));
            mag[y * w + x] = gx.abs() + gy.abs();

            let angle = gy.atan2(gx).to_degrees();
            let angle = if angle < 0.0 { angle + 180.0 } else { angle };
            dir[y * w + x] = match angle {
                a if !(22.5..157.5).contains(&a) => 0,
                a if a < 67.5 => 1,
                a if a < 112.5 => 2,
                _ => 3,
            };
        }
    }

    // Non-maximum suppression: keep only local maxima along the gradient.
    let mut thin = vec![0.0f64; w * h];
    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let m = mag[y * w + x];
            let (n1, n2) = match dir[y * w + x] {
                0 => (mag[y * w + x - 1], mag[y * w + x + 1]),
                1 => (mag[(y - 1) * w + x + 1], mag[(y + 1) * w + x - 1]),
                2 => (mag[(y - 1) * w + x], mag[(y + 1) * w + x]),
                _ => (mag[(y - 1) * w + x - 1], mag[(y + 1) * w + x + 1]),
            };
            if m >= n1 && m >= n2 {
                thin[y * w + x] = m;
            }
        }
    }

    // Hysteresis: strong pixels seed, weak pixels join when 8-connected.
    let mut state = vec![0u8; w * h]; // 0 none, 1 weak, 2 strong
    let mut stack = Vec::new();
    for i in 0..w * h {
        if thin[i] >= HIGH_THRESHOLD {
            state[i] = 2;
            stack.push(i);
        } else if thin[i] >= LOW_THRESHOLD {
            state[i] = 1;
        }
    }
    while let Some(i) = stack.pop() {
        let (x, y) = (i % w, i / w);
        for dy in -1i64..=1 {
            for dx in -1i64..=1 {
                let nx = x as i64 + dx;
                let ny = y as i64 + dy;
                if nx < 0 || ny < 0 || nx >= w as i64 || ny >= h as i64 {
                    continue;
                }
                let ni = ny as usize * w + nx as usize;
                if state[ni] == 1 {
                    state[ni] = 2;
                    stack.push(ni);
                }
            }
        }
    }

    let buf: &mut [u8] = &mut out;
    for i in 0..w * h {
        if state[i] == 2 {
            buf[i] = 255;
        }
    }
    out
}
