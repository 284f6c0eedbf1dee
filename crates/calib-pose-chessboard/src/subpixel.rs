//! Sub-pixel corner refinement by the gradient orthogonality condition.
//!
//! For a true X-junction at `q`, every image gradient `g(p)` in the
//! neighbourhood is orthogonal to `p - q`. Stacking these constraints with a
//! Gaussian weight gives the 2×2 system `(Σ g gᵀ) q = Σ g gᵀ p`, iterated
//! because the window moves with the estimate.

use calib_pose_core::{sample_bilinear_clamped, GrayImageView};
use nalgebra::{Point2, Vector2};
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct SubpixelConfig {
    /// Window is `(2 * half_window + 1)²` pixels.
    pub half_window: usize,
    pub max_iters: usize,
    /// Stop when a corner moves less than this (pixels).
    pub epsilon: f32,
}

impl Default for SubpixelConfig {
    fn default() -> Self {
        Self {
            half_window: 5,
            max_iters: 30,
            epsilon: 0.001,
        }
    }
}

/// Refine every corner independently; the output keeps the input order.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "debug", skip(image, corners, cfg), fields(corners = corners.len()))
)]
pub fn refine_subpixel(
    image: &GrayImageView<'_>,
    corners: &[Point2<f32>],
    cfg: &SubpixelConfig,
) -> Vec<Point2<f32>> {
    let weights = window_weights(cfg.half_window);
    corners
        .iter()
        .map(|&c| refine_one(image, c, cfg, &weights))
        .collect()
}

fn window_weights(half_window: usize) -> Vec<f64> {
    let w = half_window as i32;
    let scale = half_window.max(1) as f64;
    let mut out = Vec::with_capacity(((2 * w + 1) * (2 * w + 1)) as usize);
    for dy in -w..=w {
        for dx in -w..=w {
            let (x, y) = (dx as f64 / scale, dy as f64 / scale);
            out.push((-(x * x) - y * y).exp());
        }
    }
    out
}

fn refine_one(
    image: &GrayImageView<'_>,
    start: Point2<f32>,
    cfg: &SubpixelConfig,
    weights: &[f64],
) -> Point2<f32> {
    let w = cfg.half_window as i32;
    let eps_sq = (cfg.epsilon as f64).powi(2);
    let sample = |x: f64, y: f64| sample_bilinear_clamped(image, x as f32, y as f32) as f64;

    let origin = Vector2::new(start.x as f64, start.y as f64);
    let mut q = origin;

    for _ in 0..cfg.max_iters {
        let (mut a, mut b, mut c) = (0.0, 0.0, 0.0);
        let (mut bb1, mut bb2) = (0.0, 0.0);

        let mut k = 0;
        for dy in -w..=w {
            for dx in -w..=w {
                let (ox, oy) = (dx as f64, dy as f64);
                let (px, py) = (q.x + ox, q.y + oy);
                let gx = 0.5 * (sample(px + 1.0, py) - sample(px - 1.0, py));
                let gy = 0.5 * (sample(px, py + 1.0) - sample(px, py - 1.0));
                let m = weights[k];
                k += 1;

                let gxx = gx * gx * m;
                let gxy = gx * gy * m;
                let gyy = gy * gy * m;
                a += gxx;
                b += gxy;
                c += gyy;
                bb1 += gxx * ox + gxy * oy;
                bb2 += gxy * ox + gyy * oy;
            }
        }

        let det = a * c - b * b;
        if det.abs() <= f64::EPSILON * (a * c).abs().max(1.0) {
            break;
        }
        let shift = Vector2::new((c * bb1 - b * bb2) / det, (a * bb2 - b * bb1) / det);
        q += shift;

        if (q - origin).abs().max() > w as f64 {
            q = origin;
            break;
        }
        if shift.norm_squared() <= eps_sq {
            break;
        }
    }

    Point2::new(q.x as f32, q.y as f32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use calib_pose_core::GrayImage;

    /// Anti-aliased checkerboard with a corner lattice at `origin + k * square`.
    fn render_board(w: usize, h: usize, origin: (f64, f64), square: f64) -> GrayImage {
        const SS: usize = 8;
        let mut img = GrayImage::filled(w, h, 0);
        for y in 0..h {
            for x in 0..w {
                let mut acc = 0usize;
                for sy in 0..SS {
                    for sx in 0..SS {
                        let fx = x as f64 - 0.5 + (sx as f64 + 0.5) / SS as f64;
                        let fy = y as f64 - 0.5 + (sy as f64 + 0.5) / SS as f64;
                        let ci = ((fx - origin.0) / square).floor() as i64;
                        let cj = ((fy - origin.1) / square).floor() as i64;
                        if (ci + cj).rem_euclid(2) == 0 {
                            acc += 1;
                        }
                    }
                }
                img.put(x, y, (acc * 255 / (SS * SS)) as u8);
            }
        }
        img
    }

    #[test]
    fn converges_to_true_corner_from_rounded_guess() {
        let img = render_board(80, 80, (20.3, 19.6), 14.0);
        let truth = [
            Point2::new(20.3_f32, 19.6),
            Point2::new(34.3, 33.6),
            Point2::new(48.3, 19.6),
        ];
        let guess: Vec<Point2<f32>> = truth
            .iter()
            .map(|p| Point2::new(p.x.round() + 0.4, p.y.round() - 0.3))
            .collect();

        let refined = refine_subpixel(&img.view(), &guess, &SubpixelConfig::default());
        for (r, t) in refined.iter().zip(truth.iter()) {
            assert!((r - t).norm() < 0.1, "refined {:?} vs truth {:?}", r, t);
        }
    }

    #[test]
    fn flat_region_keeps_the_guess() {
        let img = GrayImage::filled(40, 40, 128);
        let guess = [Point2::new(20.0_f32, 20.0)];
        let refined = refine_subpixel(&img.view(), &guess, &SubpixelConfig::default());
        assert_eq!(refined[0], guess[0]);
    }
}
