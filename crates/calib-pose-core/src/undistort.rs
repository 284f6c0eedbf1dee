//! Inverse of the radial-tangential model, per point and as a dense remap.

use crate::{sample_bilinear, Distortion, GrayImage, GrayImageView, Intrinsics};
use nalgebra::Point2;
use serde::{Deserialize, Serialize};

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum UndistortError {
    #[error("frame is {got_w}x{got_h}, remap was built for {want_w}x{want_h}")]
    SizeMismatch {
        want_w: usize,
        want_h: usize,
        got_w: usize,
        got_h: usize,
    },
}

/// Controls the fixed-point inversion of the distortion model.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct UndistortConfig {
    /// Hard cap on fixed-point iterations.
    pub max_iters: u32,
    /// Stop once the update (normalised units) is below this.
    pub eps: f64,
    /// Below this coefficient magnitude a single forward correction is used.
    pub small_distortion_threshold: f64,
}

impl Default for UndistortConfig {
    fn default() -> Self {
        Self {
            max_iters: 20,
            eps: 1e-12,
            small_distortion_threshold: 1e-6,
        }
    }
}

/// Map a distorted normalised point to its ideal pinhole position.
pub fn undistort_normalized(
    distortion: &Distortion,
    distorted: Point2<f64>,
    cfg: &UndistortConfig,
) -> Point2<f64> {
    if distortion.magnitude() < cfg.small_distortion_threshold {
        let delta = distortion.distort(distorted) - distorted;
        return distorted - delta;
    }

    // x_{k+1} = x_k - (distort(x_k) - x_d)
    let mut x = distorted;
    for _ in 0..cfg.max_iters {
        let residual = distortion.distort(x) - distorted;
        let next = x - residual;
        if !next.x.is_finite() || !next.y.is_finite() {
            break;
        }
        let step = (next - x).norm();
        x = next;
        if step < cfg.eps {
            break;
        }
    }
    x
}

impl Intrinsics {
    /// Distorted pixel to the ideal pixel under the same camera matrix.
    pub fn undistort_pixel(&self, p: Point2<f64>) -> Point2<f64> {
        self.undistort_pixel_with(p, &UndistortConfig::default())
    }

    pub fn undistort_pixel_with(&self, p: Point2<f64>, cfg: &UndistortConfig) -> Point2<f64> {
        let xn = self.undistort_to_normalized(p, cfg);
        self.normalized_to_pixel(xn)
    }

    /// Distorted pixel to ideal normalised coordinates.
    pub fn undistort_to_normalized(&self, p: Point2<f64>, cfg: &UndistortConfig) -> Point2<f64> {
        let xd = self.pixel_to_normalized(p);
        undistort_normalized(&self.distortion, xd, cfg)
    }

    /// Ideal pixel to the pixel the lens actually produces.
    pub fn distort_pixel(&self, p: Point2<f64>) -> Point2<f64> {
        let xn = self.pixel_to_normalized(p);
        self.normalized_to_pixel(self.distortion.distort(xn))
    }

    pub fn undistort_points(&self, points: &[Point2<f64>]) -> Vec<Point2<f64>> {
        let cfg = UndistortConfig::default();
        points
            .iter()
            .map(|&p| self.undistort_pixel_with(p, &cfg))
            .collect()
    }
}

/// Precomputed dense remap from an ideal (undistorted) frame to source pixels.
///
/// Build once per camera and resolution, then reuse for every frame; it is
/// immutable and can be shared across worker threads.
#[derive(Clone, Debug)]
pub struct UndistortMap {
    width: usize,
    height: usize,
    map: Vec<Point2<f32>>,
}

impl UndistortMap {
    pub fn new(intrinsics: &Intrinsics, width: usize, height: usize) -> Self {
        let mut map = Vec::with_capacity(width * height);
        for y in 0..height {
            for x in 0..width {
                let src = intrinsics.distort_pixel(Point2::new(x as f64, y as f64));
                map.push(Point2::new(src.x as f32, src.y as f32));
            }
        }
        Self { width, height, map }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Produce a new undistorted frame; `src` is left untouched.
    pub fn remap(&self, src: &GrayImageView<'_>) -> Result<GrayImage, UndistortError> {
        if src.width != self.width || src.height != self.height {
            return Err(UndistortError::SizeMismatch {
                want_w: self.width,
                want_h: self.height,
                got_w: src.width,
                got_h: src.height,
            });
        }
        let data = self
            .map
            .iter()
            .map(|p| sample_bilinear(src, p.x, p.y).round().clamp(0.0, 255.0) as u8)
            .collect();
        Ok(GrayImage {
            width: self.width,
            height: self.height,
            data,
        })
    }
}

/// One-shot dense undistortion of a frame.
pub fn undistort_image(
    intrinsics: &Intrinsics,
    src: &GrayImageView<'_>,
) -> Result<GrayImage, UndistortError> {
    UndistortMap::new(intrinsics, src.width, src.height).remap(src)
}
