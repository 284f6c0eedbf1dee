//! Pinhole camera with OpenCV-style radial-tangential distortion.
//!
//! Normalised coordinates are `(X/Z, Y/Z)` in the camera frame; pixels are
//! `(fx * x + cx, fy * y + cy)` after distortion.

use crate::GeometryError;
use nalgebra::{Matrix3, Point2, Point3, Rotation3, Vector3};
use serde::{Deserialize, Serialize};

/// Points closer than this to the camera plane are rejected by projection.
pub const MIN_DEPTH: f64 = 1e-9;

/// Lens distortion coefficients in OpenCV order `(k1, k2, p1, p2, k3, k4, k5, k6)`.
///
/// `k4..k6` form the denominator of the rational radial model and are zero
/// for the common 5-coefficient model.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Distortion {
    pub k1: f64,
    pub k2: f64,
    pub p1: f64,
    pub p2: f64,
    #[serde(default)]
    pub k3: f64,
    #[serde(default)]
    pub k4: f64,
    #[serde(default)]
    pub k5: f64,
    #[serde(default)]
    pub k6: f64,
}

impl Distortion {
    pub fn none() -> Self {
        Self::default()
    }

    /// Build from an OpenCV coefficient vector of length 4 to 8.
    pub fn from_coeffs(coeffs: &[f64]) -> Result<Self, GeometryError> {
        if !(4..=8).contains(&coeffs.len()) {
            return Err(GeometryError::InvalidDistortion { len: coeffs.len() });
        }
        if coeffs.iter().any(|c| !c.is_finite()) {
            return Err(GeometryError::NonFinite);
        }
        let at = |i: usize| coeffs.get(i).copied().unwrap_or(0.0);
        Ok(Self {
            k1: at(0),
            k2: at(1),
            p1: at(2),
            p2: at(3),
            k3: at(4),
            k4: at(5),
            k5: at(6),
            k6: at(7),
        })
    }

    /// Coefficient vector: 5 entries, or 8 when the rational terms are used.
    pub fn to_coeffs(&self) -> Vec<f64> {
        let mut out = vec![self.k1, self.k2, self.p1, self.p2, self.k3];
        if self.is_rational() {
            out.extend([self.k4, self.k5, self.k6]);
        }
        out
    }

    #[inline]
    pub fn is_rational(&self) -> bool {
        self.k4 != 0.0 || self.k5 != 0.0 || self.k6 != 0.0
    }

    /// Largest absolute coefficient.
    pub fn magnitude(&self) -> f64 {
        [
            self.k1, self.k2, self.p1, self.p2, self.k3, self.k4, self.k5, self.k6,
        ]
        .iter()
        .fold(0.0_f64, |m, c| m.max(c.abs()))
    }

    /// Forward model on normalised coordinates.
    #[inline]
    pub fn distort(&self, p: Point2<f64>) -> Point2<f64> {
        let (x, y) = (p.x, p.y);
        let r2 = x * x + y * y;
        let r4 = r2 * r2;
        let r6 = r4 * r2;

        let num = 1.0 + self.k1 * r2 + self.k2 * r4 + self.k3 * r6;
        let den = 1.0 + self.k4 * r2 + self.k5 * r4 + self.k6 * r6;
        let radial = if den.abs() > 1e-12 { num / den } else { num };

        let xy = x * y;
        let dx = 2.0 * self.p1 * xy + self.p2 * (r2 + 2.0 * x * x);
        let dy = self.p1 * (r2 + 2.0 * y * y) + 2.0 * self.p2 * xy;

        Point2::new(x * radial + dx, y * radial + dy)
    }
}

/// Camera intrinsics: focal lengths and principal point in pixels, plus distortion.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Intrinsics {
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
    #[serde(default)]
    pub distortion: Distortion,
}

impl Intrinsics {
    /// Validated constructor: focal lengths must be positive and every value finite.
    pub fn new(
        fx: f64,
        fy: f64,
        cx: f64,
        cy: f64,
        distortion: Distortion,
    ) -> Result<Self, GeometryError> {
        let out = Self {
            fx,
            fy,
            cx,
            cy,
            distortion,
        };
        out.validate()?;
        Ok(out)
    }

    /// Build from a 3×3 camera matrix and an OpenCV coefficient vector.
    pub fn from_camera_matrix(k: &Matrix3<f64>, dist_coeffs: &[f64]) -> Result<Self, GeometryError> {
        let distortion = if dist_coeffs.is_empty() {
            Distortion::none()
        } else {
            Distortion::from_coeffs(dist_coeffs)?
        };
        Self::new(k[(0, 0)], k[(1, 1)], k[(0, 2)], k[(1, 2)], distortion)
    }

    pub fn validate(&self) -> Result<(), GeometryError> {
        let vals = [self.fx, self.fy, self.cx, self.cy];
        if vals.iter().any(|v| !v.is_finite()) {
            return Err(GeometryError::NonFinite);
        }
        if self.fx <= 0.0 || self.fy <= 0.0 {
            return Err(GeometryError::InvalidFocalLength {
                fx: self.fx,
                fy: self.fy,
            });
        }
        Ok(())
    }

    pub fn camera_matrix(&self) -> Matrix3<f64> {
        Matrix3::new(
            self.fx, 0.0, self.cx, //
            0.0, self.fy, self.cy, //
            0.0, 0.0, 1.0,
        )
    }

    /// Same camera matrix with distortion removed.
    pub fn without_distortion(&self) -> Self {
        Self {
            distortion: Distortion::none(),
            ..*self
        }
    }

    pub fn principal_point_in_bounds(&self, width: usize, height: usize) -> bool {
        self.cx >= 0.0 && self.cy >= 0.0 && self.cx < width as f64 && self.cy < height as f64
    }

    #[inline]
    pub fn normalized_to_pixel(&self, p: Point2<f64>) -> Point2<f64> {
        Point2::new(self.fx * p.x + self.cx, self.fy * p.y + self.cy)
    }

    #[inline]
    pub fn pixel_to_normalized(&self, p: Point2<f64>) -> Point2<f64> {
        Point2::new((p.x - self.cx) / self.fx, (p.y - self.cy) / self.fy)
    }

    /// Project a point already expressed in the camera frame.
    pub fn project_camera_point(&self, pc: &Point3<f64>) -> Result<Point2<f64>, GeometryError> {
        if !(pc.z > MIN_DEPTH) || !pc.x.is_finite() || !pc.y.is_finite() {
            return Err(GeometryError::InvalidGeometry { depth: pc.z });
        }
        let xn = Point2::new(pc.x / pc.z, pc.y / pc.z);
        let xd = self.distortion.distort(xn);
        let px = self.normalized_to_pixel(xd);
        if !px.x.is_finite() || !px.y.is_finite() {
            return Err(GeometryError::InvalidGeometry { depth: pc.z });
        }
        Ok(px)
    }
}

/// Rigid transform followed by pinhole projection and distortion.
pub fn project(
    point: &Point3<f64>,
    rotation: &Rotation3<f64>,
    translation: &Vector3<f64>,
    intrinsics: &Intrinsics,
) -> Result<Point2<f64>, GeometryError> {
    let pc = rotation * point + translation;
    intrinsics.project_camera_point(&pc)
}

/// Project every point, failing on the first one behind the camera.
pub fn project_points(
    points: &[Point3<f64>],
    rotation: &Rotation3<f64>,
    translation: &Vector3<f64>,
    intrinsics: &Intrinsics,
) -> Result<Vec<Point2<f64>>, GeometryError> {
    points
        .iter()
        .map(|p| project(p, rotation, translation, intrinsics))
        .collect()
}

/// Euclidean pixel distance between an observation and a prediction.
#[inline]
pub fn reprojection_error(observed: &Point2<f64>, predicted: &Point2<f64>) -> f64 {
    (observed - predicted).norm()
}

/// Aggregated reprojection error over a set of correspondences.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ReprojectionStats {
    pub count: usize,
    pub sum: f64,
    pub mean: f64,
    pub rms: f64,
    pub max: f64,
}

impl ReprojectionStats {
    pub fn from_pairs(observed: &[Point2<f64>], predicted: &[Point2<f64>]) -> Self {
        let mut stats = Self::default();
        let mut sum_sq = 0.0;
        for (o, p) in observed.iter().zip(predicted) {
            let e = reprojection_error(o, p);
            stats.count += 1;
            stats.sum += e;
            sum_sq += e * e;
            stats.max = stats.max.max(e);
        }
        if stats.count > 0 {
            let n = stats.count as f64;
            stats.mean = stats.sum / n;
            stats.rms = (sum_sq / n).sqrt();
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn camera() -> Intrinsics {
        Intrinsics::new(1280.0, 1280.0, 640.0, 360.0, Distortion::none()).expect("camera")
    }

    #[test]
    fn projects_point_on_optical_axis_to_principal_point() {
        let cam = camera();
        let p = project(
            &Point3::new(0.0, 0.0, 0.0),
            &Rotation3::identity(),
            &Vector3::new(0.0, 0.0, 0.5),
            &cam,
        )
        .expect("projection");
        assert_relative_eq!(p.x, 640.0, epsilon = 1e-12);
        assert_relative_eq!(p.y, 360.0, epsilon = 1e-12);

        let q = project(
            &Point3::new(0.035, -0.035, 0.0),
            &Rotation3::identity(),
            &Vector3::new(0.0, 0.0, 0.5),
            &cam,
        )
        .expect("projection");
        assert_relative_eq!(q.x, 640.0 + 1280.0 * 0.07, epsilon = 1e-9);
        assert_relative_eq!(q.y, 360.0 - 1280.0 * 0.07, epsilon = 1e-9);
    }

    #[test]
    fn points_behind_camera_are_invalid_geometry() {
        let cam = camera();
        let err = project(
            &Point3::new(0.0, 0.0, 0.0),
            &Rotation3::identity(),
            &Vector3::new(0.0, 0.0, -1.0),
            &cam,
        )
        .unwrap_err();
        assert!(matches!(err, GeometryError::InvalidGeometry { .. }));

        let on_plane = cam.project_camera_point(&Point3::new(1.0, 1.0, 0.0));
        assert!(on_plane.is_err());
    }

    #[test]
    fn rejects_bad_intrinsics_and_coefficient_counts() {
        assert!(Intrinsics::new(0.0, 1.0, 0.0, 0.0, Distortion::none()).is_err());
        assert!(Intrinsics::new(f64::NAN, 1.0, 0.0, 0.0, Distortion::none()).is_err());
        assert!(Distortion::from_coeffs(&[0.1, 0.0, 0.0]).is_err());
        assert!(Distortion::from_coeffs(&[0.0; 9]).is_err());

        let d = Distortion::from_coeffs(&[0.1, -0.02, 0.001, 0.002]).expect("4 coeffs");
        assert_eq!(d.k3, 0.0);
        assert_eq!(d.to_coeffs().len(), 5);
        let r = Distortion::from_coeffs(&[0.1, -0.02, 0.0, 0.0, 0.0, 0.01, 0.0, 0.0])
            .expect("8 coeffs");
        assert_eq!(r.to_coeffs().len(), 8);
    }

    #[test]
    fn reprojection_stats_aggregate_errors() {
        let obs = [Point2::new(0.0, 0.0), Point2::new(10.0, 0.0)];
        let pred = [Point2::new(3.0, 4.0), Point2::new(10.0, 0.0)];
        let stats = ReprojectionStats::from_pairs(&obs, &pred);
        assert_eq!(stats.count, 2);
        assert_relative_eq!(stats.sum, 5.0);
        assert_relative_eq!(stats.mean, 2.5);
        assert_relative_eq!(stats.max, 5.0);
        assert_relative_eq!(stats.rms, (12.5_f64).sqrt());
    }

    #[test]
    fn principal_point_bounds() {
        let cam = camera();
        assert!(cam.principal_point_in_bounds(1280, 720));
        assert!(!cam.principal_point_in_bounds(320, 240));
    }
}
