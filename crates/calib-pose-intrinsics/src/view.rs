use crate::CalibrationError;
use nalgebra::{Point2, Point3};
use serde::{Deserialize, Serialize};

/// Correspondences of one image of the planar target.
///
/// Object points lie on `z = 0` in the target frame; `image_points[i]` is the
/// observation of `object_points[i]` in pixels.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CalibrationView {
    pub object_points: Vec<Point3<f64>>,
    pub image_points: Vec<Point2<f64>>,
}

/// Minimal correspondences per view for a homography.
pub const MIN_POINTS_PER_VIEW: usize = 4;

impl CalibrationView {
    pub fn new(object_points: Vec<Point3<f64>>, image_points: Vec<Point2<f64>>) -> Self {
        Self {
            object_points,
            image_points,
        }
    }

    /// Pair detector output (`f32` pixels) with a target template.
    pub fn from_detection(object_points: &[Point3<f64>], corners: &[Point2<f32>]) -> Self {
        Self {
            object_points: object_points.to_vec(),
            image_points: corners
                .iter()
                .map(|c| Point2::new(c.x as f64, c.y as f64))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.object_points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.object_points.is_empty()
    }

    /// Target-plane coordinates `(X, Y)` of the object points.
    pub fn plane_points(&self) -> Vec<Point2<f64>> {
        self.object_points
            .iter()
            .map(|p| Point2::new(p.x, p.y))
            .collect()
    }

    /// Check the invariants calibration relies on; `index` is reported back.
    pub fn validate(&self, index: usize) -> Result<(), CalibrationError> {
        let invalid = |reason: String| CalibrationError::InvalidView { index, reason };

        if self.object_points.len() != self.image_points.len() {
            return Err(invalid(format!(
                "{} object points but {} image points",
                self.object_points.len(),
                self.image_points.len()
            )));
        }
        if self.len() < MIN_POINTS_PER_VIEW {
            return Err(invalid(format!(
                "{} correspondences, at least {MIN_POINTS_PER_VIEW} required",
                self.len()
            )));
        }
        if let Some(i) = self.object_points.iter().position(|p| p.z.abs() > 1e-9) {
            return Err(invalid(format!("object point {i} is not on the z = 0 plane")));
        }
        let finite = self
            .object_points
            .iter()
            .all(|p| p.coords.iter().all(|v| v.is_finite()))
            && self
                .image_points
                .iter()
                .all(|p| p.coords.iter().all(|v| v.is_finite()));
        if !finite {
            return Err(invalid("non-finite coordinates".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square() -> Vec<Point3<f64>> {
        vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(1.0, 1.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        ]
    }

    #[test]
    fn validation_reports_the_view_index() {
        let img = vec![Point2::new(0.0, 0.0); 3];
        let view = CalibrationView::new(square(), img);
        match view.validate(7) {
            Err(CalibrationError::InvalidView { index, .. }) => assert_eq!(index, 7),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn off_plane_points_are_rejected() {
        let mut obj = square();
        obj[2].z = 0.1;
        let view = CalibrationView::new(obj, vec![Point2::new(1.0, 2.0); 4]);
        assert!(view.validate(0).is_err());

        let ok = CalibrationView::from_detection(&square(), &[Point2::new(1.0_f32, 2.0); 4]);
        assert!(ok.validate(0).is_ok());
    }
}
