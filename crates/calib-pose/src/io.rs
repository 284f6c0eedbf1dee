//! JSON persistence of camera intrinsics.

use crate::core::{GeometryError, Intrinsics};
use crate::intrinsics::CalibrationResult;
use log::{info, warn};
use nalgebra::Matrix3;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(thiserror::Error, Debug)]
pub enum RecordError {
    #[error("failed to access intrinsics record: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid intrinsics record json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("record does not describe a valid camera: {0}")]
    Camera(#[from] GeometryError),
}

/// Where a set of intrinsics came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntrinsicsSource {
    Calibrated,
    /// Guessed from the frame size, see [`default_intrinsics`].
    Default,
}

/// On-disk form of a calibration, OpenCV style.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IntrinsicsRecord {
    /// Row-major 3×3 camera matrix.
    pub camera_matrix: [[f64; 3]; 3],
    /// `(k1, k2, p1, p2, k3[, k4, k5, k6])`.
    pub dist_coeffs: Vec<f64>,
    pub image_width: usize,
    pub image_height: usize,
    /// RMS reprojection error of the calibration, in pixels.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rms: Option<f64>,
    pub source: IntrinsicsSource,
}

impl IntrinsicsRecord {
    pub fn from_intrinsics(
        intrinsics: &Intrinsics,
        image_width: usize,
        image_height: usize,
        rms: Option<f64>,
        source: IntrinsicsSource,
    ) -> Self {
        let k = intrinsics.camera_matrix();
        Self {
            camera_matrix: [0, 1, 2].map(|r| [k[(r, 0)], k[(r, 1)], k[(r, 2)]]),
            dist_coeffs: intrinsics.distortion.to_coeffs(),
            image_width,
            image_height,
            rms,
            source,
        }
    }

    pub fn from_calibration(res: &CalibrationResult, image_width: usize, image_height: usize) -> Self {
        Self::from_intrinsics(
            &res.intrinsics,
            image_width,
            image_height,
            Some(res.rms),
            IntrinsicsSource::Calibrated,
        )
    }

    /// Validated camera model.
    pub fn intrinsics(&self) -> Result<Intrinsics, GeometryError> {
        let k = Matrix3::from_fn(|r, c| self.camera_matrix[r][c]);
        Intrinsics::from_camera_matrix(&k, &self.dist_coeffs)
    }

    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, RecordError> {
        let text = fs::read_to_string(path)?;
        let record: Self = serde_json::from_str(&text)?;
        record.intrinsics()?;
        Ok(record)
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), RecordError> {
        let text = serde_json::to_string_pretty(self)?;
        fs::write(path, text)?;
        Ok(())
    }
}

/// Rough webcam model: `fx = fy = width`, principal point at the centre,
/// no distortion.
pub fn default_intrinsics(width: usize, height: usize) -> IntrinsicsRecord {
    let w = width as f64;
    let h = height as f64;
    IntrinsicsRecord {
        camera_matrix: [[w, 0.0, 0.5 * w], [0.0, w, 0.5 * h], [0.0, 0.0, 1.0]],
        dist_coeffs: vec![0.0; 5],
        image_width: width,
        image_height: height,
        rms: None,
        source: IntrinsicsSource::Default,
    }
}

/// Load a record, falling back to [`default_intrinsics`] when the file is
/// missing, unreadable or invalid.
pub fn load_intrinsics_or_default(path: impl AsRef<Path>, width: usize, height: usize) -> IntrinsicsRecord {
    let path = path.as_ref();
    match IntrinsicsRecord::load_json(path) {
        Ok(record) => {
            info!("loaded intrinsics from {}", path.display());
            if record.image_width != width || record.image_height != height {
                warn!(
                    "intrinsics were calibrated at {}x{}, frames are {width}x{height}",
                    record.image_width, record.image_height
                );
            }
            record
        }
        Err(err) => {
            warn!(
                "{}: {err}; using default intrinsics for {width}x{height}",
                path.display()
            );
            default_intrinsics(width, height)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Distortion;
    use tempfile::tempdir;

    #[test]
    fn record_survives_a_file_round_trip() {
        let cam = Intrinsics::new(
            812.5,
            809.0,
            641.2,
            358.9,
            Distortion {
                k1: -0.1,
                k2: 0.02,
                p1: 0.001,
                ..Distortion::none()
            },
        )
        .expect("camera");
        let rec = IntrinsicsRecord::from_intrinsics(&cam, 1280, 720, Some(0.31), IntrinsicsSource::Calibrated);

        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("camera.json");
        rec.write_json(&path).expect("write");
        let back = IntrinsicsRecord::load_json(&path).expect("load");

        assert_eq!(back, rec);
        assert_eq!(back.intrinsics().expect("valid"), cam);
    }

    #[test]
    fn missing_or_broken_records_fall_back_to_defaults() {
        let dir = tempdir().expect("tempdir");
        let rec = load_intrinsics_or_default(dir.path().join("nope.json"), 1280, 720);
        assert_eq!(rec.source, IntrinsicsSource::Default);
        let k = rec.intrinsics().expect("valid");
        assert_eq!((k.fx, k.fy, k.cx, k.cy), (1280.0, 1280.0, 640.0, 360.0));
        assert_eq!(k.distortion, Distortion::none());

        let broken = dir.path().join("broken.json");
        fs::write(&broken, "{\"camera_matrix\": 3}").expect("write");
        assert!(matches!(IntrinsicsRecord::load_json(&broken), Err(RecordError::Json(_))));
        let rec = load_intrinsics_or_default(&broken, 640, 480);
        assert_eq!(rec.source, IntrinsicsSource::Default);
        assert_eq!(rec.image_width, 640);

        let bad_focal = dir.path().join("bad.json");
        let mut zero = default_intrinsics(640, 480);
        zero.camera_matrix[0][0] = 0.0;
        zero.write_json(&bad_focal).expect("write");
        assert!(matches!(
            IntrinsicsRecord::load_json(&bad_focal),
            Err(RecordError::Camera(_))
        ));
    }
}
