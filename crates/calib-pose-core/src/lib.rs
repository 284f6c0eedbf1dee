//! Core types and numerics shared by the `calib-pose-*` crates.
//!
//! Everything here is purely geometric: grayscale image views, planar
//! homographies, the pinhole + radial-tangential camera model and its
//! inverse, rotation conventions, and a small Levenberg-Marquardt solver.
//! It does *not* depend on any concrete corner detector or image crate.

mod camera;
mod error;
mod homography;
mod image;
pub mod lm;
mod logger;
pub mod rotation;
mod types;
mod undistort;

pub use camera::{
    project, project_points, reprojection_error, Distortion, Intrinsics, ReprojectionStats,
    MIN_DEPTH,
};
pub use error::{GeometryError, ImageError};
pub use homography::{estimate_homography, homography_from_4pt, normalize_points, Homography};
pub use image::{
    sample_bilinear, sample_bilinear_clamped, sample_bilinear_u8, GrayImage, GrayImageView,
};
pub use lm::{LmConfig, LmError, LmReport, LmTermination, ResidualProblem};
pub use rotation::{rq_decompose, EulerAngles, RqDecomposition};
pub use types::{Corner, Marker};
pub use undistort::{
    undistort_image, undistort_normalized, UndistortConfig, UndistortError, UndistortMap,
};

#[cfg(feature = "tracing")]
pub use logger::init_tracing;

pub use logger::init_with_level;
