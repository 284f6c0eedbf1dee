//! High-level facade crate for the `calib-pose-*` workspace.
//!
//! This crate provides:
//! - re-exports of the underlying crates,
//! - (feature `image`) checkerboard detection and calibration straight from
//!   `image::GrayImage`s, using the `chess-corners` ChESS detector,
//! - a stateless per-frame marker pipeline with pull/push seams,
//! - JSON persistence of the resulting camera model.
//!
//! ## Quickstart
//!
//! ```no_run
//! use calib_pose::aruco::builtins::DICT_4X4_50;
//! use calib_pose::io::load_intrinsics_or_default;
//! use calib_pose::pipeline::{MarkerPipeline, PipelineConfig};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let record = load_intrinsics_or_default("camera.json", 1280, 720);
//! let mut config = PipelineConfig::default();
//! config.identify.marker_length = 0.07;
//! let pipeline = MarkerPipeline::new(record.intrinsics()?, DICT_4X4_50, config)?;
//!
//! let frame = calib_pose::core::GrayImage::filled(1280, 720, 255);
//! for m in pipeline.process_frame(0, &frame.view()).markers {
//!     let r = m.report();
//!     println!("id {} at {:?}, euler {:?} deg", r.id, r.position, r.euler_deg);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## API map
//! - `calib_pose::core`: images, camera model, undistortion, rotations, LM.
//! - `calib_pose::chessboard`: checkerboard grid assembly and sub-pixel refinement.
//! - `calib_pose::intrinsics`: Zhang initialisation and joint refinement.
//! - `calib_pose::aruco`: dictionaries, quad extraction and marker identification.
//! - `calib_pose::pnp`: planar PnP and pose representations.
//! - `calib_pose::detect` (feature `image`): end-to-end helpers on `image::GrayImage`.
//! - `calib_pose::pipeline`: per-frame marker poses.
//! - `calib_pose::io`: intrinsics records.

pub use calib_pose_aruco as aruco;
pub use calib_pose_chessboard as chessboard;
pub use calib_pose_core as core;
pub use calib_pose_intrinsics as intrinsics;
pub use calib_pose_pnp as pnp;

pub use calib_pose_core::{Corner, Distortion, GrayImage, GrayImageView, Intrinsics, Marker};
pub use calib_pose_pnp::Pose;

#[cfg(feature = "image")]
pub mod detect;
pub mod io;
pub mod pipeline;
