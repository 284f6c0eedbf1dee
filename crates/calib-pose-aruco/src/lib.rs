//! Square fiducial markers: dictionaries, quad extraction and identification.
//!
//! This crate focuses on:
//! - dictionaries, either built in (the OpenCV 4x4 family, e.g. [`builtins::DICT_4X4_250`]) or loaded from JSON,
//! - finding dark convex quadrilaterals in a grayscale frame,
//! - reading the bit grid inside a quad and matching it under all four rotations.
//!
//! ```no_run
//! use calib_pose_aruco::{builtins, IdentifyParams, MarkerIdentifier, QuadParams};
//! use calib_pose_core::GrayImageView;
//!
//! # fn frame() -> GrayImageView<'static> { unimplemented!() }
//! let identifier = MarkerIdentifier::new(builtins::DICT_4X4_50, IdentifyParams::default())?;
//! for m in identifier.detect_markers(&frame(), &QuadParams::default()) {
//!     println!("marker {} at {:?}", m.id, m.center());
//! }
//! # Ok::<(), calib_pose_aruco::DictionaryError>(())
//! ```
//!
//! Corners of a returned [`calib_pose_core::Marker`] follow the marker's own
//! orientation: corner 0 is the codeword's top-left cell, then clockwise.

pub mod builtins;
mod dictionary;
mod identify;
mod matcher;
mod quad;
mod threshold;

#[cfg(test)]
mod testutil;

pub use dictionary::{Dictionary, DictionaryError};
pub use identify::{identify, try_identify, IdentificationRejected, IdentifyParams, MarkerIdentifier};
pub use matcher::{rotate_code_u64, Match, Matcher};
pub use quad::{detect_quads, validate_quad, DetectedQuadrilateral, QuadGate, QuadParams};
pub use threshold::adaptive_threshold;
