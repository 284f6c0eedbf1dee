//! Checkerboard pattern detection on top of `calib-pose-core`.
//!
//! ## Quickstart
//!
//! ```
//! use calib_pose_chessboard::{ChessboardDetector, ChessboardParams, PatternSize};
//! use calib_pose_core::Corner;
//!
//! let detector = ChessboardDetector::new(ChessboardParams::default());
//! let corners: Vec<Corner> = Vec::new();
//! let result = detector.find_pattern_corners(&corners, PatternSize::new(9, 6));
//! assert!(!result.found);
//! ```
//!
//! Algorithm:
//! 1. Drop X-junction candidates below `min_strength`.
//! 2. Build k-nearest-neighbour lists with a kd-tree.
//! 3. From seeds near the centroid, grow a lattice breadth-first, accepting
//!    an edge when it extends one of the local axes `±u`, `±v` in direction
//!    and length. Local axes are re-estimated at every step, so perspective
//!    is followed.
//! 4. Accept the first lattice that fills a `cols × rows` box (up to swap).
//! 5. Order it row-major, right-handed, starting near the image top-left.
//!
//! `refine_subpixel` then moves each corner to the saddle point of the
//! intensity surface.

mod detector;
mod gridgraph;
mod params;
mod pattern;
mod subpixel;

pub use detector::ChessboardDetector;
pub use gridgraph::{grow_lattice, GridGraph, Lattice};
pub use params::{ChessboardParams, GridGraphParams};
pub use pattern::{PatternCorners, PatternNotFound, PatternSize};
pub use subpixel::{refine_subpixel, SubpixelConfig};
