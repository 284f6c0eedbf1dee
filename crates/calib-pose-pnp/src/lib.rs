//! Planar PnP for square fiducial markers.
//!
//! A marker's four corners are undistorted to normalised coordinates and
//! passed to IPPE, which returns both rotations that explain the plane's
//! local appearance. Each candidate gets a least-squares translation;
//! candidates behind the camera are dropped and the rest are ranked by RMS
//! reprojection error in pixels. The winner is optionally polished by a few
//! Levenberg-Marquardt iterations.
//!
//! ```
//! use calib_pose_core::{Distortion, Intrinsics, Marker};
//! use calib_pose_pnp::estimate_pose;
//! use nalgebra::Point2;
//!
//! let k = Intrinsics::new(1280.0, 1280.0, 640.0, 360.0, Distortion::none()).unwrap();
//! // A 0.07 marker seen face-on at 0.5 covers 179.2 px.
//! let (lo, hi) = (640.0 - 89.6, 640.0 + 89.6);
//! let (top, bottom) = (360.0 - 89.6, 360.0 + 89.6);
//! let marker = Marker {
//!     id: 0,
//!     corners: [
//!         Point2::new(lo, top),
//!         Point2::new(hi, top),
//!         Point2::new(hi, bottom),
//!         Point2::new(lo, bottom),
//!     ],
//!     size: 0.07,
//!     rotation: 0,
//!     hamming: 0,
//!     border_score: 1.0,
//! };
//! let pose = estimate_pose(&marker, &k).unwrap();
//! assert!((pose.translation.z - 0.5).abs() < 1e-4);
//! ```

mod error;
mod estimate;
pub mod ippe;
mod pose;
mod refine;

pub use error::PoseError;
pub use estimate::{
    estimate_pose, marker_object_points, solve_planar_pnp, try_estimate_pose, PlanarPnp,
    PoseCandidate, PoseParams,
};
pub use pose::Pose;
