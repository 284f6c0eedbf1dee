//! Intrinsic calibration from views of a planar target.
//!
//! ## Quickstart
//!
//! ```no_run
//! use calib_pose_intrinsics::{calibrate, CalibrationOptions, CalibrationView};
//!
//! let views: Vec<CalibrationView> = Vec::new(); // one per detected board
//! match calibrate(&views, &CalibrationOptions::default()) {
//!     Ok(res) => println!("fx = {:.1}, rms = {:.3} px", res.intrinsics.fx, res.rms),
//!     Err(e) => eprintln!("calibration failed: {e}"),
//! }
//! ```
//!
//! Pipeline:
//! 1. Validate the views (matching lengths, `z = 0` targets, ≥ 4 points).
//! 2. Normalised DLT homography per view.
//! 3. Zhang's closed form with a zero-skew row, on homographies conditioned
//!    by one shared image normalisation.
//! 4. Board poses from `K⁻¹ H`, projected onto SO(3).
//! 5. Levenberg-Marquardt over intrinsics, distortion `(k1, k2, p1, p2, k3)`
//!    and all poses.

mod calibrate;
mod error;
mod planar_pose;
mod refine;
mod view;
mod zhang;

pub use calibrate::{
    calibrate, CalibrationOptions, CalibrationQuality, CalibrationResult, RefinementSummary,
    ViewExtrinsics,
};
pub use error::{CalibrationError, Degeneracy};
pub use planar_pose::pose_from_homography;
pub use view::{CalibrationView, MIN_POINTS_PER_VIEW};
pub use zhang::{image_normalization, intrinsics_from_homographies};
