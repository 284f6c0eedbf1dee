use calib_pose_core::LmError;
use serde::{Deserialize, Serialize};

/// Why the closed-form initialisation could not produce a camera matrix.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Degeneracy {
    #[error("homography of view {view} could not be estimated")]
    Homography { view: usize },
    /// The views do not constrain the image of the absolute conic, e.g.
    /// all boards parallel to each other or repeated views.
    #[error("view constraints are rank deficient (singular value ratio {ratio:.3e})")]
    RankDeficient { ratio: f64 },
    #[error("closed-form solution has no positive focal lengths")]
    NoPositiveSolution,
    #[error("board pose of view {view} could not be recovered")]
    Pose { view: usize },
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum CalibrationError {
    #[error("need at least {required} views, got {got}")]
    InsufficientViews { got: usize, required: usize },
    #[error("degenerate configuration: {0}")]
    DegenerateConfiguration(Degeneracy),
    #[error("view {index} is invalid: {reason}")]
    InvalidView { index: usize, reason: String },
    #[error("refinement failed: {0}")]
    Refinement(#[from] LmError),
}

impl From<Degeneracy> for CalibrationError {
    fn from(d: Degeneracy) -> Self {
        Self::DegenerateConfiguration(d)
    }
}
