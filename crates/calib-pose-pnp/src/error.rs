/// Why no pose could be recovered for a set of correspondences.
///
/// Expected per marker and per frame; callers drop the marker and go on.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq)]
pub enum PoseError {
    #[error("need at least 4 finite correspondences, got {got}")]
    TooFewPoints { got: usize },
    #[error("{object} object points but {image} image points")]
    LengthMismatch { object: usize, image: usize },
    #[error("target size {size} is degenerate")]
    DegenerateSize { size: f64 },
    #[error("object points are not on the z = 0 plane")]
    NotPlanar,
    #[error("points are nearly collinear")]
    Collinear,
    #[error("plane-to-image homography could not be estimated")]
    HomographyFailed,
    #[error("no pose candidate places the target in front of the camera")]
    NoValidSolution,
}
