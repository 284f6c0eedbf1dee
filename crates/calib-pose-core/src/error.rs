/// Errors raised by the camera model.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq)]
pub enum GeometryError {
    #[error("point is not in front of the camera (depth={depth})")]
    InvalidGeometry { depth: f64 },
    #[error("invalid focal lengths (fx={fx}, fy={fy})")]
    InvalidFocalLength { fx: f64, fy: f64 },
    #[error("distortion needs 4 to 8 coefficients, got {len}")]
    InvalidDistortion { len: usize },
    #[error("non-finite camera parameter")]
    NonFinite,
}

/// Errors raised when wrapping raw image buffers.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageError {
    #[error("invalid grayscale image dimensions (width={width}, height={height})")]
    InvalidDimensions { width: usize, height: usize },
    #[error("invalid grayscale image buffer length (expected {expected} bytes, got {got})")]
    BufferLength { expected: usize, got: usize },
}
