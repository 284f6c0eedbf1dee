use crate::chessboard::{
    refine_subpixel, ChessboardDetector, ChessboardParams, PatternCorners, PatternSize,
    SubpixelConfig,
};
use crate::core;
use crate::intrinsics::{calibrate, CalibrationError, CalibrationOptions, CalibrationResult, CalibrationView};
use chess_corners::{find_chess_corners_image, ChessConfig, CornerDescriptor};
use log::{debug, info};
use nalgebra::Point2;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[cfg(feature = "rayon")]
use rayon::prelude::*;

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Errors produced by the image-level helpers.
#[derive(thiserror::Error, Debug)]
pub enum DetectError {
    #[error("invalid grayscale image buffer length (expected {expected} bytes, got {got})")]
    InvalidGrayBuffer { expected: usize, got: usize },

    #[error("invalid grayscale image dimensions (width={width}, height={height})")]
    InvalidGrayDimensions { width: u32, height: u32 },

    #[error("image {index} is {got_w}x{got_h}, the first one is {want_w}x{want_h}")]
    SizeMismatch {
        index: usize,
        want_w: u32,
        want_h: u32,
        got_w: u32,
        got_h: u32,
    },

    #[error(transparent)]
    Image(#[from] ::image::ImageError),

    #[error(transparent)]
    Calibration(#[from] CalibrationError),
}

/// Default settings for the `chess-corners` ChESS detector.
///
/// Tuned for printed boards filling a good part of a 720p frame; override
/// for small or blurry boards.
pub fn default_chess_config() -> ChessConfig {
    let mut cfg = ChessConfig::single_scale();
    cfg.params.threshold_rel = 0.2;
    cfg.params.nms_radius = 2;
    cfg
}

/// Borrow an `image::GrayImage` as the `calib-pose-core` view type.
pub fn gray_view(img: &::image::GrayImage) -> core::GrayImageView<'_> {
    core::GrayImageView {
        width: img.width() as usize,
        height: img.height() as usize,
        data: img.as_raw(),
    }
}

/// Owned `calib-pose-core` image, e.g. for a [`crate::pipeline::FrameSource`].
pub fn to_core_image(img: ::image::GrayImage) -> Result<core::GrayImage, DetectError> {
    let (w, h) = (img.width() as usize, img.height() as usize);
    let raw = img.into_raw();
    let got = raw.len();
    core::GrayImage::from_raw(w, h, raw).map_err(|_| DetectError::InvalidGrayBuffer {
        expected: w * h,
        got,
    })
}

/// Read any format `image` understands and convert it to 8-bit gray.
pub fn load_gray(path: impl AsRef<Path>) -> Result<::image::GrayImage, DetectError> {
    Ok(::image::open(path)?.to_luma8())
}

/// Build an `image::GrayImage` from a raw grayscale buffer.
pub fn gray_image_from_slice(
    width: u32,
    height: u32,
    pixels: &[u8],
) -> Result<::image::GrayImage, DetectError> {
    let w = usize::try_from(width).ok();
    let h = usize::try_from(height).ok();
    let Some((w, h)) = w.zip(h) else {
        return Err(DetectError::InvalidGrayDimensions { width, height });
    };
    let Some(expected) = w.checked_mul(h) else {
        return Err(DetectError::InvalidGrayDimensions { width, height });
    };
    if pixels.len() != expected {
        return Err(DetectError::InvalidGrayBuffer {
            expected,
            got: pixels.len(),
        });
    }
    ::image::GrayImage::from_raw(width, height, pixels.to_vec())
        .ok_or(DetectError::InvalidGrayDimensions { width, height })
}

/// Detect ChESS corners and adapt them into `calib-pose-core::Corner`.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "info", skip(img, cfg), fields(width = img.width(), height = img.height()))
)]
pub fn detect_corners(img: &::image::GrayImage, cfg: &ChessConfig) -> Vec<core::Corner> {
    find_chess_corners_image(img, cfg)
        .iter()
        .map(adapt_chess_corner)
        .collect()
}

/// Everything the checkerboard search needs besides the ChESS settings.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternSearchParams {
    pub chessboard: ChessboardParams,
    pub subpixel: SubpixelConfig,
}

/// ChESS corners, grid assembly and sub-pixel refinement in one call.
///
/// Refinement only runs on a complete pattern; partial results are returned
/// as found.
#[cfg_attr(
    feature = "tracing",
    instrument(
        level = "info",
        skip(img, chess_cfg, params),
        fields(width = img.width(), height = img.height(), cols = pattern.cols, rows = pattern.rows)
    )
)]
pub fn find_pattern_corners(
    img: &::image::GrayImage,
    chess_cfg: &ChessConfig,
    pattern: PatternSize,
    params: &PatternSearchParams,
) -> PatternCorners {
    let corners = detect_corners(img, chess_cfg);
    let detector = ChessboardDetector::new(params.chessboard.clone());
    let mut found = detector.find_pattern_corners(&corners, pattern);
    if found.found {
        found.corners = refine_subpixel(&gray_view(img), &found.corners, &params.subpixel);
    }
    found
}

/// Calibration plus bookkeeping about which images were usable.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ImageCalibration {
    pub result: CalibrationResult,
    /// Indices of the input images where the full pattern was found.
    pub used_images: Vec<usize>,
    pub image_width: u32,
    pub image_height: u32,
}

/// Detect `pattern` in every image and calibrate from the successful ones.
///
/// All images must share one size. Images without a full pattern are
/// skipped; too few usable images surface as
/// `CalibrationError::InsufficientViews`.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "info", skip_all, fields(images = images.len(), cols = pattern.cols, rows = pattern.rows))
)]
pub fn calibrate_from_images(
    images: &[::image::GrayImage],
    pattern: PatternSize,
    square_size: f64,
    chess_cfg: &ChessConfig,
    search: &PatternSearchParams,
    options: &CalibrationOptions,
) -> Result<ImageCalibration, DetectError> {
    let (width, height) = images.first().map(|i| i.dimensions()).unwrap_or((0, 0));
    if let Some((index, img)) = images
        .iter()
        .enumerate()
        .find(|(_, i)| i.dimensions() != (width, height))
    {
        return Err(DetectError::SizeMismatch {
            index,
            want_w: width,
            want_h: height,
            got_w: img.width(),
            got_h: img.height(),
        });
    }

    let find = |(i, img): (usize, &::image::GrayImage)| {
        let found = find_pattern_corners(img, chess_cfg, pattern, search);
        if !found.found {
            debug!("image {i}: pattern not found ({} partial corners)", found.corners.len());
        }
        found.found.then_some((i, found.corners))
    };
    #[cfg(feature = "rayon")]
    let detections: Vec<(usize, Vec<Point2<f32>>)> =
        images.par_iter().enumerate().filter_map(find).collect();
    #[cfg(not(feature = "rayon"))]
    let detections: Vec<(usize, Vec<Point2<f32>>)> =
        images.iter().enumerate().filter_map(find).collect();

    info!(
        "pattern {}x{} found in {}/{} images",
        pattern.cols,
        pattern.rows,
        detections.len(),
        images.len()
    );

    let object = pattern.object_points(square_size);
    let (used_images, views): (Vec<usize>, Vec<CalibrationView>) = detections
        .into_iter()
        .map(|(i, corners)| (i, CalibrationView::from_detection(&object, &corners)))
        .unzip();

    let mut options = options.clone();
    if options.image_size.is_none() && width > 0 {
        options.image_size = Some((width as usize, height as usize));
    }
    let result = calibrate(&views, &options)?;

    Ok(ImageCalibration {
        result,
        used_images,
        image_width: width,
        image_height: height,
    })
}

fn adapt_chess_corner(c: &CornerDescriptor) -> core::Corner {
    core::Corner {
        position: Point2::new(c.x, c.y),
        orientation: c.orientation,
        strength: c.response,
    }
}
