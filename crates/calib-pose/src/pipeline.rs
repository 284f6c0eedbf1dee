//! Per-frame marker detection and pose estimation.
//!
//! A [`MarkerPipeline`] is built once from the camera model and the
//! dictionary and then shared read-only: every frame goes through
//! quad extraction, identification and PnP with no state carried over.

use crate::aruco::{Dictionary, DictionaryError, IdentifyParams, MarkerIdentifier, QuadParams};
use crate::core::{GrayImage, GrayImageView, Intrinsics, Marker, UndistortMap};
use crate::pnp::{try_estimate_pose, Pose, PoseParams};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::io::Write;

#[cfg(feature = "rayon")]
use rayon::prelude::*;

#[cfg(feature = "tracing")]
use tracing::instrument;

#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("failed to write results: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to encode results: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub identify: IdentifyParams,
    pub quads: QuadParams,
    pub pose: PoseParams,
}

/// An identified marker with its pose.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct MarkerPose {
    pub marker: Marker,
    pub pose: Pose,
}

/// Human-facing summary of a marker pose.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PoseReport {
    pub id: u32,
    /// Marker origin in the camera frame, in the unit of the marker size.
    pub position: [f64; 3],
    /// `[roll_x, pitch_y, yaw_z]` in degrees, Z-Y-X convention.
    pub euler_deg: [f64; 3],
    pub distance: f64,
    pub reprojection_error: f64,
    /// Pitch within 1° of ±90°, where roll and yaw are not separable.
    pub gimbal_lock: bool,
}

impl MarkerPose {
    pub fn report(&self) -> PoseReport {
        let euler = self.pose.euler();
        let t = self.pose.translation;
        PoseReport {
            id: self.marker.id,
            position: [t.x, t.y, t.z],
            euler_deg: euler.to_degrees(),
            distance: self.pose.distance(),
            reprojection_error: self.pose.reprojection_error,
            gimbal_lock: euler.near_gimbal_lock(1.0),
        }
    }
}

/// Everything recovered from one frame.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameResult {
    pub frame_index: usize,
    /// At most one entry per marker id, sorted by id.
    pub markers: Vec<MarkerPose>,
}

pub struct MarkerPipeline {
    intrinsics: Intrinsics,
    identifier: MarkerIdentifier,
    config: PipelineConfig,
    remap: Option<UndistortMap>,
}

impl MarkerPipeline {
    pub fn new(
        intrinsics: Intrinsics,
        dictionary: Dictionary,
        config: PipelineConfig,
    ) -> Result<Self, DictionaryError> {
        let identifier = MarkerIdentifier::new(dictionary, config.identify.clone())?;
        Ok(Self {
            intrinsics,
            identifier,
            config,
            remap: None,
        })
    }

    /// Undistort whole frames of `width × height` before detection.
    ///
    /// Without it, frames are searched as captured and only the marker
    /// corners are undistorted by the PnP step. Frames of another size fall
    /// back to that path.
    pub fn with_frame_undistortion(mut self, width: usize, height: usize) -> Self {
        self.remap = Some(UndistortMap::new(&self.intrinsics, width, height));
        self
    }

    pub fn intrinsics(&self) -> &Intrinsics {
        &self.intrinsics
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    #[cfg_attr(
        feature = "tracing",
        instrument(level = "info", skip(self, frame), fields(width = frame.width, height = frame.height))
    )]
    pub fn process_frame(&self, frame_index: usize, frame: &GrayImageView<'_>) -> FrameResult {
        let undistorted = self.remap.as_ref().and_then(|map| match map.remap(frame) {
            Ok(img) => Some(img),
            Err(err) => {
                warn!("frame {frame_index}: {err}; detecting on the raw frame");
                None
            }
        });
        let (view, intrinsics) = match &undistorted {
            Some(img) => (img.view(), self.intrinsics.without_distortion()),
            None => (*frame, self.intrinsics),
        };

        let markers = self.identifier.detect_markers(&view, &self.config.quads);
        let markers: Vec<MarkerPose> = markers
            .into_iter()
            .filter_map(|marker| {
                match try_estimate_pose(&marker, &intrinsics, &self.config.pose) {
                    Ok(pose) => Some(MarkerPose { marker, pose }),
                    Err(err) => {
                        debug!("frame {frame_index}: marker {} dropped: {err}", marker.id);
                        None
                    }
                }
            })
            .collect();

        debug!("frame {frame_index}: {} marker poses", markers.len());
        FrameResult {
            frame_index,
            markers,
        }
    }

    /// Process independent frames, in parallel with the `rayon` feature.
    /// Results keep the input order.
    pub fn process_frames(&self, frames: &[GrayImage]) -> Vec<FrameResult> {
        #[cfg(feature = "rayon")]
        let iter = frames.par_iter().enumerate();
        #[cfg(not(feature = "rayon"))]
        let iter = frames.iter().enumerate();

        iter.map(|(i, f)| self.process_frame(i, &f.view())).collect()
    }
}

/// Pull side of the pipeline: a camera, a video decoder, a list of files.
pub trait FrameSource {
    /// Next frame, or `None` when the source is exhausted.
    fn next_frame(&mut self) -> Option<GrayImage>;
}

/// Any iterator of frames is a source.
pub struct IterSource<I>(pub I);

impl<I: Iterator<Item = GrayImage>> FrameSource for IterSource<I> {
    fn next_frame(&mut self) -> Option<GrayImage> {
        self.0.next()
    }
}

/// Push side of the pipeline: overlays, loggers, network publishers.
pub trait PoseSink {
    fn accept(&mut self, result: &FrameResult) -> Result<(), PipelineError>;
}

impl PoseSink for Vec<FrameResult> {
    fn accept(&mut self, result: &FrameResult) -> Result<(), PipelineError> {
        self.push(result.clone());
        Ok(())
    }
}

/// Writes one JSON object per frame.
pub struct JsonLinesSink<W: Write> {
    out: W,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

#[derive(Serialize)]
struct FrameLine {
    frame_index: usize,
    markers: Vec<PoseReport>,
}

impl<W: Write> PoseSink for JsonLinesSink<W> {
    fn accept(&mut self, result: &FrameResult) -> Result<(), PipelineError> {
        let line = FrameLine {
            frame_index: result.frame_index,
            markers: result.markers.iter().map(MarkerPose::report).collect(),
        };
        serde_json::to_writer(&mut self.out, &line)?;
        writeln!(self.out)?;
        Ok(())
    }
}

/// Drain `source` through `pipeline` into `sink`, stopping after
/// `max_frames` when given. Returns the number of frames processed.
pub fn run_pipeline<S, K>(
    pipeline: &MarkerPipeline,
    source: &mut S,
    sink: &mut K,
    max_frames: Option<usize>,
) -> Result<usize, PipelineError>
where
    S: FrameSource + ?Sized,
    K: PoseSink + ?Sized,
{
    let mut count = 0;
    while max_frames.is_none_or(|m| count < m) {
        let Some(frame) = source.next_frame() else {
            break;
        };
        let result = pipeline.process_frame(count, &frame.view());
        sink.accept(&result)?;
        count += 1;
    }
    Ok(count)
}
