//! Marker and general planar pose estimation.

use crate::ippe::{ippe_rotations, translation_for_rotation};
use crate::refine::refine_pose;
use crate::{Pose, PoseError};
use calib_pose_core::{
    project_points, Intrinsics, Marker, ReprojectionStats, UndistortConfig, MIN_DEPTH,
};
use log::{debug, trace};
use nalgebra::{Matrix2, Point2, Point3, Rotation3, Vector2, Vector3};
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Smallest target extent treated as a real object.
const MIN_TARGET_SIZE: f64 = 1e-9;

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PoseParams {
    /// LM patience for polishing the chosen candidate (at most seven residual
    /// evaluations per unit); 0 disables it.
    pub refine_iterations: usize,
    /// Inversion of the lens model for the observed corners.
    pub undistort: UndistortConfig,
    /// Minimal ratio of the two principal spreads of a point set.
    pub collinearity_tolerance: f64,
}

impl Default for PoseParams {
    fn default() -> Self {
        Self {
            refine_iterations: 10,
            undistort: UndistortConfig::default(),
            collinearity_tolerance: 1e-6,
        }
    }
}

/// Marker corners in the marker frame: x right, y down, origin at the
/// centre, in the order top-left, top-right, bottom-right, bottom-left.
///
/// A marker facing the camera squarely therefore has identity rotation.
pub fn marker_object_points(size: f64) -> [Point3<f64>; 4] {
    let h = 0.5 * size;
    [
        Point3::new(-h, -h, 0.0),
        Point3::new(h, -h, 0.0),
        Point3::new(h, h, 0.0),
        Point3::new(-h, h, 0.0),
    ]
}

/// One solution of the planar ambiguity.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PoseCandidate {
    pub rotation: Rotation3<f64>,
    pub translation: Vector3<f64>,
    /// RMS reprojection error in pixels.
    pub rms: f64,
}

/// Both candidates of a planar PnP solve, best first.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlanarPnp {
    pub best: PoseCandidate,
    /// The other valid candidate, if it is distinct and in front of the camera.
    pub alternative: Option<PoseCandidate>,
    /// Whether LM refinement improved `best`.
    pub refined: bool,
}

impl PlanarPnp {
    /// `alternative.rms / best.rms`; large values mean a clear decision.
    pub fn ambiguity_ratio(&self) -> Option<f64> {
        self.alternative
            .map(|alt| alt.rms / self.best.rms.max(f64::EPSILON))
    }
}

/// Pose of a planar target from `n >= 4` correspondences.
///
/// Object points must lie on `z = 0`; image points are distorted pixels.
/// The object points are centred before solving and the translation is
/// mapped back to the caller's origin.
pub fn solve_planar_pnp(
    object: &[Point3<f64>],
    image: &[Point2<f64>],
    intrinsics: &Intrinsics,
    params: &PoseParams,
) -> Result<PlanarPnp, PoseError> {
    if object.len() != image.len() {
        return Err(PoseError::LengthMismatch {
            object: object.len(),
            image: image.len(),
        });
    }
    let (object, image): (Vec<Point3<f64>>, Vec<Point2<f64>>) = object
        .iter()
        .zip(image)
        .filter(|(p, q)| p.iter().all(|v| v.is_finite()) && q.iter().all(|v| v.is_finite()))
        .map(|(p, q)| (*p, *q))
        .unzip();
    if object.len() < 4 {
        return Err(PoseError::TooFewPoints { got: object.len() });
    }

    let centre = object
        .iter()
        .fold(Vector3::zeros(), |acc, p| acc + p.coords)
        / object.len() as f64;
    let centred: Vec<Point3<f64>> = object.iter().map(|p| p - centre).collect();
    let extent = centred.iter().map(|p| p.xy().coords.norm()).fold(0.0, f64::max);
    if !(extent > MIN_TARGET_SIZE) {
        return Err(PoseError::DegenerateSize { size: extent });
    }
    if object.iter().any(|p| p.z.abs() > 1e-6 * extent) {
        return Err(PoseError::NotPlanar);
    }

    let plane: Vec<Point2<f64>> = centred.iter().map(|p| p.xy()).collect();
    let normalized: Vec<Point2<f64>> = image
        .iter()
        .map(|&p| intrinsics.undistort_to_normalized(p, &params.undistort))
        .collect();
    if is_collinear(&plane, params.collinearity_tolerance)
        || is_collinear(&normalized, params.collinearity_tolerance)
    {
        return Err(PoseError::Collinear);
    }

    let rotations = ippe_rotations(&plane, &normalized)?;

    let mut candidates: Vec<PoseCandidate> = Vec::with_capacity(2);
    for rotation in rotations {
        let Some(t_centred) = translation_for_rotation(&rotation, &centred, &normalized) else {
            trace!("candidate without a translation");
            continue;
        };
        if centred
            .iter()
            .any(|p| !((rotation * p + t_centred).z > MIN_DEPTH))
        {
            trace!("candidate behind the camera");
            continue;
        }
        let translation = t_centred - rotation * centre;
        let Ok(predicted) = project_points(&object, &rotation, &translation, intrinsics) else {
            continue;
        };
        let rms = ReprojectionStats::from_pairs(&image, &predicted).rms;
        if !rms.is_finite() {
            continue;
        }
        if candidates
            .iter()
            .any(|c| c.rotation.angle_to(&rotation) < 1e-9)
        {
            continue;
        }
        candidates.push(PoseCandidate {
            rotation,
            translation,
            rms,
        });
    }
    candidates.sort_by(|a, b| a.rms.total_cmp(&b.rms));

    let mut candidates = candidates.into_iter();
    let mut best = candidates.next().ok_or(PoseError::NoValidSolution)?;
    let alternative = candidates.next();
    if alternative.is_none() {
        trace!("single pose candidate (rms {:.3} px)", best.rms);
    }

    let refined = match refine_pose(
        &best.rotation,
        &best.translation,
        &object,
        &image,
        intrinsics,
        params.refine_iterations,
        best.rms,
    ) {
        Some((rotation, translation, rms)) => {
            best = PoseCandidate {
                rotation,
                translation,
                rms,
            };
            true
        }
        None => false,
    };

    Ok(PlanarPnp {
        best,
        alternative,
        refined,
    })
}

/// Pose of an identified marker with default parameters.
pub fn estimate_pose(marker: &Marker, intrinsics: &Intrinsics) -> Option<Pose> {
    match try_estimate_pose(marker, intrinsics, &PoseParams::default()) {
        Ok(pose) => Some(pose),
        Err(err) => {
            debug!("marker {}: {err}", marker.id);
            None
        }
    }
}

#[cfg_attr(
    feature = "tracing",
    instrument(level = "debug", skip(marker, intrinsics, params), fields(marker_id = marker.id))
)]
pub fn try_estimate_pose(
    marker: &Marker,
    intrinsics: &Intrinsics,
    params: &PoseParams,
) -> Result<Pose, PoseError> {
    if !(marker.size > MIN_TARGET_SIZE) || !marker.size.is_finite() {
        return Err(PoseError::DegenerateSize { size: marker.size });
    }
    let object = marker_object_points(marker.size);
    let solution = solve_planar_pnp(&object, &marker.corners_f64(), intrinsics, params)?;
    if let Some(ratio) = solution.ambiguity_ratio() {
        trace!("marker {}: ambiguity ratio {ratio:.2}", marker.id);
    }

    Ok(Pose {
        rotation: solution.best.rotation,
        translation: solution.best.translation,
        marker_id: marker.id,
        reprojection_error: solution.best.rms,
    })
}

/// Whether the point spread is (nearly) one-dimensional.
fn is_collinear(points: &[Point2<f64>], tolerance: f64) -> bool {
    let n = points.len() as f64;
    let mean = points.iter().fold(Vector2::zeros(), |acc, p| acc + p.coords) / n;
    let scatter = points.iter().fold(Matrix2::zeros(), |acc, p| {
        let d = p.coords - mean;
        acc + d * d.transpose()
    });
    let eig = scatter.symmetric_eigenvalues();
    let (lo, hi) = (eig.min(), eig.max());
    !(hi > 0.0) || lo / hi < tolerance
}
