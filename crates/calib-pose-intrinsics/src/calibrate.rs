use crate::planar_pose::pose_from_homography;
use crate::refine::{self, CalibrationProblem, CX, INTRINSIC_PARAMS, K1, K3, P1};
use crate::zhang::{image_normalization, intrinsics_from_homographies};
use crate::{CalibrationError, CalibrationView, Degeneracy};
use calib_pose_core::lm::minimize;
use calib_pose_core::{
    estimate_homography, project_points, Intrinsics, LmConfig, LmTermination, ReprojectionStats,
};
use log::{debug, info, warn};
use nalgebra::{Rotation3, Vector3};
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationOptions {
    /// Fewer views fail with `InsufficientViews`; never below 2.
    pub min_views: usize,
    /// Singular value ratio under which Zhang's system counts as rank deficient.
    pub rank_tolerance: f64,
    /// Overall RMS (pixels) above which the result is flagged `Poor`.
    pub rms_warn_threshold: f64,
    /// Image size, used to pin a fixed principal point to the centre and to
    /// sanity-check the estimate.
    pub image_size: Option<(usize, usize)>,
    pub fix_principal_point: bool,
    /// Keep `k3 = 0`.
    pub fix_k3: bool,
    /// Keep `p1 = p2 = 0`.
    pub zero_tangential: bool,
    /// Estimate a pure pinhole camera.
    pub fix_distortion: bool,
    pub lm: LmConfig,
}

impl Default for CalibrationOptions {
    fn default() -> Self {
        Self {
            min_views: 2,
            rank_tolerance: 1e-8,
            rms_warn_threshold: 1.0,
            image_size: None,
            fix_principal_point: false,
            fix_k3: false,
            zero_tangential: false,
            fix_distortion: false,
            lm: LmConfig {
                patience: 200,
                ..LmConfig::default()
            },
        }
    }
}

/// Board pose of one view and its reprojection error.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ViewExtrinsics {
    pub rotation: Rotation3<f64>,
    pub translation: Vector3<f64>,
    pub rms: f64,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct RefinementSummary {
    pub initial_cost: f64,
    pub final_cost: f64,
    /// Residual evaluations spent by the solver.
    pub evaluations: usize,
    pub termination: LmTermination,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum CalibrationQuality {
    Good,
    Poor { rms: f64, threshold: f64 },
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CalibrationResult {
    pub intrinsics: Intrinsics,
    pub extrinsics: Vec<ViewExtrinsics>,
    /// RMS reprojection error over all correspondences (pixels).
    pub rms: f64,
    pub refinement: RefinementSummary,
    pub rms_warn_threshold: f64,
}

impl CalibrationResult {
    pub fn quality(&self) -> CalibrationQuality {
        if self.rms > self.rms_warn_threshold {
            CalibrationQuality::Poor {
                rms: self.rms,
                threshold: self.rms_warn_threshold,
            }
        } else {
            CalibrationQuality::Good
        }
    }
}

/// Calibrate a pinhole camera with radial-tangential distortion from views
/// of a planar target.
///
/// Zhang's closed form initialises the camera matrix, each view's pose comes
/// from its homography, and all parameters are then refined jointly.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "info", skip(views, options), fields(views = views.len()))
)]
pub fn calibrate(
    views: &[CalibrationView],
    options: &CalibrationOptions,
) -> Result<CalibrationResult, CalibrationError> {
    let required = options.min_views.max(2);
    if views.len() < required {
        return Err(CalibrationError::InsufficientViews {
            got: views.len(),
            required,
        });
    }
    for (index, view) in views.iter().enumerate() {
        view.validate(index)?;
    }

    let homographies = views
        .iter()
        .enumerate()
        .map(|(i, v)| {
            estimate_homography(&v.plane_points(), &v.image_points)
                .map(|h| h.h)
                .ok_or(Degeneracy::Homography { view: i })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let image_sets: Vec<_> = views.iter().map(|v| v.image_points.clone()).collect();
    let normalization = image_normalization(&image_sets);
    let mut initial =
        intrinsics_from_homographies(&homographies, &normalization, options.rank_tolerance)?;
    info!(
        "initial intrinsics: fx={:.2} fy={:.2} cx={:.2} cy={:.2}",
        initial.fx, initial.fy, initial.cx, initial.cy
    );

    let k = initial.camera_matrix();
    let poses = homographies
        .iter()
        .enumerate()
        .map(|(i, h)| pose_from_homography(&k, h).ok_or(Degeneracy::Pose { view: i }))
        .collect::<Result<Vec<_>, _>>()?;

    if options.fix_principal_point {
        if let Some((w, h)) = options.image_size {
            initial.cx = w as f64 / 2.0;
            initial.cy = h as f64 / 2.0;
        }
    }

    let mut free = vec![true; INTRINSIC_PARAMS + refine::VIEW_PARAMS * views.len()];
    if options.fix_principal_point {
        free[CX] = false;
        free[CX + 1] = false;
    }
    if options.zero_tangential || options.fix_distortion {
        free[P1] = false;
        free[P1 + 1] = false;
    }
    if options.fix_k3 || options.fix_distortion {
        free[K3] = false;
    }
    if options.fix_distortion {
        free[K1] = false;
        free[K1 + 1] = false;
    }

    let problem = CalibrationProblem { views };
    let report = minimize(
        &problem,
        refine::pack(&initial, &poses),
        Some(&free),
        &options.lm,
    )?;
    debug!(
        "refinement: cost {:.3e} -> {:.3e} in {} evaluations ({:?})",
        report.initial_cost, report.cost, report.evaluations, report.termination
    );
    if !report.termination.converged() {
        warn!("refinement stopped without converging: {:?}", report.termination);
    }

    let intrinsics =
        refine::unpack_intrinsics(&report.params).ok_or(Degeneracy::NoPositiveSolution)?;

    let mut extrinsics = Vec::with_capacity(views.len());
    for (v, view) in views.iter().enumerate() {
        let (rotation, translation) = refine::unpack_pose(&report.params, v);
        let predicted = project_points(&view.object_points, &rotation, &translation, &intrinsics)
            .map_err(|_| Degeneracy::Pose { view: v })?;
        let stats = ReprojectionStats::from_pairs(&view.image_points, &predicted);
        debug!("view {v}: rms {:.4} px, max {:.4} px", stats.rms, stats.max);
        extrinsics.push(ViewExtrinsics {
            rotation,
            translation,
            rms: stats.rms,
        });
    }

    let n: usize = views.iter().map(CalibrationView::len).sum();
    let rms = (report.cost / n as f64).sqrt();

    let result = CalibrationResult {
        intrinsics,
        extrinsics,
        rms,
        refinement: RefinementSummary {
            initial_cost: report.initial_cost,
            final_cost: report.cost,
            evaluations: report.evaluations,
            termination: report.termination,
        },
        rms_warn_threshold: options.rms_warn_threshold,
    };

    info!(
        "calibrated {} views: fx={:.2} fy={:.2} cx={:.2} cy={:.2} rms={:.4} px",
        views.len(),
        intrinsics.fx,
        intrinsics.fy,
        intrinsics.cx,
        intrinsics.cy,
        rms
    );
    if let CalibrationQuality::Poor { rms, threshold } = result.quality() {
        warn!("calibration rms {rms:.3} px exceeds {threshold:.3} px");
    }
    if let Some((w, h)) = options.image_size {
        if !intrinsics.principal_point_in_bounds(w, h) {
            warn!(
                "principal point ({:.1}, {:.1}) lies outside the {w}x{h} image",
                intrinsics.cx, intrinsics.cy
            );
        }
    }

    Ok(result)
}
