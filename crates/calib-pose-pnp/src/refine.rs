//! Levenberg-Marquardt polish of a single pose on pixel residuals.

use calib_pose_core::rotation::{rotation_from_rvec, rvec_from_rotation};
use calib_pose_core::lm::minimize;
use calib_pose_core::{project, Intrinsics, LmConfig, ResidualProblem};
use nalgebra::{DVector, Point2, Point3, Rotation3, Vector3};

/// Parameters: `[rvec (3), t (3)]`; residuals: `(u, v)` per correspondence.
struct PoseProblem<'a> {
    object: &'a [Point3<f64>],
    image: &'a [Point2<f64>],
    intrinsics: &'a Intrinsics,
}

impl ResidualProblem for PoseProblem<'_> {
    fn residuals(&self, params: &DVector<f64>) -> Option<DVector<f64>> {
        let (rotation, translation) = unpack(params);
        let mut r = DVector::zeros(2 * self.object.len());
        for (i, (p, obs)) in self.object.iter().zip(self.image).enumerate() {
            let pred = project(p, &rotation, &translation, self.intrinsics).ok()?;
            r[2 * i] = pred.x - obs.x;
            r[2 * i + 1] = pred.y - obs.y;
        }
        Some(r)
    }
}

fn unpack(params: &DVector<f64>) -> (Rotation3<f64>, Vector3<f64>) {
    let rvec = Vector3::new(params[0], params[1], params[2]);
    let t = Vector3::new(params[3], params[4], params[5]);
    (rotation_from_rvec(&rvec), t)
}

/// Refined pose and its RMS pixel error, or `None` if the solver could not
/// run or did not improve on `initial_rms`.
pub(crate) fn refine_pose(
    rotation: &Rotation3<f64>,
    translation: &Vector3<f64>,
    object: &[Point3<f64>],
    image: &[Point2<f64>],
    intrinsics: &Intrinsics,
    patience: usize,
    initial_rms: f64,
) -> Option<(Rotation3<f64>, Vector3<f64>, f64)> {
    if patience == 0 || object.is_empty() {
        return None;
    }
    let problem = PoseProblem {
        object,
        image,
        intrinsics,
    };
    let rvec = rvec_from_rotation(rotation);
    let x0 = DVector::from_column_slice(&[
        rvec.x,
        rvec.y,
        rvec.z,
        translation.x,
        translation.y,
        translation.z,
    ]);
    let cfg = LmConfig {
        patience,
        ..LmConfig::default()
    };

    let report = minimize(&problem, x0, None, &cfg).ok()?;
    let rms = (report.cost / object.len() as f64).sqrt();
    if !(rms < initial_rms) {
        return None;
    }
    let (r, t) = unpack(&report.params);
    Some((r, t, rms))
}
