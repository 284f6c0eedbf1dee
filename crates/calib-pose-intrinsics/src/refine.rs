//! Joint reprojection-error problem over intrinsics and all view poses.
//!
//! Parameter layout:
//!
//! ```text
//! [fx, fy, cx, cy, k1, k2, p1, p2, k3, (rx, ry, rz, tx, ty, tz) per view]
//! ```
//!
//! Rotations are axis-angle vectors. Residuals are `predicted - observed`
//! in pixels, two per correspondence.

use crate::CalibrationView;
use calib_pose_core::rotation::{rotation_from_rvec, rvec_from_rotation};
use calib_pose_core::{project, Distortion, Intrinsics, ResidualProblem};
use nalgebra::{DVector, Rotation3, Vector3};

pub(crate) const INTRINSIC_PARAMS: usize = 9;
pub(crate) const VIEW_PARAMS: usize = 6;

pub(crate) const FX: usize = 0;
pub(crate) const CX: usize = 2;
pub(crate) const K1: usize = 4;
pub(crate) const P1: usize = 6;
pub(crate) const K3: usize = 8;

pub(crate) struct CalibrationProblem<'a> {
    pub views: &'a [CalibrationView],
}

pub(crate) fn pack(intrinsics: &Intrinsics, poses: &[(Rotation3<f64>, Vector3<f64>)]) -> DVector<f64> {
    let d = &intrinsics.distortion;
    let mut x = DVector::zeros(INTRINSIC_PARAMS + VIEW_PARAMS * poses.len());
    let head = [
        intrinsics.fx,
        intrinsics.fy,
        intrinsics.cx,
        intrinsics.cy,
        d.k1,
        d.k2,
        d.p1,
        d.p2,
        d.k3,
    ];
    x.rows_mut(0, INTRINSIC_PARAMS).copy_from_slice(&head);
    for (v, (r, t)) in poses.iter().enumerate() {
        let o = INTRINSIC_PARAMS + VIEW_PARAMS * v;
        x.fixed_rows_mut::<3>(o).copy_from(&rvec_from_rotation(r));
        x.fixed_rows_mut::<3>(o + 3).copy_from(t);
    }
    x
}

/// Intrinsics encoded in `x`; `None` for non-positive focal lengths.
pub(crate) fn unpack_intrinsics(x: &DVector<f64>) -> Option<Intrinsics> {
    let distortion = Distortion {
        k1: x[K1],
        k2: x[K1 + 1],
        p1: x[P1],
        p2: x[P1 + 1],
        k3: x[K3],
        ..Distortion::none()
    };
    Intrinsics::new(x[FX], x[FX + 1], x[CX], x[CX + 1], distortion).ok()
}

pub(crate) fn unpack_pose(x: &DVector<f64>, view: usize) -> (Rotation3<f64>, Vector3<f64>) {
    let o = INTRINSIC_PARAMS + VIEW_PARAMS * view;
    let rvec: Vector3<f64> = x.fixed_rows::<3>(o).into_owned();
    let t: Vector3<f64> = x.fixed_rows::<3>(o + 3).into_owned();
    (rotation_from_rvec(&rvec), t)
}

impl ResidualProblem for CalibrationProblem<'_> {
    fn residuals(&self, x: &DVector<f64>) -> Option<DVector<f64>> {
        let intrinsics = unpack_intrinsics(x)?;
        let n: usize = self.views.iter().map(CalibrationView::len).sum();
        let mut r = DVector::zeros(2 * n);

        let mut row = 0;
        for (v, view) in self.views.iter().enumerate() {
            let (rot, t) = unpack_pose(x, v);
            for (obj, img) in view.object_points.iter().zip(&view.image_points) {
                let p = project(obj, &rot, &t, &intrinsics).ok()?;
                r[row] = p.x - img.x;
                r[row + 1] = p.y - img.y;
                row += 2;
            }
        }
        Some(r)
    }
}
