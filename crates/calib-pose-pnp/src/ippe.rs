//! Infinitesimal plane-based pose estimation (Collins & Bartoli, 2014).
//!
//! The plane-to-image homography is linearised at the plane origin. Its
//! Jacobian there fixes the first two rotation columns up to one sign, which
//! yields exactly two rotation candidates. Both are returned; the caller
//! disambiguates by reprojection error.

use crate::PoseError;
use calib_pose_core::estimate_homography;
use calib_pose_core::rotation::project_to_so3;
use nalgebra::{Matrix2, Matrix3, Point2, Point3, Rotation3, Vector3};

/// The two rotation candidates for a plane through the object origin.
///
/// `plane` holds object coordinates on `z = 0` (ideally centred at the
/// origin) and `normalized` the matching ideal image points `(x/z, y/z)`.
pub fn ippe_rotations(
    plane: &[Point2<f64>],
    normalized: &[Point2<f64>],
) -> Result<[Rotation3<f64>; 2], PoseError> {
    let h = estimate_homography(plane, normalized)
        .ok_or(PoseError::HomographyFailed)?
        .h;
    let h22 = h[(2, 2)];
    if !h.iter().all(|v| v.is_finite()) || h22.abs() < 1e-12 {
        return Err(PoseError::HomographyFailed);
    }

    // Image of the plane origin and the homography Jacobian there.
    let p = h[(0, 2)] / h22;
    let q = h[(1, 2)] / h22;
    let jac = Matrix2::new(
        (h[(0, 0)] - h[(2, 0)] * p) / h22,
        (h[(0, 1)] - h[(2, 1)] * p) / h22,
        (h[(1, 0)] - h[(2, 0)] * q) / h22,
        (h[(1, 1)] - h[(2, 1)] * q) / h22,
    );

    // Rv turns the optical axis onto the viewing ray of the origin.
    let ray = Vector3::new(p, q, 1.0);
    let rv = Rotation3::rotation_between(&Vector3::z(), &ray).ok_or(PoseError::NoValidSolution)?;
    let rvm = rv.matrix();

    let b = Matrix2::new(
        rvm[(0, 0)] - p * rvm[(2, 0)],
        rvm[(0, 1)] - p * rvm[(2, 1)],
        rvm[(1, 0)] - q * rvm[(2, 0)],
        rvm[(1, 1)] - q * rvm[(2, 1)],
    );
    let a = b.try_inverse().ok_or(PoseError::HomographyFailed)? * jac;

    let gamma = a.singular_values().max();
    if !(gamma > 1e-12) {
        return Err(PoseError::Collinear);
    }
    let r = a / gamma;

    let b0 = (1.0 - r[(0, 0)].powi(2) - r[(1, 0)].powi(2)).max(0.0).sqrt();
    let mut b1 = (1.0 - r[(0, 1)].powi(2) - r[(1, 1)].powi(2)).max(0.0).sqrt();
    if -(r[(0, 0)] * r[(0, 1)] + r[(1, 0)] * r[(1, 1)]) < 0.0 {
        b1 = -b1;
    }

    let candidate = |s: f64| {
        let c0 = Vector3::new(r[(0, 0)], r[(1, 0)], s * b0);
        let c1 = Vector3::new(r[(0, 1)], r[(1, 1)], s * b1);
        let c2 = c0.cross(&c1);
        project_to_so3(&(rvm * Matrix3::from_columns(&[c0, c1, c2])))
    };

    match (candidate(1.0), candidate(-1.0)) {
        (Some(r1), Some(r2)) => Ok([r1, r2]),
        _ => Err(PoseError::NoValidSolution),
    }
}

/// Least-squares translation for a fixed rotation.
///
/// Each correspondence contributes `t_x - x t_z = x (R P)_z - (R P)_x` and
/// the same for `y`.
pub fn translation_for_rotation(
    rotation: &Rotation3<f64>,
    object: &[Point3<f64>],
    normalized: &[Point2<f64>],
) -> Option<Vector3<f64>> {
    let mut ata = Matrix3::<f64>::zeros();
    let mut atb = Vector3::<f64>::zeros();

    for (p, m) in object.iter().zip(normalized) {
        let rp = rotation * p;
        for (row, rhs) in [
            (Vector3::new(1.0, 0.0, -m.x), m.x * rp.z - rp.x),
            (Vector3::new(0.0, 1.0, -m.y), m.y * rp.z - rp.y),
        ] {
            ata += row * row.transpose();
            atb += row * rhs;
        }
    }

    let t = ata.cholesky()?.solve(&atb);
    t.iter().all(|v| v.is_finite()).then_some(t)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn square(h: f64) -> Vec<Point3<f64>> {
        vec![
            Point3::new(-h, -h, 0.0),
            Point3::new(h, -h, 0.0),
            Point3::new(h, h, 0.0),
            Point3::new(-h, h, 0.0),
        ]
    }

    fn observe(obj: &[Point3<f64>], r: &Rotation3<f64>, t: &Vector3<f64>) -> Vec<Point2<f64>> {
        obj.iter()
            .map(|p| {
                let pc = r * p + t;
                Point2::new(pc.x / pc.z, pc.y / pc.z)
            })
            .collect()
    }

    #[test]
    fn one_candidate_is_exact() {
        let obj = square(0.05);
        let plane: Vec<_> = obj.iter().map(|p| p.xy()).collect();
        let r_true = Rotation3::from_euler_angles(0.4, -0.3, 0.7);
        let t_true = Vector3::new(0.02, -0.04, 0.6);
        let img = observe(&obj, &r_true, &t_true);

        let cands = ippe_rotations(&plane, &img).expect("candidates");
        let best = cands
            .iter()
            .min_by(|a, b| a.angle_to(&r_true).total_cmp(&b.angle_to(&r_true)))
            .expect("two candidates");
        assert!(best.angle_to(&r_true) < 1e-8);

        let t = translation_for_rotation(best, &obj, &img).expect("translation");
        assert_relative_eq!(t, t_true, epsilon = 1e-7);
    }

    #[test]
    fn face_on_candidates_coincide_with_identity() {
        let obj = square(0.035);
        let plane: Vec<_> = obj.iter().map(|p| p.xy()).collect();
        let img = observe(&obj, &Rotation3::identity(), &Vector3::new(0.0, 0.0, 0.5));

        let [r1, r2] = ippe_rotations(&plane, &img).expect("candidates");
        assert!(r1.angle() < 1e-9);
        assert!(r2.angle() < 1e-9);
    }
}
