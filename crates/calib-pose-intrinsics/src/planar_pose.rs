use calib_pose_core::rotation::project_to_so3;
use nalgebra::{Matrix3, Rotation3, Vector3};

/// Board pose from a plane homography `H ~ K [r1 r2 t]`.
///
/// Returns the rotation and translation mapping target coordinates into the
/// camera frame, with the target in front of the camera (`t.z > 0`).
pub fn pose_from_homography(
    k: &Matrix3<f64>,
    h: &Matrix3<f64>,
) -> Option<(Rotation3<f64>, Vector3<f64>)> {
    let k_inv = k.try_inverse()?;
    let a1 = k_inv * h.column(0);
    let a2 = k_inv * h.column(1);
    let a3 = k_inv * h.column(2);

    let scale = 0.5 * (a1.norm() + a2.norm());
    if !(scale > 0.0) {
        return None;
    }
    let mut lambda = 1.0 / scale;
    if (lambda * a3).z < 0.0 {
        lambda = -lambda;
    }

    let r1 = lambda * a1;
    let r2 = lambda * a2;
    let r3 = r1.cross(&r2);
    let rotation = project_to_so3(&Matrix3::from_columns(&[r1, r2, r3]))?;
    let translation = lambda * a3;

    translation
        .iter()
        .all(|v| v.is_finite())
        .then_some((rotation, translation))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn recovers_pose_up_to_homography_scale() {
        let k = Matrix3::new(800.0, 0.0, 640.0, 0.0, 780.0, 360.0, 0.0, 0.0, 1.0);
        let rot = Rotation3::from_euler_angles(0.1, -0.05, 0.2);
        let t = Vector3::new(0.1, -0.05, 1.0);

        let mut h = Matrix3::zeros();
        h.set_column(0, &(k * rot.matrix().column(0)));
        h.set_column(1, &(k * rot.matrix().column(1)));
        h.set_column(2, &(k * t));
        // Homographies are only defined up to scale, including its sign.
        let h = h * -3.5;

        let (r_est, t_est) = pose_from_homography(&k, &h).expect("pose");
        assert_relative_eq!(t_est, t, epsilon = 1e-9);
        assert!(r_est.angle_to(&rot) < 1e-9);
    }
}
