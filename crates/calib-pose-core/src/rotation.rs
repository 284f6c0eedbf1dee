//! Rotation helpers: axis-angle vectors, projection onto SO(3), RQ and Euler angles.
//!
//! # Euler convention
//!
//! Angles follow the intrinsic Z-Y-X order:
//!
//! ```text
//! R = Rz(yaw) * Ry(pitch) * Rx(roll)
//! ```
//!
//! They are extracted with the same Givens sequence an RQ decomposition
//! uses (first about x, then y, then z). The conversion is order dependent
//! and degenerates when `pitch` approaches ±90°: roll and yaw then rotate
//! about the same axis, roll is reported as 0 and yaw carries the remainder.
//! Compose rotations with the matrix or quaternion forms, not with angles.

use nalgebra::{Matrix3, Rotation3, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

/// Rotation from an axis-angle (Rodrigues) vector.
#[inline]
pub fn rotation_from_rvec(rvec: &Vector3<f64>) -> Rotation3<f64> {
    Rotation3::from_scaled_axis(*rvec)
}

/// Axis-angle (Rodrigues) vector of a rotation.
#[inline]
pub fn rvec_from_rotation(rotation: &Rotation3<f64>) -> Vector3<f64> {
    rotation.scaled_axis()
}

/// Closest proper rotation to `m` in the Frobenius sense.
pub fn project_to_so3(m: &Matrix3<f64>) -> Option<Rotation3<f64>> {
    let svd = m.svd(true, true);
    let u = svd.u?;
    let v_t = svd.v_t?;
    let mut r = u * v_t;
    if r.determinant() < 0.0 {
        let mut d = Matrix3::identity();
        d[(2, 2)] = -1.0;
        r = u * d * v_t;
    }
    if !r.iter().all(|v| v.is_finite()) {
        return None;
    }
    Some(Rotation3::from_matrix_unchecked(r))
}

pub fn quaternion_from_rotation(rotation: &Rotation3<f64>) -> UnitQuaternion<f64> {
    UnitQuaternion::from_rotation_matrix(rotation)
}

/// Result of `M = upper * rotation` with `rotation = Rz * Ry * Rx`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RqDecomposition {
    pub upper: Matrix3<f64>,
    pub rotation: Rotation3<f64>,
    /// Angles of the three Givens rotations (radians).
    pub angles: EulerAngles,
}

/// RQ-decompose a 3×3 matrix with Givens rotations about x, y and z.
///
/// `upper[(1,1)]` and `upper[(2,2)]` come out non-negative. For a proper
/// rotation `upper` is the identity and `angles` are its Z-Y-X Euler angles.
pub fn rq_decompose(m: &Matrix3<f64>) -> RqDecomposition {
    // Zero m[2,1] with Rx.
    let roll = m[(2, 1)].atan2(m[(2, 2)]);
    let qx = Rotation3::from_axis_angle(&Vector3::x_axis(), roll);
    let m1 = m * qx.matrix().transpose();

    // Zero m1[2,0] with Ry.
    let pitch = (-m1[(2, 0)]).atan2(m1[(2, 2)]);
    let qy = Rotation3::from_axis_angle(&Vector3::y_axis(), pitch);
    let m2 = m1 * qy.matrix().transpose();

    // Zero m2[1,0] with Rz.
    let yaw = m2[(1, 0)].atan2(m2[(1, 1)]);
    let qz = Rotation3::from_axis_angle(&Vector3::z_axis(), yaw);
    let mut upper = m2 * qz.matrix().transpose();

    // Givens rotations leave exact zeros up to rounding.
    upper[(1, 0)] = 0.0;
    upper[(2, 0)] = 0.0;
    upper[(2, 1)] = 0.0;

    RqDecomposition {
        upper,
        rotation: qz * qy * qx,
        angles: EulerAngles {
            roll,
            pitch,
            yaw,
        },
    }
}

/// Z-Y-X Euler angles in radians. See the module docs for the convention.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EulerAngles {
    /// Rotation about x, applied first.
    pub roll: f64,
    /// Rotation about y.
    pub pitch: f64,
    /// Rotation about z, applied last.
    pub yaw: f64,
}

impl EulerAngles {
    pub fn from_rotation(rotation: &Rotation3<f64>) -> Self {
        rq_decompose(rotation.matrix()).angles
    }

    pub fn to_rotation(&self) -> Rotation3<f64> {
        Rotation3::from_axis_angle(&Vector3::z_axis(), self.yaw)
            * Rotation3::from_axis_angle(&Vector3::y_axis(), self.pitch)
            * Rotation3::from_axis_angle(&Vector3::x_axis(), self.roll)
    }

    /// `[roll, pitch, yaw]` in degrees, the order used for reporting.
    pub fn to_degrees(&self) -> [f64; 3] {
        [
            self.roll.to_degrees(),
            self.pitch.to_degrees(),
            self.yaw.to_degrees(),
        ]
    }

    /// True when pitch is within `tol_deg` of ±90°.
    pub fn near_gimbal_lock(&self, tol_deg: f64) -> bool {
        (self.pitch.abs() - std::f64::consts::FRAC_PI_2).abs() < tol_deg.to_radians()
    }
}
