use calib_pose_core::rotation::{quaternion_from_rotation, rvec_from_rotation};
use calib_pose_core::EulerAngles;
use nalgebra::{Isometry3, Point3, Rotation3, Translation3, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

/// Rigid transform taking marker coordinates into the camera frame.
///
/// `translation` is in the unit of `Marker::size`; `reprojection_error` is
/// the RMS pixel distance over the marker corners.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub rotation: Rotation3<f64>,
    pub translation: Vector3<f64>,
    pub marker_id: u32,
    pub reprojection_error: f64,
}

impl Pose {
    /// Axis-angle vector, as used by OpenCV `rvec`.
    pub fn rvec(&self) -> Vector3<f64> {
        rvec_from_rotation(&self.rotation)
    }

    pub fn quaternion(&self) -> UnitQuaternion<f64> {
        quaternion_from_rotation(&self.rotation)
    }

    /// Z-Y-X Euler angles (radians). For display only; see
    /// [`calib_pose_core::rotation`] for the convention and its singularity.
    pub fn euler(&self) -> EulerAngles {
        EulerAngles::from_rotation(&self.rotation)
    }

    pub fn isometry(&self) -> Isometry3<f64> {
        Isometry3::from_parts(Translation3::from(self.translation), self.quaternion())
    }

    /// Distance from the camera centre to the marker origin.
    pub fn distance(&self) -> f64 {
        self.translation.norm()
    }

    pub fn transform_point(&self, p: &Point3<f64>) -> Point3<f64> {
        self.rotation * p + self.translation
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn representations_agree() {
        let pose = Pose {
            rotation: Rotation3::from_euler_angles(0.2, -0.1, 0.4),
            translation: Vector3::new(0.1, -0.2, 1.5),
            marker_id: 3,
            reprojection_error: 0.0,
        };
        let p = Point3::new(0.03, -0.02, 0.0);
        let expected = pose.transform_point(&p);

        assert_relative_eq!(pose.isometry() * p, expected, epsilon = 1e-12);
        let from_rvec = Rotation3::from_scaled_axis(pose.rvec());
        assert_relative_eq!(from_rvec * p, pose.rotation * p, epsilon = 1e-12);
        assert_relative_eq!(
            pose.euler().to_rotation().matrix(),
            pose.rotation.matrix(),
            epsilon = 1e-9
        );
    }
}
