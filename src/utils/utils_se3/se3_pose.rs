use nalgebra::{Isometry3, Matrix3, Rotation3, Translation3, UnitQuaternion, Vector3, Vector6};
use serde::{Serialize, Deserialize};

/// An SE(3) pose (rotation and translation).  Poses compose as `a.multiply(&b)` meaning
/// "b expressed in a's frame, then a".  A pose `aMb` maps points from frame b into frame a.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SE3Pose {
    data: Isometry3<f64>
}
impl SE3Pose {
    pub fn new(data: Isometry3<f64>) -> Self {
        Self { data }
    }
    pub fn new_identity() -> Self {
        Self::new(Isometry3::identity())
    }
    pub fn new_from_euler_angles(rx: f64, ry: f64, rz: f64, x: f64, y: f64, z: f64) -> Self {
        let rotation = UnitQuaternion::from_euler_angles(rx, ry, rz);
        Self::new(Isometry3::from_parts(Translation3::new(x, y, z), rotation))
    }
    pub fn new_from_rotation_and_translation(rotation: &Rotation3<f64>, translation: &Vector3<f64>) -> Self {
        let rotation = UnitQuaternion::from_rotation_matrix(rotation);
        Self::new(Isometry3::from_parts(Translation3::from(translation.clone()), rotation))
    }
    pub fn new_translation(x: f64, y: f64, z: f64) -> Self {
        Self::new(Isometry3::translation(x, y, z))
    }
    /// Exponential map from a twist `[linear; angular]` to a pose.
    pub fn new_from_exp6(twist: &Vector6<f64>) -> Self {
        let v = Vector3::new(twist[0], twist[1], twist[2]);
        let w = Vector3::new(twist[3], twist[4], twist[5]);
        let rotation = UnitQuaternion::from_scaled_axis(w.clone());
        let translation = SE3Utils::left_jacobian_so3(&w) * v;
        Self::new(Isometry3::from_parts(Translation3::from(translation), rotation))
    }
    pub fn data(&self) -> &Isometry3<f64> {
        &self.data
    }
    pub fn translation(&self) -> Vector3<f64> {
        self.data.translation.vector.clone()
    }
    pub fn rotation(&self) -> &UnitQuaternion<f64> {
        &self.data.rotation
    }
    pub fn rotation_matrix(&self) -> Matrix3<f64> {
        self.data.rotation.to_rotation_matrix().into_inner()
    }
    pub fn inverse(&self) -> SE3Pose {
        Self::new(self.data.inverse())
    }
    pub fn multiply(&self, other: &SE3Pose) -> SE3Pose {
        Self::new(self.data * other.data)
    }
    /// Maps a point expressed in this pose's local frame into the parent frame.
    pub fn act_point(&self, point: &Vector3<f64>) -> Vector3<f64> {
        self.data.rotation * point + self.data.translation.vector
    }
    /// Maps a point expressed in the parent frame into this pose's local frame.
    pub fn inverse_act_point(&self, point: &Vector3<f64>) -> Vector3<f64> {
        self.data.rotation.inverse() * (point - self.data.translation.vector)
    }
    /// The displacement between two poses such that self * displacement = other.
    pub fn displacement(&self, other: &SE3Pose) -> SE3Pose {
        self.inverse().multiply(other)
    }
    /// Logarithm map to a twist `[linear; angular]`.
    pub fn log6(&self) -> Vector6<f64> {
        let w: Vector3<f64> = self.data.rotation.scaled_axis();
        let v = SE3Utils::left_jacobian_inverse_so3(&w) * self.data.translation.vector;
        Vector6::new(v[0], v[1], v[2], w[0], w[1], w[2])
    }
}
impl Default for SE3Pose {
    fn default() -> Self { Self::new_identity() }
}

/// Convenience struct that holds class functions over SO(3) / SE(3) tangent spaces.
pub struct SE3Utils;
impl SE3Utils {
    pub fn skew(v: &Vector3<f64>) -> Matrix3<f64> {
        Matrix3::new(
            0.0, -v[2], v[1],
            v[2], 0.0, -v[0],
            -v[1], v[0], 0.0
        )
    }
    pub fn exp3(w: &Vector3<f64>) -> Rotation3<f64> {
        Rotation3::new(w.clone())
    }
    pub fn log3(r: &Rotation3<f64>) -> Vector3<f64> {
        r.scaled_axis()
    }
    /// V(w) such that the translation of exp6([v; w]) is V(w) v.
    pub fn left_jacobian_so3(w: &Vector3<f64>) -> Matrix3<f64> {
        let theta = w.norm();
        let wx = Self::skew(w);
        let wx2 = wx * wx;
        let (a, b) = if theta < 1e-6 {
            (0.5 - theta * theta / 24.0, 1.0 / 6.0 - theta * theta / 120.0)
        } else {
            ((1.0 - theta.cos()) / (theta * theta), (theta - theta.sin()) / (theta * theta * theta))
        };
        Matrix3::identity() + wx * a + wx2 * b
    }
    pub fn left_jacobian_inverse_so3(w: &Vector3<f64>) -> Matrix3<f64> {
        let theta = w.norm();
        let wx = Self::skew(w);
        let wx2 = wx * wx;
        let c = if theta < 1e-6 {
            1.0 / 12.0 + theta * theta / 720.0
        } else {
            (1.0 - (theta * theta.sin()) / (2.0 * (1.0 - theta.cos()))) / (theta * theta)
        };
        Matrix3::identity() - wx * 0.5 + wx2 * c
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use super::*;

    #[test]
    fn exp6_and_log6_are_inverse() {
        let twist = Vector6::new(0.3, -0.2, 0.5, 0.4, -1.1, 0.7);
        let pose = SE3Pose::new_from_exp6(&twist);
        let back = pose.log6();
        assert_abs_diff_eq!(back, twist, epsilon = 1e-9);
    }

    #[test]
    fn log6_of_identity_is_zero() {
        assert_abs_diff_eq!(SE3Pose::new_identity().log6(), Vector6::zeros(), epsilon = 1e-12);
    }

    #[test]
    fn small_angle_branch_matches_translation() {
        let twist = Vector6::new(1.0, 2.0, 3.0, 1e-9, 0.0, 0.0);
        let pose = SE3Pose::new_from_exp6(&twist);
        assert_abs_diff_eq!(pose.translation(), Vector3::new(1.0, 2.0, 3.0), epsilon = 1e-8);
    }

    #[test]
    fn inverse_act_undoes_act() {
        let pose = SE3Pose::new_from_euler_angles(0.1, 0.2, -0.3, 1.0, -2.0, 0.5);
        let p = Vector3::new(0.3, 0.7, -0.1);
        assert_abs_diff_eq!(pose.inverse_act_point(&pose.act_point(&p)), p, epsilon = 1e-12);
        let d = pose.displacement(&pose);
        assert_abs_diff_eq!(d.log6(), Vector6::zeros(), epsilon = 1e-12);
    }
}
