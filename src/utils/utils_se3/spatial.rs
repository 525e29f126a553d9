use nalgebra::{Matrix3, Matrix6, Vector3, Vector6};
use serde::{Serialize, Deserialize};
use crate::utils::utils_se3::se3_pose::{SE3Pose, SE3Utils};

// Spatial vectors are stored as [linear; angular].

pub fn linear(v: &Vector6<f64>) -> Vector3<f64> {
    Vector3::new(v[0], v[1], v[2])
}
pub fn angular(v: &Vector6<f64>) -> Vector3<f64> {
    Vector3::new(v[3], v[4], v[5])
}
pub fn spatial(linear: &Vector3<f64>, angular: &Vector3<f64>) -> Vector6<f64> {
    Vector6::new(linear[0], linear[1], linear[2], angular[0], angular[1], angular[2])
}

/// Motion cross product `v x m`.
pub fn cross_motion(v: &Vector6<f64>, m: &Vector6<f64>) -> Vector6<f64> {
    let (vl, va) = (linear(v), angular(v));
    let (ml, ma) = (linear(m), angular(m));
    spatial(&(va.cross(&ml) + vl.cross(&ma)), &va.cross(&ma))
}
/// Force cross product `v x* f`.
pub fn cross_force(v: &Vector6<f64>, f: &Vector6<f64>) -> Vector6<f64> {
    let (vl, va) = (linear(v), angular(v));
    let (fl, fa) = (linear(f), angular(f));
    spatial(&va.cross(&fl), &(va.cross(&fa) + vl.cross(&fl)))
}

/// Action matrix of `aMb` on motions: maps a motion expressed in b to the same motion expressed in a.
pub fn motion_action_matrix(pose: &SE3Pose) -> Matrix6<f64> {
    let r = pose.rotation_matrix();
    let px = SE3Utils::skew(&pose.translation());
    let mut out = Matrix6::zeros();
    out.fixed_slice_mut::<3, 3>(0, 0).copy_from(&r);
    out.fixed_slice_mut::<3, 3>(0, 3).copy_from(&(px * r));
    out.fixed_slice_mut::<3, 3>(3, 3).copy_from(&r);
    out
}
/// Action matrix of `aMb` on forces: maps a force expressed in b to the same force expressed in a.
pub fn force_action_matrix(pose: &SE3Pose) -> Matrix6<f64> {
    let r = pose.rotation_matrix();
    let px = SE3Utils::skew(&pose.translation());
    let mut out = Matrix6::zeros();
    out.fixed_slice_mut::<3, 3>(0, 0).copy_from(&r);
    out.fixed_slice_mut::<3, 3>(3, 0).copy_from(&(px * r));
    out.fixed_slice_mut::<3, 3>(3, 3).copy_from(&r);
    out
}
pub fn act_motion(pose: &SE3Pose, m: &Vector6<f64>) -> Vector6<f64> {
    let r = pose.rotation();
    let w = r * angular(m);
    let l = r * linear(m) + pose.translation().cross(&w);
    spatial(&l, &w)
}
pub fn inverse_act_motion(pose: &SE3Pose, m: &Vector6<f64>) -> Vector6<f64> {
    let r_inv = pose.rotation().inverse();
    let (ml, ma) = (linear(m), angular(m));
    let w = r_inv * ma;
    let l = r_inv * (ml - pose.translation().cross(&ma));
    spatial(&l, &w)
}
pub fn inverse_act_force(pose: &SE3Pose, f: &Vector6<f64>) -> Vector6<f64> {
    let r_inv = pose.rotation().inverse();
    let (fl, fa) = (linear(f), angular(f));
    let l = r_inv * fl;
    let a = r_inv * (fa - pose.translation().cross(&fl));
    spatial(&l, &a)
}
pub fn act_force(pose: &SE3Pose, f: &Vector6<f64>) -> Vector6<f64> {
    let r = pose.rotation();
    let l = r * linear(f);
    let a = r * angular(f) + pose.translation().cross(&l);
    spatial(&l, &a)
}

/// Rigid body inertia expressed in the body (joint) frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SpatialInertia {
    mass: f64,
    com: Vector3<f64>,
    inertia_at_com: Matrix3<f64>
}
impl SpatialInertia {
    pub fn new(mass: f64, com: Vector3<f64>, inertia_at_com: Matrix3<f64>) -> Self {
        Self { mass, com, inertia_at_com }
    }
    pub fn new_zero() -> Self {
        Self::new(0.0, Vector3::zeros(), Matrix3::zeros())
    }
    pub fn new_point_mass(mass: f64, com: Vector3<f64>) -> Self {
        Self::new(mass, com, Matrix3::zeros())
    }
    /// Uniform box of the given side lengths centered at `com`.
    pub fn new_box(mass: f64, com: Vector3<f64>, x: f64, y: f64, z: f64) -> Self {
        let ixx = mass * (y * y + z * z) / 12.0;
        let iyy = mass * (x * x + z * z) / 12.0;
        let izz = mass * (x * x + y * y) / 12.0;
        Self::new(mass, com, Matrix3::from_diagonal(&Vector3::new(ixx, iyy, izz)))
    }
    /// Uniform cylinder of the given radius and length, with axis along local z.
    pub fn new_cylinder(mass: f64, com: Vector3<f64>, radius: f64, length: f64) -> Self {
        let ixx = mass * (3.0 * radius * radius + length * length) / 12.0;
        let izz = mass * radius * radius / 2.0;
        Self::new(mass, com, Matrix3::from_diagonal(&Vector3::new(ixx, ixx, izz)))
    }
    pub fn mass(&self) -> f64 {
        self.mass
    }
    pub fn com(&self) -> &Vector3<f64> {
        &self.com
    }
    pub fn inertia_at_com(&self) -> &Matrix3<f64> {
        &self.inertia_at_com
    }
    pub fn to_matrix(&self) -> Matrix6<f64> {
        let cx = SE3Utils::skew(&self.com);
        let m = self.mass;
        let mut out = Matrix6::zeros();
        out.fixed_slice_mut::<3, 3>(0, 0).copy_from(&(Matrix3::identity() * m));
        out.fixed_slice_mut::<3, 3>(0, 3).copy_from(&(-cx * m));
        out.fixed_slice_mut::<3, 3>(3, 0).copy_from(&(cx * m));
        out.fixed_slice_mut::<3, 3>(3, 3).copy_from(&(self.inertia_at_com - cx * cx * m));
        out
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use super::*;

    #[test]
    fn action_matrices_agree_with_direct_actions() {
        let pose = SE3Pose::new_from_euler_angles(0.3, -0.4, 1.2, 0.5, 0.1, -0.7);
        let m = Vector6::new(0.1, 0.2, 0.3, -0.4, 0.5, 0.6);
        assert_abs_diff_eq!(motion_action_matrix(&pose) * m, act_motion(&pose, &m), epsilon = 1e-12);
        assert_abs_diff_eq!(force_action_matrix(&pose) * m, act_force(&pose, &m), epsilon = 1e-12);
        assert_abs_diff_eq!(inverse_act_motion(&pose, &act_motion(&pose, &m)), m, epsilon = 1e-12);
        assert_abs_diff_eq!(inverse_act_force(&pose, &act_force(&pose, &m)), m, epsilon = 1e-12);
    }

    #[test]
    fn inertia_matrix_is_symmetric_and_gives_momentum() {
        let inertia = SpatialInertia::new_box(2.0, Vector3::new(0.1, 0.0, -0.3), 0.2, 0.3, 0.4);
        let mat = inertia.to_matrix();
        assert_abs_diff_eq!(mat, mat.transpose(), epsilon = 1e-12);
        // pure translation: momentum = m v
        let v = Vector6::new(1.0, 0.0, 0.0, 0.0, 0.0, 0.0);
        let h = mat * v;
        assert_abs_diff_eq!(linear(&h), Vector3::new(2.0, 0.0, 0.0), epsilon = 1e-12);
    }
}
