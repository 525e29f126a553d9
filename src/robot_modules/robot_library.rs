use std::f64::consts::FRAC_PI_2;
use nalgebra::{Matrix3, Vector3};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Serialize, Deserialize};
use crate::robot_modules::robot_model_module::{JointType, RobotModelModule};
use crate::utils::utils_errors::TrajoptError;
use crate::utils::utils_se3::se3_pose::SE3Pose;
use crate::utils::utils_se3::spatial::SpatialInertia;

/// Names of the robots that can be built with `RobotLibrary::load`.
pub const ROBOT_NAMES: [&str; 5] = ["pendulum", "double_pendulum", "cartpole", "ur5", "free_flyer_body"];

/// A box rigidly attached to a joint body, used as a coarse collision geometry for the link.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LinkShape {
    joint_idx: usize,
    placement: SE3Pose,
    half_extents: Vector3<f64>
}
impl LinkShape {
    pub fn new(joint_idx: usize, placement: SE3Pose, half_extents: Vector3<f64>) -> Self {
        Self { joint_idx, placement, half_extents }
    }
    pub fn joint_idx(&self) -> usize {
        self.joint_idx
    }
    pub fn placement(&self) -> &SE3Pose {
        &self.placement
    }
    pub fn half_extents(&self) -> &Vector3<f64> {
        &self.half_extents
    }
    /// The eight box corners in the joint frame.
    pub fn corners(&self) -> Vec<Vector3<f64>> {
        let h = &self.half_extents;
        let mut out = vec![];
        for sx in [-1.0, 1.0] {
            for sy in [-1.0, 1.0] {
                for sz in [-1.0, 1.0] {
                    out.push(self.placement.act_point(&Vector3::new(sx * h[0], sy * h[1], sz * h[2])));
                }
            }
        }
        out
    }
    /// Corners plus `num_samples` points drawn uniformly on the box surface, in the joint frame.
    pub fn sample_surface_points(&self, num_samples: usize, seed: u64) -> Vec<Vector3<f64>> {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let h = &self.half_extents;
        let mut out = self.corners();
        for _ in 0..num_samples {
            let face: usize = rng.gen_range(0..6);
            let axis = face / 2;
            let sign = if face % 2 == 0 { -1.0 } else { 1.0 };
            let mut p = Vector3::new(rng.gen_range(-h[0]..=h[0]), rng.gen_range(-h[1]..=h[1]), rng.gen_range(-h[2]..=h[2]));
            p[axis] = sign * h[axis];
            out.push(self.placement.act_point(&p));
        }
        out
    }
}

/// Convenience struct that builds the robot models shipped with the crate.
///
/// # Example
/// ```
/// use trajopt::robot_modules::robot_library::RobotLibrary;
///
/// let model = RobotLibrary::load("ur5").expect("error");
/// assert_eq!(model.nq(), 6);
/// assert!(RobotLibrary::load("not_a_robot").is_err());
/// ```
pub struct RobotLibrary;
impl RobotLibrary {
    pub fn load(robot_name: &str) -> Result<RobotModelModule, TrajoptError> {
        return match robot_name {
            "pendulum" => { Self::pendulum() }
            "double_pendulum" => { Self::double_pendulum() }
            "cartpole" => { Self::cartpole() }
            "ur5" => { Self::ur5() }
            "free_flyer_body" => { Self::free_flyer_body() }
            _ => { Err(TrajoptError::new_generic_error_str(&format!("robot {} is not in the library.  Available robots: {:?}", robot_name, ROBOT_NAMES), file!(), line!())) }
        }
    }
    pub fn load_link_shapes(robot_name: &str) -> Result<Vec<LinkShape>, TrajoptError> {
        let shapes = match robot_name {
            "pendulum" => {
                vec![LinkShape::new(0, SE3Pose::new_translation(0.0, 0.0, -0.5), Vector3::new(0.025, 0.025, 0.5))]
            }
            "double_pendulum" => {
                vec![
                    LinkShape::new(0, SE3Pose::new_translation(0.0, 0.0, -0.5), Vector3::new(0.025, 0.025, 0.5)),
                    LinkShape::new(1, SE3Pose::new_translation(0.0, 0.0, -0.5), Vector3::new(0.025, 0.025, 0.5))
                ]
            }
            "cartpole" => {
                vec![
                    LinkShape::new(0, SE3Pose::new_identity(), Vector3::new(0.2, 0.1, 0.05)),
                    LinkShape::new(1, SE3Pose::new_translation(0.0, 0.0, -0.5), Vector3::new(0.01, 0.01, 0.5))
                ]
            }
            "ur5" => {
                vec![
                    LinkShape::new(0, SE3Pose::new_identity(), Vector3::new(0.06, 0.06, 0.07)),
                    LinkShape::new(1, SE3Pose::new_translation(0.0, 0.0, 0.2125), Vector3::new(0.06, 0.06, 0.27)),
                    LinkShape::new(2, SE3Pose::new_translation(0.0, 0.0, 0.196), Vector3::new(0.045, 0.045, 0.24)),
                    LinkShape::new(3, SE3Pose::new_translation(0.0, 0.093, 0.0), Vector3::new(0.04, 0.06, 0.04)),
                    LinkShape::new(4, SE3Pose::new_translation(0.0, 0.0, 0.09465), Vector3::new(0.04, 0.04, 0.06)),
                    LinkShape::new(5, SE3Pose::new_translation(0.0, 0.06, 0.0), Vector3::new(0.04, 0.03, 0.04))
                ]
            }
            "free_flyer_body" => {
                vec![LinkShape::new(0, SE3Pose::new_identity(), Vector3::new(0.2, 0.15, 0.1))]
            }
            _ => { return Err(TrajoptError::new_generic_error_str(&format!("robot {} is not in the library.", robot_name), file!(), line!())); }
        };
        Ok(shapes)
    }

    fn pendulum() -> Result<RobotModelModule, TrajoptError> {
        let mut model = RobotModelModule::new_empty("pendulum");
        let j = model.add_joint("hinge", None, SE3Pose::new_identity(), JointType::new_revolute(Vector3::y()), SpatialInertia::new_point_mass(1.0, Vector3::new(0.0, 0.0, -1.0)))?;
        model.add_frame("tip", j, SE3Pose::new_translation(0.0, 0.0, -1.0))?;
        Ok(model)
    }
    fn double_pendulum() -> Result<RobotModelModule, TrajoptError> {
        let mut model = RobotModelModule::new_empty("double_pendulum");
        let j0 = model.add_joint("shoulder", None, SE3Pose::new_identity(), JointType::new_revolute(Vector3::y()), SpatialInertia::new_point_mass(1.0, Vector3::new(0.0, 0.0, -1.0)))?;
        let j1 = model.add_joint("elbow", Some(j0), SE3Pose::new_translation(0.0, 0.0, -1.0), JointType::new_revolute(Vector3::y()), SpatialInertia::new_point_mass(1.0, Vector3::new(0.0, 0.0, -1.0)))?;
        model.add_frame("tip", j1, SE3Pose::new_translation(0.0, 0.0, -1.0))?;
        Ok(model)
    }
    /// Cart on a rail along x with a hanging pole.  Only the cart is meant to be actuated.
    fn cartpole() -> Result<RobotModelModule, TrajoptError> {
        let mut model = RobotModelModule::new_empty("cartpole");
        let cart = model.add_joint("cart", None, SE3Pose::new_identity(), JointType::new_prismatic(Vector3::x()), SpatialInertia::new_box(1.0, Vector3::zeros(), 0.4, 0.2, 0.1))?;
        let pole = model.add_joint("pole", Some(cart), SE3Pose::new_identity(), JointType::new_revolute(Vector3::y()), SpatialInertia::new_cylinder(0.1, Vector3::new(0.0, 0.0, -0.5), 0.01, 1.0))?;
        model.add_frame("pole_tip", pole, SE3Pose::new_translation(0.0, 0.0, -1.0))?;
        Ok(model)
    }
    /// Six-dof arm with the link offsets of the UR5 and cylinder approximations of its link inertias.
    fn ur5() -> Result<RobotModelModule, TrajoptError> {
        let mut model = RobotModelModule::new_empty("ur5");
        let shoulder_pan = model.add_joint("shoulder_pan_joint", None,
                                           SE3Pose::new_translation(0.0, 0.0, 0.089159),
                                           JointType::new_revolute(Vector3::z()),
                                           SpatialInertia::new_cylinder(3.7, Vector3::zeros(), 0.06, 0.15))?;
        let shoulder_lift = model.add_joint("shoulder_lift_joint", Some(shoulder_pan),
                                            SE3Pose::new_from_euler_angles(0.0, FRAC_PI_2, 0.0, 0.0, 0.13585, 0.0),
                                            JointType::new_revolute(Vector3::y()),
                                            SpatialInertia::new_cylinder(8.393, Vector3::new(0.0, 0.0, 0.28), 0.06, 0.425))?;
        let elbow = model.add_joint("elbow_joint", Some(shoulder_lift),
                                    SE3Pose::new_translation(0.0, -0.1197, 0.425),
                                    JointType::new_revolute(Vector3::y()),
                                    SpatialInertia::new_cylinder(2.275, Vector3::new(0.0, 0.0, 0.25), 0.045, 0.39225))?;
        let wrist_1 = model.add_joint("wrist_1_joint", Some(elbow),
                                      SE3Pose::new_from_euler_angles(0.0, FRAC_PI_2, 0.0, 0.0, 0.0, 0.39225),
                                      JointType::new_revolute(Vector3::y()),
                                      SpatialInertia::new_cylinder(1.219, Vector3::zeros(), 0.04, 0.12))?;
        let wrist_2 = model.add_joint("wrist_2_joint", Some(wrist_1),
                                      SE3Pose::new_translation(0.0, 0.093, 0.0),
                                      JointType::new_revolute(Vector3::z()),
                                      SpatialInertia::new_cylinder(1.219, Vector3::zeros(), 0.04, 0.12))?;
        let wrist_3 = model.add_joint("wrist_3_joint", Some(wrist_2),
                                      SE3Pose::new_translation(0.0, 0.0, 0.09465),
                                      JointType::new_revolute(Vector3::y()),
                                      SpatialInertia::new(0.1879, Vector3::zeros(), Matrix3::from_diagonal(&Vector3::new(1e-4, 1e-4, 1.5e-4))))?;
        model.add_frame("ee_link", wrist_3, SE3Pose::new_translation(0.0, 0.0823, 0.0))?;
        model.add_frame("tool0", wrist_3, SE3Pose::new_from_euler_angles(-FRAC_PI_2, 0.0, 0.0, 0.0, 0.0823, 0.0))?;
        Ok(model)
    }
    /// A single floating rigid box.
    fn free_flyer_body() -> Result<RobotModelModule, TrajoptError> {
        let mut model = RobotModelModule::new_empty("free_flyer_body");
        let base = model.add_joint("root_joint", None, SE3Pose::new_identity(), JointType::FreeFlyer, SpatialInertia::new_box(2.0, Vector3::zeros(), 0.4, 0.3, 0.2))?;
        model.add_frame("body_center", base, SE3Pose::new_identity())?;
        Ok(model)
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use super::*;

    #[test]
    fn every_listed_robot_loads_with_shapes() {
        for name in ROBOT_NAMES {
            let model = RobotLibrary::load(name).unwrap();
            let shapes = RobotLibrary::load_link_shapes(name).unwrap();
            assert!(!shapes.is_empty());
            for s in &shapes { assert!(s.joint_idx() < model.num_joints()); }
        }
    }

    #[test]
    fn surface_samples_lie_on_the_box() {
        let shape = LinkShape::new(0, SE3Pose::new_identity(), Vector3::new(0.1, 0.2, 0.3));
        let points = shape.sample_surface_points(50, 7);
        assert_eq!(points.len(), 58);
        for p in points {
            let on_face = (p[0].abs() - 0.1).abs() < 1e-12 || (p[1].abs() - 0.2).abs() < 1e-12 || (p[2].abs() - 0.3).abs() < 1e-12;
            assert!(on_face);
            assert!(p[0].abs() <= 0.1 + 1e-12 && p[1].abs() <= 0.2 + 1e-12 && p[2].abs() <= 0.3 + 1e-12);
        }
    }

    #[test]
    fn samples_are_reproducible_from_seed() {
        let shape = LinkShape::new(0, SE3Pose::new_translation(1.0, 0.0, 0.0), Vector3::new(0.1, 0.1, 0.1));
        let a = shape.sample_surface_points(10, 3);
        let b = shape.sample_surface_points(10, 3);
        for (x, y) in a.iter().zip(b.iter()) { assert_abs_diff_eq!(x, y); }
    }
}
