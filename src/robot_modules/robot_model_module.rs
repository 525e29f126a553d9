use std::collections::HashMap;
use nalgebra::{DMatrix, DVector, Isometry3, Quaternion, Translation3, Unit, UnitQuaternion, Vector3};
use serde::{Serialize, Deserialize};
use crate::utils::utils_console::{trajopt_print, PrintColor, PrintMode};
use crate::utils::utils_errors::TrajoptError;
use crate::utils::utils_se3::se3_pose::SE3Pose;
use crate::utils::utils_se3::spatial::SpatialInertia;

/// The type of motion a joint allows between its parent and its own body.
///
/// A `FreeFlyer` joint is parameterized by `[x, y, z, qx, qy, qz, qw]` (nq = 7) and its velocity
/// is the body twist `[v; w]` expressed in the joint frame (nv = 6).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum JointType {
    Revolute { axis: Unit<Vector3<f64>> },
    Prismatic { axis: Unit<Vector3<f64>> },
    FreeFlyer
}
impl JointType {
    pub fn new_revolute(axis: Vector3<f64>) -> Self {
        Self::Revolute { axis: Unit::new_normalize(axis) }
    }
    pub fn new_prismatic(axis: Vector3<f64>) -> Self {
        Self::Prismatic { axis: Unit::new_normalize(axis) }
    }
    pub fn nq(&self) -> usize {
        return match self {
            JointType::Revolute { .. } => { 1 }
            JointType::Prismatic { .. } => { 1 }
            JointType::FreeFlyer => { 7 }
        }
    }
    pub fn nv(&self) -> usize {
        return match self {
            JointType::Revolute { .. } => { 1 }
            JointType::Prismatic { .. } => { 1 }
            JointType::FreeFlyer => { 6 }
        }
    }
    /// Placement of the joint's body frame relative to the joint's origin for the given joint
    /// configuration slice (length `nq()`).
    pub fn joint_transform(&self, q: &[f64]) -> SE3Pose {
        return match self {
            JointType::Revolute { axis } => {
                SE3Pose::new(Isometry3::from_parts(Translation3::identity(), UnitQuaternion::from_axis_angle(axis, q[0])))
            }
            JointType::Prismatic { axis } => {
                let t = axis.into_inner() * q[0];
                SE3Pose::new(Isometry3::from_parts(Translation3::from(t), UnitQuaternion::identity()))
            }
            JointType::FreeFlyer => {
                let rotation = UnitQuaternion::from_quaternion(Quaternion::new(q[6], q[3], q[4], q[5]));
                SE3Pose::new(Isometry3::from_parts(Translation3::new(q[0], q[1], q[2]), rotation))
            }
        }
    }
    /// Motion subspace matrix (6 x nv) in the joint's body frame.
    pub fn motion_subspace(&self) -> DMatrix<f64> {
        return match self {
            JointType::Revolute { axis } => {
                DMatrix::from_column_slice(6, 1, &[0.0, 0.0, 0.0, axis[0], axis[1], axis[2]])
            }
            JointType::Prismatic { axis } => {
                DMatrix::from_column_slice(6, 1, &[axis[0], axis[1], axis[2], 0.0, 0.0, 0.0])
            }
            JointType::FreeFlyer => {
                DMatrix::identity(6, 6)
            }
        }
    }
    pub fn neutral_configuration(&self) -> Vec<f64> {
        return match self {
            JointType::Revolute { .. } => { vec![0.0] }
            JointType::Prismatic { .. } => { vec![0.0] }
            JointType::FreeFlyer => { vec![0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0] }
        }
    }
}

/// A joint together with the rigid body it carries.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RobotJoint {
    name: String,
    joint_idx: usize,
    parent_idx: Option<usize>,
    placement: SE3Pose,
    joint_type: JointType,
    inertia: SpatialInertia,
    idx_q: usize,
    idx_v: usize
}
impl RobotJoint {
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn joint_idx(&self) -> usize {
        self.joint_idx
    }
    pub fn parent_idx(&self) -> Option<usize> {
        self.parent_idx
    }
    /// Placement of this joint's origin in its parent's body frame.
    pub fn placement(&self) -> &SE3Pose {
        &self.placement
    }
    pub fn joint_type(&self) -> &JointType {
        &self.joint_type
    }
    pub fn inertia(&self) -> &SpatialInertia {
        &self.inertia
    }
    pub fn idx_q(&self) -> usize {
        self.idx_q
    }
    pub fn idx_v(&self) -> usize {
        self.idx_v
    }
    pub fn nq(&self) -> usize {
        self.joint_type.nq()
    }
    pub fn nv(&self) -> usize {
        self.joint_type.nv()
    }
}

/// A named frame rigidly attached to a joint's body (e.g., a tool tip or a contact point).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RobotFrame {
    name: String,
    joint_idx: usize,
    placement: SE3Pose
}
impl RobotFrame {
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn joint_idx(&self) -> usize {
        self.joint_idx
    }
    pub fn placement(&self) -> &SE3Pose {
        &self.placement
    }
}

/// The `RobotModelModule` holds the kinematic tree of a robot: its joints (in topological order,
/// parents before children), the inertia of the body each joint carries, named frames, and the
/// gravity vector.  It is the model every kinematics and dynamics computation reads from.
///
/// # Example
/// ```
/// use nalgebra::Vector3;
/// use trajopt::robot_modules::robot_model_module::{JointType, RobotModelModule};
/// use trajopt::utils::utils_se3::se3_pose::SE3Pose;
/// use trajopt::utils::utils_se3::spatial::SpatialInertia;
///
/// let mut model = RobotModelModule::new_empty("pendulum");
/// let j = model.add_joint("hinge", None, SE3Pose::new_identity(), JointType::new_revolute(Vector3::y()),
///                         SpatialInertia::new_point_mass(1.0, Vector3::new(0., 0., -1.))).expect("error");
/// model.add_frame("tip", j, SE3Pose::new_translation(0., 0., -1.)).expect("error");
/// assert_eq!(model.nq(), 1);
/// assert_eq!(model.get_frame_idx("tip").expect("error"), 0);
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RobotModelModule {
    robot_name: String,
    joints: Vec<RobotJoint>,
    frames: Vec<RobotFrame>,
    nq: usize,
    nv: usize,
    gravity: Vector3<f64>,
    joint_name_to_idx_hashmap: HashMap<String, usize>,
    frame_name_to_idx_hashmap: HashMap<String, usize>
}
impl RobotModelModule {
    pub fn new_empty(robot_name: &str) -> Self {
        Self {
            robot_name: robot_name.to_string(),
            joints: vec![],
            frames: vec![],
            nq: 0,
            nv: 0,
            gravity: Vector3::new(0.0, 0.0, -9.81),
            joint_name_to_idx_hashmap: HashMap::new(),
            frame_name_to_idx_hashmap: HashMap::new()
        }
    }
    /// Appends a joint.  `parent_idx` must refer to an already added joint (None means the world).
    /// Returns the new joint's index.
    pub fn add_joint(&mut self, name: &str, parent_idx: Option<usize>, placement: SE3Pose, joint_type: JointType, inertia: SpatialInertia) -> Result<usize, TrajoptError> {
        if let Some(p) = parent_idx {
            if p >= self.joints.len() { return Err(TrajoptError::new_idx_out_of_bound_error(p, self.joints.len(), file!(), line!())); }
        }
        if self.joint_name_to_idx_hashmap.contains_key(name) {
            return Err(TrajoptError::new_generic_error_str(&format!("joint with name {} already exists in robot {}.", name, self.robot_name), file!(), line!()));
        }

        let joint_idx = self.joints.len();
        let joint = RobotJoint {
            name: name.to_string(),
            joint_idx,
            parent_idx,
            placement,
            idx_q: self.nq,
            idx_v: self.nv,
            inertia,
            joint_type
        };
        self.nq += joint.nq();
        self.nv += joint.nv();
        self.joint_name_to_idx_hashmap.insert(name.to_string(), joint_idx);
        self.joints.push(joint);

        Ok(joint_idx)
    }
    pub fn add_frame(&mut self, name: &str, joint_idx: usize, placement: SE3Pose) -> Result<usize, TrajoptError> {
        if joint_idx >= self.joints.len() { return Err(TrajoptError::new_idx_out_of_bound_error(joint_idx, self.joints.len(), file!(), line!())); }
        if self.frame_name_to_idx_hashmap.contains_key(name) {
            return Err(TrajoptError::new_generic_error_str(&format!("frame with name {} already exists in robot {}.", name, self.robot_name), file!(), line!()));
        }
        let frame_idx = self.frames.len();
        self.frames.push(RobotFrame { name: name.to_string(), joint_idx, placement });
        self.frame_name_to_idx_hashmap.insert(name.to_string(), frame_idx);
        Ok(frame_idx)
    }
    pub fn set_gravity(&mut self, gravity: Vector3<f64>) {
        self.gravity = gravity;
    }
    pub fn robot_name(&self) -> &str {
        &self.robot_name
    }
    pub fn joints(&self) -> &Vec<RobotJoint> {
        &self.joints
    }
    pub fn frames(&self) -> &Vec<RobotFrame> {
        &self.frames
    }
    pub fn num_joints(&self) -> usize {
        self.joints.len()
    }
    pub fn nq(&self) -> usize {
        self.nq
    }
    pub fn nv(&self) -> usize {
        self.nv
    }
    pub fn gravity(&self) -> &Vector3<f64> {
        &self.gravity
    }
    pub fn get_joint(&self, joint_idx: usize) -> Result<&RobotJoint, TrajoptError> {
        return self.joints.get(joint_idx).ok_or(TrajoptError::new_idx_out_of_bound_error(joint_idx, self.joints.len(), file!(), line!()));
    }
    pub fn get_frame(&self, frame_idx: usize) -> Result<&RobotFrame, TrajoptError> {
        return self.frames.get(frame_idx).ok_or(TrajoptError::new_idx_out_of_bound_error(frame_idx, self.frames.len(), file!(), line!()));
    }
    pub fn get_joint_idx(&self, name: &str) -> Result<usize, TrajoptError> {
        return self.joint_name_to_idx_hashmap.get(name).cloned()
            .ok_or(TrajoptError::new_generic_error_str(&format!("joint {} does not exist in robot {}.", name, self.robot_name), file!(), line!()));
    }
    pub fn get_frame_idx(&self, name: &str) -> Result<usize, TrajoptError> {
        return self.frame_name_to_idx_hashmap.get(name).cloned()
            .ok_or(TrajoptError::new_generic_error_str(&format!("frame {} does not exist in robot {}.", name, self.robot_name), file!(), line!()));
    }
    pub fn neutral_configuration(&self) -> DVector<f64> {
        let mut out = vec![];
        for j in &self.joints { out.extend(j.joint_type.neutral_configuration()); }
        DVector::from_vec(out)
    }
    /// Indices of the joints on the path from the root to `joint_idx` (inclusive), root first.
    pub fn support(&self, joint_idx: usize) -> Result<Vec<usize>, TrajoptError> {
        self.get_joint(joint_idx)?;
        let mut out = vec![joint_idx];
        let mut curr = self.joints[joint_idx].parent_idx;
        while let Some(p) = curr {
            out.push(p);
            curr = self.joints[p].parent_idx;
        }
        out.reverse();
        Ok(out)
    }
    pub fn print_summary(&self) {
        trajopt_print(&format!("Robot {} (nq = {}, nv = {}) --->", self.robot_name, self.nq, self.nv), PrintMode::Println, PrintColor::Cyan, true);
        for j in &self.joints {
            trajopt_print(&format!("  Joint {} {}: {:?}, parent {:?}, idx_q {}, idx_v {}, mass {}", j.joint_idx, j.name, j.joint_type, j.parent_idx, j.idx_q, j.idx_v, j.inertia.mass()), PrintMode::Println, PrintColor::None, false);
        }
        for (i, f) in self.frames.iter().enumerate() {
            trajopt_print(&format!("  Frame {} {}: on joint {}", i, f.name, f.joint_idx), PrintMode::Println, PrintColor::None, false);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_link() -> RobotModelModule {
        let mut model = RobotModelModule::new_empty("two_link");
        let j0 = model.add_joint("j0", None, SE3Pose::new_identity(), JointType::new_revolute(Vector3::z()), SpatialInertia::new_point_mass(1.0, Vector3::new(1.0, 0.0, 0.0))).unwrap();
        model.add_joint("j1", Some(j0), SE3Pose::new_translation(1.0, 0.0, 0.0), JointType::new_revolute(Vector3::z()), SpatialInertia::new_point_mass(1.0, Vector3::new(1.0, 0.0, 0.0))).unwrap();
        model
    }

    #[test]
    fn indices_accumulate_in_order() {
        let mut model = two_link();
        let ff = model.add_joint("ff", None, SE3Pose::new_identity(), JointType::FreeFlyer, SpatialInertia::new_zero()).unwrap();
        assert_eq!(model.nq(), 9);
        assert_eq!(model.nv(), 8);
        assert_eq!(model.get_joint(ff).unwrap().idx_q(), 2);
        assert_eq!(model.get_joint(ff).unwrap().idx_v(), 2);
        assert_eq!(model.neutral_configuration()[8], 1.0);
    }

    #[test]
    fn bad_parent_and_duplicate_names_are_rejected() {
        let mut model = two_link();
        assert!(model.add_joint("j2", Some(10), SE3Pose::new_identity(), JointType::new_revolute(Vector3::z()), SpatialInertia::new_zero()).is_err());
        assert!(model.add_joint("j1", Some(0), SE3Pose::new_identity(), JointType::new_revolute(Vector3::z()), SpatialInertia::new_zero()).is_err());
        assert!(model.add_frame("f", 5, SE3Pose::new_identity()).is_err());
        assert!(model.get_frame_idx("missing").is_err());
    }

    #[test]
    fn support_runs_root_first() {
        let model = two_link();
        assert_eq!(model.support(1).unwrap(), vec![0, 1]);
    }
}
