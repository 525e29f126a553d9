use nalgebra::{DMatrix, DVector, Vector3, Vector6};
use serde::{Serialize, Deserialize};
use crate::robot_modules::robot_model_module::{RobotJoint, RobotModelModule};
use crate::utils::utils_console::{trajopt_print, PrintColor, PrintMode};
use crate::utils::utils_errors::{check_dimension, TrajoptError};
use crate::utils::utils_se3::se3_pose::SE3Pose;
use crate::utils::utils_se3::spatial::{act_motion, angular, cross_motion, inverse_act_motion, linear};

/// Forward kinematics over a `RobotModelModule`: joint and frame placements for a configuration,
/// plus joint motion (velocity, acceleration) and local Jacobians of attached frames.
///
/// Velocities and accelerations are spatial vectors `[linear; angular]` expressed in each joint's
/// local frame.
///
/// # Example
/// ```
/// use nalgebra::DVector;
/// use trajopt::robot_modules::robot_library::RobotLibrary;
/// use trajopt::robot_modules::robot_kinematics_module::RobotKinematicsModule;
///
/// let model = RobotLibrary::load("double_pendulum").expect("error");
/// let kinematics = RobotKinematicsModule::new(model);
/// let fk_res = kinematics.compute_fk(&DVector::zeros(2)).expect("error");
/// fk_res.print_summary();
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RobotKinematicsModule {
    model: RobotModelModule
}
impl RobotKinematicsModule {
    pub fn new(model: RobotModelModule) -> Self {
        Self { model }
    }
    pub fn model(&self) -> &RobotModelModule {
        &self.model
    }
    pub fn joint_configuration_slice<'a>(q: &'a DVector<f64>, joint: &RobotJoint) -> &'a [f64] {
        &q.as_slice()[joint.idx_q()..joint.idx_q() + joint.nq()]
    }
    pub fn joint_velocity(v: &DVector<f64>, joint: &RobotJoint) -> DVector<f64> {
        v.rows(joint.idx_v(), joint.nv()).into_owned()
    }
    /// Placement of each joint frame in its parent joint frame (`liMi`) for configuration `q`.
    pub fn compute_local_transforms(&self, q: &DVector<f64>) -> Result<Vec<SE3Pose>, TrajoptError> {
        check_dimension("q", self.model.nq(), q.len(), file!(), line!())?;
        let out = self.model.joints().iter().map(|joint| {
            joint.placement().multiply(&joint.joint_type().joint_transform(Self::joint_configuration_slice(q, joint)))
        }).collect();
        Ok(out)
    }
    /// Computes the placement of every joint frame in the world frame.
    pub fn compute_fk(&self, q: &DVector<f64>) -> Result<RobotFKResult, TrajoptError> {
        let local = self.compute_local_transforms(q)?;
        let mut joint_placements: Vec<SE3Pose> = Vec::with_capacity(local.len());
        for (joint, li_m_i) in self.model.joints().iter().zip(local.into_iter()) {
            let o_m_i = match joint.parent_idx() {
                None => { li_m_i }
                Some(p) => { joint_placements[p].multiply(&li_m_i) }
            };
            joint_placements.push(o_m_i);
        }
        Ok(RobotFKResult { joint_placements })
    }
    /// Computes placements together with the local spatial velocity and acceleration of every
    /// joint frame.
    pub fn compute_motion(&self, q: &DVector<f64>, v: &DVector<f64>, a: &DVector<f64>) -> Result<RobotMotionResult, TrajoptError> {
        check_dimension("v", self.model.nv(), v.len(), file!(), line!())?;
        check_dimension("a", self.model.nv(), a.len(), file!(), line!())?;
        let fk = self.compute_fk(q)?;
        let local = self.compute_local_transforms(q)?;

        let n = self.model.num_joints();
        let mut velocities: Vec<Vector6<f64>> = Vec::with_capacity(n);
        let mut accelerations: Vec<Vector6<f64>> = Vec::with_capacity(n);
        for (i, joint) in self.model.joints().iter().enumerate() {
            let s = joint.joint_type().motion_subspace();
            let v_j = Vector6::from_iterator((&s * Self::joint_velocity(v, joint)).iter().cloned());
            let a_j = Vector6::from_iterator((&s * Self::joint_velocity(a, joint)).iter().cloned());
            let (v_parent, a_parent) = match joint.parent_idx() {
                None => { (Vector6::zeros(), Vector6::zeros()) }
                Some(p) => { (velocities[p], accelerations[p]) }
            };
            let v_i = inverse_act_motion(&local[i], &v_parent) + v_j;
            let a_i = inverse_act_motion(&local[i], &a_parent) + a_j + cross_motion(&v_i, &v_j);
            velocities.push(v_i);
            accelerations.push(a_i);
        }

        Ok(RobotMotionResult { fk, velocities, accelerations })
    }
    pub fn frame_placement(&self, q: &DVector<f64>, frame_idx: usize) -> Result<SE3Pose, TrajoptError> {
        let fk = self.compute_fk(q)?;
        self.frame_placement_from_fk(&fk, frame_idx)
    }
    pub fn frame_placement_from_fk(&self, fk: &RobotFKResult, frame_idx: usize) -> Result<SE3Pose, TrajoptError> {
        let frame = self.model.get_frame(frame_idx)?;
        let o_m_j = fk.get_joint_placement(frame.joint_idx())?;
        Ok(o_m_j.multiply(frame.placement()))
    }
    /// Spatial velocity of a frame rigidly attached to `joint_idx` at `placement`, in that frame.
    pub fn attached_frame_velocity(&self, motion: &RobotMotionResult, joint_idx: usize, placement: &SE3Pose) -> Result<Vector6<f64>, TrajoptError> {
        let v_j = motion.get_velocity(joint_idx)?;
        Ok(inverse_act_motion(placement, v_j))
    }
    /// Classical (not spatial) linear acceleration of the origin of an attached frame, in that frame.
    pub fn attached_frame_classical_acceleration(&self, motion: &RobotMotionResult, joint_idx: usize, placement: &SE3Pose) -> Result<Vector3<f64>, TrajoptError> {
        let v_f = self.attached_frame_velocity(motion, joint_idx, placement)?;
        let a_f = inverse_act_motion(placement, motion.get_acceleration(joint_idx)?);
        Ok(linear(&a_f) + angular(&v_f).cross(&linear(&v_f)))
    }
    pub fn frame_velocity(&self, q: &DVector<f64>, v: &DVector<f64>, frame_idx: usize) -> Result<Vector6<f64>, TrajoptError> {
        let motion = self.compute_motion(q, v, &DVector::zeros(self.model.nv()))?;
        let frame = self.model.get_frame(frame_idx)?;
        self.attached_frame_velocity(&motion, frame.joint_idx(), frame.placement())
    }
    pub fn frame_classical_acceleration(&self, q: &DVector<f64>, v: &DVector<f64>, a: &DVector<f64>, frame_idx: usize) -> Result<Vector3<f64>, TrajoptError> {
        let motion = self.compute_motion(q, v, a)?;
        let frame = self.model.get_frame(frame_idx)?;
        self.attached_frame_classical_acceleration(&motion, frame.joint_idx(), frame.placement())
    }
    /// Jacobian (6 x nv) mapping joint velocities to the spatial velocity of a frame attached to
    /// `joint_idx` at `placement`, expressed in that frame.
    pub fn compute_local_jacobian(&self, fk: &RobotFKResult, joint_idx: usize, placement: &SE3Pose) -> Result<DMatrix<f64>, TrajoptError> {
        let o_m_f = fk.get_joint_placement(joint_idx)?.multiply(placement);
        let f_m_o = o_m_f.inverse();
        let mut out = DMatrix::zeros(6, self.model.nv());
        for k in self.model.support(joint_idx)? {
            let joint = self.model.get_joint(k)?;
            let f_m_k = f_m_o.multiply(fk.get_joint_placement(k)?);
            let s = joint.joint_type().motion_subspace();
            for c in 0..joint.nv() {
                let col = Vector6::from_iterator(s.column(c).iter().cloned());
                let col_f = act_motion(&f_m_k, &col);
                out.column_mut(joint.idx_v() + c).copy_from(&col_f);
            }
        }
        Ok(out)
    }
    /// Position of `point_world` expressed in the local frame of joint `joint_idx`.
    pub fn point_in_joint_frame(&self, fk: &RobotFKResult, joint_idx: usize, point_world: &Vector3<f64>) -> Result<Vector3<f64>, TrajoptError> {
        Ok(fk.get_joint_placement(joint_idx)?.inverse_act_point(point_world))
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RobotFKResult {
    joint_placements: Vec<SE3Pose>
}
impl RobotFKResult {
    pub fn joint_placements(&self) -> &Vec<SE3Pose> {
        &self.joint_placements
    }
    pub fn get_joint_placement(&self, joint_idx: usize) -> Result<&SE3Pose, TrajoptError> {
        return self.joint_placements.get(joint_idx).ok_or(TrajoptError::new_idx_out_of_bound_error(joint_idx, self.joint_placements.len(), file!(), line!()));
    }
    pub fn print_summary(&self) {
        for (i, p) in self.joint_placements.iter().enumerate() {
            trajopt_print(&format!("Joint {} --->", i), PrintMode::Println, PrintColor::Blue, true);
            let t = p.translation();
            let (rx, ry, rz) = p.rotation().euler_angles();
            trajopt_print(&format!("   > Translation: [{:.5}, {:.5}, {:.5}]", t[0], t[1], t[2]), PrintMode::Println, PrintColor::None, false);
            trajopt_print(&format!("   > Euler angles: [{:.5}, {:.5}, {:.5}]", rx, ry, rz), PrintMode::Println, PrintColor::None, false);
        }
    }
}

#[derive(Clone, Debug)]
pub struct RobotMotionResult {
    fk: RobotFKResult,
    velocities: Vec<Vector6<f64>>,
    accelerations: Vec<Vector6<f64>>
}
impl RobotMotionResult {
    pub fn fk(&self) -> &RobotFKResult {
        &self.fk
    }
    pub fn get_velocity(&self, joint_idx: usize) -> Result<&Vector6<f64>, TrajoptError> {
        return self.velocities.get(joint_idx).ok_or(TrajoptError::new_idx_out_of_bound_error(joint_idx, self.velocities.len(), file!(), line!()));
    }
    pub fn get_acceleration(&self, joint_idx: usize) -> Result<&Vector6<f64>, TrajoptError> {
        return self.accelerations.get(joint_idx).ok_or(TrajoptError::new_idx_out_of_bound_error(joint_idx, self.accelerations.len(), file!(), line!()));
    }
}
