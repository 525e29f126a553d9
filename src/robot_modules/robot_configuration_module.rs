use nalgebra::{DMatrix, DVector, Vector6};
use crate::robot_modules::robot_model_module::{JointType, RobotModelModule};
use crate::problem_functions::FD_PERTURBATION;
use crate::utils::utils_errors::{check_dimension, TrajoptError};
use crate::utils::utils_math::finite_difference::FiniteDifferenceUtils;
use crate::utils::utils_se3::se3_pose::SE3Pose;

/// Integration and difference on a configuration space.  Configurations live in an `nq`
/// dimensional ambient vector while tangent displacements live in `nv` dimensions.
pub trait ConfigurationManifold: Send + Sync {
    fn nq(&self) -> usize;
    fn nv(&self) -> usize;
    /// Advances `q` by the tangent displacement `dq`.
    fn integrate(&self, q: &DVector<f64>, dq: &DVector<f64>) -> Result<DVector<f64>, TrajoptError>;
    /// Returns `dq` such that `integrate(q0, dq) = q1`.
    fn difference(&self, q0: &DVector<f64>, q1: &DVector<f64>) -> Result<DVector<f64>, TrajoptError>;
    /// Jacobians of `integrate(q, dq)` with respect to `q` (nq x nq) and `dq` (nq x nv).
    fn integrate_jacobians(&self, q: &DVector<f64>, dq: &DVector<f64>) -> Result<(DMatrix<f64>, DMatrix<f64>), TrajoptError> {
        RobotConfigurationUtils::integrate_jacobians_finite_difference(self, q, dq)
    }
}

/// Flat configuration space where nq = nv and integration is plain addition.
#[derive(Clone, Debug)]
pub struct EuclideanSpace {
    dim: usize
}
impl EuclideanSpace {
    pub fn new(dim: usize) -> Self {
        Self { dim }
    }
}
impl ConfigurationManifold for EuclideanSpace {
    fn nq(&self) -> usize { self.dim }
    fn nv(&self) -> usize { self.dim }
    fn integrate(&self, q: &DVector<f64>, dq: &DVector<f64>) -> Result<DVector<f64>, TrajoptError> {
        check_dimension("q", self.dim, q.len(), file!(), line!())?;
        check_dimension("dq", self.dim, dq.len(), file!(), line!())?;
        Ok(q + dq)
    }
    fn difference(&self, q0: &DVector<f64>, q1: &DVector<f64>) -> Result<DVector<f64>, TrajoptError> {
        check_dimension("q0", self.dim, q0.len(), file!(), line!())?;
        check_dimension("q1", self.dim, q1.len(), file!(), line!())?;
        Ok(q1 - q0)
    }
    fn integrate_jacobians(&self, q: &DVector<f64>, dq: &DVector<f64>) -> Result<(DMatrix<f64>, DMatrix<f64>), TrajoptError> {
        check_dimension("q", self.dim, q.len(), file!(), line!())?;
        check_dimension("dq", self.dim, dq.len(), file!(), line!())?;
        Ok((DMatrix::identity(self.dim, self.dim), DMatrix::identity(self.dim, self.dim)))
    }
}

impl ConfigurationManifold for RobotModelModule {
    fn nq(&self) -> usize { RobotModelModule::nq(self) }
    fn nv(&self) -> usize { RobotModelModule::nv(self) }
    fn integrate(&self, q: &DVector<f64>, dq: &DVector<f64>) -> Result<DVector<f64>, TrajoptError> {
        RobotConfigurationUtils::integrate(self, q, dq)
    }
    fn difference(&self, q0: &DVector<f64>, q1: &DVector<f64>) -> Result<DVector<f64>, TrajoptError> {
        RobotConfigurationUtils::difference(self, q0, q1)
    }
    fn integrate_jacobians(&self, q: &DVector<f64>, dq: &DVector<f64>) -> Result<(DMatrix<f64>, DMatrix<f64>), TrajoptError> {
        RobotConfigurationUtils::integrate_jacobians(self, q, dq)
    }
}

/// Configuration-space operations that respect each joint's group structure.
pub struct RobotConfigurationUtils;
impl RobotConfigurationUtils {
    pub fn integrate(model: &RobotModelModule, q: &DVector<f64>, dq: &DVector<f64>) -> Result<DVector<f64>, TrajoptError> {
        check_dimension("q", model.nq(), q.len(), file!(), line!())?;
        check_dimension("dq", model.nv(), dq.len(), file!(), line!())?;

        let mut out = q.clone();
        for joint in model.joints() {
            let iq = joint.idx_q();
            let iv = joint.idx_v();
            match joint.joint_type() {
                JointType::Revolute { .. } | JointType::Prismatic { .. } => {
                    out[iq] = q[iq] + dq[iv];
                }
                JointType::FreeFlyer => {
                    let m = joint.joint_type().joint_transform(&q.as_slice()[iq..iq + 7]);
                    let twist = Vector6::from_iterator(dq.as_slice()[iv..iv + 6].iter().cloned());
                    let m_next = m.multiply(&SE3Pose::new_from_exp6(&twist));
                    Self::write_free_flyer(&m_next, &mut out, iq);
                }
            }
        }
        Ok(out)
    }
    pub fn difference(model: &RobotModelModule, q0: &DVector<f64>, q1: &DVector<f64>) -> Result<DVector<f64>, TrajoptError> {
        check_dimension("q0", model.nq(), q0.len(), file!(), line!())?;
        check_dimension("q1", model.nq(), q1.len(), file!(), line!())?;

        let mut out = DVector::zeros(model.nv());
        for joint in model.joints() {
            let iq = joint.idx_q();
            let iv = joint.idx_v();
            match joint.joint_type() {
                JointType::Revolute { .. } | JointType::Prismatic { .. } => {
                    out[iv] = q1[iq] - q0[iq];
                }
                JointType::FreeFlyer => {
                    let m0 = joint.joint_type().joint_transform(&q0.as_slice()[iq..iq + 7]);
                    let m1 = joint.joint_type().joint_transform(&q1.as_slice()[iq..iq + 7]);
                    let twist = m0.displacement(&m1).log6();
                    out.rows_mut(iv, 6).copy_from(&twist);
                }
            }
        }
        Ok(out)
    }
    /// Jacobians of `integrate` joint by joint: identities on the scalar joints, central
    /// differences of the free-flyer block alone.
    pub fn integrate_jacobians(model: &RobotModelModule, q: &DVector<f64>, dq: &DVector<f64>) -> Result<(DMatrix<f64>, DMatrix<f64>), TrajoptError> {
        check_dimension("q", model.nq(), q.len(), file!(), line!())?;
        check_dimension("dq", model.nv(), dq.len(), file!(), line!())?;

        let mut d_q = DMatrix::zeros(model.nq(), model.nq());
        let mut d_dq = DMatrix::zeros(model.nq(), model.nv());
        for joint in model.joints() {
            let iq = joint.idx_q();
            let iv = joint.idx_v();
            match joint.joint_type() {
                JointType::Revolute { .. } | JointType::Prismatic { .. } => {
                    d_q[(iq, iq)] = 1.0;
                    d_dq[(iq, iv)] = 1.0;
                }
                JointType::FreeFlyer => {
                    let joint_type = joint.joint_type();
                    let q_block = &q.as_slice()[iq..iq + 7];
                    let dq_block = &dq.as_slice()[iv..iv + 6];
                    let step = |q7: &[f64], twist: &[f64]| -> DVector<f64> {
                        let m = joint_type.joint_transform(q7);
                        let m_next = m.multiply(&SE3Pose::new_from_exp6(&Vector6::from_column_slice(twist)));
                        let mut out = DVector::zeros(7);
                        Self::write_free_flyer(&m_next, &mut out, 0);
                        out
                    };
                    let jq = FiniteDifferenceUtils::central_difference_jacobian(q_block, 7, FD_PERTURBATION, |x| Ok(step(x, dq_block)))?;
                    let jdq = FiniteDifferenceUtils::central_difference_jacobian(dq_block, 7, FD_PERTURBATION, |x| Ok(step(q_block, x)))?;
                    d_q.slice_mut((iq, iq), (7, 7)).copy_from(&jq);
                    d_dq.slice_mut((iq, iv), (7, 6)).copy_from(&jdq);
                }
            }
        }
        Ok((d_q, d_dq))
    }
    /// Central differences of `integrate` on any manifold.
    pub fn integrate_jacobians_finite_difference<M: ConfigurationManifold + ?Sized>(manifold: &M, q: &DVector<f64>, dq: &DVector<f64>) -> Result<(DMatrix<f64>, DMatrix<f64>), TrajoptError> {
        let nq = manifold.nq();
        let d_q = FiniteDifferenceUtils::central_difference_jacobian(q.as_slice(), nq, FD_PERTURBATION, |x| manifold.integrate(&DVector::from_column_slice(x), dq))?;
        let d_dq = FiniteDifferenceUtils::central_difference_jacobian(dq.as_slice(), nq, FD_PERTURBATION, |x| manifold.integrate(q, &DVector::from_column_slice(x)))?;
        Ok((d_q, d_dq))
    }
    /// Renormalizes the quaternion part of every free-flyer joint.
    pub fn normalize(model: &RobotModelModule, q: &DVector<f64>) -> Result<DVector<f64>, TrajoptError> {
        check_dimension("q", model.nq(), q.len(), file!(), line!())?;
        let mut out = q.clone();
        for joint in model.joints() {
            if let JointType::FreeFlyer = joint.joint_type() {
                let iq = joint.idx_q();
                let m = joint.joint_type().joint_transform(&q.as_slice()[iq..iq + 7]);
                Self::write_free_flyer(&m, &mut out, iq);
            }
        }
        Ok(out)
    }
    fn write_free_flyer(m: &SE3Pose, out: &mut DVector<f64>, iq: usize) {
        let t = m.translation();
        let r = m.rotation();
        out[iq] = t[0];
        out[iq + 1] = t[1];
        out[iq + 2] = t[2];
        out[iq + 3] = r.i;
        out[iq + 4] = r.j;
        out[iq + 5] = r.k;
        out[iq + 6] = r.w;
    }
}
