use nalgebra::{DMatrix, DVector, Matrix6, Vector3, Vector6};
use serde::{Serialize, Deserialize};
use crate::robot_modules::robot_kinematics_module::RobotKinematicsModule;
use crate::robot_modules::robot_model_module::RobotModelModule;
use crate::problem_functions::FD_PERTURBATION;
use crate::utils::utils_errors::{check_dimension, TrajoptError};
use crate::utils::utils_math::finite_difference::FiniteDifferenceUtils;
use crate::utils::utils_se3::spatial::{act_force, cross_force, cross_motion, force_action_matrix, inverse_act_motion, spatial};

/// Forward dynamics as seen by the trajectory encoders: given a state `(q, v)` and a joint torque
/// `tau` (length `nv`), returns the joint acceleration.
pub trait ForwardDynamicsOracle: Send + Sync {
    fn nq(&self) -> usize;
    fn nv(&self) -> usize;
    fn accel(&self, q: &DVector<f64>, v: &DVector<f64>, tau: &DVector<f64>) -> Result<DVector<f64>, TrajoptError>;
    /// Partial derivatives `(∂a/∂q, ∂a/∂v, ∂a/∂τ)` of `accel`.
    fn accel_derivatives(&self, q: &DVector<f64>, v: &DVector<f64>, tau: &DVector<f64>) -> Result<(DMatrix<f64>, DMatrix<f64>, DMatrix<f64>), TrajoptError> {
        RobotDynamicsUtils::accel_derivatives_finite_difference(self, q, v, tau)
    }
}

pub struct RobotDynamicsUtils;
impl RobotDynamicsUtils {
    /// Central differences of `accel` in each of its arguments.
    pub fn accel_derivatives_finite_difference<O: ForwardDynamicsOracle + ?Sized>(oracle: &O, q: &DVector<f64>, v: &DVector<f64>, tau: &DVector<f64>) -> Result<(DMatrix<f64>, DMatrix<f64>, DMatrix<f64>), TrajoptError> {
        let nv = oracle.nv();
        let d_q = FiniteDifferenceUtils::central_difference_jacobian(q.as_slice(), nv, FD_PERTURBATION, |x| oracle.accel(&DVector::from_column_slice(x), v, tau))?;
        let d_v = FiniteDifferenceUtils::central_difference_jacobian(v.as_slice(), nv, FD_PERTURBATION, |x| oracle.accel(q, &DVector::from_column_slice(x), tau))?;
        let d_tau = FiniteDifferenceUtils::central_difference_jacobian(tau.as_slice(), nv, FD_PERTURBATION, |x| oracle.accel(q, v, &DVector::from_column_slice(x)))?;
        Ok((d_q, d_v, d_tau))
    }
}

/// Maps a control vector onto the joint torque vector.  With `Underactuated`, the control holds one
/// entry per listed dof and every other torque is zero.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Actuation {
    Full,
    Underactuated { actuated_dofs: Vec<usize> }
}
impl Actuation {
    pub fn nu(&self, nv: usize) -> usize {
        return match self {
            Actuation::Full => { nv }
            Actuation::Underactuated { actuated_dofs } => { actuated_dofs.len() }
        }
    }
    pub fn validate(&self, nv: usize) -> Result<(), TrajoptError> {
        if let Actuation::Underactuated { actuated_dofs } = self {
            for d in actuated_dofs {
                if *d >= nv { return Err(TrajoptError::new_idx_out_of_bound_error(*d, nv, file!(), line!())); }
            }
        }
        Ok(())
    }
    /// `∂τ/∂u`, an `nv` x `nu` selection matrix.
    pub fn selection_matrix(&self, nv: usize) -> Result<DMatrix<f64>, TrajoptError> {
        self.validate(nv)?;
        return match self {
            Actuation::Full => { Ok(DMatrix::identity(nv, nv)) }
            Actuation::Underactuated { actuated_dofs } => {
                let mut out = DMatrix::zeros(nv, actuated_dofs.len());
                for (i, d) in actuated_dofs.iter().enumerate() { out[(*d, i)] = 1.0; }
                Ok(out)
            }
        }
    }
    pub fn torque_from_control(&self, u: &[f64], nv: usize) -> Result<DVector<f64>, TrajoptError> {
        check_dimension("control", self.nu(nv), u.len(), file!(), line!())?;
        return match self {
            Actuation::Full => { Ok(DVector::from_column_slice(u)) }
            Actuation::Underactuated { actuated_dofs } => {
                let mut tau = DVector::zeros(nv);
                for (i, d) in actuated_dofs.iter().enumerate() {
                    if *d >= nv { return Err(TrajoptError::new_idx_out_of_bound_error(*d, nv, file!(), line!())); }
                    tau[*d] = u[i];
                }
                Ok(tau)
            }
        }
    }
}
impl Default for Actuation {
    fn default() -> Self { Self::Full }
}

/// The `RobotDynamicsModule` holds the rigid-body dynamics algorithms over a robot model:
/// recursive Newton-Euler (inverse dynamics), the composite mass matrix, nonlinear effects, and
/// the articulated-body algorithm (forward dynamics).  Gravity is folded in as a fictitious
/// upward acceleration of the base.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RobotDynamicsModule {
    kinematics: RobotKinematicsModule
}
impl RobotDynamicsModule {
    pub fn new(model: RobotModelModule) -> Self {
        Self { kinematics: RobotKinematicsModule::new(model) }
    }
    pub fn model(&self) -> &RobotModelModule {
        self.kinematics.model()
    }
    pub fn kinematics(&self) -> &RobotKinematicsModule {
        &self.kinematics
    }
    fn base_acceleration(&self) -> Vector6<f64> {
        let g = self.model().gravity();
        spatial(&(-g), &Vector3::zeros())
    }
    fn check_state(&self, q: &DVector<f64>, v: &DVector<f64>, third: &DVector<f64>, third_name: &str) -> Result<(), TrajoptError> {
        check_dimension("q", self.model().nq(), q.len(), file!(), line!())?;
        check_dimension("v", self.model().nv(), v.len(), file!(), line!())?;
        check_dimension(third_name, self.model().nv(), third.len(), file!(), line!())
    }
    fn subspace_product(s: &DMatrix<f64>, x: &DVector<f64>) -> Vector6<f64> {
        Vector6::from_iterator((s * x).iter().cloned())
    }

    /// Inverse dynamics: the torque needed to realize acceleration `a` at state `(q, v)`.
    pub fn rnea(&self, q: &DVector<f64>, v: &DVector<f64>, a: &DVector<f64>) -> Result<DVector<f64>, TrajoptError> {
        self.check_state(q, v, a, "a")?;
        let model = self.model();
        let local = self.kinematics.compute_local_transforms(q)?;
        let n = model.num_joints();

        let mut vel: Vec<Vector6<f64>> = Vec::with_capacity(n);
        let mut acc: Vec<Vector6<f64>> = Vec::with_capacity(n);
        let mut forces: Vec<Vector6<f64>> = Vec::with_capacity(n);
        let a0 = self.base_acceleration();

        for (i, joint) in model.joints().iter().enumerate() {
            let s = joint.joint_type().motion_subspace();
            let v_j = Self::subspace_product(&s, &RobotKinematicsModule::joint_velocity(v, joint));
            let a_j = Self::subspace_product(&s, &RobotKinematicsModule::joint_velocity(a, joint));
            let (v_parent, a_parent) = match joint.parent_idx() {
                None => { (Vector6::zeros(), a0) }
                Some(p) => { (vel[p], acc[p]) }
            };
            let v_i = inverse_act_motion(&local[i], &v_parent) + v_j;
            let a_i = inverse_act_motion(&local[i], &a_parent) + a_j + cross_motion(&v_i, &v_j);
            let inertia = joint.inertia().to_matrix();
            let f_i = inertia * a_i + cross_force(&v_i, &(inertia * v_i));
            vel.push(v_i);
            acc.push(a_i);
            forces.push(f_i);
        }

        let mut tau = DVector::zeros(model.nv());
        for i in (0..n).rev() {
            let joint = &model.joints()[i];
            let s = joint.joint_type().motion_subspace();
            let f_i = DVector::from_column_slice(forces[i].as_slice());
            tau.rows_mut(joint.idx_v(), joint.nv()).copy_from(&(s.transpose() * f_i));
            if let Some(p) = joint.parent_idx() {
                let f_parent = act_force(&local[i], &forces[i]);
                forces[p] += f_parent;
            }
        }

        Ok(tau)
    }
    /// Coriolis, centrifugal, and gravity torques `b(q, v)`.
    pub fn nonlinear_effects(&self, q: &DVector<f64>, v: &DVector<f64>) -> Result<DVector<f64>, TrajoptError> {
        self.rnea(q, v, &DVector::zeros(self.model().nv()))
    }
    /// Generalized gravity torques `g(q)`.
    pub fn gravity_torques(&self, q: &DVector<f64>) -> Result<DVector<f64>, TrajoptError> {
        let nv = self.model().nv();
        self.rnea(q, &DVector::zeros(nv), &DVector::zeros(nv))
    }
    /// Joint-space mass matrix `M(q)`, built column by column from inverse dynamics.
    pub fn crba(&self, q: &DVector<f64>) -> Result<DMatrix<f64>, TrajoptError> {
        let nv = self.model().nv();
        let zeros = DVector::zeros(nv);
        let g = self.rnea(q, &zeros, &zeros)?;
        let mut out = DMatrix::zeros(nv, nv);
        for j in 0..nv {
            let mut e = DVector::zeros(nv);
            e[j] = 1.0;
            let col = self.rnea(q, &zeros, &e)? - &g;
            out.column_mut(j).copy_from(&col);
        }
        // symmetrize away round-off
        let sym = (&out + out.transpose()) * 0.5;
        Ok(sym)
    }
    /// Forward dynamics with the articulated-body algorithm.
    pub fn aba(&self, q: &DVector<f64>, v: &DVector<f64>, tau: &DVector<f64>) -> Result<DVector<f64>, TrajoptError> {
        self.check_state(q, v, tau, "tau")?;
        let model = self.model();
        let local = self.kinematics.compute_local_transforms(q)?;
        let n = model.num_joints();

        let mut vel: Vec<Vector6<f64>> = Vec::with_capacity(n);
        let mut bias: Vec<Vector6<f64>> = Vec::with_capacity(n);
        let mut art_inertia: Vec<Matrix6<f64>> = Vec::with_capacity(n);
        let mut art_force: Vec<Vector6<f64>> = Vec::with_capacity(n);

        for (i, joint) in model.joints().iter().enumerate() {
            let s = joint.joint_type().motion_subspace();
            let v_j = Self::subspace_product(&s, &RobotKinematicsModule::joint_velocity(v, joint));
            let v_parent = match joint.parent_idx() {
                None => { Vector6::zeros() }
                Some(p) => { vel[p] }
            };
            let v_i = inverse_act_motion(&local[i], &v_parent) + v_j;
            let inertia = joint.inertia().to_matrix();
            vel.push(v_i);
            bias.push(cross_motion(&v_i, &v_j));
            art_inertia.push(inertia);
            art_force.push(cross_force(&v_i, &(inertia * v_i)));
        }

        let mut u_mats: Vec<DMatrix<f64>> = vec![DMatrix::zeros(0, 0); n];
        let mut d_invs: Vec<DMatrix<f64>> = vec![DMatrix::zeros(0, 0); n];
        let mut u_vecs: Vec<DVector<f64>> = vec![DVector::zeros(0); n];

        for i in (0..n).rev() {
            let joint = &model.joints()[i];
            let s = joint.joint_type().motion_subspace();
            let ia = DMatrix::from_column_slice(6, 6, art_inertia[i].as_slice());
            let pa = DVector::from_column_slice(art_force[i].as_slice());
            let u_mat = &ia * &s;
            let d = s.transpose() * &u_mat;
            let d_inv = d.try_inverse().ok_or(TrajoptError::new_generic_error_str(&format!("articulated inertia of joint {} is singular.", joint.name()), file!(), line!()))?;
            let u_vec = RobotKinematicsModule::joint_velocity(tau, joint) - s.transpose() * &pa;

            if let Some(p) = joint.parent_idx() {
                let ia_reduced = &ia - &u_mat * &d_inv * u_mat.transpose();
                let c = DVector::from_column_slice(bias[i].as_slice());
                let pa_reduced = &pa + &ia_reduced * c + &u_mat * (&d_inv * &u_vec);
                let ia_reduced = Matrix6::from_iterator(ia_reduced.iter().cloned());
                let pa_reduced = Vector6::from_iterator(pa_reduced.iter().cloned());
                let x = force_action_matrix(&local[i]);
                art_inertia[p] += x * ia_reduced * x.transpose();
                art_force[p] += act_force(&local[i], &pa_reduced);
            }

            u_mats[i] = u_mat;
            d_invs[i] = d_inv;
            u_vecs[i] = u_vec;
        }

        let mut acc: Vec<Vector6<f64>> = Vec::with_capacity(n);
        let mut out = DVector::zeros(model.nv());
        let a0 = self.base_acceleration();
        for (i, joint) in model.joints().iter().enumerate() {
            let s = joint.joint_type().motion_subspace();
            let a_parent = match joint.parent_idx() {
                None => { a0 }
                Some(p) => { acc[p] }
            };
            let a_prime = inverse_act_motion(&local[i], &a_parent) + bias[i];
            let a_prime_d = DVector::from_column_slice(a_prime.as_slice());
            let qdd = &d_invs[i] * (&u_vecs[i] - u_mats[i].transpose() * a_prime_d);
            let a_i = a_prime + Self::subspace_product(&s, &qdd);
            out.rows_mut(joint.idx_v(), joint.nv()).copy_from(&qdd);
            acc.push(a_i);
        }

        Ok(out)
    }
}

/// Unconstrained forward dynamics through the articulated-body algorithm.
#[derive(Clone, Debug)]
pub struct FreeDynamics {
    dynamics: RobotDynamicsModule
}
impl FreeDynamics {
    pub fn new(model: RobotModelModule) -> Self {
        Self { dynamics: RobotDynamicsModule::new(model) }
    }
    pub fn dynamics(&self) -> &RobotDynamicsModule {
        &self.dynamics
    }
}
impl ForwardDynamicsOracle for FreeDynamics {
    fn nq(&self) -> usize { self.dynamics.model().nq() }
    fn nv(&self) -> usize { self.dynamics.model().nv() }
    fn accel(&self, q: &DVector<f64>, v: &DVector<f64>, tau: &DVector<f64>) -> Result<DVector<f64>, TrajoptError> {
        self.dynamics.aba(q, v, tau)
    }
    /// Differentiates `rnea(q, v, aba(q, v, τ)) = τ`: `∂a/∂τ = M⁻¹` and
    /// `∂a/∂(q, v) = -M⁻¹ ∂rnea/∂(q, v)`.
    fn accel_derivatives(&self, q: &DVector<f64>, v: &DVector<f64>, tau: &DVector<f64>) -> Result<(DMatrix<f64>, DMatrix<f64>, DMatrix<f64>), TrajoptError> {
        let a = self.dynamics.aba(q, v, tau)?;
        let m_inv = match self.dynamics.crba(q)?.cholesky() {
            Some(c) => { c.inverse() }
            None => { return Err(TrajoptError::new_generic_error_str("mass matrix is not positive definite.", file!(), line!())); }
        };
        let nv = self.nv();
        let d_q = FiniteDifferenceUtils::central_difference_jacobian(q.as_slice(), nv, FD_PERTURBATION, |x| self.dynamics.rnea(&DVector::from_column_slice(x), v, &a))?;
        let d_v = FiniteDifferenceUtils::central_difference_jacobian(v.as_slice(), nv, FD_PERTURBATION, |x| self.dynamics.rnea(q, &DVector::from_column_slice(x), &a))?;
        Ok((-&m_inv * d_q, -&m_inv * d_v, m_inv))
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use crate::robot_modules::robot_library::RobotLibrary;
    use super::*;

    #[test]
    fn pendulum_matches_closed_form() {
        // point mass m = 1 at distance l = 1 below a hinge about y
        let dynamics = RobotDynamicsModule::new(RobotLibrary::load("pendulum").unwrap());
        for theta in [0.0, 0.3, -1.2, 2.5] {
            let q = DVector::from_vec(vec![theta]);
            let a = dynamics.aba(&q, &DVector::zeros(1), &DVector::zeros(1)).unwrap();
            assert_abs_diff_eq!(a[0], -9.81 * f64::sin(theta), epsilon = 1e-9);
        }
        let m = dynamics.crba(&DVector::from_vec(vec![0.7])).unwrap();
        assert_abs_diff_eq!(m[(0, 0)], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn aba_inverts_rnea() {
        for name in ["double_pendulum", "cartpole", "ur5", "free_flyer_body"] {
            let model = RobotLibrary::load(name).unwrap();
            let nv = model.nv();
            let mut q = model.neutral_configuration();
            for i in 0..model.nq() { if q[i] == 0.0 { q[i] = 0.1 * (i as f64 + 1.0); } }
            let q = crate::robot_modules::robot_configuration_module::RobotConfigurationUtils::normalize(&model, &q).unwrap();
            let v = DVector::from_fn(nv, |i, _| 0.3 - 0.1 * i as f64);
            let tau = DVector::from_fn(nv, |i, _| 0.5 * (i as f64) - 1.0);
            let dynamics = RobotDynamicsModule::new(model);
            let a = dynamics.aba(&q, &v, &tau).unwrap();
            let tau_back = dynamics.rnea(&q, &v, &a).unwrap();
            assert_abs_diff_eq!(tau_back, tau, epsilon = 1e-8);
        }
    }

    #[test]
    fn mass_matrix_is_symmetric_positive_definite() {
        let model = RobotLibrary::load("ur5").unwrap();
        let dynamics = RobotDynamicsModule::new(model);
        let q = DVector::from_vec(vec![0.2, -0.9, 1.3, 0.1, 0.4, -0.6]);
        let m = dynamics.crba(&q).unwrap();
        assert_abs_diff_eq!(m, m.transpose(), epsilon = 1e-12);
        assert!(m.clone().cholesky().is_some());

        // M a + b = rnea(q, v, a)
        let v = DVector::from_vec(vec![0.1, 0.2, -0.3, 0.0, 0.5, -0.1]);
        let a = DVector::from_vec(vec![1.0, -0.5, 0.2, 0.3, 0.0, 0.7]);
        let b = dynamics.nonlinear_effects(&q, &v).unwrap();
        let tau = dynamics.rnea(&q, &v, &a).unwrap();
        assert_abs_diff_eq!(&m * &a + b, tau, epsilon = 1e-9);
    }

    #[test]
    fn free_falling_body_accelerates_with_gravity() {
        let oracle = FreeDynamics::new(RobotLibrary::load("free_flyer_body").unwrap());
        let q = oracle.dynamics().model().neutral_configuration();
        let a = oracle.accel(&q, &DVector::zeros(6), &DVector::zeros(6)).unwrap();
        assert_abs_diff_eq!(a, DVector::from_vec(vec![0.0, 0.0, -9.81, 0.0, 0.0, 0.0]), epsilon = 1e-9);
    }

    #[test]
    fn underactuated_control_is_zero_padded() {
        let act = Actuation::Underactuated { actuated_dofs: vec![0] };
        assert_eq!(act.nu(2), 1);
        let tau = act.torque_from_control(&[3.0], 2).unwrap();
        assert_eq!(tau, DVector::from_vec(vec![3.0, 0.0]));
        assert!(act.torque_from_control(&[3.0, 1.0], 2).is_err());
        assert!(Actuation::Underactuated { actuated_dofs: vec![5] }.validate(2).is_err());
    }

    #[test]
    fn accel_derivatives_agree_with_differences_of_aba() {
        let oracle = FreeDynamics::new(RobotLibrary::load("double_pendulum").unwrap());
        let q = DVector::from_vec(vec![0.4, -0.7]);
        let v = DVector::from_vec(vec![0.3, 1.1]);
        let tau = DVector::from_vec(vec![0.5, -0.2]);
        let (d_q, d_v, d_tau) = oracle.accel_derivatives(&q, &v, &tau).unwrap();
        let (fd_q, fd_v, fd_tau) = RobotDynamicsUtils::accel_derivatives_finite_difference(&oracle, &q, &v, &tau).unwrap();
        assert_abs_diff_eq!(d_q, fd_q, epsilon = 1e-5);
        assert_abs_diff_eq!(d_v, fd_v, epsilon = 1e-5);
        assert_abs_diff_eq!(d_tau, fd_tau, epsilon = 1e-6);
        let m = oracle.dynamics().crba(&q).unwrap();
        assert_abs_diff_eq!(&m * d_tau, DMatrix::identity(2, 2), epsilon = 1e-9);
    }

    #[test]
    fn selection_matrix_places_the_actuated_dofs() {
        let s = Actuation::Underactuated { actuated_dofs: vec![1] }.selection_matrix(3).unwrap();
        assert_eq!(s.shape(), (3, 1));
        assert_eq!(s[(1, 0)], 1.0);
        assert_eq!(s.sum(), 1.0);
        assert_eq!(Actuation::Full.selection_matrix(2).unwrap(), DMatrix::identity(2, 2));
    }

    #[test]
    fn torque_of_wrong_size_is_rejected() {
        let oracle = FreeDynamics::new(RobotLibrary::load("pendulum").unwrap());
        assert!(oracle.accel(&DVector::zeros(1), &DVector::zeros(1), &DVector::zeros(2)).is_err());
    }
}
