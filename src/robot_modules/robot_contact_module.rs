use nalgebra::{DMatrix, DVector};
use serde::{Serialize, Deserialize};
use crate::robot_modules::robot_dynamics_module::{ForwardDynamicsOracle, RobotDynamicsModule};
use crate::robot_modules::robot_model_module::RobotModelModule;
use crate::utils::utils_errors::TrajoptError;
use crate::utils::utils_se3::se3_pose::SE3Pose;
use crate::utils::utils_se3::spatial::inverse_act_motion;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContactType {
    /// Point contact: constrains the linear acceleration of the contact frame origin.
    Contact3D,
    /// Planar or welded contact: constrains the full spatial acceleration of the contact frame.
    Contact6D
}
impl ContactType {
    pub fn dim(&self) -> usize {
        return match self {
            ContactType::Contact3D => { 3 }
            ContactType::Contact6D => { 6 }
        }
    }
}

/// A bilateral contact between a frame rigidly attached to a joint and the environment.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ContactDescriptor {
    name: String,
    joint_idx: usize,
    placement: SE3Pose,
    contact_type: ContactType
}
impl ContactDescriptor {
    pub fn new(name: &str, joint_idx: usize, placement: SE3Pose, contact_type: ContactType) -> Self {
        Self { name: name.to_string(), joint_idx, placement, contact_type }
    }
    /// Builds a contact located at an existing named frame of the model.
    pub fn new_at_frame(model: &RobotModelModule, frame_name: &str, contact_type: ContactType) -> Result<Self, TrajoptError> {
        let frame = model.get_frame(model.get_frame_idx(frame_name)?)?;
        Ok(Self::new(frame_name, frame.joint_idx(), frame.placement().clone(), contact_type))
    }
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn joint_idx(&self) -> usize {
        self.joint_idx
    }
    pub fn placement(&self) -> &SE3Pose {
        &self.placement
    }
    pub fn contact_type(&self) -> ContactType {
        self.contact_type
    }
}

/// Settings of the proximal iteration used to solve the contact forces.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProximalSettings {
    pub mu: f64,
    pub accuracy: f64,
    pub max_iter: usize
}
impl Default for ProximalSettings {
    fn default() -> Self {
        Self { mu: 1e-8, accuracy: 1e-12, max_iter: 10 }
    }
}

#[derive(Clone, Debug)]
pub struct ConstrainedDynamicsResult {
    acceleration: DVector<f64>,
    forces: DVector<f64>,
    iterations: usize,
    converged: bool
}
impl ConstrainedDynamicsResult {
    pub fn acceleration(&self) -> &DVector<f64> {
        &self.acceleration
    }
    /// Stacked contact forces, in contact order, each expressed in its contact frame.
    pub fn forces(&self) -> &DVector<f64> {
        &self.forces
    }
    pub fn iterations(&self) -> usize {
        self.iterations
    }
    pub fn converged(&self) -> bool {
        self.converged
    }
}

/// Forward dynamics under a fixed set of bilateral contacts.  The contact forces `λ` solve
/// `J a + γ = 0` through the proximal iteration
/// `(J M⁻¹ Jᵀ + μ I) λ_{k+1} = -(J M⁻¹ (τ - b) + γ) + μ λ_k`, after which
/// `a = M⁻¹ (τ - b + Jᵀ λ)`.
#[derive(Clone, Debug)]
pub struct ConstrainedDynamics {
    dynamics: RobotDynamicsModule,
    contacts: Vec<ContactDescriptor>,
    settings: ProximalSettings
}
impl ConstrainedDynamics {
    pub fn new(model: RobotModelModule, contacts: Vec<ContactDescriptor>, settings: ProximalSettings) -> Result<Self, TrajoptError> {
        for c in &contacts {
            model.get_joint(c.joint_idx())?;
        }
        Ok(Self { dynamics: RobotDynamicsModule::new(model), contacts, settings })
    }
    pub fn dynamics(&self) -> &RobotDynamicsModule {
        &self.dynamics
    }
    pub fn contacts(&self) -> &Vec<ContactDescriptor> {
        &self.contacts
    }
    pub fn settings(&self) -> &ProximalSettings {
        &self.settings
    }
    pub fn contact_dim(&self) -> usize {
        self.contacts.iter().map(|c| c.contact_type().dim()).sum()
    }
    /// Stacked contact Jacobian and acceleration drift `γ` (the contact acceleration at `a = 0`).
    pub fn contact_jacobian_and_drift(&self, q: &DVector<f64>, v: &DVector<f64>) -> Result<(DMatrix<f64>, DVector<f64>), TrajoptError> {
        let kinematics = self.dynamics.kinematics();
        let nv = self.dynamics.model().nv();
        let motion = kinematics.compute_motion(q, v, &DVector::zeros(nv))?;

        let m = self.contact_dim();
        let mut jac = DMatrix::zeros(m, nv);
        let mut drift = DVector::zeros(m);
        let mut row = 0;
        for c in &self.contacts {
            let j6 = kinematics.compute_local_jacobian(motion.fk(), c.joint_idx(), c.placement())?;
            match c.contact_type() {
                ContactType::Contact3D => {
                    jac.rows_mut(row, 3).copy_from(&j6.rows(0, 3));
                    let gamma = kinematics.attached_frame_classical_acceleration(&motion, c.joint_idx(), c.placement())?;
                    drift.rows_mut(row, 3).copy_from(&gamma);
                }
                ContactType::Contact6D => {
                    jac.rows_mut(row, 6).copy_from(&j6);
                    let a_f = inverse_act_motion(c.placement(), motion.get_acceleration(c.joint_idx())?);
                    drift.rows_mut(row, 6).copy_from(&a_f);
                }
            }
            row += c.contact_type().dim();
        }
        Ok((jac, drift))
    }
    pub fn solve(&self, q: &DVector<f64>, v: &DVector<f64>, tau: &DVector<f64>) -> Result<ConstrainedDynamicsResult, TrajoptError> {
        if self.contacts.is_empty() {
            let a = self.dynamics.aba(q, v, tau)?;
            return Ok(ConstrainedDynamicsResult { acceleration: a, forces: DVector::zeros(0), iterations: 0, converged: true });
        }

        let m_mat = self.dynamics.crba(q)?;
        let b = self.dynamics.nonlinear_effects(q, v)?;
        let (jac, drift) = self.contact_jacobian_and_drift(q, v)?;
        let chol = m_mat.cholesky().ok_or(TrajoptError::new_generic_error_str("mass matrix is not positive definite.", file!(), line!()))?;

        let free_term = tau - &b;
        let m_inv_free = chol.solve(&free_term);
        let m_inv_jt = chol.solve(&jac.transpose());
        let delassus = &jac * &m_inv_jt;
        let rhs = -(&jac * &m_inv_free + &drift);

        let dim = jac.nrows();
        let mu = self.settings.mu;
        let regularized = &delassus + DMatrix::<f64>::identity(dim, dim) * mu;
        let lu = regularized.lu();

        let mut lambda = DVector::zeros(dim);
        let mut converged = false;
        let mut iterations = 0;
        for _ in 0..self.settings.max_iter.max(1) {
            iterations += 1;
            let next = lu.solve(&(&rhs + &lambda * mu)).ok_or(TrajoptError::new_generic_error_str("contact system is singular; increase the proximal mu.", file!(), line!()))?;
            let change = (&next - &lambda).amax();
            lambda = next;
            if change <= self.settings.accuracy {
                converged = true;
                break;
            }
        }

        let a = m_inv_free + &m_inv_jt * &lambda;
        Ok(ConstrainedDynamicsResult { acceleration: a, forces: lambda, iterations, converged })
    }
}
impl ForwardDynamicsOracle for ConstrainedDynamics {
    fn nq(&self) -> usize { self.dynamics.model().nq() }
    fn nv(&self) -> usize { self.dynamics.model().nv() }
    fn accel(&self, q: &DVector<f64>, v: &DVector<f64>, tau: &DVector<f64>) -> Result<DVector<f64>, TrajoptError> {
        Ok(self.solve(q, v, tau)?.acceleration)
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use crate::robot_modules::robot_library::RobotLibrary;
    use super::*;

    #[test]
    fn pinned_pendulum_tip_does_not_move() {
        let model = RobotLibrary::load("pendulum").unwrap();
        let contact = ContactDescriptor::new_at_frame(&model, "tip", ContactType::Contact3D).unwrap();
        let dynamics = ConstrainedDynamics::new(model, vec![contact], ProximalSettings::default()).unwrap();
        let res = dynamics.solve(&DVector::from_vec(vec![0.4]), &DVector::zeros(1), &DVector::from_vec(vec![2.0])).unwrap();
        assert!(res.converged());
        assert_abs_diff_eq!(res.acceleration()[0], 0.0, epsilon = 1e-6);
        assert_eq!(res.forces().len(), 3);
    }

    #[test]
    fn contact_acceleration_is_cancelled() {
        let model = RobotLibrary::load("double_pendulum").unwrap();
        let contact = ContactDescriptor::new_at_frame(&model, "tip", ContactType::Contact3D).unwrap();
        let dynamics = ConstrainedDynamics::new(model, vec![contact], ProximalSettings::default()).unwrap();
        let q = DVector::from_vec(vec![0.5, 0.8]);
        let v = DVector::from_vec(vec![0.3, -0.2]);
        let tau = DVector::from_vec(vec![0.1, -0.4]);
        let res = dynamics.solve(&q, &v, &tau).unwrap();
        let (jac, drift) = dynamics.contact_jacobian_and_drift(&q, &v).unwrap();
        let residual = &jac * res.acceleration() + drift;
        assert!(residual.amax() < 1e-6);
    }

    #[test]
    fn no_contacts_reduces_to_free_dynamics() {
        let model = RobotLibrary::load("double_pendulum").unwrap();
        let dynamics = ConstrainedDynamics::new(model.clone(), vec![], ProximalSettings::default()).unwrap();
        let free = RobotDynamicsModule::new(model);
        let q = DVector::from_vec(vec![0.2, 0.1]);
        let v = DVector::from_vec(vec![0.0, 0.3]);
        let tau = DVector::zeros(2);
        assert_abs_diff_eq!(dynamics.accel(&q, &v, &tau).unwrap(), free.aba(&q, &v, &tau).unwrap(), epsilon = 1e-12);
    }

    #[test]
    fn contact_on_missing_joint_is_rejected() {
        let model = RobotLibrary::load("pendulum").unwrap();
        let contact = ContactDescriptor::new("c", 4, SE3Pose::new_identity(), ContactType::Contact6D);
        assert!(ConstrainedDynamics::new(model, vec![contact], ProximalSettings::default()).is_err());
    }
}
