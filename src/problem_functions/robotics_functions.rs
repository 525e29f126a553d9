use nalgebra::{DMatrix, DVector, Vector3};
use crate::ellipsoids::ellipsoid::{Ellipsoid, EllipsoidDescriptor, ELLIPSOID_PARAMETER_DIM};
use crate::problem_functions::ProblemFunction;
use crate::robot_modules::robot_configuration_module::ConfigurationManifold;
use crate::robot_modules::robot_dynamics_module::{Actuation, ForwardDynamicsOracle};
use crate::robot_modules::robot_kinematics_module::RobotKinematicsModule;
use crate::utils::utils_errors::{check_dimension, TrajoptError};
use crate::utils::utils_se3::se3_pose::{SE3Pose, SE3Utils};

/// Semi-implicit Euler step on the manifold:
/// `q' = integrate(q, v dt + a dt²)`, `v' = v + a dt`.
pub fn advance_state(manifold: &dyn ConfigurationManifold, q: &DVector<f64>, v: &DVector<f64>, a: &DVector<f64>, dt: f64) -> Result<(DVector<f64>, DVector<f64>), TrajoptError> {
    let dq = v * dt + a * (dt * dt);
    let q_next = manifold.integrate(q, &dq)?;
    let v_next = v + a * dt;
    Ok((q_next, v_next))
}

/// `a - accel(q, v, τ(u))` over the input `[q; v; a; u]`.
pub struct DynamicsResidual<'a> {
    oracle: &'a dyn ForwardDynamicsOracle,
    actuation: Actuation
}
impl<'a> DynamicsResidual<'a> {
    pub fn new(oracle: &'a dyn ForwardDynamicsOracle, actuation: Actuation) -> Result<Self, TrajoptError> {
        actuation.validate(oracle.nv())?;
        Ok(Self { oracle, actuation })
    }
}
impl<'a> ProblemFunction for DynamicsResidual<'a> {
    fn input_dimension(&self) -> usize {
        let nv = self.oracle.nv();
        self.oracle.nq() + 2 * nv + self.actuation.nu(nv)
    }
    fn output_dimension(&self) -> usize { self.oracle.nv() }
    fn call(&self, input: &[f64]) -> Result<DVector<f64>, TrajoptError> {
        check_dimension("dynamics residual input", self.input_dimension(), input.len(), file!(), line!())?;
        let nq = self.oracle.nq();
        let nv = self.oracle.nv();
        let q = DVector::from_column_slice(&input[0..nq]);
        let v = DVector::from_column_slice(&input[nq..nq + nv]);
        let a = DVector::from_column_slice(&input[nq + nv..nq + 2 * nv]);
        let tau = self.actuation.torque_from_control(&input[nq + 2 * nv..], nv)?;
        let accel = self.oracle.accel(&q, &v, &tau)?;
        Ok(a - accel)
    }
    /// `[-∂a/∂q, -∂a/∂v, I, -∂a/∂τ S]` with `S` the actuation selection matrix.
    fn derivative_analytical(&self, input: &[f64]) -> Result<Option<DMatrix<f64>>, TrajoptError> {
        check_dimension("dynamics residual input", self.input_dimension(), input.len(), file!(), line!())?;
        let nq = self.oracle.nq();
        let nv = self.oracle.nv();
        let nu = self.actuation.nu(nv);
        let q = DVector::from_column_slice(&input[0..nq]);
        let v = DVector::from_column_slice(&input[nq..nq + nv]);
        let tau = self.actuation.torque_from_control(&input[nq + 2 * nv..], nv)?;
        let (d_q, d_v, d_tau) = self.oracle.accel_derivatives(&q, &v, &tau)?;
        let selection = self.actuation.selection_matrix(nv)?;

        let mut out = DMatrix::zeros(nv, self.input_dimension());
        out.slice_mut((0, 0), (nv, nq)).copy_from(&(-d_q));
        out.slice_mut((0, nq), (nv, nv)).copy_from(&(-d_v));
        out.slice_mut((0, nq + nv), (nv, nv)).fill_with_identity();
        out.slice_mut((0, nq + 2 * nv), (nv, nu)).copy_from(&(-(d_tau * selection)));
        Ok(Some(out))
    }
    fn name(&self) -> String { "dynamics residual".to_string() }
}

/// `x_{t+1} - advance(x_t, a_t)` over the input `[q_t; v_t; a_t; q_{t+1}; v_{t+1}]`.
pub struct IntegrationResidual<'a> {
    manifold: &'a dyn ConfigurationManifold,
    dt: f64
}
impl<'a> IntegrationResidual<'a> {
    pub fn new(manifold: &'a dyn ConfigurationManifold, dt: f64) -> Self {
        Self { manifold, dt }
    }
}
impl<'a> ProblemFunction for IntegrationResidual<'a> {
    fn input_dimension(&self) -> usize { 2 * self.manifold.nq() + 3 * self.manifold.nv() }
    fn output_dimension(&self) -> usize { self.manifold.nq() + self.manifold.nv() }
    fn call(&self, input: &[f64]) -> Result<DVector<f64>, TrajoptError> {
        check_dimension("integration residual input", self.input_dimension(), input.len(), file!(), line!())?;
        let nq = self.manifold.nq();
        let nv = self.manifold.nv();
        let mut idx = 0;
        let mut take = |n: usize| { let s = DVector::from_column_slice(&input[idx..idx + n]); idx += n; s };
        let q = take(nq);
        let v = take(nv);
        let a = take(nv);
        let q_next = take(nq);
        let v_next = take(nv);
        let (q_adv, v_adv) = advance_state(self.manifold, &q, &v, &a, self.dt)?;
        let mut out = DVector::zeros(nq + nv);
        out.rows_mut(0, nq).copy_from(&(q_next - q_adv));
        out.rows_mut(nq, nv).copy_from(&(v_next - v_adv));
        Ok(out)
    }
    /// The velocity rows are linear; the configuration rows chain the manifold's integration
    /// Jacobians through `dq = v dt + a dt²`.
    fn derivative_analytical(&self, input: &[f64]) -> Result<Option<DMatrix<f64>>, TrajoptError> {
        check_dimension("integration residual input", self.input_dimension(), input.len(), file!(), line!())?;
        let nq = self.manifold.nq();
        let nv = self.manifold.nv();
        let dt = self.dt;
        let q = DVector::from_column_slice(&input[0..nq]);
        let v = DVector::from_column_slice(&input[nq..nq + nv]);
        let a = DVector::from_column_slice(&input[nq + nv..nq + 2 * nv]);
        let dq = &v * dt + &a * (dt * dt);
        let (d_q, d_dq) = self.manifold.integrate_jacobians(&q, &dq)?;

        // columns: q, v, a, q', v'
        let (cq, cv, ca, cq1, cv1) = (0, nq, nq + nv, nq + 2 * nv, 2 * nq + 2 * nv);
        let mut out = DMatrix::zeros(nq + nv, self.input_dimension());
        out.slice_mut((0, cq), (nq, nq)).copy_from(&(-d_q));
        out.slice_mut((0, cv), (nq, nv)).copy_from(&(&d_dq * (-dt)));
        out.slice_mut((0, ca), (nq, nv)).copy_from(&(&d_dq * (-dt * dt)));
        out.slice_mut((0, cq1), (nq, nq)).fill_with_identity();
        out.slice_mut((nq, cv), (nv, nv)).fill_diagonal(-1.0);
        out.slice_mut((nq, ca), (nv, nv)).fill_diagonal(-dt);
        out.slice_mut((nq, cv1), (nv, nv)).fill_with_identity();
        Ok(Some(out))
    }
    fn name(&self) -> String { "integration residual".to_string() }
}

/// `log6(M(q)⁻¹ M*)` for a frame placement `M(q)` and a target `M*`, over the input `q`.
pub struct PlacementErrorResidual<'a> {
    kinematics: &'a RobotKinematicsModule,
    frame_idx: usize,
    target: SE3Pose
}
impl<'a> PlacementErrorResidual<'a> {
    pub fn new(kinematics: &'a RobotKinematicsModule, frame_idx: usize, target: SE3Pose) -> Result<Self, TrajoptError> {
        kinematics.model().get_frame(frame_idx)?;
        Ok(Self { kinematics, frame_idx, target })
    }
}
impl<'a> ProblemFunction for PlacementErrorResidual<'a> {
    fn input_dimension(&self) -> usize { self.kinematics.model().nq() }
    fn output_dimension(&self) -> usize { 6 }
    fn call(&self, input: &[f64]) -> Result<DVector<f64>, TrajoptError> {
        let q = DVector::from_column_slice(input);
        let m = self.kinematics.frame_placement(&q, self.frame_idx)?;
        let err = m.displacement(&self.target).log6();
        Ok(DVector::from_column_slice(err.as_slice()))
    }
    fn name(&self) -> String { "placement error".to_string() }
}

/// `(v_i - c)ᵀ A (v_i - c) - 1` for every point `v_i`, over the ellipsoid parameters `[w; c; r]`.
pub struct EllipsoidContainment {
    points: Vec<Vector3<f64>>
}
impl EllipsoidContainment {
    pub fn new(points: Vec<Vector3<f64>>) -> Self {
        Self { points }
    }
    fn split(input: &[f64]) -> (Vector3<f64>, Vector3<f64>, Vector3<f64>) {
        (Vector3::new(input[0], input[1], input[2]), Vector3::new(input[3], input[4], input[5]), Vector3::new(input[6], input[7], input[8]))
    }
}
impl ProblemFunction for EllipsoidContainment {
    fn input_dimension(&self) -> usize { ELLIPSOID_PARAMETER_DIM }
    fn output_dimension(&self) -> usize { self.points.len() }
    fn call(&self, input: &[f64]) -> Result<DVector<f64>, TrajoptError> {
        check_dimension("ellipsoid parameters", ELLIPSOID_PARAMETER_DIM, input.len(), file!(), line!())?;
        let (w, c, r) = Self::split(input);
        let a = Ellipsoid::shape_matrix_from_parameters(&w, &r);
        let out = DVector::from_iterator(self.points.len(), self.points.iter().map(|p| {
            let d = p - c;
            (d.transpose() * a * d)[(0, 0)] - 1.0
        }));
        Ok(out)
    }
    /// With `l = Rᵀ (v - c)`, `∂l/∂w = Rᵀ [v - c]× J(w)` where `J` is the left Jacobian of SO(3).
    fn derivative_analytical(&self, input: &[f64]) -> Result<Option<DMatrix<f64>>, TrajoptError> {
        check_dimension("ellipsoid parameters", ELLIPSOID_PARAMETER_DIM, input.len(), file!(), line!())?;
        let (w, c, r) = Self::split(input);
        let rot = SE3Utils::exp3(&w).into_inner();
        let jl = SE3Utils::left_jacobian_so3(&w);
        let inv_r2 = Vector3::new(1.0 / (r[0] * r[0]), 1.0 / (r[1] * r[1]), 1.0 / (r[2] * r[2]));
        let mut out = DMatrix::zeros(self.points.len(), ELLIPSOID_PARAMETER_DIM);

        for (i, p) in self.points.iter().enumerate() {
            let d = p - c;
            let local = rot.transpose() * d;
            let weighted = local.component_mul(&inv_r2) * 2.0;
            let grad_w = (rot.transpose() * SE3Utils::skew(&d) * jl).transpose() * weighted;
            let grad_c = -(rot * weighted);
            for k in 0..3 {
                out[(i, k)] = grad_w[k];
                out[(i, 3 + k)] = grad_c[k];
                out[(i, 6 + k)] = -2.0 * local[k] * local[k] / (r[k] * r[k] * r[k]);
            }
        }
        Ok(Some(out))
    }
    fn name(&self) -> String { "ellipsoid containment".to_string() }
}

/// `1 - (p_local - c)ᵀ A (p_local - c)` with `p_local = oMj(q)⁻¹ p`, over the input `q`.  The
/// value is at most zero exactly when the obstacle point lies outside the link ellipsoid.
pub struct CollisionClearance<'a> {
    kinematics: &'a RobotKinematicsModule,
    descriptor: EllipsoidDescriptor,
    obstacle_point: Vector3<f64>
}
impl<'a> CollisionClearance<'a> {
    pub fn new(kinematics: &'a RobotKinematicsModule, descriptor: EllipsoidDescriptor, obstacle_point: Vector3<f64>) -> Result<Self, TrajoptError> {
        kinematics.model().get_joint(descriptor.joint_idx())?;
        Ok(Self { kinematics, descriptor, obstacle_point })
    }
    pub fn quadratic_form(&self, q: &DVector<f64>) -> Result<f64, TrajoptError> {
        let fk = self.kinematics.compute_fk(q)?;
        let p_local = self.kinematics.point_in_joint_frame(&fk, self.descriptor.joint_idx(), &self.obstacle_point)?;
        Ok(self.descriptor.ellipsoid().quadratic_form(&p_local))
    }
}
impl<'a> ProblemFunction for CollisionClearance<'a> {
    fn input_dimension(&self) -> usize { self.kinematics.model().nq() }
    fn output_dimension(&self) -> usize { 1 }
    fn call(&self, input: &[f64]) -> Result<DVector<f64>, TrajoptError> {
        let q = DVector::from_column_slice(input);
        Ok(DVector::from_element(1, 1.0 - self.quadratic_form(&q)?))
    }
    fn name(&self) -> String { format!("collision clearance of {}", self.descriptor.name()) }
}
