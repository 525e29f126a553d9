use nalgebra::{DMatrix, DVector};
use serde::{Serialize, Deserialize};
use crate::ellipsoids::collision_constraints::CollisionConstraintAssembler;
use crate::optimization::{NonlinearOptimizer, OptimizationProblem, OptimizerParameters, OptimizerResult, SolveStatus, VariableBlock};
use crate::problem_functions::robotics_functions::{advance_state, DynamicsResidual, IntegrationResidual, PlacementErrorResidual};
use crate::problem_functions::standard_functions::AffineResidual;
use crate::robot_modules::robot_configuration_module::ConfigurationManifold;
use crate::robot_modules::robot_dynamics_module::{Actuation, ForwardDynamicsOracle};
use crate::robot_modules::robot_kinematics_module::RobotKinematicsModule;
use crate::trajectory_optimization::trajectory::StateTrajectory;
use crate::utils::utils_console::{trajopt_print, PrintColor, PrintMode, TrajoptDebug};
use crate::utils::utils_errors::{check_dimension, TrajoptError};
use crate::utils::utils_se3::se3_pose::SE3Pose;

/// Hyperparameters of a multiple-shooting problem.  The running weights are multiplied by `dt`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ShootingProblemConfig {
    pub horizon: usize,
    pub dt: f64,
    pub velocity_weight: f64,
    pub acceleration_weight: f64,
    pub control_weight: f64,
    pub terminal_weight: f64,
    /// Adds `v_T = 0` when the horizon is not empty.
    pub terminal_zero_velocity: bool,
    pub optimizer_parameters: OptimizerParameters,
    pub debug: TrajoptDebug
}
impl Default for ShootingProblemConfig {
    fn default() -> Self {
        Self {
            horizon: 20,
            dt: 0.05,
            velocity_weight: 0.001,
            acceleration_weight: 0.0001,
            control_weight: 0.0,
            terminal_weight: 10000.0,
            terminal_zero_velocity: false,
            optimizer_parameters: OptimizerParameters::default(),
            debug: TrajoptDebug::False
        }
    }
}

/// Reach `target` with the frame `frame_idx` at the last step.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TerminalTask {
    frame_idx: usize,
    target: SE3Pose
}
impl TerminalTask {
    pub fn new(kinematics: &RobotKinematicsModule, frame_name: &str, target: SE3Pose) -> Result<Self, TrajoptError> {
        let frame_idx = kinematics.model().get_frame_idx(frame_name)?;
        Ok(Self { frame_idx, target })
    }
    pub fn frame_idx(&self) -> usize {
        self.frame_idx
    }
    pub fn target(&self) -> &SE3Pose {
        &self.target
    }
}

/// Decision variable blocks of an encoded shooting problem.
#[derive(Clone, Debug)]
pub struct ShootingVariables {
    configurations: Vec<VariableBlock>,
    velocities: Vec<VariableBlock>,
    accelerations: Vec<VariableBlock>,
    controls: Vec<VariableBlock>
}
impl ShootingVariables {
    pub fn configurations(&self) -> &Vec<VariableBlock> {
        &self.configurations
    }
    pub fn velocities(&self) -> &Vec<VariableBlock> {
        &self.velocities
    }
    pub fn accelerations(&self) -> &Vec<VariableBlock> {
        &self.accelerations
    }
    pub fn controls(&self) -> &Vec<VariableBlock> {
        &self.controls
    }
    pub fn horizon(&self) -> usize {
        self.accelerations.len()
    }
    /// Length of the decision vectors this layout reads and writes.
    pub fn num_variables(&self) -> usize {
        self.configurations.iter().chain(self.velocities.iter()).chain(self.accelerations.iter()).chain(self.controls.iter())
            .map(|b| b.offset() + b.dim())
            .max()
            .unwrap_or(0)
    }
    /// The last configuration `q_T` inside a decision vector.
    pub fn final_configuration(&self, x: &[f64]) -> Result<DVector<f64>, TrajoptError> {
        let block = &self.configurations[self.configurations.len() - 1];
        Ok(DVector::from_column_slice(block.values(x)?))
    }
    pub fn decode(&self, x: &[f64], dt: f64, result: Option<&OptimizerResult>) -> Result<StateTrajectory, TrajoptError> {
        let read = |blocks: &Vec<VariableBlock>| -> Result<Vec<DVector<f64>>, TrajoptError> {
            blocks.iter().map(|b| -> Result<DVector<f64>, TrajoptError> { Ok(DVector::from_column_slice(b.values(x)?)) }).collect()
        };
        let (status, cost) = match result {
            Some(r) => { (r.status(), r.cost()) }
            None => { (SolveStatus::Converged, f64::NAN) }
        };
        StateTrajectory::new(dt, read(&self.configurations)?, read(&self.velocities)?, read(&self.accelerations)?, read(&self.controls)?, status, cost)
    }
    /// Writes a trajectory into a decision vector of the matching layout.
    pub fn encode(&self, trajectory: &StateTrajectory, x: &mut [f64]) -> Result<(), TrajoptError> {
        check_dimension("trajectory horizon", self.horizon(), trajectory.horizon(), file!(), line!())?;
        check_dimension("decision vector", self.num_variables(), x.len(), file!(), line!())?;
        let write = |blocks: &Vec<VariableBlock>, values: &Vec<DVector<f64>>, x: &mut [f64]| -> Result<(), TrajoptError> {
            for (b, v) in blocks.iter().zip(values.iter()) {
                check_dimension(b.name(), b.dim(), v.len(), file!(), line!())?;
                x[b.range()].copy_from_slice(v.as_slice());
            }
            Ok(())
        };
        write(&self.configurations, trajectory.configurations(), x)?;
        write(&self.velocities, trajectory.velocities(), x)?;
        write(&self.accelerations, trajectory.accelerations(), x)?;
        write(&self.controls, trajectory.controls(), x)?;
        Ok(())
    }
}

/// Multiple-shooting transcription of a dynamic trajectory problem.
///
/// Decision variables are the states `x_t = (q_t, v_t)` for `t = 0..T`, and the slack
/// accelerations `a_t` and controls `u_t` for `t = 0..T-1`.  For every step
///
/// * `a_t = accel(q_t, v_t, τ(u_t))`, with `τ` zero padding an under-actuated control,
/// * `x_{t+1} = advance(x_t, a_t)`, a semi-implicit Euler step on the configuration manifold,
///
/// plus the initial constraint `x_0 = x_ref`.  The cost sums `‖v_t‖²`, `‖a_t‖²` and optionally
/// `‖u_t‖²` over the horizon and adds the squared log6 error of an optional terminal task.
///
/// # Example
/// ```
/// use nalgebra::DVector;
/// use trajopt::robot_modules::robot_dynamics_module::{Actuation, FreeDynamics};
/// use trajopt::robot_modules::robot_library::RobotLibrary;
/// use trajopt::trajectory_optimization::shooting_problem::{ShootingProblem, ShootingProblemConfig};
///
/// let model = RobotLibrary::load("pendulum").expect("error");
/// let oracle = FreeDynamics::new(model.clone());
/// let mut config = ShootingProblemConfig::default();
/// config.horizon = 0;
/// let problem = ShootingProblem::new(&oracle, &model, Actuation::Full, DVector::zeros(1), DVector::zeros(1), config).expect("error");
/// let (nlp, _) = problem.encode().expect("error");
/// assert_eq!(nlp.num_equality_constraints(), 2);
/// ```
pub struct ShootingProblem<'a> {
    oracle: &'a dyn ForwardDynamicsOracle,
    manifold: &'a dyn ConfigurationManifold,
    actuation: Actuation,
    q_ref: DVector<f64>,
    v_ref: DVector<f64>,
    terminal_task: Option<(&'a RobotKinematicsModule, TerminalTask)>,
    collision_constraints: Option<CollisionConstraintAssembler<'a>>,
    config: ShootingProblemConfig
}
impl<'a> ShootingProblem<'a> {
    pub fn new(oracle: &'a dyn ForwardDynamicsOracle, manifold: &'a dyn ConfigurationManifold, actuation: Actuation, q_ref: DVector<f64>, v_ref: DVector<f64>, config: ShootingProblemConfig) -> Result<Self, TrajoptError> {
        check_dimension("manifold nq", oracle.nq(), manifold.nq(), file!(), line!())?;
        check_dimension("manifold nv", oracle.nv(), manifold.nv(), file!(), line!())?;
        check_dimension("reference configuration", oracle.nq(), q_ref.len(), file!(), line!())?;
        check_dimension("reference velocity", oracle.nv(), v_ref.len(), file!(), line!())?;
        actuation.validate(oracle.nv())?;
        if !(config.dt > 0.0) {
            return Err(TrajoptError::new_generic_error_str(&format!("time step must be positive, got {}.", config.dt), file!(), line!()));
        }
        Ok(Self { oracle, manifold, actuation, q_ref, v_ref, terminal_task: None, collision_constraints: None, config })
    }
    pub fn set_terminal_task(&mut self, kinematics: &'a RobotKinematicsModule, task: TerminalTask) -> Result<(), TrajoptError> {
        check_dimension("kinematics nq", self.oracle.nq(), kinematics.model().nq(), file!(), line!())?;
        kinematics.model().get_frame(task.frame_idx)?;
        self.terminal_task = Some((kinematics, task));
        Ok(())
    }
    /// Applies the collision constraints to every configuration after the initial one.
    pub fn set_collision_constraints(&mut self, assembler: CollisionConstraintAssembler<'a>) -> Result<(), TrajoptError> {
        check_dimension("kinematics nq", self.oracle.nq(), assembler.kinematics().model().nq(), file!(), line!())?;
        self.collision_constraints = Some(assembler);
        Ok(())
    }
    pub fn config(&self) -> &ShootingProblemConfig {
        &self.config
    }
    pub fn nu(&self) -> usize {
        self.actuation.nu(self.oracle.nv())
    }
    /// Builds the nonlinear program.
    pub fn encode(&self) -> Result<(OptimizationProblem<'a>, ShootingVariables), TrajoptError> {
        let nq = self.oracle.nq();
        let nv = self.oracle.nv();
        let nu = self.nu();
        let horizon = self.config.horizon;
        let dt = self.config.dt;
        let oracle = self.oracle;
        let manifold = self.manifold;

        let mut problem = OptimizationProblem::new();
        let mut configurations = vec![];
        let mut velocities = vec![];
        let mut accelerations = vec![];
        let mut controls = vec![];
        for t in 0..horizon + 1 {
            let q = problem.add_variable(&format!("q_{}", t), nq);
            let v = problem.add_variable(&format!("v_{}", t), nv);
            problem.set_initial_guess(&q, self.q_ref.as_slice())?;
            problem.set_initial_guess(&v, self.v_ref.as_slice())?;
            configurations.push(q);
            velocities.push(v);
        }
        for t in 0..horizon {
            accelerations.push(problem.add_variable(&format!("a_{}", t), nv));
            controls.push(problem.add_variable(&format!("u_{}", t), nu));
        }

        let mut x_ref = self.q_ref.as_slice().to_vec();
        x_ref.extend_from_slice(self.v_ref.as_slice());
        problem.add_equality_constraint(Box::new(AffineResidual::new_offset(&DVector::from_vec(x_ref))), &[&configurations[0], &velocities[0]])?;

        for t in 0..horizon {
            let dynamics = DynamicsResidual::new(oracle, self.actuation.clone())?;
            problem.add_equality_constraint(Box::new(dynamics), &[&configurations[t], &velocities[t], &accelerations[t], &controls[t]])?;
            let integration = IntegrationResidual::new(manifold, dt);
            problem.add_equality_constraint(Box::new(integration), &[&configurations[t], &velocities[t], &accelerations[t], &configurations[t + 1], &velocities[t + 1]])?;

            problem.add_squared_residual_cost(Box::new(AffineResidual::new_offset(&DVector::zeros(nv))), &[&velocities[t]], self.config.velocity_weight * dt)?;
            problem.add_squared_residual_cost(Box::new(AffineResidual::new_offset(&DVector::zeros(nv))), &[&accelerations[t]], self.config.acceleration_weight * dt)?;
            if self.config.control_weight > 0.0 && nu > 0 {
                problem.add_squared_residual_cost(Box::new(AffineResidual::new_offset(&DVector::zeros(nu))), &[&controls[t]], self.config.control_weight * dt)?;
            }
        }

        if horizon > 0 && self.config.terminal_zero_velocity {
            problem.add_equality_constraint(Box::new(AffineResidual::new(DMatrix::identity(nv, nv), DVector::zeros(nv))?), &[&velocities[horizon]])?;
        }
        if let Some((kinematics, task)) = &self.terminal_task {
            let residual = PlacementErrorResidual::new(*kinematics, task.frame_idx, task.target.clone())?;
            problem.add_squared_residual_cost(Box::new(residual), &[&configurations[horizon]], self.config.terminal_weight)?;
        }
        if let Some(assembler) = &self.collision_constraints {
            for q in configurations.iter().skip(1) {
                assembler.register(&mut problem, q)?;
            }
        }

        Ok((problem, ShootingVariables { configurations, velocities, accelerations, controls }))
    }
    /// Simulates the controls forward from the reference state.
    pub fn rollout(&self, controls: &[DVector<f64>]) -> Result<StateTrajectory, TrajoptError> {
        let nv = self.oracle.nv();
        let mut qs = vec![self.q_ref.clone()];
        let mut vs = vec![self.v_ref.clone()];
        let mut accelerations = vec![];
        for u in controls {
            let tau = self.actuation.torque_from_control(u.as_slice(), nv)?;
            let t = qs.len() - 1;
            let a = self.oracle.accel(&qs[t], &vs[t], &tau)?;
            let (q_next, v_next) = advance_state(self.manifold, &qs[t], &vs[t], &a, self.config.dt)?;
            accelerations.push(a);
            qs.push(q_next);
            vs.push(v_next);
        }
        StateTrajectory::new(self.config.dt, qs, vs, accelerations, controls.to_vec(), SolveStatus::Converged, f64::NAN)
    }
    /// Encodes and solves the problem.  When the solver does not converge a diagnostic is printed
    /// and the last iterate is returned with its status.  The callback receives the evaluation
    /// count and the current final configuration.
    pub fn solve(&self, callback: Option<&mut dyn FnMut(usize, &DVector<f64>)>) -> Result<StateTrajectory, TrajoptError> {
        let (problem, variables) = self.encode()?;
        let optimizer = NonlinearOptimizer::new(self.config.optimizer_parameters.clone(), self.config.debug.clone());
        let result = match callback {
            None => { optimizer.optimize(&problem, None)? }
            Some(callback) => {
                let mut wrapped = |count: usize, u: &[f64]| {
                    if let Ok(q) = variables.final_configuration(u) { callback(count, &q); }
                };
                optimizer.optimize(&problem, Some(&mut wrapped))?
            }
        };
        if let Some(d) = result.diagnostic() {
            trajopt_print(&format!("ERROR in convergence, returning the last iterate: {}", d), PrintMode::Println, PrintColor::Yellow, true);
        }
        variables.decode(result.x_min().as_slice(), self.config.dt, Some(&result))
    }
}
