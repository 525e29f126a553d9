use nalgebra::DVector;
use serde::{Serialize, Deserialize};
use crate::ellipsoids::collision_constraints::CollisionConstraintAssembler;
use crate::optimization::{NonlinearOptimizer, OptimizationProblem, OptimizerParameters, VariableBlock};
use crate::problem_functions::robotics_functions::PlacementErrorResidual;
use crate::problem_functions::standard_functions::AffineResidual;
use crate::robot_modules::robot_kinematics_module::RobotKinematicsModule;
use crate::trajectory_optimization::trajectory::ConfigurationTrajectory;
use crate::utils::utils_console::{trajopt_print, PrintColor, PrintMode, TrajoptDebug};
use crate::utils::utils_errors::{check_dimension, TrajoptError};
use crate::utils::utils_se3::se3_pose::SE3Pose;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct KinematicProblemConfig {
    pub horizon: usize,
    pub running_weight: f64,
    pub terminal_weight: f64,
    pub optimizer_parameters: OptimizerParameters,
    pub debug: TrajoptDebug
}
impl Default for KinematicProblemConfig {
    fn default() -> Self {
        Self {
            horizon: 10,
            running_weight: 0.1,
            terminal_weight: 1.0,
            optimizer_parameters: OptimizerParameters::default(),
            debug: TrajoptDebug::False
        }
    }
}

/// Configuration-only trajectory toward an end-effector target:
///
/// decide `q_0..q_T` minimizing `w_run Σ ‖q_t - q_{t+1}‖² + w_term ‖log6(M(q_T)⁻¹ M*)‖²`
/// subject to `q_0 = q_ref`.
pub struct KinematicProblem<'a> {
    kinematics: &'a RobotKinematicsModule,
    frame_idx: usize,
    target: SE3Pose,
    q_ref: DVector<f64>,
    collision_constraints: Option<CollisionConstraintAssembler<'a>>,
    config: KinematicProblemConfig
}
impl<'a> KinematicProblem<'a> {
    pub fn new(kinematics: &'a RobotKinematicsModule, frame_name: &str, target: SE3Pose, q_ref: DVector<f64>, config: KinematicProblemConfig) -> Result<Self, TrajoptError> {
        let frame_idx = kinematics.model().get_frame_idx(frame_name)?;
        check_dimension("reference configuration", kinematics.model().nq(), q_ref.len(), file!(), line!())?;
        Ok(Self { kinematics, frame_idx, target, q_ref, collision_constraints: None, config })
    }
    /// Applies the collision constraints to `q_1..q_T`.
    pub fn set_collision_constraints(&mut self, assembler: CollisionConstraintAssembler<'a>) -> Result<(), TrajoptError> {
        check_dimension("kinematics nq", self.kinematics.model().nq(), assembler.kinematics().model().nq(), file!(), line!())?;
        self.collision_constraints = Some(assembler);
        Ok(())
    }
    pub fn frame_idx(&self) -> usize {
        self.frame_idx
    }
    pub fn target(&self) -> &SE3Pose {
        &self.target
    }
    pub fn config(&self) -> &KinematicProblemConfig {
        &self.config
    }
    pub fn encode(&self) -> Result<(OptimizationProblem<'a>, Vec<VariableBlock>), TrajoptError> {
        let nq = self.kinematics.model().nq();
        let horizon = self.config.horizon;
        let mut problem = OptimizationProblem::new();
        let mut qs = vec![];
        for t in 0..horizon + 1 {
            let q = problem.add_variable(&format!("q_{}", t), nq);
            problem.set_initial_guess(&q, self.q_ref.as_slice())?;
            qs.push(q);
        }
        problem.add_equality_constraint(Box::new(AffineResidual::new_offset(&self.q_ref)), &[&qs[0]])?;
        for t in 0..horizon {
            problem.add_squared_residual_cost(Box::new(AffineResidual::new_difference(nq)), &[&qs[t], &qs[t + 1]], self.config.running_weight)?;
        }
        let terminal = PlacementErrorResidual::new(self.kinematics, self.frame_idx, self.target.clone())?;
        problem.add_squared_residual_cost(Box::new(terminal), &[&qs[horizon]], self.config.terminal_weight)?;
        if let Some(assembler) = &self.collision_constraints {
            for q in qs.iter().skip(1) {
                assembler.register(&mut problem, q)?;
            }
        }
        Ok((problem, qs))
    }
    /// Placement error `log6(M(q)⁻¹ M*)` of the task frame.
    pub fn terminal_error(&self, q: &DVector<f64>) -> Result<f64, TrajoptError> {
        let m = self.kinematics.frame_placement(q, self.frame_idx)?;
        Ok(m.displacement(&self.target).log6().norm())
    }
    /// Solves the problem, falling back to the last iterate on non-convergence.  The callback
    /// receives the evaluation count and the current last configuration.
    pub fn solve(&self, callback: Option<&mut dyn FnMut(usize, &DVector<f64>)>) -> Result<ConfigurationTrajectory, TrajoptError> {
        let (problem, qs) = self.encode()?;
        let last = qs[qs.len() - 1].clone();
        let optimizer = NonlinearOptimizer::new(self.config.optimizer_parameters.clone(), self.config.debug.clone());
        let result = match callback {
            None => { optimizer.optimize(&problem, None)? }
            Some(callback) => {
                let mut wrapped = |count: usize, u: &[f64]| {
                    if let Ok(q) = last.values(u) { callback(count, &DVector::from_column_slice(q)); }
                };
                optimizer.optimize(&problem, Some(&mut wrapped))?
            }
        };
        if let Some(d) = result.diagnostic() {
            trajopt_print(&format!("ERROR in convergence, returning the last iterate: {}", d), PrintMode::Println, PrintColor::Yellow, true);
        }
        let x = result.x_min().as_slice();
        let mut configurations = vec![];
        for q in &qs { configurations.push(DVector::from_column_slice(q.values(x)?)); }
        ConfigurationTrajectory::new(configurations, result.status(), result.cost())
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use crate::robot_modules::robot_library::RobotLibrary;
    use super::*;

    #[test]
    fn encoding_has_one_variable_block_per_step() {
        let kinematics = RobotKinematicsModule::new(RobotLibrary::load("ur5").unwrap());
        let q0 = DVector::from_vec(vec![0.0, -1.57, 0.0, 0.0, 0.0, 0.0]);
        let problem = KinematicProblem::new(&kinematics, "tool0", SE3Pose::new_identity(), q0, KinematicProblemConfig::default()).unwrap();
        let (nlp, qs) = problem.encode().unwrap();
        assert_eq!(qs.len(), 11);
        assert_eq!(nlp.num_variables(), 66);
        assert_eq!(nlp.num_equality_constraints(), 6);
        assert_eq!(nlp.num_cost_terms(), 11);
    }

    #[test]
    fn double_pendulum_tip_moves_toward_a_reachable_target() {
        let kinematics = RobotKinematicsModule::new(RobotLibrary::load("double_pendulum").unwrap());
        let tip = kinematics.model().get_frame_idx("tip").unwrap();
        let target = kinematics.frame_placement(&DVector::from_vec(vec![0.8, -0.4]), tip).unwrap();
        let q_ref = DVector::zeros(2);
        let mut config = KinematicProblemConfig::default();
        config.horizon = 4;
        config.running_weight = 0.01;
        let problem = KinematicProblem::new(&kinematics, "tip", target, q_ref.clone(), config).unwrap();
        let initial_error = problem.terminal_error(&q_ref).unwrap();

        let mut displayed = vec![];
        let mut callback = |_count: usize, q: &DVector<f64>| { displayed.push(q.clone()); };
        let traj = problem.solve(Some(&mut callback)).unwrap();
        assert!(!displayed.is_empty());
        assert_eq!(traj.horizon(), 4);
        assert_abs_diff_eq!(traj.configurations()[0].amax(), 0.0, epsilon = 1e-3);
        assert!(problem.terminal_error(traj.final_configuration()).unwrap() < 0.5 * initial_error);
    }

    #[test]
    fn unknown_frame_is_rejected() {
        let kinematics = RobotKinematicsModule::new(RobotLibrary::load("ur5").unwrap());
        let q0 = DVector::zeros(6);
        assert!(KinematicProblem::new(&kinematics, "no_such_frame", SE3Pose::new_identity(), q0, KinematicProblemConfig::default()).is_err());
        assert!(KinematicProblem::new(&kinematics, "tool0", SE3Pose::new_identity(), DVector::zeros(3), KinematicProblemConfig::default()).is_err());
    }
}
