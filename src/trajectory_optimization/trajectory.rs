use nalgebra::DVector;
use serde::{Serialize, Deserialize};
use crate::optimization::SolveStatus;
use crate::problem_functions::robotics_functions::advance_state;
use crate::robot_modules::robot_configuration_module::ConfigurationManifold;
use crate::utils::utils_console::{trajopt_print, PrintColor, PrintMode};
use crate::utils::utils_errors::{check_dimension, TrajoptError};

/// Result of a shooting problem: `T + 1` states and `T` accelerations and controls.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StateTrajectory {
    dt: f64,
    configurations: Vec<DVector<f64>>,
    velocities: Vec<DVector<f64>>,
    accelerations: Vec<DVector<f64>>,
    controls: Vec<DVector<f64>>,
    status: SolveStatus,
    cost: f64
}
impl StateTrajectory {
    pub fn new(dt: f64, configurations: Vec<DVector<f64>>, velocities: Vec<DVector<f64>>, accelerations: Vec<DVector<f64>>, controls: Vec<DVector<f64>>, status: SolveStatus, cost: f64) -> Result<Self, TrajoptError> {
        if configurations.is_empty() {
            return Err(TrajoptError::new_generic_error_str("a trajectory needs at least one state.", file!(), line!()));
        }
        let horizon = configurations.len() - 1;
        check_dimension("number of velocities", horizon + 1, velocities.len(), file!(), line!())?;
        check_dimension("number of accelerations", horizon, accelerations.len(), file!(), line!())?;
        check_dimension("number of controls", horizon, controls.len(), file!(), line!())?;
        Ok(Self { dt, configurations, velocities, accelerations, controls, status, cost })
    }
    pub fn horizon(&self) -> usize {
        self.configurations.len() - 1
    }
    pub fn dt(&self) -> f64 {
        self.dt
    }
    pub fn configurations(&self) -> &Vec<DVector<f64>> {
        &self.configurations
    }
    pub fn velocities(&self) -> &Vec<DVector<f64>> {
        &self.velocities
    }
    pub fn accelerations(&self) -> &Vec<DVector<f64>> {
        &self.accelerations
    }
    pub fn controls(&self) -> &Vec<DVector<f64>> {
        &self.controls
    }
    pub fn status(&self) -> SolveStatus {
        self.status
    }
    pub fn converged(&self) -> bool {
        self.status == SolveStatus::Converged
    }
    pub fn cost(&self) -> f64 {
        self.cost
    }
    pub fn final_configuration(&self) -> &DVector<f64> {
        &self.configurations[self.configurations.len() - 1]
    }
    pub fn get_state(&self, t: usize) -> Result<(&DVector<f64>, &DVector<f64>), TrajoptError> {
        if t >= self.configurations.len() {
            return Err(TrajoptError::new_idx_out_of_bound_error(t, self.configurations.len(), file!(), line!()));
        }
        Ok((&self.configurations[t], &self.velocities[t]))
    }
    /// Largest mismatch between each stored state and one integration step from its predecessor.
    pub fn max_integration_error(&self, manifold: &dyn ConfigurationManifold) -> Result<f64, TrajoptError> {
        let mut out = 0.0_f64;
        for t in 0..self.horizon() {
            let (q_next, v_next) = advance_state(manifold, &self.configurations[t], &self.velocities[t], &self.accelerations[t], self.dt)?;
            let dq = manifold.difference(&q_next, &self.configurations[t + 1])?;
            out = out.max(dq.amax()).max((&v_next - &self.velocities[t + 1]).amax());
        }
        Ok(out)
    }
    pub fn print_summary(&self) {
        let color = if self.converged() { PrintColor::Green } else { PrintColor::Yellow };
        trajopt_print(&format!("State trajectory with {} steps of {} s ({:?}, cost {:.6e})", self.horizon(), self.dt, self.status, self.cost), PrintMode::Println, color, true);
        for (t, q) in self.configurations.iter().enumerate() {
            trajopt_print(&format!("   t = {}: q = {:.4?}, v = {:.4?}", t, q.as_slice(), self.velocities[t].as_slice()), PrintMode::Println, PrintColor::None, false);
        }
    }
}

/// Result of a kinematic problem: the configurations `q_0..q_T`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConfigurationTrajectory {
    configurations: Vec<DVector<f64>>,
    status: SolveStatus,
    cost: f64
}
impl ConfigurationTrajectory {
    pub fn new(configurations: Vec<DVector<f64>>, status: SolveStatus, cost: f64) -> Result<Self, TrajoptError> {
        if configurations.is_empty() {
            return Err(TrajoptError::new_generic_error_str("a trajectory needs at least one configuration.", file!(), line!()));
        }
        Ok(Self { configurations, status, cost })
    }
    pub fn horizon(&self) -> usize {
        self.configurations.len() - 1
    }
    pub fn configurations(&self) -> &Vec<DVector<f64>> {
        &self.configurations
    }
    pub fn status(&self) -> SolveStatus {
        self.status
    }
    pub fn converged(&self) -> bool {
        self.status == SolveStatus::Converged
    }
    pub fn cost(&self) -> f64 {
        self.cost
    }
    pub fn final_configuration(&self) -> &DVector<f64> {
        &self.configurations[self.configurations.len() - 1]
    }
    /// Largest joint-space step `‖q_{t+1} - q_t‖`.
    pub fn max_step(&self) -> f64 {
        self.configurations.windows(2).map(|w| (&w[1] - &w[0]).norm()).fold(0.0, f64::max)
    }
    pub fn print_summary(&self) {
        let color = if self.converged() { PrintColor::Green } else { PrintColor::Yellow };
        trajopt_print(&format!("Configuration trajectory with {} steps ({:?}, cost {:.6e})", self.horizon(), self.status, self.cost), PrintMode::Println, color, true);
        for (t, q) in self.configurations.iter().enumerate() {
            trajopt_print(&format!("   t = {}: {:.4?}", t, q.as_slice()), PrintMode::Println, PrintColor::None, false);
        }
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use crate::robot_modules::robot_configuration_module::EuclideanSpace;
    use crate::utils::utils_files::{temp_file_path, SaveAndLoadable};
    use super::*;

    #[test]
    fn mismatched_lengths_are_rejected() {
        let q = vec![DVector::zeros(1), DVector::zeros(1)];
        let v = vec![DVector::zeros(1)];
        assert!(StateTrajectory::new(0.1, q, v, vec![DVector::zeros(1)], vec![DVector::zeros(1)], SolveStatus::Converged, 0.0).is_err());
        assert!(ConfigurationTrajectory::new(vec![], SolveStatus::Converged, 0.0).is_err());
    }

    #[test]
    fn integration_error_of_a_consistent_rollout_is_zero() {
        let manifold = EuclideanSpace::new(1);
        let dt = 0.1;
        let a = DVector::from_element(1, 2.0);
        let q0 = DVector::zeros(1);
        let v0 = DVector::zeros(1);
        let (q1, v1) = advance_state(&manifold, &q0, &v0, &a, dt).unwrap();
        let traj = StateTrajectory::new(dt, vec![q0, q1], vec![v0, v1], vec![a], vec![DVector::zeros(1)], SolveStatus::Converged, 0.0).unwrap();
        assert_abs_diff_eq!(traj.max_integration_error(&manifold).unwrap(), 0.0, epsilon = 1e-14);
        assert_abs_diff_eq!(traj.final_configuration()[0], 0.02, epsilon = 1e-14);
    }

    #[test]
    fn trajectory_survives_a_file_round_trip() {
        let traj = ConfigurationTrajectory::new(vec![DVector::from_vec(vec![0.0, 1.0]), DVector::from_vec(vec![0.5, 1.0])], SolveStatus::NotConvergedIterations, 1.5).unwrap();
        let path = temp_file_path("configuration_trajectory.json");
        traj.save_to_path(&path).unwrap();
        let loaded = ConfigurationTrajectory::load_from_path(&path).unwrap();
        assert_eq!(traj, loaded);
        assert_abs_diff_eq!(loaded.max_step(), 0.5);
    }
}
