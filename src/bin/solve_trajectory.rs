extern crate trajopt;

use std::env;
use std::path::PathBuf;
use std::time::Duration;
use nalgebra::{DVector, Vector3};
use trajopt::ellipsoids::collision_constraints::CollisionConstraintAssembler;
use trajopt::ellipsoids::ellipsoid::EllipsoidDescriptor;
use trajopt::robot_modules::robot_dynamics_module::{Actuation, FreeDynamics};
use trajopt::robot_modules::robot_kinematics_module::RobotKinematicsModule;
use trajopt::robot_modules::robot_library::RobotLibrary;
use trajopt::trajectory_optimization::kinematic_problem::{KinematicProblem, KinematicProblemConfig};
use trajopt::trajectory_optimization::shooting_problem::{ShootingProblem, ShootingProblemConfig, TerminalTask};
use trajopt::utils::utils_console::{trajopt_print, PrintColor, PrintMode};
use trajopt::utils::utils_errors::TrajoptError;
use trajopt::utils::utils_files::SaveAndLoadable;
use trajopt::utils::utils_se3::se3_pose::SE3Pose;
use trajopt::visualization::{ConsoleVisualizer, TaskScene};

const DISPLAY_EVERY: usize = 200;

/// Usage: solve_trajectory [kinematic | shooting] [problem_config_path] [ellipsoids_path]
///
/// `kinematic` moves the ur5 tool toward a fixed target; `shooting` moves the cartpole's pole tip
/// with full dynamics.  An ellipsoid table (from fit_link_ellipsoids) adds a single obstacle point.
fn main() -> Result<(), TrajoptError> {
    let args: Vec<String> = env::args().collect();
    let mode = args.get(1).map(|s| s.as_str()).unwrap_or("kinematic");
    let config_path = args.get(2).map(PathBuf::from);
    let ellipsoids: Option<Vec<EllipsoidDescriptor>> = match args.get(3) {
        None => { None }
        Some(s) => { Some(Vec::<EllipsoidDescriptor>::load_from_path(&PathBuf::from(s))?) }
    };

    return match mode {
        "kinematic" => { solve_kinematic(config_path, ellipsoids) }
        "shooting" => { solve_shooting(config_path, ellipsoids) }
        _ => { Err(TrajoptError::new_generic_error_str(&format!("unknown mode {}, expected kinematic or shooting.", mode), file!(), line!())) }
    }
}

fn solve_kinematic(config_path: Option<PathBuf>, ellipsoids: Option<Vec<EllipsoidDescriptor>>) -> Result<(), TrajoptError> {
    let config = match &config_path {
        None => { KinematicProblemConfig::default() }
        Some(p) => { KinematicProblemConfig::load_from_path(p)? }
    };
    let kinematics = RobotKinematicsModule::new(RobotLibrary::load("ur5")?);
    let target = SE3Pose::new_from_euler_angles(0.0, 3.0, 0.0, -0.5, 0.1, 0.2);
    let q0 = DVector::from_vec(vec![0.0, -std::f64::consts::FRAC_PI_2, 0.0, 0.0, 0.0, 0.0]);

    let mut problem = KinematicProblem::new(&kinematics, "tool0", target.clone(), q0.clone(), config)?;
    if let Some(descriptors) = ellipsoids {
        let mut assembler = CollisionConstraintAssembler::new(&kinematics);
        assembler.add_all_pairs(&descriptors, &[Vector3::new(-0.2, 0.1, 0.4)])?;
        problem.set_collision_constraints(assembler)?;
    }

    let scene = TaskScene::new(&kinematics, "tool0", target)?;
    let mut viz = ConsoleVisualizer::new(true);
    scene.add_to(&mut viz)?;
    scene.display_scene(&mut viz, &q0, Some(Duration::from_millis(300)))?;

    trajopt_print("Let's go to the target ...", PrintMode::Println, PrintColor::Blue, true);
    let mut callback = |count: usize, q: &DVector<f64>| {
        if count % DISPLAY_EVERY == 0 {
            if let Err(e) = scene.display_scene(&mut viz, q, None) {
                trajopt_print(e.message(), PrintMode::Println, PrintColor::Red, false);
            }
        }
    };
    let traj = problem.solve(Some(&mut callback))?;
    traj.print_summary();
    trajopt_print(&format!("terminal placement error {:.6}", problem.terminal_error(traj.final_configuration())?), PrintMode::Println, PrintColor::Green, true);

    let mut viz = ConsoleVisualizer::new(false);
    scene.add_to(&mut viz)?;
    scene.display_trajectory(&mut viz, traj.configurations(), Some(Duration::from_millis(10)))
}

fn solve_shooting(config_path: Option<PathBuf>, ellipsoids: Option<Vec<EllipsoidDescriptor>>) -> Result<(), TrajoptError> {
    let config = match &config_path {
        None => { ShootingProblemConfig::default() }
        Some(p) => { ShootingProblemConfig::load_from_path(p)? }
    };
    let model = RobotLibrary::load("cartpole")?;
    let oracle = FreeDynamics::new(model.clone());
    let kinematics = RobotKinematicsModule::new(model.clone());
    let goal = DVector::from_vec(vec![0.5, 0.0]);
    let target = kinematics.frame_placement(&goal, kinematics.model().get_frame_idx("pole_tip")?)?;

    let actuation = Actuation::Underactuated { actuated_dofs: vec![0] };
    let mut problem = ShootingProblem::new(&oracle, &model, actuation, DVector::zeros(2), DVector::zeros(2), config)?;
    problem.set_terminal_task(&kinematics, TerminalTask::new(&kinematics, "pole_tip", target.clone())?)?;
    if let Some(descriptors) = ellipsoids {
        let mut assembler = CollisionConstraintAssembler::new(&kinematics);
        assembler.add_all_pairs(&descriptors, &[Vector3::new(0.25, 0.0, -1.2)])?;
        problem.set_collision_constraints(assembler)?;
    }

    let scene = TaskScene::new(&kinematics, "pole_tip", target)?;
    let mut viz = ConsoleVisualizer::new(false);
    scene.add_to(&mut viz)?;
    let mut callback = |count: usize, q: &DVector<f64>| {
        if count % DISPLAY_EVERY == 0 {
            if let Err(e) = scene.display_scene(&mut viz, q, None) {
                trajopt_print(e.message(), PrintMode::Println, PrintColor::Red, false);
            }
        }
    };
    let traj = problem.solve(Some(&mut callback))?;
    traj.print_summary();
    trajopt_print(&format!("max integration error {:.3e}", traj.max_integration_error(&model)?), PrintMode::Println, PrintColor::Green, true);
    Ok(())
}
