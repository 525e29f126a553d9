use approx::assert_abs_diff_eq;
use nalgebra::{DVector, Vector3};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use trajopt::ellipsoids::collision_constraints::CollisionConstraintAssembler;
use trajopt::ellipsoids::ellipsoid::{Ellipsoid, EllipsoidDescriptor};
use trajopt::ellipsoids::ellipsoid_fitter::{EllipsoidFitConfig, EllipsoidFitter};
use trajopt::optimization::SolveStatus;
use trajopt::robot_modules::robot_contact_module::{ConstrainedDynamics, ContactDescriptor, ContactType, ProximalSettings};
use trajopt::robot_modules::robot_dynamics_module::{Actuation, FreeDynamics};
use trajopt::robot_modules::robot_kinematics_module::RobotKinematicsModule;
use trajopt::robot_modules::robot_library::RobotLibrary;
use trajopt::trajectory_optimization::shooting_problem::{ShootingProblem, ShootingProblemConfig};
use trajopt::utils::utils_se3::se3_pose::SE3Pose;

fn config(horizon: usize) -> ShootingProblemConfig {
    let mut c = ShootingProblemConfig::default();
    c.horizon = horizon;
    c.dt = 0.05;
    c
}

#[test]
fn satisfied_integration_constraints_reproduce_each_next_state() {
    let model = RobotLibrary::load("double_pendulum").unwrap();
    let oracle = FreeDynamics::new(model.clone());
    let problem = ShootingProblem::new(&oracle, &model, Actuation::Full, DVector::from_vec(vec![0.2, 0.7]), DVector::from_vec(vec![-0.5, 0.1]), config(6)).unwrap();
    let controls: Vec<DVector<f64>> = (0..6).map(|t| DVector::from_vec(vec![(t as f64).sin(), 0.3])).collect();
    let traj = problem.rollout(&controls).unwrap();
    assert_abs_diff_eq!(traj.max_integration_error(&model).unwrap(), 0.0, epsilon = 1e-12);

    let (nlp, variables) = problem.encode().unwrap();
    let mut x = nlp.initial_guess().to_vec();
    variables.encode(&traj, &mut x).unwrap();
    assert_abs_diff_eq!(nlp.constraint_violation(&x).unwrap(), 0.0, epsilon = 1e-10);
}

#[test]
fn zero_horizon_has_only_the_initial_state_constraint() {
    let model = RobotLibrary::load("ur5").unwrap();
    let oracle = FreeDynamics::new(model.clone());
    let problem = ShootingProblem::new(&oracle, &model, Actuation::Full, DVector::zeros(6), DVector::zeros(6), config(0)).unwrap();
    let (nlp, variables) = problem.encode().unwrap();
    assert_eq!(variables.horizon(), 0);
    assert!(variables.accelerations().is_empty());
    assert!(variables.controls().is_empty());
    assert_eq!(nlp.num_equality_constraints(), 12);
    assert_eq!(nlp.num_inequality_constraints(), 0);
}

#[test]
fn single_joint_at_rest_without_torque_stays_put() {
    let model = RobotLibrary::load("pendulum").unwrap();
    let oracle = FreeDynamics::new(model.clone());
    let problem = ShootingProblem::new(&oracle, &model, Actuation::Full, DVector::zeros(1), DVector::zeros(1), config(1)).unwrap();
    let traj = problem.rollout(&[DVector::zeros(1)]).unwrap();
    assert_abs_diff_eq!(traj.accelerations()[0][0], 0.0, epsilon = 1e-12);
    assert_abs_diff_eq!(traj.configurations()[1][0], 0.0, epsilon = 1e-12);
    assert_abs_diff_eq!(traj.velocities()[1][0], 0.0, epsilon = 1e-12);
}

#[test]
fn contact_aware_oracle_plugs_into_the_encoder() {
    let model = RobotLibrary::load("pendulum").unwrap();
    let contact = ContactDescriptor::new_at_frame(&model, "tip", ContactType::Contact3D).unwrap();
    let oracle = ConstrainedDynamics::new(model.clone(), vec![contact], ProximalSettings::default()).unwrap();
    let problem = ShootingProblem::new(&oracle, &model, Actuation::Full, DVector::from_vec(vec![0.4]), DVector::zeros(1), config(3)).unwrap();
    let controls = vec![DVector::from_vec(vec![2.0]); 3];
    let traj = problem.rollout(&controls).unwrap();
    // the pinned tip cancels the torque
    for a in traj.accelerations() {
        assert_abs_diff_eq!(a[0], 0.0, epsilon = 1e-6);
    }
    assert_abs_diff_eq!(traj.final_configuration()[0], 0.4, epsilon = 1e-6);
}

#[test]
fn fitted_ellipsoid_contains_a_random_cloud() {
    let mut rng = ChaCha8Rng::seed_from_u64(42);
    let pose = SE3Pose::new_from_euler_angles(0.3, -0.2, 0.9, 0.1, 0.0, -0.4);
    let points: Vec<Vector3<f64>> = (0..150).map(|_| {
        pose.act_point(&Vector3::new(rng.gen_range(-0.3..0.3), rng.gen_range(-0.1..0.1), rng.gen_range(-0.05..0.05)))
    }).collect();
    let fit = EllipsoidFitter::fit(&points, &EllipsoidFitConfig::default()).unwrap();
    for p in &points {
        assert!(fit.ellipsoid().quadratic_form(p) <= 1.0 + 1e-6);
    }
    assert_eq!(fit.status(), SolveStatus::Converged);
    assert!(!fit.sphere_fallback());
    let centroid = points.iter().fold(Vector3::zeros(), |s, p| s + p) / points.len() as f64;
    let bounding = points.iter().map(|p| (p - centroid).norm()).fold(0.0, f64::max);
    let sphere = Ellipsoid::new_sphere(centroid, bounding).unwrap();
    assert!(fit.ellipsoid().volume() < 0.5 * sphere.volume());
}

#[test]
fn obstacle_outside_a_fitted_link_ellipsoid_is_clear() {
    let kinematics = RobotKinematicsModule::new(RobotLibrary::load("double_pendulum").unwrap());
    let descriptors = EllipsoidFitter::fit_robot_links("double_pendulum", 30, 5, &EllipsoidFitConfig::default()).unwrap();
    let d: &EllipsoidDescriptor = &descriptors[1];
    let e = d.ellipsoid();
    // twice the first radius along the first principal axis, in the joint frame
    let local = e.pose().act_point(&Vector3::new(2.0 * e.radii()[0], 0.0, 0.0));
    let q = DVector::from_vec(vec![0.3, -0.6]);
    let fk = kinematics.compute_fk(&q).unwrap();
    let world = fk.get_joint_placement(d.joint_idx()).unwrap().act_point(&local);

    let mut assembler = CollisionConstraintAssembler::new(&kinematics);
    assembler.add_pair(d.clone(), world).unwrap();
    let forms = assembler.quadratic_forms(&q).unwrap();
    assert_abs_diff_eq!(forms[0], 4.0, epsilon = 1e-9);
    assert!(assembler.is_collision_free(&q).unwrap());
}
