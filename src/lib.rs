//! trajopt is a toolbox for constrained robot trajectory optimization.
//! It encodes multiple-shooting and kinematic trajectory problems over a robot's dynamics and
//! kinematics, fits minimum-volume ellipsoids around link geometry, and turns those ellipsoids
//! into collision-avoidance constraints.  Problems are solved with the OpEn augmented Lagrangian
//! and PANOC solvers.

pub mod utils;
pub mod robot_modules;
pub mod problem_functions;
pub mod optimization;
pub mod trajectory_optimization;
pub mod ellipsoids;
pub mod visualization;
