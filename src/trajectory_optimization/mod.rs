pub mod trajectory;
pub mod shooting_problem;
pub mod kinematic_problem;
