pub mod ellipsoid;
pub mod ellipsoid_fitter;
pub mod collision_constraints;
