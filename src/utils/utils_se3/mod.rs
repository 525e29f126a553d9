pub mod se3_pose;
pub mod spatial;
