use nalgebra::{DVector, Vector3};
use crate::ellipsoids::ellipsoid::EllipsoidDescriptor;
use crate::optimization::{OptimizationProblem, VariableBlock};
use crate::problem_functions::robotics_functions::CollisionClearance;
use crate::robot_modules::robot_kinematics_module::RobotKinematicsModule;
use crate::utils::utils_console::{trajopt_print, PrintColor, PrintMode};
use crate::utils::utils_errors::{check_dimension, TrajoptError};

/// Keeps static obstacle points outside ellipsoids attached to robot links.  For every registered
/// (ellipsoid, point) pair and every configuration block it is applied to, the inequality
/// `(p_local - c)ᵀ A (p_local - c) ≥ 1` is added, with `p_local` the point seen from the
/// ellipsoid's joint frame.
///
/// # Example
/// ```
/// use nalgebra::{DVector, Vector3};
/// use trajopt::ellipsoids::collision_constraints::CollisionConstraintAssembler;
/// use trajopt::ellipsoids::ellipsoid::{Ellipsoid, EllipsoidDescriptor};
/// use trajopt::robot_modules::robot_kinematics_module::RobotKinematicsModule;
/// use trajopt::robot_modules::robot_library::RobotLibrary;
///
/// let kinematics = RobotKinematicsModule::new(RobotLibrary::load("pendulum").expect("error"));
/// let rod = Ellipsoid::new(Vector3::zeros(), Vector3::new(0.0, 0.0, -0.5), Vector3::new(0.05, 0.05, 0.55)).expect("error");
/// let mut assembler = CollisionConstraintAssembler::new(&kinematics);
/// assembler.add_pair(EllipsoidDescriptor::new("rod", 0, rod), Vector3::new(0.3, 0.0, -0.5)).expect("error");
/// assert!(assembler.is_collision_free(&DVector::zeros(1)).expect("error"));
/// ```
#[derive(Clone)]
pub struct CollisionConstraintAssembler<'a> {
    kinematics: &'a RobotKinematicsModule,
    pairs: Vec<(EllipsoidDescriptor, Vector3<f64>)>
}
impl<'a> CollisionConstraintAssembler<'a> {
    pub fn new(kinematics: &'a RobotKinematicsModule) -> Self {
        Self { kinematics, pairs: vec![] }
    }
    pub fn add_pair(&mut self, descriptor: EllipsoidDescriptor, obstacle_point: Vector3<f64>) -> Result<(), TrajoptError> {
        self.kinematics.model().get_joint(descriptor.joint_idx())?;
        self.pairs.push((descriptor, obstacle_point));
        Ok(())
    }
    /// Pairs every descriptor with every obstacle point.
    pub fn add_all_pairs(&mut self, descriptors: &[EllipsoidDescriptor], obstacle_points: &[Vector3<f64>]) -> Result<(), TrajoptError> {
        for d in descriptors {
            for p in obstacle_points {
                self.add_pair(d.clone(), *p)?;
            }
        }
        Ok(())
    }
    pub fn pairs(&self) -> &Vec<(EllipsoidDescriptor, Vector3<f64>)> {
        &self.pairs
    }
    pub fn num_pairs(&self) -> usize {
        self.pairs.len()
    }
    pub fn kinematics(&self) -> &'a RobotKinematicsModule {
        self.kinematics
    }
    /// Registers one inequality per pair on the configuration block `q`.  Returns how many were
    /// added.
    pub fn register(&self, problem: &mut OptimizationProblem<'a>, q: &VariableBlock) -> Result<usize, TrajoptError> {
        check_dimension(&format!("configuration block {}", q.name()), self.kinematics.model().nq(), q.dim(), file!(), line!())?;
        for (descriptor, point) in &self.pairs {
            let clearance = CollisionClearance::new(self.kinematics, descriptor.clone(), *point)?;
            problem.add_inequality_constraint(Box::new(clearance), &[q])?;
        }
        Ok(self.pairs.len())
    }
    /// Local quadratic form of every pair at `q`; a value of at least one means no collision.
    pub fn quadratic_forms(&self, q: &DVector<f64>) -> Result<Vec<f64>, TrajoptError> {
        let fk = self.kinematics.compute_fk(q)?;
        let mut out = Vec::with_capacity(self.pairs.len());
        for (descriptor, point) in &self.pairs {
            let p_local = self.kinematics.point_in_joint_frame(&fk, descriptor.joint_idx(), point)?;
            out.push(descriptor.ellipsoid().quadratic_form(&p_local));
        }
        Ok(out)
    }
    pub fn min_quadratic_form(&self, q: &DVector<f64>) -> Result<f64, TrajoptError> {
        Ok(self.quadratic_forms(q)?.into_iter().fold(f64::INFINITY, f64::min))
    }
    pub fn is_collision_free(&self, q: &DVector<f64>) -> Result<bool, TrajoptError> {
        Ok(self.min_quadratic_form(q)? >= 1.0)
    }
    pub fn print_clearances(&self, q: &DVector<f64>) -> Result<(), TrajoptError> {
        let forms = self.quadratic_forms(q)?;
        for ((descriptor, point), f) in self.pairs.iter().zip(forms.iter()) {
            let color = if *f >= 1.0 { PrintColor::Green } else { PrintColor::Red };
            trajopt_print(&format!("   {} vs point {:?}: {:.4}", descriptor.name(), point.as_slice(), f), PrintMode::Println, color, false);
        }
        Ok(())
    }
}
