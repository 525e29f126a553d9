pub mod standard_functions;
pub mod robotics_functions;

use nalgebra::{DMatrix, DVector};
use crate::utils::utils_console::{trajopt_print, PrintColor, PrintMode};
use crate::utils::utils_errors::{check_dimension, TrajoptError};
use crate::utils::utils_math::finite_difference::FiniteDifferenceUtils;

/// Step used by the central finite-difference fallback.
pub const FD_PERTURBATION: f64 = 0.000001;

/// A vector-valued function `f: R^n -> R^m` that can appear in an optimization problem as a cost
/// term or as a constraint.  Implementors provide `call`; the Jacobian comes from
/// `derivative_analytical` when it is implemented and from central finite differences otherwise.
pub trait ProblemFunction: Send + Sync {
    fn input_dimension(&self) -> usize;
    fn output_dimension(&self) -> usize;
    fn call(&self, input: &[f64]) -> Result<DVector<f64>, TrajoptError>;
    /// Returns `Ok(None)` when no closed-form Jacobian is available.
    fn derivative_analytical(&self, _input: &[f64]) -> Result<Option<DMatrix<f64>>, TrajoptError> {
        Ok(None)
    }
    fn derivative_finite_difference(&self, input: &[f64]) -> Result<DMatrix<f64>, TrajoptError> {
        ProblemFunctionUtils::derivative_finite_difference_generic(self, input)
    }
    /// Jacobian (output_dimension x input_dimension).
    fn derivative(&self, input: &[f64]) -> Result<DMatrix<f64>, TrajoptError> {
        return match self.derivative_analytical(input)? {
            Some(d) => { Ok(d) }
            None => { self.derivative_finite_difference(input) }
        }
    }
    fn name(&self) -> String {
        "function".to_string()
    }
}

/// Convenience struct that holds class functions shared by all `ProblemFunction`s.
pub struct ProblemFunctionUtils;
impl ProblemFunctionUtils {
    pub fn derivative_finite_difference_generic<S: ProblemFunction + ?Sized>(s: &S, input: &[f64]) -> Result<DMatrix<f64>, TrajoptError> {
        check_dimension(&format!("input of {}", s.name()), s.input_dimension(), input.len(), file!(), line!())?;
        FiniteDifferenceUtils::central_difference_jacobian(input, s.output_dimension(), FD_PERTURBATION, |x| s.call(x))
    }
    /// Largest absolute difference between the analytical and finite-difference Jacobians, or
    /// `None` if the function has no analytical Jacobian.
    pub fn derivative_check<S: ProblemFunction + ?Sized>(s: &S, input: &[f64]) -> Result<Option<f64>, TrajoptError> {
        let analytical = match s.derivative_analytical(input)? {
            None => { return Ok(None); }
            Some(a) => { a }
        };
        let fd = s.derivative_finite_difference(input)?;
        let diff = (analytical - fd).amax();
        Ok(Some(diff))
    }
    pub fn print_derivative_check<S: ProblemFunction + ?Sized>(s: &S, input: &[f64]) -> Result<(), TrajoptError> {
        return match Self::derivative_check(s, input)? {
            None => {
                trajopt_print(&format!("{} has no analytical derivative.", s.name()), PrintMode::Println, PrintColor::Yellow, false);
                Ok(())
            }
            Some(d) => {
                let color = if d < 1e-4 { PrintColor::Green } else { PrintColor::Red };
                trajopt_print(&format!("{} derivative check max error: {:e}", s.name(), d), PrintMode::Println, color, true);
                Ok(())
            }
        }
    }
}
