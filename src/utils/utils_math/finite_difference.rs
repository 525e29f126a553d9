use nalgebra::{DMatrix, DVector};
use crate::utils::utils_errors::{check_dimension, TrajoptError};

pub struct FiniteDifferenceUtils;
impl FiniteDifferenceUtils {
    /// Central-difference Jacobian (`output_dimension` x `input.len()`) of `f` at `input`.
    pub fn central_difference_jacobian<F>(input: &[f64], output_dimension: usize, step: f64, f: F) -> Result<DMatrix<f64>, TrajoptError>
        where F: Fn(&[f64]) -> Result<DVector<f64>, TrajoptError> {
        let mut out = DMatrix::zeros(output_dimension, input.len());
        let mut perturbed = input.to_vec();
        for i in 0..input.len() {
            perturbed[i] = input[i] + step;
            let f_plus = f(&perturbed)?;
            perturbed[i] = input[i] - step;
            let f_minus = f(&perturbed)?;
            perturbed[i] = input[i];
            check_dimension("finite difference output", output_dimension, f_plus.len(), file!(), line!())?;
            check_dimension("finite difference output", output_dimension, f_minus.len(), file!(), line!())?;
            out.column_mut(i).copy_from(&((f_plus - f_minus) / (2.0 * step)));
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use super::*;

    #[test]
    fn jacobian_of_a_polynomial_map() {
        let f = |x: &[f64]| -> Result<DVector<f64>, TrajoptError> { Ok(DVector::from_vec(vec![x[0] * x[0] * x[1], x[1].sin()])) };
        let j = FiniteDifferenceUtils::central_difference_jacobian(&[1.5, 0.3], 2, 1e-6, f).unwrap();
        assert_abs_diff_eq!(j[(0, 0)], 2.0 * 1.5 * 0.3, epsilon = 1e-7);
        assert_abs_diff_eq!(j[(0, 1)], 1.5 * 1.5, epsilon = 1e-7);
        assert_abs_diff_eq!(j[(1, 0)], 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(j[(1, 1)], 0.3_f64.cos(), epsilon = 1e-7);
    }
}
