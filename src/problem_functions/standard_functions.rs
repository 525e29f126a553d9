use nalgebra::{DMatrix, DVector};
use crate::problem_functions::ProblemFunction;
use crate::utils::utils_errors::{check_dimension, TrajoptError};

/// `f(g(x))`.
pub struct ComposedFunction<'a> {
    outer: Box<dyn ProblemFunction + 'a>,
    inner: Box<dyn ProblemFunction + 'a>
}
impl<'a> ComposedFunction<'a> {
    pub fn new(outer: Box<dyn ProblemFunction + 'a>, inner: Box<dyn ProblemFunction + 'a>) -> Result<Self, TrajoptError> {
        check_dimension("input of the outer function", outer.input_dimension(), inner.output_dimension(), file!(), line!())?;
        Ok(Self { outer, inner })
    }
}
impl<'a> ProblemFunction for ComposedFunction<'a> {
    fn input_dimension(&self) -> usize { self.inner.input_dimension() }
    fn output_dimension(&self) -> usize { self.outer.output_dimension() }
    fn call(&self, input: &[f64]) -> Result<DVector<f64>, TrajoptError> {
        let g = self.inner.call(input)?;
        self.outer.call(g.as_slice())
    }
    fn derivative_analytical(&self, input: &[f64]) -> Result<Option<DMatrix<f64>>, TrajoptError> {
        let g = self.inner.call(input)?;
        let dg_dx = self.inner.derivative(input)?;
        let df_dg = self.outer.derivative(g.as_slice())?;
        Ok(Some(df_dg * dg_dx))
    }
    fn name(&self) -> String {
        format!("{} of {}", self.outer.name(), self.inner.name())
    }
}

/// `A x - b`.
#[derive(Clone, Debug)]
pub struct AffineResidual {
    a: DMatrix<f64>,
    b: DVector<f64>
}
impl AffineResidual {
    pub fn new(a: DMatrix<f64>, b: DVector<f64>) -> Result<Self, TrajoptError> {
        check_dimension("affine offset", a.nrows(), b.len(), file!(), line!())?;
        Ok(Self { a, b })
    }
    /// `x - target`.
    pub fn new_offset(target: &DVector<f64>) -> Self {
        let n = target.len();
        Self { a: DMatrix::identity(n, n), b: target.clone() }
    }
    /// `x_a - x_b` where the input is `[x_a; x_b]`.
    pub fn new_difference(dim: usize) -> Self {
        let mut a = DMatrix::zeros(dim, 2 * dim);
        for i in 0..dim {
            a[(i, i)] = 1.0;
            a[(i, dim + i)] = -1.0;
        }
        Self { a, b: DVector::zeros(dim) }
    }
}
impl ProblemFunction for AffineResidual {
    fn input_dimension(&self) -> usize { self.a.ncols() }
    fn output_dimension(&self) -> usize { self.a.nrows() }
    fn call(&self, input: &[f64]) -> Result<DVector<f64>, TrajoptError> {
        check_dimension("affine residual input", self.a.ncols(), input.len(), file!(), line!())?;
        let x = DVector::from_column_slice(input);
        Ok(&self.a * x - &self.b)
    }
    fn derivative_analytical(&self, _input: &[f64]) -> Result<Option<DMatrix<f64>>, TrajoptError> {
        Ok(Some(self.a.clone()))
    }
    fn name(&self) -> String { "affine residual".to_string() }
}

/// `Σ w_i x_i²`; with unit weights this is the squared Euclidean norm.
#[derive(Clone, Debug)]
pub struct WeightedSumOfSquares {
    weights: DVector<f64>
}
impl WeightedSumOfSquares {
    pub fn new(weights: DVector<f64>) -> Self {
        Self { weights }
    }
    pub fn new_squared_norm(dim: usize) -> Self {
        Self { weights: DVector::from_element(dim, 1.0) }
    }
}
impl ProblemFunction for WeightedSumOfSquares {
    fn input_dimension(&self) -> usize { self.weights.len() }
    fn output_dimension(&self) -> usize { 1 }
    fn call(&self, input: &[f64]) -> Result<DVector<f64>, TrajoptError> {
        check_dimension("sum of squares input", self.weights.len(), input.len(), file!(), line!())?;
        let val: f64 = input.iter().zip(self.weights.iter()).map(|(x, w)| w * x * x).sum();
        Ok(DVector::from_element(1, val))
    }
    fn derivative_analytical(&self, input: &[f64]) -> Result<Option<DMatrix<f64>>, TrajoptError> {
        let mut out = DMatrix::zeros(1, input.len());
        for (i, (x, w)) in input.iter().zip(self.weights.iter()).enumerate() {
            out[(0, i)] = 2.0 * w * x;
        }
        Ok(Some(out))
    }
    fn name(&self) -> String { "sum of squares".to_string() }
}

/// Product of all inputs.
#[derive(Clone, Debug)]
pub struct Product {
    dim: usize
}
impl Product {
    pub fn new(dim: usize) -> Self {
        Self { dim }
    }
}
impl ProblemFunction for Product {
    fn input_dimension(&self) -> usize { self.dim }
    fn output_dimension(&self) -> usize { 1 }
    fn call(&self, input: &[f64]) -> Result<DVector<f64>, TrajoptError> {
        check_dimension("product input", self.dim, input.len(), file!(), line!())?;
        Ok(DVector::from_element(1, input.iter().product()))
    }
    fn derivative_analytical(&self, input: &[f64]) -> Result<Option<DMatrix<f64>>, TrajoptError> {
        let mut out = DMatrix::zeros(1, input.len());
        for i in 0..input.len() {
            out[(0, i)] = input.iter().enumerate().filter(|(j, _)| *j != i).map(|(_, x)| *x).product();
        }
        Ok(Some(out))
    }
    fn name(&self) -> String { "product".to_string() }
}

pub type ClosureCall<'a> = Box<dyn Fn(&[f64]) -> Result<DVector<f64>, TrajoptError> + Send + Sync + 'a>;
pub type ClosureDerivative<'a> = Box<dyn Fn(&[f64]) -> Result<DMatrix<f64>, TrajoptError> + Send + Sync + 'a>;

/// Wraps plain closures so that external oracles can be injected as problem functions.
///
/// # Example
/// ```
/// use nalgebra::DVector;
/// use trajopt::problem_functions::ProblemFunction;
/// use trajopt::problem_functions::standard_functions::FunctionFromClosure;
/// use trajopt::utils::utils_errors::TrajoptError;
///
/// let f = FunctionFromClosure::new("sin", 1, 1, Box::new(|x: &[f64]| Ok::<_, TrajoptError>(DVector::from_element(1, x[0].sin()))), None);
/// let d = f.derivative(&[0.0]).expect("error");
/// assert!((d[(0, 0)] - 1.0).abs() < 1e-6);
/// ```
pub struct FunctionFromClosure<'a> {
    name: String,
    input_dimension: usize,
    output_dimension: usize,
    call: ClosureCall<'a>,
    derivative: Option<ClosureDerivative<'a>>
}
impl<'a> FunctionFromClosure<'a> {
    pub fn new(name: &str, input_dimension: usize, output_dimension: usize, call: ClosureCall<'a>, derivative: Option<ClosureDerivative<'a>>) -> Self {
        Self { name: name.to_string(), input_dimension, output_dimension, call, derivative }
    }
}
impl<'a> ProblemFunction for FunctionFromClosure<'a> {
    fn input_dimension(&self) -> usize { self.input_dimension }
    fn output_dimension(&self) -> usize { self.output_dimension }
    fn call(&self, input: &[f64]) -> Result<DVector<f64>, TrajoptError> {
        check_dimension(&format!("input of {}", self.name), self.input_dimension, input.len(), file!(), line!())?;
        let out = (self.call)(input)?;
        check_dimension(&format!("output of {}", self.name), self.output_dimension, out.len(), file!(), line!())?;
        Ok(out)
    }
    fn derivative_analytical(&self, input: &[f64]) -> Result<Option<DMatrix<f64>>, TrajoptError> {
        return match &self.derivative {
            None => { Ok(None) }
            Some(d) => { Ok(Some(d(input)?)) }
        }
    }
    fn name(&self) -> String { self.name.clone() }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use crate::problem_functions::ProblemFunctionUtils;
    use super::*;

    #[test]
    fn analytical_derivatives_agree_with_finite_differences() {
        let x = [0.3, -1.2, 0.7];
        let p = Product::new(3);
        assert!(ProblemFunctionUtils::derivative_check(&p, &x).unwrap().unwrap() < 1e-6);
        let s = WeightedSumOfSquares::new(DVector::from_vec(vec![1.0, 2.0, 0.5]));
        assert!(ProblemFunctionUtils::derivative_check(&s, &x).unwrap().unwrap() < 1e-6);
        let d = AffineResidual::new_difference(3);
        assert!(ProblemFunctionUtils::derivative_check(&d, &[1.0, 2.0, 3.0, 0.5, 0.5, 0.5]).unwrap().unwrap() < 1e-6);
        assert!(ProblemFunctionUtils::derivative_check(&d, &[1.0, 2.0]).is_err());
    }

    #[test]
    fn composition_applies_chain_rule() {
        let inner = AffineResidual::new_offset(&DVector::from_vec(vec![1.0, 1.0]));
        let outer = WeightedSumOfSquares::new_squared_norm(2);
        let c = ComposedFunction::new(Box::new(outer), Box::new(inner)).unwrap();
        let v = c.call(&[3.0, 0.0]).unwrap();
        assert_abs_diff_eq!(v[0], 5.0);
        let d = c.derivative(&[3.0, 0.0]).unwrap();
        assert_abs_diff_eq!(d[(0, 0)], 4.0);
        assert_abs_diff_eq!(d[(0, 1)], -2.0);
    }

    #[test]
    fn closure_without_derivative_falls_back_to_finite_differences() {
        let f = FunctionFromClosure::new("cube", 1, 1, Box::new(|x: &[f64]| Ok::<_, TrajoptError>(DVector::from_element(1, x[0].powi(3)))), None);
        let d = f.derivative(&[2.0]).unwrap();
        assert_abs_diff_eq!(d[(0, 0)], 12.0, epsilon = 1e-5);
        assert!(f.call(&[1.0, 2.0]).is_err());
    }

    #[test]
    fn mismatched_composition_is_rejected() {
        let inner = AffineResidual::new_offset(&DVector::zeros(3));
        let outer = WeightedSumOfSquares::new_squared_norm(2);
        assert!(ComposedFunction::new(Box::new(outer), Box::new(inner)).is_err());
    }
}
