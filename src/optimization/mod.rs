use std::ops::Range;
use std::sync::Mutex;
use std::time::Duration;
use nalgebra::DVector;
use serde::{Serialize, Deserialize};
use optimization_engine::{constraints, Optimizer, Problem, SolverError};
use optimization_engine::alm::{AlmCache, AlmFactory, AlmOptimizer, AlmProblem, NO_JACOBIAN_MAPPING, NO_MAPPING, NO_SET};
use optimization_engine::core::ExitStatus;
use optimization_engine::panoc::{PANOCCache, PANOCOptimizer};
use crate::problem_functions::ProblemFunction;
use crate::utils::utils_console::{trajopt_print, PrintColor, PrintMode, TrajoptDebug};
use crate::utils::utils_errors::{check_dimension, TrajoptError};

/// A named, contiguous slice of the decision vector.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariableBlock {
    name: String,
    idx: usize,
    offset: usize,
    dim: usize
}
impl VariableBlock {
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn idx(&self) -> usize {
        self.idx
    }
    pub fn offset(&self) -> usize {
        self.offset
    }
    pub fn dim(&self) -> usize {
        self.dim
    }
    pub fn range(&self) -> Range<usize> {
        self.offset..self.offset + self.dim
    }
    /// The entries of `x` that belong to this block.
    pub fn values<'x>(&self, x: &'x [f64]) -> Result<&'x [f64], TrajoptError> {
        return match x.get(self.range()) {
            Some(s) => { Ok(s) }
            None => { Err(TrajoptError::new_idx_out_of_bound_error(self.offset + self.dim, x.len(), file!(), line!())) }
        }
    }
}

/// A function of the concatenation of the blocks it names.
struct ProblemTerm<'a> {
    function: Box<dyn ProblemFunction + 'a>,
    blocks: Vec<VariableBlock>
}
impl<'a> ProblemTerm<'a> {
    fn gather(&self, x: &[f64]) -> Vec<f64> {
        let mut out = Vec::with_capacity(self.function.input_dimension());
        for b in &self.blocks { out.extend_from_slice(&x[b.range()]); }
        out
    }
    fn scatter_add(&self, local: &DVector<f64>, out: &mut DVector<f64>) {
        let mut k = 0;
        for b in &self.blocks {
            for i in b.range() {
                out[i] += local[k];
                k += 1;
            }
        }
    }
}

#[derive(Clone, Copy, Debug)]
enum CostKind {
    Scalar { weight: f64 },
    SquaredResidual { weight: f64 }
}

/// A nonlinear program over named variable blocks:
///
/// minimize `Σ costs(x)` subject to `g(x) = 0`, `h(x) ≤ 0`, `lb ≤ x ≤ ub`.
///
/// Every cost and constraint only sees the blocks it was registered with, so its Jacobian is
/// evaluated on that small input and scattered into the full decision vector.
///
/// # Example
/// ```
/// use nalgebra::DVector;
/// use trajopt::optimization::{NonlinearOptimizer, OptimizationProblem, OptimizerParameters};
/// use trajopt::problem_functions::standard_functions::AffineResidual;
/// use trajopt::utils::utils_console::TrajoptDebug;
///
/// let mut problem = OptimizationProblem::new();
/// let x = problem.add_variable("x", 2);
/// problem.add_squared_residual_cost(Box::new(AffineResidual::new_offset(&DVector::from_vec(vec![1.0, -2.0]))), &[&x], 1.0).expect("error");
/// let result = NonlinearOptimizer::new(OptimizerParameters::default(), TrajoptDebug::False).optimize(&problem, None).expect("error");
/// assert!((result.x_min()[0] - 1.0).abs() < 1e-3);
/// ```
pub struct OptimizationProblem<'a> {
    blocks: Vec<VariableBlock>,
    lower_bounds: Vec<f64>,
    upper_bounds: Vec<f64>,
    initial_guess: Vec<f64>,
    costs: Vec<(ProblemTerm<'a>, CostKind)>,
    equality_constraints: Vec<ProblemTerm<'a>>,
    inequality_constraints: Vec<ProblemTerm<'a>>
}
impl<'a> OptimizationProblem<'a> {
    pub fn new() -> Self {
        Self {
            blocks: vec![],
            lower_bounds: vec![],
            upper_bounds: vec![],
            initial_guess: vec![],
            costs: vec![],
            equality_constraints: vec![],
            inequality_constraints: vec![]
        }
    }
    /// Appends a block of `dim` unbounded variables initialized at zero.
    pub fn add_variable(&mut self, name: &str, dim: usize) -> VariableBlock {
        let block = VariableBlock { name: name.to_string(), idx: self.blocks.len(), offset: self.num_variables(), dim };
        self.lower_bounds.extend(std::iter::repeat(-f64::INFINITY).take(dim));
        self.upper_bounds.extend(std::iter::repeat(f64::INFINITY).take(dim));
        self.initial_guess.extend(std::iter::repeat(0.0).take(dim));
        self.blocks.push(block.clone());
        block
    }
    pub fn set_bounds(&mut self, block: &VariableBlock, lower: &[f64], upper: &[f64]) -> Result<(), TrajoptError> {
        self.check_block(block)?;
        check_dimension(&format!("lower bounds of {}", block.name), block.dim, lower.len(), file!(), line!())?;
        check_dimension(&format!("upper bounds of {}", block.name), block.dim, upper.len(), file!(), line!())?;
        if lower.iter().zip(upper.iter()).any(|(l, u)| l > u) {
            return Err(TrajoptError::new_generic_error_str(&format!("lower bound exceeds upper bound in block {}.", block.name), file!(), line!()));
        }
        self.lower_bounds[block.range()].copy_from_slice(lower);
        self.upper_bounds[block.range()].copy_from_slice(upper);
        Ok(())
    }
    pub fn set_initial_guess(&mut self, block: &VariableBlock, values: &[f64]) -> Result<(), TrajoptError> {
        self.check_block(block)?;
        check_dimension(&format!("initial guess of {}", block.name), block.dim, values.len(), file!(), line!())?;
        self.initial_guess[block.range()].copy_from_slice(values);
        Ok(())
    }
    /// Adds `weight * f(x)` for a scalar valued `f`.
    pub fn add_cost(&mut self, function: Box<dyn ProblemFunction + 'a>, blocks: &[&VariableBlock], weight: f64) -> Result<(), TrajoptError> {
        check_dimension(&format!("output of cost {}", function.name()), 1, function.output_dimension(), file!(), line!())?;
        let term = self.new_term(function, blocks)?;
        self.costs.push((term, CostKind::Scalar { weight }));
        Ok(())
    }
    /// Adds `weight * ‖r(x)‖²`.
    pub fn add_squared_residual_cost(&mut self, function: Box<dyn ProblemFunction + 'a>, blocks: &[&VariableBlock], weight: f64) -> Result<(), TrajoptError> {
        let term = self.new_term(function, blocks)?;
        self.costs.push((term, CostKind::SquaredResidual { weight }));
        Ok(())
    }
    /// Adds `g(x) = 0`.
    pub fn add_equality_constraint(&mut self, function: Box<dyn ProblemFunction + 'a>, blocks: &[&VariableBlock]) -> Result<(), TrajoptError> {
        let term = self.new_term(function, blocks)?;
        self.equality_constraints.push(term);
        Ok(())
    }
    /// Adds `h(x) ≤ 0`.
    pub fn add_inequality_constraint(&mut self, function: Box<dyn ProblemFunction + 'a>, blocks: &[&VariableBlock]) -> Result<(), TrajoptError> {
        let term = self.new_term(function, blocks)?;
        self.inequality_constraints.push(term);
        Ok(())
    }
    pub fn variable_blocks(&self) -> &Vec<VariableBlock> {
        &self.blocks
    }
    pub fn get_variable(&self, name: &str) -> Result<&VariableBlock, TrajoptError> {
        return match self.blocks.iter().find(|b| b.name == name) {
            Some(b) => { Ok(b) }
            None => { Err(TrajoptError::new_generic_error_str(&format!("variable block {} does not exist.", name), file!(), line!())) }
        }
    }
    pub fn num_variables(&self) -> usize {
        self.lower_bounds.len()
    }
    pub fn num_cost_terms(&self) -> usize {
        self.costs.len()
    }
    /// Number of scalar equality constraints.
    pub fn num_equality_constraints(&self) -> usize {
        self.equality_constraints.iter().map(|t| t.function.output_dimension()).sum()
    }
    /// Number of scalar inequality constraints.
    pub fn num_inequality_constraints(&self) -> usize {
        self.inequality_constraints.iter().map(|t| t.function.output_dimension()).sum()
    }
    pub fn has_constraints(&self) -> bool {
        self.num_equality_constraints() + self.num_inequality_constraints() > 0
    }
    pub fn lower_bounds(&self) -> &[f64] {
        &self.lower_bounds
    }
    pub fn upper_bounds(&self) -> &[f64] {
        &self.upper_bounds
    }
    pub fn initial_guess(&self) -> &[f64] {
        &self.initial_guess
    }
    pub fn cost(&self, x: &[f64]) -> Result<f64, TrajoptError> {
        self.check_input(x)?;
        let mut out = 0.0;
        for (term, kind) in &self.costs {
            let val = term.function.call(&term.gather(x))?;
            out += match kind {
                CostKind::Scalar { weight } => { *weight * val[0] }
                CostKind::SquaredResidual { weight } => { *weight * val.norm_squared() }
            };
        }
        Ok(out)
    }
    pub fn gradient(&self, x: &[f64]) -> Result<DVector<f64>, TrajoptError> {
        self.check_input(x)?;
        let mut out = DVector::zeros(x.len());
        for (term, kind) in &self.costs {
            let input = term.gather(x);
            let jacobian = term.function.derivative(&input)?;
            let local: DVector<f64> = match kind {
                CostKind::Scalar { weight } => { jacobian.row(0).transpose() * *weight }
                CostKind::SquaredResidual { weight } => {
                    let r = term.function.call(&input)?;
                    jacobian.transpose() * r * (2.0 * *weight)
                }
            };
            term.scatter_add(&local, &mut out);
        }
        Ok(out)
    }
    /// `‖x - Π(x - ∇f(x))‖∞` with `Π` the projection on the box bounds.  Zero exactly when `x` is
    /// a stationary point of the cost over the box.
    pub fn projected_gradient_residual(&self, x: &[f64]) -> Result<f64, TrajoptError> {
        let g = self.gradient(x)?;
        let mut out = 0.0_f64;
        for i in 0..x.len() {
            let projected = (x[i] - g[i]).max(self.lower_bounds[i]).min(self.upper_bounds[i]);
            out = out.max((x[i] - projected).abs());
        }
        Ok(out)
    }
    /// Stacked values of all equality constraints.
    pub fn equality_values(&self, x: &[f64]) -> Result<DVector<f64>, TrajoptError> {
        self.check_input(x)?;
        Self::stack_values(&self.equality_constraints, x, self.num_equality_constraints())
    }
    /// Stacked values of all inequality constraints.
    pub fn inequality_values(&self, x: &[f64]) -> Result<DVector<f64>, TrajoptError> {
        self.check_input(x)?;
        Self::stack_values(&self.inequality_constraints, x, self.num_inequality_constraints())
    }
    /// Largest of `|g_i(x)|` and `max(0, h_j(x))`; zero for a feasible point.
    pub fn constraint_violation(&self, x: &[f64]) -> Result<f64, TrajoptError> {
        let g = self.equality_values(x)?;
        let h = self.inequality_values(x)?;
        let eq = g.iter().fold(0.0_f64, |m, v| m.max(v.abs()));
        let ineq = h.iter().fold(0.0_f64, |m, v| m.max(*v));
        Ok(eq.max(ineq))
    }
    /// `[g(x); max(0, h(x))]`: zero exactly on the feasible set.
    pub fn penalty_mapping(&self, x: &[f64]) -> Result<DVector<f64>, TrajoptError> {
        let g = self.equality_values(x)?;
        let h = self.inequality_values(x)?;
        let mut out = DVector::zeros(g.len() + h.len());
        out.rows_mut(0, g.len()).copy_from(&g);
        for (i, v) in h.iter().enumerate() { out[g.len() + i] = v.max(0.0); }
        Ok(out)
    }
    /// `J(x)ᵀ d` where `J` is the Jacobian of `penalty_mapping`.  Inactive inequality rows are zero.
    pub fn penalty_mapping_jacobian_transpose_product(&self, x: &[f64], d: &[f64]) -> Result<DVector<f64>, TrajoptError> {
        self.check_input(x)?;
        check_dimension("penalty multiplier", self.num_equality_constraints() + self.num_inequality_constraints(), d.len(), file!(), line!())?;
        let mut out = DVector::zeros(x.len());
        let mut row = 0;
        for term in &self.equality_constraints {
            let m = term.function.output_dimension();
            let input = term.gather(x);
            let jacobian = term.function.derivative(&input)?;
            let local = jacobian.transpose() * DVector::from_column_slice(&d[row..row + m]);
            term.scatter_add(&local, &mut out);
            row += m;
        }
        for term in &self.inequality_constraints {
            let m = term.function.output_dimension();
            let input = term.gather(x);
            let h = term.function.call(&input)?;
            let mut masked = DVector::from_column_slice(&d[row..row + m]);
            for i in 0..m { if h[i] <= 0.0 { masked[i] = 0.0; } }
            if masked.iter().any(|v| *v != 0.0) {
                let jacobian = term.function.derivative(&input)?;
                term.scatter_add(&(jacobian.transpose() * masked), &mut out);
            }
            row += m;
        }
        Ok(out)
    }
    pub fn print_summary(&self) {
        trajopt_print(&format!("Optimization problem with {} variables in {} blocks", self.num_variables(), self.blocks.len()), PrintMode::Println, PrintColor::Blue, true);
        for b in &self.blocks {
            trajopt_print(&format!("   {} -- offset {}, dim {}", b.name, b.offset, b.dim), PrintMode::Println, PrintColor::None, false);
        }
        trajopt_print(&format!("   {} cost terms, {} equality rows, {} inequality rows", self.num_cost_terms(), self.num_equality_constraints(), self.num_inequality_constraints()), PrintMode::Println, PrintColor::None, false);
    }

    fn new_term(&self, function: Box<dyn ProblemFunction + 'a>, blocks: &[&VariableBlock]) -> Result<ProblemTerm<'a>, TrajoptError> {
        for b in blocks { self.check_block(b)?; }
        let input_dim: usize = blocks.iter().map(|b| b.dim).sum();
        check_dimension(&format!("input of {}", function.name()), function.input_dimension(), input_dim, file!(), line!())?;
        Ok(ProblemTerm { function, blocks: blocks.iter().map(|b| (*b).clone()).collect() })
    }
    fn check_block(&self, block: &VariableBlock) -> Result<(), TrajoptError> {
        return match self.blocks.get(block.idx) {
            Some(b) if b == block => { Ok(()) }
            _ => { Err(TrajoptError::new_generic_error_str(&format!("variable block {} does not belong to this problem.", block.name), file!(), line!())) }
        }
    }
    fn check_input(&self, x: &[f64]) -> Result<(), TrajoptError> {
        check_dimension("decision vector", self.num_variables(), x.len(), file!(), line!())
    }
    fn stack_values(terms: &Vec<ProblemTerm<'a>>, x: &[f64], total: usize) -> Result<DVector<f64>, TrajoptError> {
        let mut out = DVector::zeros(total);
        let mut row = 0;
        for term in terms {
            let val = term.function.call(&term.gather(x))?;
            out.rows_mut(row, val.len()).copy_from(&val);
            row += val.len();
        }
        Ok(out)
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////

/// Solver outcome.  Anything but `Converged` still comes with the last iterate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SolveStatus {
    Converged,
    NotConvergedIterations,
    NotConvergedOutOfTime,
    NumericalFailure
}
impl From<ExitStatus> for SolveStatus {
    fn from(e: ExitStatus) -> Self {
        return match e {
            ExitStatus::Converged => { SolveStatus::Converged }
            ExitStatus::NotConvergedIterations => { SolveStatus::NotConvergedIterations }
            ExitStatus::NotConvergedOutOfTime => { SolveStatus::NotConvergedOutOfTime }
        }
    }
}

#[derive(Clone, Debug)]
pub struct OptimizerResult {
    x_min: DVector<f64>,
    status: SolveStatus,
    num_outer_iterations: usize,
    num_inner_iterations: usize,
    num_cost_evaluations: usize,
    solve_time: Duration,
    cost: f64,
    constraint_violation: f64,
    failure_message: Option<String>
}
impl OptimizerResult {
    pub fn x_min(&self) -> &DVector<f64> {
        &self.x_min
    }
    pub fn status(&self) -> SolveStatus {
        self.status
    }
    pub fn converged(&self) -> bool {
        self.status == SolveStatus::Converged
    }
    pub fn num_outer_iterations(&self) -> usize {
        self.num_outer_iterations
    }
    pub fn num_inner_iterations(&self) -> usize {
        self.num_inner_iterations
    }
    pub fn num_cost_evaluations(&self) -> usize {
        self.num_cost_evaluations
    }
    pub fn solve_time(&self) -> Duration {
        self.solve_time
    }
    pub fn cost(&self) -> f64 {
        self.cost
    }
    pub fn constraint_violation(&self) -> f64 {
        self.constraint_violation
    }
    /// Error raised by a problem function during the solve, if any.
    pub fn failure_message(&self) -> Option<&String> {
        self.failure_message.as_ref()
    }
    /// One line description of a non-converged solve.
    pub fn diagnostic(&self) -> Option<String> {
        if self.converged() { return None; }
        let mut s = format!("solver stopped with status {:?} after {} outer / {} inner iterations (cost {:.6e}, constraint violation {:.3e})", self.status, self.num_outer_iterations, self.num_inner_iterations, self.cost, self.constraint_violation);
        if let Some(m) = &self.failure_message { s += &format!(": {}", m); }
        Some(s)
    }
    pub fn print_summary(&self) {
        let color = if self.converged() { PrintColor::Green } else { PrintColor::Yellow };
        trajopt_print(&format!("Solve status: {:?}", self.status), PrintMode::Println, color, true);
        trajopt_print(&format!("   cost: {:.6e}", self.cost), PrintMode::Println, PrintColor::None, false);
        trajopt_print(&format!("   constraint violation: {:.3e}", self.constraint_violation), PrintMode::Println, PrintColor::None, false);
        trajopt_print(&format!("   iterations: {} outer, {} inner, {} cost evaluations", self.num_outer_iterations, self.num_inner_iterations, self.num_cost_evaluations), PrintMode::Println, PrintColor::None, false);
        trajopt_print(&format!("   solve time: {:?}", self.solve_time), PrintMode::Println, PrintColor::None, false);
        if let Some(m) = &self.failure_message {
            trajopt_print(&format!("   failure: {}", m), PrintMode::Println, PrintColor::Red, false);
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OptimizerParameters {
    max_time: Option<Duration>,
    max_iterations: Option<usize>,
    max_outer_iterations: Option<usize>,
    open_tolerance: f64,
    constraint_tolerance: f64,
    initial_inner_tolerance: f64,
    initial_penalty: f64,
    penalty_update_factor: f64,
    lbfgs_memory: usize
}
impl OptimizerParameters {
    pub fn new_empty() -> Self {
        Self::default()
    }
    pub fn set_max_time(&mut self, max_time: Duration) {
        self.max_time = Some(max_time);
    }
    /// Inner (PANOC) iteration limit.
    pub fn set_max_iterations(&mut self, max_iterations: usize) {
        self.max_iterations = Some(max_iterations);
    }
    /// Outer augmented Lagrangian iteration limit.
    pub fn set_max_outer_iterations(&mut self, max_outer_iterations: usize) {
        self.max_outer_iterations = Some(max_outer_iterations);
    }
    pub fn set_open_tolerance(&mut self, tolerance: f64) {
        self.open_tolerance = tolerance;
    }
    /// Required `‖[g; max(0, h)]‖` at convergence.
    pub fn set_constraint_tolerance(&mut self, tolerance: f64) {
        self.constraint_tolerance = tolerance;
    }
    pub fn set_initial_inner_tolerance(&mut self, tolerance: f64) {
        self.initial_inner_tolerance = tolerance;
    }
    pub fn set_initial_penalty(&mut self, penalty: f64) {
        self.initial_penalty = penalty;
    }
    pub fn set_penalty_update_factor(&mut self, factor: f64) {
        self.penalty_update_factor = factor;
    }
    pub fn set_lbfgs_memory(&mut self, memory: usize) {
        self.lbfgs_memory = memory;
    }
    pub fn max_time(&self) -> Option<Duration> {
        self.max_time
    }
    pub fn max_iterations(&self) -> Option<usize> {
        self.max_iterations
    }
    pub fn max_outer_iterations(&self) -> Option<usize> {
        self.max_outer_iterations
    }
    pub fn open_tolerance(&self) -> f64 {
        self.open_tolerance
    }
    pub fn constraint_tolerance(&self) -> f64 {
        self.constraint_tolerance
    }
    fn validate(&self) -> Result<(), TrajoptError> {
        let positive = self.open_tolerance > 0.0 && self.constraint_tolerance > 0.0 && self.initial_inner_tolerance > 0.0 && self.initial_penalty > 0.0;
        if !positive || !(self.penalty_update_factor > 1.0) || self.lbfgs_memory == 0 {
            return Err(TrajoptError::new_generic_error_str(&format!("invalid optimizer parameters {:?}.", self), file!(), line!()));
        }
        if self.max_iterations == Some(0) || self.max_outer_iterations == Some(0) {
            return Err(TrajoptError::new_generic_error_str("iteration limits must be positive.", file!(), line!()));
        }
        Ok(())
    }
}
impl Default for OptimizerParameters {
    fn default() -> Self {
        Self {
            max_time: None,
            max_iterations: Some(2000),
            max_outer_iterations: Some(50),
            open_tolerance: 0.00001,
            constraint_tolerance: 0.00001,
            initial_inner_tolerance: 0.01,
            initial_penalty: 10.0,
            penalty_update_factor: 5.0,
            lbfgs_memory: 10
        }
    }
}

/// Callback invoked with the evaluation count and the candidate decision vector every time the
/// solver evaluates the cost.
pub type OptimizerCallback<'c> = &'c mut dyn FnMut(usize, &[f64]);

/// OpEn seeds PANOC with a Lipschitz estimate of the gradient taken along the step
/// `h_i = max(1e-12, 1e-6 u_i)`.  The solver iterates on `u = x - x_0 + SOLVER_COORDINATE_OFFSET`
/// so that step stays near the finite-difference step instead of at round-off level when the
/// initial guess is mostly zero.
const SOLVER_COORDINATE_OFFSET: f64 = 1.0;

/// Shared state of the solver closures.  The closures only hold a reference to this so they can be
/// copied into the PANOC and ALM problem structs.  Solver-side vectors `u` map to decision vectors
/// through `x = u + origin`.
struct EvaluationContext<'p, 'a, 'c> {
    problem: &'p OptimizationProblem<'a>,
    origin: Vec<f64>,
    callback: Mutex<Option<OptimizerCallback<'c>>>,
    num_evaluations: Mutex<usize>,
    failure: Mutex<Option<TrajoptError>>,
    debug: TrajoptDebug
}
impl<'p, 'a, 'c> EvaluationContext<'p, 'a, 'c> {
    fn new(problem: &'p OptimizationProblem<'a>, init_condition: &[f64], callback: Option<OptimizerCallback<'c>>, debug: TrajoptDebug) -> Self {
        let origin = init_condition.iter().map(|x| x - SOLVER_COORDINATE_OFFSET).collect();
        Self { problem, origin, callback: Mutex::new(callback), num_evaluations: Mutex::new(0), failure: Mutex::new(None), debug }
    }
    fn to_problem(&self, u: &[f64]) -> Vec<f64> {
        u.iter().zip(self.origin.iter()).map(|(u, o)| u + o).collect()
    }
    fn to_solver(&self, x: &[f64]) -> Vec<f64> {
        x.iter().zip(self.origin.iter()).map(|(x, o)| x - o).collect()
    }
    fn record(&self, e: TrajoptError) -> SolverError {
        if let Ok(mut f) = self.failure.lock() {
            if f.is_none() { *f = Some(e); }
        }
        SolverError::Cost
    }
    fn cost(&self, u: &[f64], cost: &mut f64) -> Result<(), SolverError> {
        let x = self.to_problem(u);
        *cost = self.problem.cost(&x).map_err(|e| self.record(e))?;
        let count = match self.num_evaluations.lock() {
            Ok(mut n) => { *n += 1; *n }
            Err(_) => { 0 }
        };
        if self.debug.should_print(count) {
            trajopt_print(&format!("   evaluation {}: cost {:.6e}", count, *cost), PrintMode::Println, PrintColor::Cyan, false);
        }
        if let Ok(mut guard) = self.callback.lock() {
            if let Some(callback) = guard.as_mut() { (*callback)(count, &x); }
        }
        Ok(())
    }
    fn gradient(&self, u: &[f64], grad: &mut [f64]) -> Result<(), SolverError> {
        let g = self.problem.gradient(&self.to_problem(u)).map_err(|e| self.record(e))?;
        grad.copy_from_slice(g.as_slice());
        Ok(())
    }
    fn penalty_mapping(&self, u: &[f64], out: &mut [f64]) -> Result<(), SolverError> {
        let f2 = self.problem.penalty_mapping(&self.to_problem(u)).map_err(|e| self.record(e))?;
        out.copy_from_slice(f2.as_slice());
        Ok(())
    }
    fn penalty_jacobian_product(&self, u: &[f64], d: &[f64], out: &mut [f64]) -> Result<(), SolverError> {
        let p = self.problem.penalty_mapping_jacobian_transpose_product(&self.to_problem(u), d).map_err(|e| self.record(e))?;
        out.copy_from_slice(p.as_slice());
        Ok(())
    }
    fn num_evaluations(&self) -> usize {
        self.num_evaluations.lock().map(|n| *n).unwrap_or(0)
    }
    fn take_failure(&self) -> Option<TrajoptError> {
        self.failure.lock().ok().and_then(|mut f| f.take())
    }
}

/// Solves an `OptimizationProblem` with Optimization Engine: PANOC when only box bounds are
/// present, the augmented Lagrangian method (PANOC inner solves) otherwise.  Equality and
/// inequality constraints enter the augmented Lagrangian through the penalty mapping
/// `[g(x); max(0, h(x))]`.
#[derive(Clone, Debug)]
pub struct NonlinearOptimizer {
    parameters: OptimizerParameters,
    debug: TrajoptDebug
}
impl NonlinearOptimizer {
    pub fn new(parameters: OptimizerParameters, debug: TrajoptDebug) -> Self {
        Self { parameters, debug }
    }
    pub fn parameters(&self) -> &OptimizerParameters {
        &self.parameters
    }
    pub fn optimize(&self, problem: &OptimizationProblem, callback: Option<OptimizerCallback>) -> Result<OptimizerResult, TrajoptError> {
        self.optimize_from(problem, problem.initial_guess(), callback)
    }
    pub fn optimize_from(&self, problem: &OptimizationProblem, init_condition: &[f64], callback: Option<OptimizerCallback>) -> Result<OptimizerResult, TrajoptError> {
        self.parameters.validate()?;
        if problem.num_variables() == 0 {
            return Err(TrajoptError::new_unsupported_operation_error("optimize", "The problem has no decision variables.", file!(), line!()));
        }
        check_dimension("initial condition", problem.num_variables(), init_condition.len(), file!(), line!())?;
        let ctx = EvaluationContext::new(problem, init_condition, callback, self.debug.clone());
        return if problem.has_constraints() {
            Ok(self.optimize_alm(problem, init_condition, &ctx))
        } else {
            Ok(self.optimize_panoc(problem, init_condition, &ctx))
        }
    }
    fn optimize_panoc(&self, problem: &OptimizationProblem, init_condition: &[f64], ctx: &EvaluationContext) -> OptimizerResult {
        let start = instant::Instant::now();
        let mut panoc_cache = PANOCCache::new(problem.num_variables(), self.parameters.open_tolerance, self.parameters.lbfgs_memory);

        let df = |u: &[f64], grad: &mut [f64]| -> Result<(), SolverError> { ctx.gradient(u, grad) };
        let f = |u: &[f64], cost: &mut f64| -> Result<(), SolverError> { ctx.cost(u, cost) };

        let lower = ctx.to_solver(problem.lower_bounds());
        let upper = ctx.to_solver(problem.upper_bounds());
        let bounds = constraints::Rectangle::new(Some(&lower), Some(&upper));
        let open_problem = Problem::new(&bounds, df, f);

        let mut panoc = PANOCOptimizer::new(open_problem, &mut panoc_cache).with_tolerance(self.parameters.open_tolerance);
        if let Some(a) = self.parameters.max_time { panoc = panoc.with_max_duration(a); }
        if let Some(a) = self.parameters.max_iterations { panoc = panoc.with_max_iter(a); }

        let mut u = ctx.to_solver(init_condition);
        return match panoc.solve(&mut u) {
            Ok(status) => {
                self.finish(problem, ctx, u, status.exit_status().into(), 0, status.iterations(), status.solve_time(), Some(status.cost_value()))
            }
            Err(e) => {
                self.finish(problem, ctx, u, SolveStatus::NumericalFailure, 0, 0, start.elapsed(), None).with_solver_error(e)
            }
        }
    }
    fn optimize_alm(&self, problem: &OptimizationProblem, init_condition: &[f64], ctx: &EvaluationContext) -> OptimizerResult {
        let start = instant::Instant::now();
        let n2 = problem.num_equality_constraints() + problem.num_inequality_constraints();
        let panoc_cache = PANOCCache::new(problem.num_variables(), self.parameters.open_tolerance, self.parameters.lbfgs_memory);
        let mut alm_cache = AlmCache::new(panoc_cache, 0, n2);

        let lower = ctx.to_solver(problem.lower_bounds());
        let upper = ctx.to_solver(problem.upper_bounds());
        let bounds = constraints::Rectangle::new(Some(&lower), Some(&upper));

        let df = |u: &[f64], grad: &mut [f64]| -> Result<(), SolverError> { ctx.gradient(u, grad) };
        let f = |u: &[f64], cost: &mut f64| -> Result<(), SolverError> { ctx.cost(u, cost) };
        let f2 = |u: &[f64], f2u: &mut [f64]| -> Result<(), SolverError> { ctx.penalty_mapping(u, f2u) };
        // d has the length of the output of f2
        let f2_jacobian_product = |u: &[f64], d: &[f64], res: &mut [f64]| -> Result<(), SolverError> { ctx.penalty_jacobian_product(u, d, res) };

        let factory = AlmFactory::new(
            f,
            df,
            NO_MAPPING,
            NO_JACOBIAN_MAPPING,
            Some(f2),
            Some(f2_jacobian_product),
            NO_SET,
            n2
        );

        let alm_problem = AlmProblem::new(
            bounds,
            NO_SET,
            NO_SET,
            |u: &[f64], xi: &[f64], cost: &mut f64| -> Result<(), SolverError> {
                factory.psi(u, xi, cost)
            },
            |u: &[f64], xi: &[f64], grad: &mut [f64]| -> Result<(), SolverError> {
                factory.d_psi(u, xi, grad)
            },
            NO_MAPPING,
            Some(f2),
            0,
            n2
        );

        let epsilon = self.parameters.open_tolerance;
        let mut alm_optimizer = AlmOptimizer::new(&mut alm_cache, alm_problem)
            .with_delta_tolerance(self.parameters.constraint_tolerance)
            .with_epsilon_tolerance(epsilon)
            .with_initial_inner_tolerance(self.parameters.initial_inner_tolerance.max(epsilon))
            .with_initial_penalty(self.parameters.initial_penalty)
            .with_penalty_update_factor(self.parameters.penalty_update_factor);
        if let Some(a) = self.parameters.max_time { alm_optimizer = alm_optimizer.with_max_duration(a); }
        if let Some(a) = self.parameters.max_iterations { alm_optimizer = alm_optimizer.with_max_inner_iterations(a); }
        if let Some(a) = self.parameters.max_outer_iterations { alm_optimizer = alm_optimizer.with_max_outer_iterations(a); }

        let mut u = ctx.to_solver(init_condition);
        return match alm_optimizer.solve(&mut u) {
            Ok(r) => {
                self.finish(problem, ctx, u, r.exit_status().into(), r.num_outer_iterations(), r.num_inner_iterations(), r.solve_time(), None)
            }
            Err(e) => {
                self.finish(problem, ctx, u, SolveStatus::NumericalFailure, 0, 0, start.elapsed(), None).with_solver_error(e)
            }
        }
    }
    fn finish(&self, problem: &OptimizationProblem, ctx: &EvaluationContext, u: Vec<f64>, status: SolveStatus, num_outer_iterations: usize, num_inner_iterations: usize, solve_time: Duration, cost: Option<f64>) -> OptimizerResult {
        let x = ctx.to_problem(&u);
        let cost = match cost {
            Some(c) => { c }
            None => { problem.cost(&x).unwrap_or(f64::NAN) }
        };
        let constraint_violation = problem.constraint_violation(&x).unwrap_or(f64::NAN);
        let failure = ctx.take_failure();
        let status = if failure.is_some() {
            SolveStatus::NumericalFailure
        } else if status == SolveStatus::Converged && num_inner_iterations == 0 && !self.is_stationary(problem, &x, constraint_violation) {
            // the solver stopped before its first step
            SolveStatus::NotConvergedIterations
        } else {
            status
        };
        OptimizerResult {
            x_min: DVector::from_vec(x),
            status,
            num_outer_iterations,
            num_inner_iterations,
            num_cost_evaluations: ctx.num_evaluations(),
            solve_time,
            cost,
            constraint_violation,
            failure_message: failure.map(|e| e.to_string())
        }
    }
    /// A point counts as a solution without any solver step only if it is feasible and the
    /// projected cost gradient vanishes there.
    fn is_stationary(&self, problem: &OptimizationProblem, x: &[f64], constraint_violation: f64) -> bool {
        if !(constraint_violation <= self.parameters.constraint_tolerance) { return false; }
        return match problem.projected_gradient_residual(x) {
            Ok(r) => { r <= self.parameters.open_tolerance.sqrt() }
            Err(_) => { false }
        }
    }
}

impl OptimizerResult {
    fn with_solver_error(mut self, e: SolverError) -> Self {
        self.status = SolveStatus::NumericalFailure;
        if self.failure_message.is_none() { self.failure_message = Some(format!("{:?}", e)); }
        self
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use nalgebra::DMatrix;
    use crate::problem_functions::standard_functions::{AffineResidual, FunctionFromClosure, WeightedSumOfSquares};
    use crate::utils::utils_errors::TrajoptError;
    use super::*;

    fn optimizer() -> NonlinearOptimizer {
        NonlinearOptimizer::new(OptimizerParameters::default(), TrajoptDebug::False)
    }

    #[test]
    fn unconstrained_least_squares() {
        let mut problem = OptimizationProblem::new();
        let x = problem.add_variable("x", 2);
        problem.add_squared_residual_cost(Box::new(AffineResidual::new_offset(&DVector::from_vec(vec![1.0, -2.0]))), &[&x], 1.0).unwrap();
        let result = optimizer().optimize(&problem, None).unwrap();
        assert!(result.converged());
        assert_abs_diff_eq!(result.x_min()[0], 1.0, epsilon = 1e-3);
        assert_abs_diff_eq!(result.x_min()[1], -2.0, epsilon = 1e-3);
    }

    #[test]
    fn box_bounds_are_respected() {
        let mut problem = OptimizationProblem::new();
        let x = problem.add_variable("x", 1);
        problem.set_bounds(&x, &[-1.0], &[1.0]).unwrap();
        problem.add_squared_residual_cost(Box::new(AffineResidual::new_offset(&DVector::from_element(1, 3.0))), &[&x], 1.0).unwrap();
        let result = optimizer().optimize(&problem, None).unwrap();
        assert_abs_diff_eq!(result.x_min()[0], 1.0, epsilon = 1e-6);
    }

    #[test]
    fn equality_constrained_projection() {
        // min x² + y² s.t. x + y = 1
        let mut problem = OptimizationProblem::new();
        let x = problem.add_variable("x", 1);
        let y = problem.add_variable("y", 1);
        problem.add_cost(Box::new(WeightedSumOfSquares::new_squared_norm(2)), &[&x, &y], 1.0).unwrap();
        let line = AffineResidual::new(DMatrix::from_row_slice(1, 2, &[1.0, 1.0]), DVector::from_element(1, 1.0)).unwrap();
        problem.add_equality_constraint(Box::new(line), &[&x, &y]).unwrap();
        let result = optimizer().optimize(&problem, None).unwrap();
        assert_abs_diff_eq!(result.x_min()[0], 0.5, epsilon = 1e-3);
        assert_abs_diff_eq!(result.x_min()[1], 0.5, epsilon = 1e-3);
        assert!(result.constraint_violation() < 1e-3);
    }

    #[test]
    fn inequality_constraint_becomes_active() {
        // min (x - 2)² s.t. x - 1 ≤ 0
        let mut problem = OptimizationProblem::new();
        let x = problem.add_variable("x", 1);
        problem.add_squared_residual_cost(Box::new(AffineResidual::new_offset(&DVector::from_element(1, 2.0))), &[&x], 1.0).unwrap();
        problem.add_inequality_constraint(Box::new(AffineResidual::new_offset(&DVector::from_element(1, 1.0))), &[&x]).unwrap();
        let result = optimizer().optimize(&problem, None).unwrap();
        assert_abs_diff_eq!(result.x_min()[0], 1.0, epsilon = 1e-3);
    }

    #[test]
    fn inactive_inequality_does_not_move_the_solution() {
        let mut problem = OptimizationProblem::new();
        let x = problem.add_variable("x", 1);
        problem.add_squared_residual_cost(Box::new(AffineResidual::new_offset(&DVector::from_element(1, 0.5))), &[&x], 1.0).unwrap();
        problem.add_inequality_constraint(Box::new(AffineResidual::new_offset(&DVector::from_element(1, 1.0))), &[&x]).unwrap();
        let result = optimizer().optimize(&problem, None).unwrap();
        assert_abs_diff_eq!(result.x_min()[0], 0.5, epsilon = 1e-3);
        assert_abs_diff_eq!(result.constraint_violation(), 0.0);
    }

    #[test]
    fn callback_sees_every_cost_evaluation() {
        let mut problem = OptimizationProblem::new();
        let x = problem.add_variable("x", 3);
        problem.add_squared_residual_cost(Box::new(AffineResidual::new_offset(&DVector::from_vec(vec![1.0, 2.0, 3.0]))), &[&x], 1.0).unwrap();
        let mut calls = 0;
        let mut last = vec![];
        let mut callback = |count: usize, u: &[f64]| { calls = count; last = u.to_vec(); };
        let result = optimizer().optimize(&problem, Some(&mut callback)).unwrap();
        assert!(calls > 0);
        assert_eq!(calls, result.num_cost_evaluations());
        assert_eq!(last.len(), 3);
    }

    #[test]
    fn penalty_mapping_jacobian_matches_finite_differences() {
        let mut problem = OptimizationProblem::new();
        let a = problem.add_variable("a", 2);
        let b = problem.add_variable("b", 1);
        let quad = FunctionFromClosure::new("quad", 2, 1, Box::new(|u: &[f64]| Ok::<_, TrajoptError>(DVector::from_element(1, u[0] * u[0] + u[1] - 0.5))), None);
        problem.add_equality_constraint(Box::new(quad), &[&a]).unwrap();
        let diff = AffineResidual::new(DMatrix::from_row_slice(1, 3, &[1.0, -1.0, 0.0]), DVector::zeros(1)).unwrap();
        problem.add_inequality_constraint(Box::new(diff), &[&b, &a]).unwrap();

        let x = [0.3, 0.2, 0.9];
        let d = [0.7, -1.3];
        let product = problem.penalty_mapping_jacobian_transpose_product(&x, &d).unwrap();
        let eps = 1e-6;
        for i in 0..3 {
            let mut xp = x.to_vec();
            let mut xm = x.to_vec();
            xp[i] += eps;
            xm[i] -= eps;
            let fp = problem.penalty_mapping(&xp).unwrap();
            let fm = problem.penalty_mapping(&xm).unwrap();
            let column = (fp - fm) / (2.0 * eps);
            let expected = column[0] * d[0] + column[1] * d[1];
            assert_abs_diff_eq!(product[i], expected, epsilon = 1e-6);
        }
        // x_b - x_a0 = 0.6 > 0 is active
        assert_abs_diff_eq!(problem.constraint_violation(&x).unwrap(), 0.6, epsilon = 1e-12);
    }

    #[test]
    fn mismatched_blocks_are_rejected() {
        let mut problem = OptimizationProblem::new();
        let x = problem.add_variable("x", 2);
        assert!(problem.add_squared_residual_cost(Box::new(WeightedSumOfSquares::new_squared_norm(3)), &[&x], 1.0).is_err());
        assert!(problem.add_cost(Box::new(AffineResidual::new_offset(&DVector::zeros(2))), &[&x], 1.0).is_err());
        assert!(problem.set_bounds(&x, &[1.0, 0.0], &[0.0, 1.0]).is_err());
        assert!(problem.set_initial_guess(&x, &[1.0]).is_err());
        let mut other = OptimizationProblem::new();
        let y = other.add_variable("y", 5);
        assert!(problem.set_initial_guess(&y, &[0.0; 5]).is_err());
        assert!(problem.cost(&[0.0]).is_err());
    }

    #[test]
    fn failing_function_reports_numerical_failure() {
        let mut problem = OptimizationProblem::new();
        let x = problem.add_variable("x", 1);
        let f = FunctionFromClosure::new("broken", 1, 1, Box::new(|u: &[f64]| {
            if u[0] > 0.5 { Err(TrajoptError::new_generic_error_str("out of domain", file!(), line!())) } else { Ok(DVector::from_element(1, u[0] - 2.0)) }
        }), None);
        problem.add_squared_residual_cost(Box::new(f), &[&x], 1.0).unwrap();
        let result = optimizer().optimize(&problem, None).unwrap();
        assert_eq!(result.status(), SolveStatus::NumericalFailure);
        assert!(result.failure_message().is_some());
        assert!(result.diagnostic().is_some());
        assert_eq!(result.x_min().len(), 1);
    }

    #[test]
    fn zero_start_with_finite_difference_jacobians_makes_progress() {
        // r(x) = [x0 - 1, x1 - 2, x0 x1 - 2] subject to x2 = x0, no closed-form Jacobians
        let mut problem = OptimizationProblem::new();
        let x = problem.add_variable("x", 3);
        let residual = FunctionFromClosure::new("residual", 3, 3, Box::new(|u: &[f64]| {
            Ok::<_, TrajoptError>(DVector::from_vec(vec![u[0] - 1.0, u[1] - 2.0, u[0] * u[1] - 2.0]))
        }), None);
        problem.add_squared_residual_cost(Box::new(residual), &[&x], 1.0).unwrap();
        let tie = FunctionFromClosure::new("tie", 3, 1, Box::new(|u: &[f64]| Ok::<_, TrajoptError>(DVector::from_element(1, u[2] - u[0]))), None);
        problem.add_equality_constraint(Box::new(tie), &[&x]).unwrap();
        let initial_cost = problem.cost(problem.initial_guess()).unwrap();

        let result = optimizer().optimize(&problem, None).unwrap();
        assert!(result.num_inner_iterations() > 0);
        assert!(result.cost() < 0.01 * initial_cost);
        assert_eq!(result.status(), SolveStatus::Converged);
        assert_abs_diff_eq!(result.x_min()[0], 1.0, epsilon = 1e-2);
        assert_abs_diff_eq!(result.x_min()[1], 2.0, epsilon = 1e-2);
        assert_abs_diff_eq!(result.x_min()[2], result.x_min()[0], epsilon = 1e-3);
    }

    #[test]
    fn projected_gradient_residual_vanishes_only_at_stationary_points() {
        let mut problem = OptimizationProblem::new();
        let x = problem.add_variable("x", 1);
        problem.add_squared_residual_cost(Box::new(AffineResidual::new_offset(&DVector::from_element(1, 1.0))), &[&x], 1.0).unwrap();
        assert_abs_diff_eq!(problem.projected_gradient_residual(&[0.0]).unwrap(), 2.0, epsilon = 1e-6);
        assert_abs_diff_eq!(problem.projected_gradient_residual(&[1.0]).unwrap(), 0.0, epsilon = 1e-6);
        problem.set_bounds(&x, &[-1.0], &[0.5]).unwrap();
        // the bound blocks the descent direction
        assert_abs_diff_eq!(problem.projected_gradient_residual(&[0.5]).unwrap(), 0.0, epsilon = 1e-6);
    }

    #[test]
    fn starting_at_the_minimizer_is_reported_converged() {
        let mut problem = OptimizationProblem::new();
        let x = problem.add_variable("x", 2);
        problem.add_squared_residual_cost(Box::new(AffineResidual::new_offset(&DVector::from_vec(vec![1.0, -2.0]))), &[&x], 1.0).unwrap();
        problem.set_initial_guess(&x, &[1.0, -2.0]).unwrap();
        let result = optimizer().optimize(&problem, None).unwrap();
        assert_eq!(result.status(), SolveStatus::Converged);
        assert_abs_diff_eq!(result.x_min()[0], 1.0, epsilon = 1e-9);
        assert_abs_diff_eq!(result.x_min()[1], -2.0, epsilon = 1e-9);
    }

    #[test]
    fn parameters_round_trip_through_json() {
        let mut p = OptimizerParameters::default();
        p.set_max_time(Duration::from_millis(250));
        p.set_max_outer_iterations(7);
        let s = serde_json::to_string(&p).unwrap();
        let back: OptimizerParameters = serde_json::from_str(&s).unwrap();
        assert_eq!(p, back);
    }
}
