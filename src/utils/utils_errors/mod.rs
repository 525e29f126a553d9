use std::fmt;

/// A common error type returned by functions throughout the toolbox.
#[derive(Clone, Debug, PartialEq)]
pub enum TrajoptError {
    GenericError(String),
    IdxOutOfBoundError(String),
    DimensionMismatchError(String),
    UnsupportedOperationError(String),
    SolverError(String)
}
impl TrajoptError {
    pub fn new_generic_error_str(s: &str, file: &str, line: u32) -> Self {
        let s = format!("ERROR: {} -- File: {}, Line: {}", s, file, line);
        return Self::GenericError(s);
    }
    pub fn new_idx_out_of_bound_error(given_idx: usize, length_of_array: usize, file: &str, line: u32) -> Self {
        let s = format!("ERROR: Index {:?} is too large for the array of length {:?} -- File: {}, Line: {}", given_idx, length_of_array, file, line);
        return Self::IdxOutOfBoundError(s)
    }
    pub fn new_dimension_mismatch_error(what: &str, expected: usize, given: usize, file: &str, line: u32) -> Self {
        let s = format!("ERROR: Dimension mismatch for {}.  Expected {:?}, got {:?} -- File: {}, Line: {}", what, expected, given, file, line);
        return Self::DimensionMismatchError(s);
    }
    pub fn new_unsupported_operation_error(function_name: &str, message: &str, file: &str, line: u32) -> Self {
        let s = format!("ERROR: Unsupported operation error in function {}.  {} -- File: {}, Line: {}", function_name, message, file, line);
        return Self::UnsupportedOperationError(s);
    }
    pub fn new_solver_error(message: &str, file: &str, line: u32) -> Self {
        let s = format!("ERROR: Solver error.  {} -- File: {}, Line: {}", message, file, line);
        return Self::SolverError(s);
    }
    pub fn message(&self) -> &str {
        return match self {
            TrajoptError::GenericError(s) => { s }
            TrajoptError::IdxOutOfBoundError(s) => { s }
            TrajoptError::DimensionMismatchError(s) => { s }
            TrajoptError::UnsupportedOperationError(s) => { s }
            TrajoptError::SolverError(s) => { s }
        }
    }
}
impl fmt::Display for TrajoptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message())
    }
}
impl std::error::Error for TrajoptError { }

/// Returns an error if `given` does not equal `expected`.
pub fn check_dimension(what: &str, expected: usize, given: usize, file: &str, line: u32) -> Result<(), TrajoptError> {
    if expected != given {
        return Err(TrajoptError::new_dimension_mismatch_error(what, expected, given, file, line));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dimension_check_reports_both_sizes() {
        let err = check_dimension("q", 7, 6, file!(), line!()).unwrap_err();
        match &err {
            TrajoptError::DimensionMismatchError(s) => {
                assert!(s.contains("Expected 7"));
                assert!(s.contains("got 6"));
            }
            _ => { panic!("wrong variant: {:?}", err) }
        }
        assert!(check_dimension("q", 3, 3, file!(), line!()).is_ok());
    }
}
