use thiserror::Error;

/// Failures raised inside the core.
///
/// None of them escapes [`crate::Solver::solve`]: the solver folds them into the status and
/// message of the returned [`crate::Solution`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoverError {
    /// A structural precondition on the numeric parameters does not hold.
    #[error("invalid parameters: {0}")]
    InvalidParameters(String),
    /// An argument of a standalone operation is out of its domain.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// `next` was called on an exhausted combination iterator.
    #[error("no more combinations available")]
    Exhausted,
    /// An invariant of enumeration or indexing was broken.
    #[error("internal error: {0}")]
    Internal(String),
}

pub type CoverResult<T> = Result<T, CoverError>;
