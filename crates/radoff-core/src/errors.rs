use thiserror::Error;

/// Error type for failures while solving the offset history.
#[derive(Error, Debug)]
pub enum RadoffError {
    #[error("flux evaluation failed: {reason}")]
    Evaluation { reason: String },
    #[error("bisection did not converge after {iterations} iterations (flux residual {residual})")]
    NonConvergence { iterations: usize, residual: f64 },
    #[error("cannot split {rows} rows across {workers} workers without zero-width partitions")]
    Partition { rows: usize, workers: usize },
    #[error("run cancelled")]
    Cancelled,
}

impl RadoffError {
    pub fn evaluation(reason: impl Into<String>) -> Self {
        Self::Evaluation {
            reason: reason.into(),
        }
    }
}

/// Convenience type for `Result<T, RadoffError>`.
pub type RadoffResult<T> = Result<T, RadoffError>;
