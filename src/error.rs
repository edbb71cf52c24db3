//! Error types for the factorization optimizers.

use linfa_linalg::LinalgError;

/// Errors raised while evaluating or optimizing a factorization.
///
/// Failures are numerical rather than structural: well-scaled workloads are
/// expected to run without hitting any of them.
#[derive(Debug, thiserror::Error)]
pub enum FactorizationError {
    /// A candidate matrix reached loss or inverse evaluation without being positive definite.
    #[error("candidate matrix is not positive definite: {msg}")]
    InvalidCandidate {
        /// Where the candidate was rejected.
        msg: String,
    },

    /// Backtracking shrank the step below the configured floor without finding an acceptable step.
    #[error("line search stalled at iteration {iteration}: step {step:.3e} fell below the minimum step")]
    NumericalStall {
        /// Outer iteration at which the stall happened.
        iteration: usize,
        /// Last step size that was tried.
        step: f64,
    },

    /// A vector parameterization had a non-positive or non-finite entry.
    #[error("vector parameterization must be strictly positive: {msg}")]
    InvalidVector {
        /// Human-readable error description.
        msg: String,
    },

    /// A cached square root was used with a vector other than the one it was built for.
    #[error("square root cache was computed for a different vector")]
    CacheMismatch,

    /// Matrix or vector shapes do not agree.
    #[error("dimension mismatch: expected {expected}, found {found}")]
    DimensionMismatch {
        /// Expected dimension.
        expected: usize,
        /// Dimension that was supplied.
        found: usize,
    },

    /// Failure inside a dense linear-algebra kernel.
    #[error(transparent)]
    Linalg(#[from] LinalgError),
}

impl FactorizationError {
    /// Create an invalid candidate error.
    pub fn invalid_candidate<S: Into<String>>(msg: S) -> Self {
        Self::InvalidCandidate { msg: msg.into() }
    }

    /// Create an invalid vector error.
    pub fn invalid_vector<S: Into<String>>(msg: S) -> Self {
        Self::InvalidVector { msg: msg.into() }
    }
}

/// Result type for factorization operations.
pub type Result<T> = std::result::Result<T, FactorizationError>;
