//! mfcore optimizes matrix-mechanism factorizations.
//!
//! Given a workload matrix `A` of linear queries, the crate searches for a
//! unit-diagonal positive-definite matrix `X` minimizing
//! `tr(AᵗA·X⁻¹)·max diag(X)`. Three optimizers are provided: projected
//! gradient descent, a fixed-point iteration on a vector parameterization, and
//! a Newton-direction method with an inner conjugate-gradient solve.
//!
//! The primary entrypoint is [entrypoints::fit], which reads its configuration
//! from a [routines::settings::Settings] value, see [routines::settings::read].

/// Provides the optimizers
pub mod algorithms;
/// Entrypoints for running and comparing optimizers
pub mod entrypoints;
/// Error types of the numerical core
pub mod error;
/// Linear algebra, loss, settings, logging and output routines
pub mod routines;
/// Data structures
pub mod structs;

/// A collection of commonly used items
pub mod prelude {
    pub use crate::algorithms::{
        dispatch_algorithm, Algorithm, FixedPoint, GradientDescent, Newton, Optimizer, Status,
    };
    pub use crate::entrypoints::{compare, compare_internal, fit, fit_internal, load_workload};
    pub use crate::error::FactorizationError;
    pub use crate::routines::initialization::{initial_matrix, initial_vector};
    pub use crate::routines::loss::{evaluate, loss, Evaluation};
    pub use crate::routines::output::{FactorizationResult, Trace, TraceSample};
    pub use crate::routines::phi::{phi, SqrtCache};
    pub use crate::routines::settings::*;
    pub use crate::structs::workload::Workload;
}
