use crate::error::Result;
use crate::routines::initialization::initial_matrix;
use crate::routines::output::{FactorizationResult, Trace};
use crate::routines::settings::Settings;
use crate::structs::workload::Workload;
use ndarray::Array1;
use serde::{Deserialize, Serialize};

pub mod fixed_point;
pub mod gradient_descent;
pub mod newton;

pub use fixed_point::FixedPoint;
pub use gradient_descent::GradientDescent;
pub use newton::{newton_residual, solve_newton_direction, Newton};

/// The available optimizers
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Algorithm {
    /// Projected gradient descent with Armijo backtracking
    GradientDescent,
    /// Fixed-point iteration on the dual vector
    FixedPoint,
    /// Newton directions from an inner conjugate-gradient solve
    Newton,
}

impl Algorithm {
    /// Short identifier, matching the configuration file spelling
    pub fn as_str(&self) -> &'static str {
        match self {
            Algorithm::GradientDescent => "gradient_descent",
            Algorithm::FixedPoint => "fixed_point",
            Algorithm::Newton => "newton",
        }
    }

    pub fn all() -> [Algorithm; 3] {
        [
            Algorithm::GradientDescent,
            Algorithm::FixedPoint,
            Algorithm::Newton,
        ]
    }
}

impl std::fmt::Display for Algorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Algorithm::GradientDescent => write!(f, "gradient descent"),
            Algorithm::FixedPoint => write!(f, "fixed point"),
            Algorithm::Newton => write!(f, "Newton"),
        }
    }
}

/// Represents the status of an optimizer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    /// Optimizer has been created but not run
    Starting,
    /// Optimizer is currently running
    InProgress,
    /// The tolerance was met
    Converged,
    /// The iteration budget was exhausted
    MaxIterations,
    /// Other status with custom message
    Other(String),
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Status::Starting => write!(f, "Starting"),
            Status::InProgress => write!(f, "In progress"),
            Status::Converged => write!(f, "Converged"),
            Status::MaxIterations => write!(f, "Maximum iterations reached"),
            Status::Other(msg) => write!(f, "{}", msg),
        }
    }
}

/// Common driver shared by all optimizers
///
/// Implementors provide a single iteration in [Optimizer::next_iteration]; the
/// default [Optimizer::fit] runs iterations until one reports completion.
pub trait Optimizer {
    fn algorithm(&self) -> Algorithm;
    /// Number of completed iterations
    fn iteration(&self) -> usize;
    fn status(&self) -> &Status;
    fn set_status(&mut self, status: Status);
    fn trace(&self) -> &Trace;
    /// Runs one iteration and returns `true` when the optimizer is done
    fn next_iteration(&mut self) -> Result<bool>;
    fn fit(&mut self) -> Result<FactorizationResult> {
        self.set_status(Status::InProgress);
        tracing::info!("Starting {} optimizer", self.algorithm());
        loop {
            let span = tracing::info_span!("", "{}", format!("Iteration {}", self.iteration() + 1));
            let _enter = span.enter();
            if self.next_iteration()? {
                break;
            }
        }
        let result = self.into_result()?;
        tracing::info!(
            "{} finished after {} iterations with loss {:.6} ({})",
            self.algorithm(),
            result.iterations(),
            result.loss(),
            result.status()
        );
        Ok(result)
    }

    #[allow(clippy::wrong_self_convention)]
    fn into_result(&self) -> Result<FactorizationResult>;
}

/// Builds the optimizer selected by `algorithm`, seeded from the initial vector `v0`
///
/// The fixed-point method starts from `v0` itself; the descent methods start from `Φ(A, v0)`.
pub fn dispatch_algorithm<'a>(
    algorithm: Algorithm,
    settings: &Settings,
    workload: &'a Workload,
    v0: &Array1<f64>,
) -> anyhow::Result<Box<dyn Optimizer + 'a>> {
    let optimizer: Box<dyn Optimizer + 'a> = match algorithm {
        Algorithm::GradientDescent => Box::new(GradientDescent::new(
            workload,
            initial_matrix(workload, v0, &settings.numerics)?,
            settings.gradient_descent.clone(),
            settings.line_search.clone(),
        )?),
        Algorithm::FixedPoint => Box::new(FixedPoint::new(
            workload,
            v0.clone(),
            settings.fixed_point.clone(),
            settings.numerics.clone(),
        )?),
        Algorithm::Newton => Box::new(Newton::new(
            workload,
            initial_matrix(workload, v0, &settings.numerics)?,
            settings.newton.clone(),
            settings.line_search.clone(),
        )?),
    };
    Ok(optimizer)
}
