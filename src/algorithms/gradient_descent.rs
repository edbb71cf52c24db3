use crate::algorithms::{Algorithm, Optimizer, Status};
use crate::error::{FactorizationError, Result};
use crate::routines::line_search::{backtrack, StepOutcome};
use crate::routines::linalg::{is_positive_definite, symmetrize, zero_diagonal};
use crate::routines::loss::{evaluate, loss};
use crate::routines::output::{FactorizationResult, Trace};
use crate::routines::settings::{GradientDescentConfig, LineSearch};
use crate::structs::workload::Workload;
use ndarray::Array2;

/// Projected gradient descent over unit-diagonal positive-definite matrices
///
/// Each iteration computes the analytic gradient, zeroes its diagonal so that
/// only off-diagonal entries move, takes an Armijo-backtracked step and
/// re-symmetrizes the iterate. The iteration budget is fixed; there is no
/// convergence test.
#[derive(Debug)]
pub struct GradientDescent<'a> {
    workload: &'a Workload,
    x: Array2<f64>,
    options: GradientDescentConfig,
    line_search: LineSearch,
    iteration: usize,
    status: Status,
    trace: Trace,
}

impl<'a> GradientDescent<'a> {
    pub fn new(
        workload: &'a Workload,
        initial: Array2<f64>,
        options: GradientDescentConfig,
        line_search: LineSearch,
    ) -> Result<Self> {
        if initial.dim() != (workload.dim(), workload.dim()) {
            return Err(FactorizationError::DimensionMismatch {
                expected: workload.dim(),
                found: initial.nrows(),
            });
        }
        if !is_positive_definite(&initial) {
            return Err(FactorizationError::invalid_candidate(
                "initial iterate for gradient descent",
            ));
        }
        Ok(Self {
            workload,
            x: initial,
            options,
            line_search,
            iteration: 0,
            status: Status::Starting,
            trace: Trace::new(),
        })
    }

    /// The current iterate
    pub fn x(&self) -> &Array2<f64> {
        &self.x
    }
}

impl<'a> Optimizer for GradientDescent<'a> {
    fn algorithm(&self) -> Algorithm {
        Algorithm::GradientDescent
    }

    fn iteration(&self) -> usize {
        self.iteration
    }

    fn status(&self) -> &Status {
        &self.status
    }

    fn set_status(&mut self, status: Status) {
        self.status = status;
    }

    fn trace(&self) -> &Trace {
        &self.trace
    }

    fn next_iteration(&mut self) -> Result<bool> {
        if self.iteration >= self.options.iterations {
            self.status = Status::MaxIterations;
            return Ok(true);
        }

        let gram = self.workload.gram();
        let eval = evaluate(gram, &self.x)?;
        self.trace.record(self.iteration, eval.loss());

        let mut grad = eval.gradient().clone();
        zero_diagonal(&mut grad);

        let next = if self.options.armijo {
            let direction = -&grad;
            let slope = -(&grad * &grad).sum();
            match backtrack(
                &self.line_search,
                gram,
                &self.x,
                eval.loss(),
                &direction,
                slope,
                self.options.step_size,
                self.iteration,
            )? {
                StepOutcome::Accepted { candidate, step, .. } => {
                    tracing::debug!("loss {:.6e}, step {:.1e}", eval.loss(), step);
                    candidate
                }
                StepOutcome::Stationary => self.x.clone(),
            }
        } else {
            &self.x - &(&grad * self.options.step_size)
        };

        self.x = symmetrize(&next);
        self.iteration += 1;

        if self.iteration >= self.options.iterations {
            self.status = Status::MaxIterations;
            return Ok(true);
        }
        Ok(false)
    }

    fn into_result(&self) -> Result<FactorizationResult> {
        let final_loss = loss(self.workload.gram(), &self.x)?;
        Ok(FactorizationResult::new(
            Algorithm::GradientDescent,
            self.status.clone(),
            self.iteration,
            final_loss,
            None,
            self.x.clone(),
            None,
            self.trace.clone(),
        ))
    }
}
