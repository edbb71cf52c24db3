//! Bounded Armijo backtracking along a search direction.

use crate::error::{FactorizationError, Result};
use crate::routines::linalg::is_positive_definite;
use crate::routines::loss::loss;
use crate::routines::settings::LineSearch;
use ndarray::Array2;

/// Result of a backtracking search.
#[derive(Debug, Clone)]
pub enum StepOutcome {
    /// A feasible, sufficiently decreasing candidate was found.
    Accepted {
        candidate: Array2<f64>,
        loss: f64,
        step: f64,
    },
    /// The direction is not a descent direction to machine precision; the iterate is kept.
    Stationary,
}

/// Backtracks from `initial_step` along `direction` from `x`.
///
/// Trial candidates are `x + η·direction`. Each trial must pass an attempted
/// Cholesky factorization and the sufficient-decrease test
///
/// ```text
/// loss(candidate) ≤ loss0 + η·c·slope
/// ```
///
/// where `slope = ⟨gradient, direction⟩` and `c` is the configured
/// sufficient-decrease constant. The step is multiplied by the shrink factor
/// after every rejection. The search gives up with
/// [FactorizationError::NumericalStall] once the step falls below the minimum
/// step, stops being a positive finite number, or the trial budget runs out.
/// A step whose required decrease rounds away against `loss0` is never
/// accepted; the iterate is reported as [StepOutcome::Stationary] instead.
#[allow(clippy::too_many_arguments)]
pub fn backtrack(
    options: &LineSearch,
    gram: &Array2<f64>,
    x: &Array2<f64>,
    loss0: f64,
    direction: &Array2<f64>,
    slope: f64,
    initial_step: f64,
    iteration: usize,
) -> Result<StepOutcome> {
    if !(slope < -f64::EPSILON * loss0.abs()) {
        tracing::debug!(
            "Slope {:.3e} is not a descent direction at iteration {}, keeping iterate",
            slope,
            iteration
        );
        return Ok(StepOutcome::Stationary);
    }

    let mut step = initial_step;
    let mut trials = 0;
    while trials < options.max_trials
        && step.is_finite()
        && step > 0.0
        && step >= options.min_step
    {
        trials += 1;
        let target = loss0 + step * options.sufficient_decrease * slope;
        if !(target < loss0) {
            tracing::debug!(
                "Required decrease at step {:.3e} is below loss resolution at iteration {}, keeping iterate",
                step,
                iteration
            );
            return Ok(StepOutcome::Stationary);
        }
        let candidate = x + &(direction * step);
        if is_positive_definite(&candidate) {
            match loss(gram, &candidate) {
                Ok(value) if value <= target => {
                    tracing::trace!("Accepted step {:.3e} after {} trials", step, trials);
                    return Ok(StepOutcome::Accepted {
                        candidate,
                        loss: value,
                        step,
                    });
                }
                Ok(_) | Err(FactorizationError::InvalidCandidate { .. }) => {}
                Err(err) => return Err(err),
            }
        }
        step *= options.shrink;
    }

    tracing::error!(
        "Backtracking failed after {} trials at iteration {}",
        trials,
        iteration
    );
    Err(FactorizationError::NumericalStall { iteration, step })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routines::loss::evaluate;
    use crate::routines::linalg::zero_diagonal;
    use crate::structs::workload::Workload;

    #[test]
    fn accepts_a_decreasing_step_from_identity() {
        let workload = Workload::prefix_sum(4).unwrap();
        let x = Array2::eye(4);
        let eval = evaluate(workload.gram(), &x).unwrap();
        let mut grad = eval.gradient().clone();
        zero_diagonal(&mut grad);
        let direction = -&grad;
        let slope = -(&grad * &grad).sum();

        let outcome = backtrack(
            &LineSearch::default(),
            workload.gram(),
            &x,
            eval.loss(),
            &direction,
            slope,
            1.0,
            0,
        )
        .unwrap();
        match outcome {
            StepOutcome::Accepted { loss, step, .. } => {
                assert!(loss < 10.0);
                // A unit step leaves the positive-definite cone for this workload
                assert!(step < 1.0);
            }
            StepOutcome::Stationary => panic!("expected an accepted step"),
        }
    }

    #[test]
    fn zero_direction_is_stationary() {
        let workload = Workload::prefix_sum(3).unwrap();
        let x = Array2::eye(3);
        let direction = Array2::zeros((3, 3));
        let outcome = backtrack(
            &LineSearch::default(),
            workload.gram(),
            &x,
            6.0,
            &direction,
            0.0,
            1.0,
            0,
        )
        .unwrap();
        assert!(matches!(outcome, StepOutcome::Stationary));
    }

    #[test]
    fn impossible_decrease_stalls() {
        let workload = Workload::prefix_sum(3).unwrap();
        let x = Array2::eye(3);
        let value = loss(workload.gram(), &x).unwrap();
        // Ascent direction paired with a claimed negative slope can never be accepted
        let eval = evaluate(workload.gram(), &x).unwrap();
        let mut direction = eval.gradient().clone();
        zero_diagonal(&mut direction);
        let options = LineSearch {
            min_step: 1e-6,
            ..LineSearch::default()
        };
        let result = backtrack(
            &options,
            workload.gram(),
            &x,
            value,
            &direction,
            -1.0,
            1.0,
            3,
        );
        assert!(matches!(
            result,
            Err(FactorizationError::NumericalStall { iteration: 3, .. })
        ));
    }

    fn ascent_search(options: &LineSearch) -> Result<StepOutcome> {
        let workload = Workload::prefix_sum(3).unwrap();
        let x = Array2::eye(3);
        let eval = evaluate(workload.gram(), &x).unwrap();
        let mut direction = eval.gradient().clone();
        zero_diagonal(&mut direction);
        backtrack(
            options,
            workload.gram(),
            &x,
            eval.loss(),
            &direction,
            -1.0,
            1.0,
            0,
        )
    }

    #[test]
    fn non_shrinking_search_is_bounded_by_trials() {
        let options = LineSearch {
            shrink: 1.0,
            ..LineSearch::default()
        };
        assert!(matches!(
            ascent_search(&options),
            Err(FactorizationError::NumericalStall { .. })
        ));
    }

    #[test]
    fn zero_minimum_step_never_accepts_an_empty_step() {
        let options = LineSearch {
            min_step: 0.0,
            max_trials: 10_000,
            ..LineSearch::default()
        };
        let outcome = ascent_search(&options);
        assert!(!matches!(outcome, Ok(StepOutcome::Accepted { .. })));
    }
}
