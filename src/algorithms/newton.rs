use crate::algorithms::{Algorithm, Optimizer, Status};
use crate::error::{FactorizationError, Result};
use crate::routines::line_search::{backtrack, StepOutcome};
use crate::routines::linalg::{
    frobenius_inner, is_positive_definite, max_abs, symmetrize, zero_diagonal,
};
use crate::routines::loss::{evaluate, loss};
use crate::routines::output::{FactorizationResult, Trace};
use crate::routines::settings::{LineSearch, NewtonConfig};
use crate::structs::workload::Workload;
use ndarray::Array2;

/// Applies the curvature operator `H(P) = −(Z·P·G + G·P·Z)`.
fn curvature(z: &Array2<f64>, grad: &Array2<f64>, p: &Array2<f64>) -> Array2<f64> {
    let zpg = z.dot(p).dot(grad);
    let gpz = grad.dot(p).dot(z);
    -(zpg + gpz)
}

/// Approximately solves `H(D) = −G` by conjugate gradients.
///
/// `z` is the inverse of the current iterate and `grad` the gradient of the
/// trace term. At most `budget` conjugate-gradient steps are taken. When
/// `project_diagonal` is set, every iterate and residual is kept on the
/// zero-diagonal subspace so that the direction does not move the unit
/// diagonal.
///
/// The iteration stops early once the residual vanishes or the curvature
/// along the search direction is no longer positive.
pub fn solve_newton_direction(
    z: &Array2<f64>,
    grad: &Array2<f64>,
    budget: usize,
    project_diagonal: bool,
) -> Array2<f64> {
    let mut d = Array2::<f64>::zeros(grad.raw_dim());
    let mut r = -grad;
    if project_diagonal {
        zero_diagonal(&mut r);
    }
    let mut p = r.clone();
    let mut r_old = frobenius_inner(&r, &r);

    for step in 0..budget {
        if max_abs(&r) == 0.0 {
            break;
        }
        let b = curvature(z, grad, &p);
        let pb = frobenius_inner(&p, &b);
        if !(pb > 0.0) {
            tracing::trace!("Non-positive curvature {:.3e} at inner step {}", pb, step);
            break;
        }
        let alpha = r_old / pb;
        d.scaled_add(alpha, &p);
        r.scaled_add(-alpha, &b);
        if project_diagonal {
            zero_diagonal(&mut d);
            zero_diagonal(&mut r);
        }
        let r_new = frobenius_inner(&r, &r);
        p = &r + &(p * (r_new / r_old));
        r_old = r_new;
    }
    d
}

/// Residual `−G − H(D)` of the Newton equation for a direction `d`.
pub fn newton_residual(z: &Array2<f64>, grad: &Array2<f64>, d: &Array2<f64>) -> Array2<f64> {
    -grad - &curvature(z, grad, d)
}

/// Newton-direction method on unit-diagonal positive-definite matrices
///
/// Directions come from a fixed number of conjugate-gradient steps on the
/// zero-diagonal subspace; each outer step is then backtracked with the same
/// Armijo search as gradient descent.
#[derive(Debug)]
pub struct Newton<'a> {
    workload: &'a Workload,
    x: Array2<f64>,
    options: NewtonConfig,
    line_search: LineSearch,
    iteration: usize,
    status: Status,
    trace: Trace,
}

impl<'a> Newton<'a> {
    pub fn new(
        workload: &'a Workload,
        initial: Array2<f64>,
        options: NewtonConfig,
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
                "initial iterate for the Newton method",
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

    pub fn x(&self) -> &Array2<f64> {
        &self.x
    }
}

impl<'a> Optimizer for Newton<'a> {
    fn algorithm(&self) -> Algorithm {
        Algorithm::Newton
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

        let direction = solve_newton_direction(
            eval.inverse(),
            eval.trace_gradient(),
            self.options.inner_iterations,
            true,
        );
        let mut grad = eval.gradient().clone();
        zero_diagonal(&mut grad);
        let slope = frobenius_inner(&grad, &direction);

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
                self.x = symmetrize(&candidate);
            }
            StepOutcome::Stationary => {}
        }
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
            Algorithm::Newton,
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

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn frobenius_norm(a: &Array2<f64>) -> f64 {
        frobenius_inner(a, a).sqrt()
    }

    fn example() -> (Array2<f64>, Array2<f64>) {
        let z = array![[2.0, 0.3, 0.1], [0.3, 1.5, 0.2], [0.1, 0.2, 1.0]];
        let grad = -array![[3.0, 0.5, 0.2], [0.5, 2.0, 0.4], [0.2, 0.4, 1.5]];
        (z, grad)
    }

    #[test]
    fn inner_solve_is_exact_within_symmetric_dimension() {
        let (z, grad) = example();
        // 3×3 symmetric matrices span six dimensions
        let d = solve_newton_direction(&z, &grad, 6, false);
        let residual = newton_residual(&z, &grad, &d);
        assert!(frobenius_norm(&residual) / frobenius_norm(&grad) < 1e-8);
    }

    #[test]
    fn residual_shrinks_with_budget() {
        let (z, grad) = example();
        let one = newton_residual(&z, &grad, &solve_newton_direction(&z, &grad, 1, false));
        let three = newton_residual(&z, &grad, &solve_newton_direction(&z, &grad, 3, false));
        assert!(frobenius_norm(&three) < frobenius_norm(&one));
        assert!(frobenius_norm(&three) / frobenius_norm(&grad) < 0.01);
    }

    #[test]
    fn projected_direction_has_zero_diagonal() {
        let (z, grad) = example();
        let d = solve_newton_direction(&z, &grad, 4, true);
        assert!(d.diag().iter().all(|&x| x == 0.0));
        assert!(max_abs(&d) > 0.0);
    }

    #[test]
    fn zero_gradient_gives_zero_direction() {
        let z = Array2::<f64>::eye(3);
        let grad = Array2::<f64>::zeros((3, 3));
        let d = solve_newton_direction(&z, &grad, 5, true);
        assert_eq!(max_abs(&d), 0.0);
    }

    #[test]
    fn newton_reaches_prefix_sum_optimum() {
        let workload = Workload::prefix_sum(4).unwrap();
        let options = NewtonConfig {
            iterations: 6,
            step_size: 1.0,
            inner_iterations: 5,
        };
        let mut newton =
            Newton::new(&workload, Array2::eye(4), options, LineSearch::default()).unwrap();
        let result = newton.fit().unwrap();
        assert!((result.trace().losses()[0] - 10.0).abs() < 1e-12);
        assert!((result.loss() - 6.874144).abs() < 1e-4, "{}", result.loss());
        for w in result.trace().losses().windows(2) {
            assert!(w[1] <= w[0] + 1e-12);
        }
        assert!(is_positive_definite(result.x()));
    }
}
