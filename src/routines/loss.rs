//! Variance-proxy loss of a candidate factorization.
//!
//! For a workload with Gram matrix `G = AᵗA` and a symmetric positive-definite
//! candidate `X`, the loss is
//!
//! ```text
//! loss(X) = trace(G · X⁻¹) · max_i X[i,i]
//! ```
//!
//! The inverse is always obtained through a Cholesky factorization, so a
//! candidate that is not positive definite is reported as
//! [FactorizationError::InvalidCandidate] instead of producing NaN.

use crate::error::{FactorizationError, Result};
use crate::routines::linalg::{ensure_square, inverse_pd};
use ndarray::Array2;
use ndarray_stats::QuantileExt;

/// Loss value, inverse and gradient at a candidate matrix.
#[derive(Debug, Clone)]
pub struct Evaluation {
    loss: f64,
    inverse: Array2<f64>,
    gradient: Array2<f64>,
    trace_gradient: Array2<f64>,
}

impl Evaluation {
    /// The loss `trace(G·X⁻¹)·max diag(X)`.
    pub fn loss(&self) -> f64 {
        self.loss
    }

    /// `Z = X⁻¹`.
    pub fn inverse(&self) -> &Array2<f64> {
        &self.inverse
    }

    /// Full gradient of the loss with respect to `X`.
    ///
    /// The `max diag(X)` factor contributes only to diagonal entries, split
    /// evenly between all entries attaining the maximum.
    pub fn gradient(&self) -> &Array2<f64> {
        &self.gradient
    }

    /// Gradient of the smooth part only, `−m·Z·G·Z` with `m = max diag(X)`.
    pub fn trace_gradient(&self) -> &Array2<f64> {
        &self.trace_gradient
    }
}

/// Evaluate the loss at `x`.
pub fn loss(gram: &Array2<f64>, x: &Array2<f64>) -> Result<f64> {
    check_dims(gram, x)?;
    let inverse = inverse_pd(x)?;
    let max_diag = max_diagonal(x)?;
    Ok(trace_of_product(gram, &inverse) * max_diag)
}

/// Evaluate the loss, the inverse and the analytic gradient at `x`.
pub fn evaluate(gram: &Array2<f64>, x: &Array2<f64>) -> Result<Evaluation> {
    check_dims(gram, x)?;
    let inverse = inverse_pd(x)?;
    let max_diag = max_diagonal(x)?;
    let trace = trace_of_product(gram, &inverse);

    // d/dX trace(G·X⁻¹) = −X⁻¹·G·X⁻¹
    let trace_gradient = inverse.dot(gram).dot(&inverse) * (-max_diag);

    let mut gradient = trace_gradient.clone();
    let argmax: Vec<usize> = x
        .diag()
        .iter()
        .enumerate()
        .filter(|(_, d)| **d == max_diag)
        .map(|(i, _)| i)
        .collect();
    let share = trace / argmax.len() as f64;
    for i in argmax {
        gradient[(i, i)] += share;
    }

    Ok(Evaluation {
        loss: trace * max_diag,
        inverse,
        gradient,
        trace_gradient,
    })
}

/// `trace(A·B)` without forming the product.
fn trace_of_product(a: &Array2<f64>, b: &Array2<f64>) -> f64 {
    let n = a.nrows();
    let mut acc = 0.0;
    for i in 0..n {
        acc += a.row(i).dot(&b.column(i));
    }
    acc
}

fn max_diagonal(x: &Array2<f64>) -> Result<f64> {
    x.diag()
        .max()
        .copied()
        .map_err(|e| FactorizationError::invalid_candidate(format!("diagonal has no maximum: {e}")))
}

fn check_dims(gram: &Array2<f64>, x: &Array2<f64>) -> Result<()> {
    ensure_square(x)?;
    if gram.nrows() != x.nrows() || gram.ncols() != x.ncols() {
        return Err(FactorizationError::DimensionMismatch {
            expected: gram.nrows(),
            found: x.nrows(),
        });
    }
    Ok(())
}
