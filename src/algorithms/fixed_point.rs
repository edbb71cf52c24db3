use crate::algorithms::{Algorithm, Optimizer, Status};
use crate::error::Result;
use crate::routines::loss::loss;
use crate::routines::output::{FactorizationResult, Trace};
use crate::routines::phi::{phi, reconstruct, validate_vector, SqrtCache};
use crate::routines::settings::{FixedPointConfig, Numerics};
use crate::structs::workload::Workload;
use ndarray::Array1;

/// Fixed-point iteration on the vector parameterization
///
/// Repeats `v ← diag(sqrt(diag(v)^½·AᵗA·diag(v)^½))` until the relative change
/// `‖v_new − v‖ / ‖v‖` drops below the tolerance. The square root computed for
/// the new vector is carried over to the next iteration, so every iteration
/// performs exactly one matrix square root.
#[derive(Debug)]
pub struct FixedPoint<'a> {
    workload: &'a Workload,
    v: Array1<f64>,
    cache: SqrtCache,
    options: FixedPointConfig,
    numerics: Numerics,
    iteration: usize,
    relative_change: Option<f64>,
    status: Status,
    trace: Trace,
}

impl<'a> FixedPoint<'a> {
    pub fn new(
        workload: &'a Workload,
        v0: Array1<f64>,
        options: FixedPointConfig,
        numerics: Numerics,
    ) -> Result<Self> {
        validate_vector(&v0, workload.dim())?;
        let cache = SqrtCache::new(workload, &v0, numerics.eigen_floor)?;
        Ok(Self {
            workload,
            v: v0,
            cache,
            options,
            numerics,
            iteration: 0,
            relative_change: None,
            status: Status::Starting,
            trace: Trace::new(),
        })
    }

    /// The current vector
    pub fn v(&self) -> &Array1<f64> {
        &self.v
    }

    /// Relative change achieved by the last iteration, if any
    pub fn relative_change(&self) -> Option<f64> {
        self.relative_change
    }

    fn record_loss(&mut self) -> Result<()> {
        if self.options.record_loss {
            let x = phi(
                self.workload,
                &self.v,
                Some(&self.cache),
                self.numerics.eigen_floor,
            )?;
            let value = loss(self.workload.gram(), &x)?;
            self.trace.record(self.iteration, value);
        }
        Ok(())
    }
}

fn relative_change(new: &Array1<f64>, old: &Array1<f64>) -> f64 {
    let diff = new - old;
    diff.dot(&diff).sqrt() / old.dot(old).sqrt()
}

impl<'a> Optimizer for FixedPoint<'a> {
    fn algorithm(&self) -> Algorithm {
        Algorithm::FixedPoint
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
        if let Some(max) = self.options.max_iterations {
            if self.iteration >= max {
                tracing::warn!(
                    "Fixed point did not converge within {} iterations (relative change {:.3e})",
                    max,
                    self.relative_change.unwrap_or(f64::NAN)
                );
                self.status = Status::MaxIterations;
                return Ok(true);
            }
        }

        self.record_loss()?;

        let new_v = self.cache.next_vector();
        let new_cache = SqrtCache::new(self.workload, &new_v, self.numerics.eigen_floor)?;
        let change = relative_change(&new_v, &self.v);
        tracing::debug!("relative change {:.3e}", change);

        self.v = new_v;
        self.cache = new_cache;
        self.relative_change = Some(change);
        self.iteration += 1;

        if change < self.options.tolerance {
            self.record_loss()?;
            self.status = Status::Converged;
            return Ok(true);
        }
        Ok(false)
    }

    fn into_result(&self) -> Result<FactorizationResult> {
        let x = reconstruct(&self.v, &self.cache)?;
        let final_loss = loss(self.workload.gram(), &x)?;
        Ok(FactorizationResult::new(
            Algorithm::FixedPoint,
            self.status.clone(),
            self.iteration,
            final_loss,
            self.relative_change,
            x,
            Some(self.v.clone()),
            self.trace.clone(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FactorizationError;
    use ndarray::array;

    fn options(tolerance: f64, max_iterations: Option<usize>) -> FixedPointConfig {
        FixedPointConfig {
            tolerance,
            max_iterations,
            record_loss: true,
        }
    }

    #[test]
    fn loose_tolerance_stops_after_one_iteration() {
        let workload = Workload::prefix_sum(4).unwrap();
        let mut fp = FixedPoint::new(
            &workload,
            Array1::ones(4),
            options(1.0, Some(100)),
            Numerics::default(),
        )
        .unwrap();
        let result = fp.fit().unwrap();
        assert_eq!(result.iterations(), 1);
        assert_eq!(result.status(), &Status::Converged);
        // one loss per iteration plus the converged point
        assert_eq!(result.trace().len(), 2);
        assert!(result.relative_change().unwrap() < 1.0);
    }

    #[test]
    fn converges_to_optimum_for_prefix_sums() {
        let workload = Workload::prefix_sum(4).unwrap();
        let mut fp = FixedPoint::new(
            &workload,
            Array1::ones(4),
            options(1e-10, Some(10_000)),
            Numerics::default(),
        )
        .unwrap();
        let result = fp.fit().unwrap();
        assert_eq!(result.status(), &Status::Converged);
        assert!((result.loss() - 6.874144).abs() < 1e-4, "{}", result.loss());

        let x = result.x();
        for i in 0..4 {
            assert!((x[(i, i)] - 1.0).abs() < 1e-6);
        }
        let v = result.v().unwrap();
        assert!(v.iter().all(|&x| x > 0.0));
    }

    #[test]
    fn iteration_budget_is_respected() {
        let workload = Workload::prefix_sum(8).unwrap();
        let mut fp = FixedPoint::new(
            &workload,
            Array1::ones(8),
            options(1e-14, Some(3)),
            Numerics::default(),
        )
        .unwrap();
        let result = fp.fit().unwrap();
        assert_eq!(result.iterations(), 3);
        assert_eq!(result.status(), &Status::MaxIterations);
        assert_eq!(result.trace().len(), 3);
    }

    #[test]
    fn loss_recording_can_be_disabled() {
        let workload = Workload::prefix_sum(4).unwrap();
        let mut fp = FixedPoint::new(
            &workload,
            Array1::ones(4),
            FixedPointConfig {
                tolerance: 1e-6,
                max_iterations: Some(500),
                record_loss: false,
            },
            Numerics::default(),
        )
        .unwrap();
        let result = fp.fit().unwrap();
        assert!(result.trace().is_empty());
        assert!(result.loss().is_finite());
    }

    #[test]
    fn rejects_non_positive_start() {
        let workload = Workload::prefix_sum(3).unwrap();
        let err = FixedPoint::new(
            &workload,
            array![1.0, 0.0, 1.0],
            options(1e-8, None),
            Numerics::default(),
        )
        .unwrap_err();
        assert!(matches!(err, FactorizationError::InvalidVector { .. }));
    }
}
