//! Vector-to-matrix map Φ relating the dual vector parameterization to candidates.
//!
//! For a strictly positive vector `v` and `T = AᵗA`, let
//! `S = sqrt(diag(v)^½ · T · diag(v)^½)`. Then
//!
//! ```text
//! X_raw = diag(v)^(−½) · S · diag(v)^(−½)
//! Φ(v)  = D^(−½) · X_raw · D^(−½),   D = diag(X_raw)
//! ```
//!
//! A fixed point `v = diag(S)` of the vector update makes the renormalization a
//! no-op. The square root is the expensive step, so it lives in a [SqrtCache]
//! that records the vector it was computed for.

use crate::error::{FactorizationError, Result};
use crate::routines::linalg::{matrix_sqrt, symmetrize};
use crate::structs::workload::Workload;
use ndarray::{Array1, Array2, Axis};

/// Square root of `diag(v)^½·AᵗA·diag(v)^½` tied to the vector `v` it was built for.
#[derive(Debug, Clone)]
pub struct SqrtCache {
    vector: Array1<f64>,
    sqrt: Array2<f64>,
}

impl SqrtCache {
    /// Compute the square root for `v`.
    pub fn new(workload: &Workload, v: &Array1<f64>, floor: f64) -> Result<Self> {
        validate_vector(v, workload.dim())?;
        let half = v.mapv(f64::sqrt);
        let scaled = scale_rows_and_columns(workload.gram(), &half);
        let sqrt = matrix_sqrt(&scaled, floor)?;
        Ok(Self {
            vector: v.clone(),
            sqrt,
        })
    }

    /// The vector this cache corresponds to.
    pub fn vector(&self) -> &Array1<f64> {
        &self.vector
    }

    /// The cached square root `S`.
    pub fn sqrt(&self) -> &Array2<f64> {
        &self.sqrt
    }

    /// Diagonal of `S`, i.e. the fixed-point update of the cached vector.
    pub fn next_vector(&self) -> Array1<f64> {
        self.sqrt.diag().to_owned()
    }

    /// Checks that the cache was built for exactly `v`.
    pub fn ensure_matches(&self, v: &Array1<f64>) -> Result<()> {
        if self.vector.len() != v.len() || self.vector.iter().zip(v.iter()).any(|(a, b)| a != b) {
            return Err(FactorizationError::CacheMismatch);
        }
        Ok(())
    }
}

/// Maps a strictly positive vector to a unit-diagonal positive-definite matrix.
///
/// If `cache` is given it must have been computed for `v`; otherwise the square
/// root is computed here with eigenvalue floor `floor`.
pub fn phi(
    workload: &Workload,
    v: &Array1<f64>,
    cache: Option<&SqrtCache>,
    floor: f64,
) -> Result<Array2<f64>> {
    let raw = match cache {
        Some(cache) => reconstruct(v, cache)?,
        None => reconstruct(v, &SqrtCache::new(workload, v, floor)?)?,
    };

    let diag = raw.diag().to_owned();
    if diag.iter().any(|&d| !(d.is_finite() && d > 0.0)) {
        return Err(FactorizationError::invalid_candidate(
            "reconstructed matrix has a non-positive diagonal",
        ));
    }
    let inv_sqrt_diag = diag.mapv(|d| 1.0 / d.sqrt());
    let mut normalized = scale_rows_and_columns(&raw, &inv_sqrt_diag);
    // The renormalized diagonal is 1 up to rounding; make it exact.
    normalized.diag_mut().fill(1.0);
    Ok(normalized)
}

/// `diag(v)^(−½) · S · diag(v)^(−½)` for the cached `S`, without renormalizing the diagonal.
pub fn reconstruct(v: &Array1<f64>, cache: &SqrtCache) -> Result<Array2<f64>> {
    cache.ensure_matches(v)?;
    let inv_half = v.mapv(|x| 1.0 / x.sqrt());
    Ok(symmetrize(&scale_rows_and_columns(cache.sqrt(), &inv_half)))
}

/// `diag(d) · M · diag(d)` computed by broadcasting.
fn scale_rows_and_columns(matrix: &Array2<f64>, d: &Array1<f64>) -> Array2<f64> {
    let column = d.view().insert_axis(Axis(1));
    &(matrix * &column) * d
}

pub(crate) fn validate_vector(v: &Array1<f64>, n: usize) -> Result<()> {
    if v.len() != n {
        return Err(FactorizationError::DimensionMismatch {
            expected: n,
            found: v.len(),
        });
    }
    if let Some((i, x)) = v
        .iter()
        .enumerate()
        .find(|(_, x)| !(x.is_finite() && **x > 0.0))
    {
        return Err(FactorizationError::invalid_vector(format!(
            "entry {} is {}",
            i, x
        )));
    }
    Ok(())
}
