use crate::routines::phi::phi;
use crate::routines::settings::{InitialVector, Initialization, Numerics};
use crate::structs::workload::Workload;
use anyhow::{Context, Result};
use ndarray::{Array1, Array2};
use sobol_burley::sample;

/// Generates the initial strictly positive vector for a problem of size `n`.
///
/// The vector seeds the fixed-point method directly, and the descent methods
/// through [initial_matrix].
pub fn initial_vector(n: usize, settings: &Initialization) -> Result<Array1<f64>> {
    match settings.method {
        InitialVector::Ones => Ok(Array1::ones(n)),
        InitialVector::Sobol => generate(n, settings.lower, settings.upper, settings.seed),
    }
}

/// Generates a positive vector from a scrambled one-dimensional Sobol sequence.
///
/// Entry `i` is the `i`-th Sobol point for the given seed, scaled to `[lower, upper]`.
pub fn generate(n: usize, lower: f64, upper: f64, seed: usize) -> Result<Array1<f64>> {
    let points = u32::try_from(n).context("Vector is too long for the Sobol sequence")?;
    let seed = u32::try_from(seed).context("Sobol seed does not fit in 32 bits")?;
    let values: Vec<f64> = (0..points)
        .map(|i| {
            let unscaled = sample(i, 0, seed) as f64;
            lower + unscaled * (upper - lower)
        })
        .collect();
    Ok(Array1::from_vec(values))
}

/// Unit-diagonal positive-definite starting matrix `Φ(A, v)` for the descent methods.
pub fn initial_matrix(
    workload: &Workload,
    v: &Array1<f64>,
    numerics: &Numerics,
) -> Result<Array2<f64>> {
    let x = phi(workload, v, None, numerics.eigen_floor)
        .context("Failed to map the initial vector to a candidate matrix")?;
    Ok(x)
}
