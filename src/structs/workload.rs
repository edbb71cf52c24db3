use anyhow::{bail, Context, Result};
use csv::ReaderBuilder;
use ndarray::Array2;
use ndarray_csv::Array2Reader;
use std::path::Path;

/// The workload (target) matrix of linear queries to be answered.
///
/// The workload is read-only for the duration of a run. Alongside the matrix
/// itself we keep its Gram matrix `AᵗA`, which is the only quantity the loss
/// and the optimizers ever need. A [Workload] can be shared by reference across
/// concurrent, independent optimizer runs.
#[derive(Debug, Clone)]
pub struct Workload {
    matrix: Array2<f64>,
    gram: Array2<f64>,
}

impl Workload {
    /// Create a new [Workload] from a dense `m × n` matrix.
    pub fn new(matrix: Array2<f64>) -> Result<Self> {
        if matrix.is_empty() {
            bail!("Workload matrix must not be empty");
        }
        if !matrix.iter().all(|x| x.is_finite()) {
            bail!("Workload matrix must have finite entries");
        }
        let gram = matrix.t().dot(&matrix);
        Ok(Self { matrix, gram })
    }

    /// The `n × n` lower-triangular all-ones matrix, answering all prefix sums.
    pub fn prefix_sum(n: usize) -> Result<Self> {
        Self::new(Array2::from_shape_fn((n, n), |(i, j)| {
            if i >= j {
                1.0
            } else {
                0.0
            }
        }))
    }

    /// The `n × n` identity workload.
    pub fn identity(n: usize) -> Result<Self> {
        Self::new(Array2::eye(n))
    }

    /// Read a dense workload matrix from a headerless CSV file.
    pub fn from_csv(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut reader = ReaderBuilder::new()
            .has_headers(false)
            .from_path(path)
            .with_context(|| format!("Failed to open workload file {:?}", path))?;
        let matrix: Array2<f64> = reader
            .deserialize_array2_dynamic()
            .with_context(|| format!("Failed to parse workload matrix from {:?}", path))?;
        Self::new(matrix)
    }

    /// Get a reference to the workload matrix `A`.
    pub fn matrix(&self) -> &Array2<f64> {
        &self.matrix
    }

    /// Get a reference to the Gram matrix `AᵗA`.
    pub fn gram(&self) -> &Array2<f64> {
        &self.gram
    }

    /// Dimension `n` of the factorization, i.e. the number of columns of `A`.
    pub fn dim(&self) -> usize {
        self.matrix.ncols()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn prefix_sum_gram_has_expected_trace() {
        let workload = Workload::prefix_sum(4).unwrap();
        assert_eq!(workload.dim(), 4);
        // Column j of the prefix-sum matrix has 4 - j ones
        let trace: f64 = workload.gram().diag().sum();
        assert_eq!(trace, 10.0);
        assert_eq!(workload.gram()[(0, 1)], 3.0);
        assert_eq!(workload.gram()[(3, 3)], 1.0);
    }

    #[test]
    fn rectangular_workload_has_square_gram() {
        let workload = Workload::new(array![[1.0, 0.0], [1.0, 1.0], [0.0, 2.0]]).unwrap();
        assert_eq!(workload.dim(), 2);
        assert_eq!(workload.gram(), &array![[2.0, 1.0], [1.0, 5.0]]);
    }

    #[test]
    fn rejects_non_finite_entries() {
        assert!(Workload::new(array![[1.0, f64::NAN], [0.0, 1.0]]).is_err());
        assert!(Workload::new(Array2::zeros((0, 0))).is_err());
    }
}
