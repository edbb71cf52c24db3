//! Dense linear-algebra helpers shared by the optimizers.

use crate::error::{FactorizationError, Result};
use linfa_linalg::cholesky::Cholesky;
use linfa_linalg::eigh::Eigh;
use linfa_linalg::triangular::{SolveTriangular, UPLO};
use ndarray::{Array2, Zip};

/// Square root of a symmetric positive semi-definite matrix.
///
/// The matrix is diagonalized as `M = U·Λ·Uᵗ`, the eigenvalues are clamped from
/// below to `floor` and the result `U·diag(√λ)·Uᵗ` is returned. The output is
/// symmetric and squares back to the clamped input up to floating-point
/// tolerance. Precision degrades with the condition number of `M`.
///
/// # Errors
///
/// Returns an error if the matrix is not square, contains non-finite values, or
/// the eigensolver fails.
pub fn matrix_sqrt(matrix: &Array2<f64>, floor: f64) -> Result<Array2<f64>> {
    ensure_square(matrix)?;
    if !matrix.iter().all(|x| x.is_finite()) {
        return Err(FactorizationError::invalid_candidate(
            "matrix square root input has non-finite entries",
        ));
    }
    let floor = floor.max(0.0);

    let (eigvals, eigvecs) = matrix.eigh()?;
    let sqrt_vals = eigvals.mapv(|lambda| lambda.max(floor).sqrt());

    // Scale column j of U by sqrt(lambda_j), then multiply by Uᵗ
    let scaled = &eigvecs * &sqrt_vals;
    let sqrt = scaled.dot(&eigvecs.t());
    Ok(symmetrize(&sqrt))
}

/// Returns true if a Cholesky factorization of the matrix succeeds with finite entries.
pub fn is_positive_definite(matrix: &Array2<f64>) -> bool {
    if matrix.nrows() != matrix.ncols() || !matrix.iter().all(|x| x.is_finite()) {
        return false;
    }
    match matrix.cholesky() {
        Ok(l) => l.iter().all(|x| x.is_finite()),
        Err(_) => false,
    }
}

/// Inverse of a symmetric positive-definite matrix via its Cholesky factor.
///
/// With `X = L·Lᵗ`, we solve `L·Y = I` and return `Yᵗ·Y = X⁻¹`.
pub fn inverse_pd(matrix: &Array2<f64>) -> Result<Array2<f64>> {
    ensure_square(matrix)?;
    if !matrix.iter().all(|x| x.is_finite()) {
        return Err(FactorizationError::invalid_candidate(
            "matrix has non-finite entries",
        ));
    }
    let l = matrix
        .cholesky()
        .map_err(|e| FactorizationError::invalid_candidate(e.to_string()))?;
    if !l.iter().all(|x| x.is_finite()) {
        return Err(FactorizationError::invalid_candidate(
            "Cholesky factor has non-finite entries",
        ));
    }
    let identity = Array2::<f64>::eye(matrix.nrows());
    let l_inv = l.solve_triangular(&identity, UPLO::Lower)?;
    Ok(symmetrize(&l_inv.t().dot(&l_inv)))
}

/// Orthogonal projection onto symmetric matrices, `(M + Mᵗ) / 2`.
pub fn symmetrize(matrix: &Array2<f64>) -> Array2<f64> {
    (matrix + &matrix.t()) * 0.5
}

/// Sets every diagonal entry to zero in place.
pub fn zero_diagonal(matrix: &mut Array2<f64>) {
    matrix.diag_mut().fill(0.0);
}

/// Frobenius inner product `⟨A, B⟩ = Σ A[i,j]·B[i,j]`.
pub fn frobenius_inner(a: &Array2<f64>, b: &Array2<f64>) -> f64 {
    Zip::from(a).and(b).fold(0.0, |acc, &x, &y| acc + x * y)
}

/// Largest absolute entry of a matrix.
pub fn max_abs(matrix: &Array2<f64>) -> f64 {
    matrix.iter().fold(0.0_f64, |acc, &x| acc.max(x.abs()))
}

pub(crate) fn ensure_square(matrix: &Array2<f64>) -> Result<()> {
    if matrix.nrows() != matrix.ncols() {
        return Err(FactorizationError::DimensionMismatch {
            expected: matrix.nrows(),
            found: matrix.ncols(),
        });
    }
    Ok(())
}
