//! Least squares solver.
//!
//! Every model in this crate reduces to small regression problems of the form:
//!
//! ```text
//! minimize Σ (y_i - x_i^T β)^2
//! ```
//!
//! - ARIMA: the Hannan–Rissanen stages regress on lagged values and lagged
//!   innovations.
//! - Trend: regression on a linear trend plus Fourier seasonal terms.
//!
//! Implementation choices:
//! - SVD solve so tall, nearly collinear design matrices still produce a
//!   usable answer (`QR::solve` is intended for square systems).
//! - Parameter dimensions are tiny (at most a few dozen columns), so SVD cost
//!   is dominated by the row count and stays acceptable for decades of daily data.

use nalgebra::{DMatrix, DVector};

/// Solve a least squares problem using SVD.
///
/// Returns `None` if the system is too ill-conditioned to solve robustly.
pub fn solve_least_squares(x: &DMatrix<f64>, y: &DVector<f64>) -> Option<DVector<f64>> {
    if x.nrows() == 0 || x.ncols() == 0 || x.nrows() != y.len() {
        return None;
    }
    let svd = x.clone().svd(true, true);

    // Try progressively looser tolerances if strict solve fails.
    for &tol in &[1e-10, 1e-8, 1e-6] {
        if let Ok(beta) = svd.solve(y, tol) {
            if beta.iter().all(|v| v.is_finite()) {
                return Some(beta);
            }
        }
    }

    None
}

/// Build a design matrix from row vectors of equal width.
pub fn design_matrix(rows: &[Vec<f64>]) -> Option<DMatrix<f64>> {
    let ncols = rows.first()?.len();
    if rows.iter().any(|r| r.len() != ncols) {
        return None;
    }
    Some(DMatrix::from_fn(rows.len(), ncols, |i, j| rows[i][j]))
}
