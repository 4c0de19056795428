//! Linear least squares helpers.
//!
//! The guess estimators solve a handful of tiny linear problems (peak position
//! vs. peak index, excess width vs. peak index). They all go through an SVD
//! solve so that tall and rank-deficient systems are handled the same way.

use nalgebra::{DMatrix, DVector};

/// Solve a least squares problem using SVD.
///
/// Returns `None` if the system is too ill-conditioned to solve robustly.
pub fn solve_least_squares(x: &DMatrix<f64>, y: &DVector<f64>) -> Option<DVector<f64>> {
    let svd = x.clone().svd(true, true);

    // Progressively looser tolerances for near-singular systems.
    for &tol in &[1e-10, 1e-8, 1e-6] {
        if let Ok(beta) = svd.solve(y, tol) {
            if beta.iter().all(|v| v.is_finite()) {
                return Some(beta);
            }
        }
    }

    None
}

/// Straight-line fit `y = intercept + slope * x`.
///
/// Returns `(intercept, slope)`, or `None` with fewer than two points or
/// when all `x` coincide.
pub fn fit_line(x: &[f64], y: &[f64]) -> Option<(f64, f64)> {
    let n = x.len().min(y.len());
    if n < 2 {
        return None;
    }
    let spread = x[..n].iter().fold(f64::NEG_INFINITY, |a, &b| a.max(b))
        - x[..n].iter().fold(f64::INFINITY, |a, &b| a.min(b));
    if !(spread > 0.0) {
        return None;
    }

    let design = DMatrix::from_fn(n, 2, |i, j| if j == 0 { 1.0 } else { x[i] });
    let obs = DVector::from_row_slice(&y[..n]);
    let beta = solve_least_squares(&design, &obs)?;
    Some((beta[0], beta[1]))
}

/// Fit `y = slope * x` (no intercept).
pub fn fit_through_origin(x: &[f64], y: &[f64]) -> Option<f64> {
    let n = x.len().min(y.len());
    if n == 0 || x[..n].iter().all(|&v| v == 0.0) {
        return None;
    }
    let design = DMatrix::from_column_slice(n, 1, &x[..n]);
    let obs = DVector::from_row_slice(&y[..n]);
    solve_least_squares(&design, &obs).map(|beta| beta[0])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn least_squares_solves_simple_system() {
        // Fit y = 2 + 3x on x = [0,1,2]
        let x = DMatrix::from_row_slice(3, 2, &[1.0, 0.0, 1.0, 1.0, 1.0, 2.0]);
        let y = DVector::from_row_slice(&[2.0, 5.0, 8.0]);

        let beta = solve_least_squares(&x, &y).unwrap();
        assert!((beta[0] - 2.0).abs() < 1e-10);
        assert!((beta[1] - 3.0).abs() < 1e-10);
    }

    #[test]
    fn line_through_peak_positions_gives_gain() {
        let idx = [0.0, 1.0, 2.0, 3.0];
        let pos = [2000.0, 2005.6, 2011.2, 2016.8];
        let (intercept, slope) = fit_line(&idx, &pos).unwrap();
        assert!((intercept - 2000.0).abs() < 1e-9);
        assert!((slope - 5.6).abs() < 1e-9);
    }

    #[test]
    fn line_needs_distinct_abscissae() {
        assert!(fit_line(&[1.0], &[2.0]).is_none());
        assert!(fit_line(&[1.0, 1.0], &[2.0, 3.0]).is_none());
    }

    #[test]
    fn slope_through_origin() {
        let slope = fit_through_origin(&[1.0, 2.0, 3.0], &[0.5, 1.0, 1.5]).unwrap();
        assert!((slope - 0.5).abs() < 1e-12);
        assert!(fit_through_origin(&[0.0, 0.0], &[1.0, 2.0]).is_none());
    }
}
