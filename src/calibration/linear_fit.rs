//! Weighted first degree polynomial fit.
//!
//! Solves `min Σ (wᵢ (yᵢ − (a·xᵢ + b)))²` by SVD least squares on the column-scaled
//! design matrix, with the same rank cutoff as `numpy.polyfit` (`n · ε_machine`
//! relative to the largest singular value). Rank-deficient systems (all `x`
//! identical) still produce the minimum-norm solution rather than an error.
use nalgebra::{DMatrix, DVector};

use crate::apzero_errors::ApZeroError;

/// `y = slope · x + intercept`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearFit {
    pub slope: f64,
    pub intercept: f64,
    /// Numerical rank of the weighted design matrix (2 unless degenerate).
    pub rank: usize,
}

impl LinearFit {
    pub fn eval(&self, x: f64) -> f64 {
        self.slope * x + self.intercept
    }
}

/// Fit a line through `(x, y)` with optional per-point weights.
///
/// Arguments
/// -----------------
/// * `x`, `y`: abscissas and ordinates, same length, at least one point.
/// * `weights`: per-point residual weights, or `None` for an unweighted fit.
///
/// Return
/// ----------
/// * The fitted line, or [`ApZeroError::NumericFailure`] on mismatched lengths, an empty
///   input, a non-finite input or weight, or a non-finite solution.
pub fn weighted_linear_fit(
    x: &[f64],
    y: &[f64],
    weights: Option<&[f64]>,
) -> Result<LinearFit, ApZeroError> {
    let n = x.len();
    if n == 0 {
        return Err(ApZeroError::NumericFailure("no points to fit".into()));
    }
    if y.len() != n || weights.is_some_and(|w| w.len() != n) {
        return Err(ApZeroError::NumericFailure(
            "fit inputs have mismatched lengths".into(),
        ));
    }

    let weight = |i: usize| weights.map_or(1.0, |w| w[i]);

    if let Some(i) = (0..n).find(|&i| !weight(i).is_finite()) {
        return Err(ApZeroError::NumericFailure(format!(
            "non-finite weight {} at point {i}",
            weight(i)
        )));
    }
    if x.iter().chain(y).any(|v| !v.is_finite()) {
        return Err(ApZeroError::NumericFailure("non-finite coordinate".into()));
    }

    let mut lhs = DMatrix::<f64>::zeros(n, 2);
    let mut rhs = DVector::<f64>::zeros(n);
    for i in 0..n {
        let w = weight(i);
        lhs[(i, 0)] = x[i] * w;
        lhs[(i, 1)] = w;
        rhs[i] = y[i] * w;
    }

    // column scaling improves the conditioning when photAp spans a wide range
    let scale: Vec<f64> = (0..2)
        .map(|j| {
            let norm = lhs.column(j).norm();
            if norm == 0.0 {
                1.0
            } else {
                norm
            }
        })
        .collect();
    for j in 0..2 {
        for i in 0..n {
            lhs[(i, j)] /= scale[j];
        }
    }

    let svd = lhs.svd(true, true);
    let cutoff = n as f64 * f64::EPSILON * svd.singular_values.max();
    let rank = svd.rank(cutoff);
    let coef = svd
        .solve(&rhs, cutoff)
        .map_err(|e| ApZeroError::NumericFailure(e.to_string()))?;

    let slope = coef[0] / scale[0];
    let intercept = coef[1] / scale[1];
    if !slope.is_finite() || !intercept.is_finite() {
        return Err(ApZeroError::NumericFailure(format!(
            "non-finite fit coefficients ({slope}, {intercept})"
        )));
    }

    Ok(LinearFit {
        slope,
        intercept,
        rank,
    })
}

#[cfg(test)]
mod linear_fit_test {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_exact_line() {
        let x = [1.0, 2.0, 3.0, 4.0];
        let y: Vec<f64> = x.iter().map(|v| 150.0 + 2.5e-5 * v).collect();
        let fit = weighted_linear_fit(&x, &y, None).unwrap();
        assert_abs_diff_eq!(fit.slope, 2.5e-5, epsilon = 1e-12);
        assert_abs_diff_eq!(fit.intercept, 150.0, epsilon = 1e-11);
        assert_eq!(fit.rank, 2);
        assert_abs_diff_eq!(fit.eval(0.0), fit.intercept);
    }

    #[test]
    fn test_weights_pull_towards_precise_points() {
        let x = [0.0, 1.0, 2.0];
        let y = [0.0, 1.0, 5.0];
        let loose = weighted_linear_fit(&x, &y, None).unwrap();
        let tight = weighted_linear_fit(&x, &y, Some(&[100.0, 100.0, 1.0])).unwrap();

        // the two heavy points define y = x almost exactly
        assert_abs_diff_eq!(tight.slope, 1.0, epsilon = 1e-2);
        assert_abs_diff_eq!(tight.intercept, 0.0, epsilon = 1e-2);
        assert!(loose.slope > 2.0);
    }

    #[test]
    fn test_uniform_weights_match_unweighted() {
        let x = [1.0, 2.0, 4.0, 7.0];
        let y = [3.0, 2.5, 4.0, 6.0];
        let a = weighted_linear_fit(&x, &y, None).unwrap();
        let b = weighted_linear_fit(&x, &y, Some(&[3.0; 4])).unwrap();
        assert_abs_diff_eq!(a.slope, b.slope, epsilon = 1e-12);
        assert_abs_diff_eq!(a.intercept, b.intercept, epsilon = 1e-12);
    }

    #[test]
    fn test_two_points_same_aperture_is_degenerate_but_defined() {
        let fit = weighted_linear_fit(&[2.0, 2.0], &[10.0, 12.0], None).unwrap();
        assert_eq!(fit.rank, 1);
        // minimum norm solution still passes through the mean at x = 2
        assert_abs_diff_eq!(fit.eval(2.0), 11.0, epsilon = 1e-9);
    }

    #[test]
    fn test_infinite_weight_fails() {
        let err = weighted_linear_fit(&[1.0, 2.0], &[1.0, 2.0], Some(&[1.0, f64::INFINITY]))
            .unwrap_err();
        assert!(matches!(err, ApZeroError::NumericFailure(_)));
    }

    #[test]
    fn test_bad_inputs_fail() {
        assert!(weighted_linear_fit(&[], &[], None).is_err());
        assert!(weighted_linear_fit(&[1.0], &[1.0, 2.0], None).is_err());
        assert!(weighted_linear_fit(&[1.0, f64::NAN], &[1.0, 2.0], None).is_err());
    }
}
