//! # Precision policy
//!
//! A calibrated coordinate is never displayed with more precision than its own
//! uncertainty supports. [`format_with_uncertainty`] implements the policy:
//!
//! 1. the uncertainty (arcseconds) is rounded to **two significant figures**,
//!    i.e. to `-floor(log10(max(u, ε))) + 1` decimal places;
//! 2. the rounded uncertainty is converted to degrees, and the same rule gives the
//!    number of decimal places kept for the value (degrees).
//!
//! ```text
//! u = 0.034"  → 3 decimals → u' = 0.034"
//! u'/3600 = 9.44e-6 deg → 7 decimals → v' = round(v, 7)
//! ```
//!
//! The functions are pure: identical inputs give bit-identical outputs. Rounding to
//! a non-negative number of decimals goes through the exact decimal expansion of the
//! `f64`, so the result is the double nearest to the rounded decimal (ties to even).
use crate::constants::{ArcSec, Degree, ARCSEC_PER_DEGREE, UNCERTAINTY_FLOOR};

/// A value/uncertainty pair after applying the precision policy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rounded {
    pub value: Degree,
    pub uncertainty: ArcSec,
    /// Decimal places kept for `value`
    pub value_decimals: i32,
    /// Decimal places kept for `uncertainty`
    pub uncertainty_decimals: i32,
}

/// Number of decimal places that keeps two significant figures of `magnitude`.
///
/// Zero, negative and NaN magnitudes are replaced by `floor` before the logarithm.
pub fn decimals_for(magnitude: f64, floor: f64) -> i32 {
    let magnitude = if magnitude.is_nan() {
        floor
    } else {
        magnitude.max(floor)
    };
    let exponent = magnitude.log10().floor();
    if !exponent.is_finite() {
        // infinite magnitude: keep nothing after the point
        return 0;
    }
    -(exponent as i32) + 1
}

/// Round `value` to `decimals` decimal places; negative counts round to tens, hundreds…
pub fn round_to_decimals(value: f64, decimals: i32) -> f64 {
    if !value.is_finite() {
        return value;
    }
    if decimals >= 0 {
        let precision = decimals as usize;
        format!("{value:.precision$}").parse().unwrap_or(value)
    } else {
        let factor = 10f64.powi(-decimals);
        (value / factor).round_ties_even() * factor
    }
}

/// Apply the precision policy with the default ε floor.
///
/// Arguments
/// ---------
/// * `value`: coordinate in degrees
/// * `uncertainty`: its uncertainty in arcseconds
///
/// Return
/// ------
/// * the rounded pair and the decimal counts used
pub fn format_with_uncertainty(value: Degree, uncertainty: ArcSec) -> Rounded {
    format_with_floor(value, uncertainty, UNCERTAINTY_FLOOR)
}

/// Apply the precision policy with an explicit ε floor.
pub fn format_with_floor(value: Degree, uncertainty: ArcSec, floor: f64) -> Rounded {
    let uncertainty_decimals = decimals_for(uncertainty, floor);
    let rounded_uncertainty = round_to_decimals(uncertainty, uncertainty_decimals);

    let value_decimals = decimals_for(rounded_uncertainty / ARCSEC_PER_DEGREE, floor);
    let rounded_value = round_to_decimals(value, value_decimals);

    Rounded {
        value: rounded_value,
        uncertainty: rounded_uncertainty,
        value_decimals,
        uncertainty_decimals,
    }
}
