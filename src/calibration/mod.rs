//! # Zero-aperture calibration
//!
//! This module holds the numerical heart of the crate: for one epoch group, fit
//! position against photometric aperture on each axis and extrapolate to
//! aperture = 0.
//!
//! ## Pipeline overview
//!
//! 1. **Input split** – [`FitInput::from_group`](crate::calibration::fitter::FitInput::from_group)
//!    partitions the group with its working set and keeps only rows carrying all five
//!    numeric fields. The template row is the picked row (resolved against the included
//!    rows, then the whole group).
//! 2. **Linear fits** – RA and Dec are fitted independently as first degree polynomials of
//!    `photAp` ([`weighted_linear_fit`](crate::calibration::linear_fit::weighted_linear_fit)),
//!    weighted per [`Weighting`]. A failing weighted fit is retried unweighted.
//! 3. **Extrapolation** – the intercepts are the zero-aperture position.
//! 4. **Uncertainty** – `uncertainty_scale × template rms`, independent of the fit, then
//!    the [precision policy](crate::precision) rounds value and uncertainty together.
//! 5. **Residuals** – arcsecond offsets of every included and excluded point from the
//!    zero point (RA scaled by `cos(dec0)`), for plotting.
//!
//! Numerical failures never escape: they surface as
//! [`FitOutcome::InsufficientData`](crate::calibration::fit_result::FitOutcome).
//!
//! ## Example
//!
//! ```rust
//! use apzero::calibration::{CalibrationParams, Weighting};
//!
//! let params = CalibrationParams::builder()
//!     .weighting(Weighting::InverseVariance)
//!     .uncertainty_scale(3.0)
//!     .build()
//!     .unwrap();
//! assert_eq!(params.min_points, 2);
//! ```
pub mod fit_result;
pub mod fitter;
pub mod linear_fit;

use serde::Serialize;

use crate::{
    apzero_errors::ApZeroError,
    constants::{DEFAULT_UNCERTAINTY_SCALE, DERIVED_NOTE_FLAG, MIN_FIT_POINTS, UNCERTAINTY_FLOOR},
};

/// How each point contributes to the least-squares fit.
///
/// The weight multiplies the point's residual before squaring, as `numpy.polyfit`'s `w`.
/// `InverseSigma` is the historical behaviour of the calibration; whether `1/σ` was meant
/// rather than `1/σ²` is unresolved, so the choice stays configurable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum Weighting {
    /// w = 1/σ
    #[default]
    InverseSigma,
    /// w = 1/σ²
    InverseVariance,
    /// w = 1
    Uniform,
}

impl Weighting {
    /// Weight of a point with uncertainty `sigma`, `None` for unweighted fits.
    pub fn weight(&self, sigma: f64) -> Option<f64> {
        match self {
            Weighting::InverseSigma => Some(1.0 / sigma),
            Weighting::InverseVariance => Some(1.0 / (sigma * sigma)),
            Weighting::Uniform => None,
        }
    }
}

/// Tunable parameters of the calibration.
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationParams {
    /// Minimum number of usable included points.
    pub min_points: usize,
    /// Weighting convention of the linear fits.
    pub weighting: Weighting,
    /// Retry unweighted when the weighted fit fails numerically.
    pub unweighted_fallback: bool,
    /// Zero-aperture uncertainty = `uncertainty_scale` × template rms.
    pub uncertainty_scale: f64,
    /// ε floor of the precision policy.
    pub uncertainty_floor: f64,
    /// Prefix added to the notes of a derived row.
    pub derived_note_flag: char,
}

impl Default for CalibrationParams {
    fn default() -> Self {
        CalibrationParams {
            min_points: MIN_FIT_POINTS,
            weighting: Weighting::default(),
            unweighted_fallback: true,
            uncertainty_scale: DEFAULT_UNCERTAINTY_SCALE,
            uncertainty_floor: UNCERTAINTY_FLOOR,
            derived_note_flag: DERIVED_NOTE_FLAG,
        }
    }
}

impl CalibrationParams {
    pub fn builder() -> CalibrationParamsBuilder {
        CalibrationParamsBuilder::new()
    }
}

pub struct CalibrationParamsBuilder {
    params: CalibrationParams,
}

impl Default for CalibrationParamsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CalibrationParamsBuilder {
    /// Create a new builder initialized with default values.
    pub fn new() -> Self {
        Self {
            params: CalibrationParams::default(),
        }
    }

    pub fn min_points(mut self, v: usize) -> Self {
        self.params.min_points = v;
        self
    }
    pub fn weighting(mut self, v: Weighting) -> Self {
        self.params.weighting = v;
        self
    }
    pub fn unweighted_fallback(mut self, v: bool) -> Self {
        self.params.unweighted_fallback = v;
        self
    }
    pub fn uncertainty_scale(mut self, v: f64) -> Self {
        self.params.uncertainty_scale = v;
        self
    }
    pub fn uncertainty_floor(mut self, v: f64) -> Self {
        self.params.uncertainty_floor = v;
        self
    }
    pub fn derived_note_flag(mut self, v: char) -> Self {
        self.params.derived_note_flag = v;
        self
    }

    /// Validate and return the parameters.
    ///
    /// Return
    /// ----------
    /// * The parameters, or [`ApZeroError::InvalidCalibrationParameter`] when
    ///   - `min_points < 2` (a line needs two points),
    ///   - `uncertainty_scale` is not a finite positive number,
    ///   - `uncertainty_floor` is not a finite positive number.
    pub fn build(self) -> Result<CalibrationParams, ApZeroError> {
        let p = &self.params;

        if p.min_points < MIN_FIT_POINTS {
            return Err(ApZeroError::InvalidCalibrationParameter(format!(
                "min_points must be >= {MIN_FIT_POINTS}"
            )));
        }
        if !Self::gt0(p.uncertainty_scale) {
            return Err(ApZeroError::InvalidCalibrationParameter(
                "uncertainty_scale must be finite and > 0".into(),
            ));
        }
        if !Self::gt0(p.uncertainty_floor) {
            return Err(ApZeroError::InvalidCalibrationParameter(
                "uncertainty_floor must be finite and > 0".into(),
            ));
        }

        Ok(self.params)
    }

    #[inline]
    fn gt0(x: f64) -> bool {
        x.is_finite() && x > 0.0
    }
}
