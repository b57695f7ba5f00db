//! # Calibration fit result
//!
//! [`FitOutcome`] is what the fitter returns for one group: either a full
//! [`FitResult`] or the reason why no result is available this round.
//! Neither is ever persisted; the staged row keeps only the numbers it needs.
//!
//! The residual series are plotting material: offsets in **arcseconds** from the
//! rounded zero point, RA offsets multiplied by `cos(dec0)`.
use std::fmt;

use serde::Serialize;

use crate::constants::{Aperture, ArcSec, Degree, EpochLabel, RowId, ARCSEC_PER_DEGREE, RADEG};

/// Offset of one observation from the zero-aperture point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ResidualPoint {
    pub row_id: RowId,
    pub phot_ap: Aperture,
    /// Offset from the zero point, arcseconds
    pub offset: ArcSec,
    /// The point's own 1-sigma uncertainty, arcseconds
    pub sigma: ArcSec,
}

/// RA and Dec residuals of one subset (included or excluded points).
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ResidualSeries {
    pub ra: Vec<ResidualPoint>,
    pub dec: Vec<ResidualPoint>,
}

impl ResidualSeries {
    pub fn len(&self) -> usize {
        self.ra.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ra.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FitResult {
    pub epoch: EpochLabel,
    /// Row whose rms values set the zero-aperture uncertainty
    pub template_row: RowId,
    pub slope_ra: f64,
    pub intercept_ra: Degree,
    pub slope_dec: f64,
    pub intercept_dec: Degree,
    /// Zero-aperture RA after the precision policy, degrees
    pub ra0: Degree,
    /// Zero-aperture Dec after the precision policy, degrees
    pub dec0: Degree,
    pub ra0_err: ArcSec,
    pub dec0_err: ArcSec,
    /// `false` when no weights were applied (uniform weighting or unweighted retry)
    pub weighted: bool,
    pub included: ResidualSeries,
    pub excluded: ResidualSeries,
}

impl FitResult {
    /// Offset of the fitted lines from the zero point at aperture `phot_ap`.
    ///
    /// Return
    /// ----------
    /// * `(ΔRA·cos(dec0), ΔDec)` in arcseconds, the curve drawn through the residuals.
    pub fn model_offset_at(&self, phot_ap: Aperture) -> (ArcSec, ArcSec) {
        let cos_dec0 = (self.dec0 * RADEG).cos();
        let ra = self.slope_ra * phot_ap + self.intercept_ra;
        let dec = self.slope_dec * phot_ap + self.intercept_dec;
        (
            cos_dec0 * (ra - self.ra0) * ARCSEC_PER_DEGREE,
            (dec - self.dec0) * ARCSEC_PER_DEGREE,
        )
    }

    pub fn n_included(&self) -> usize {
        self.included.len()
    }

    pub fn n_excluded(&self) -> usize {
        self.excluded.len()
    }
}

impl fmt::Display for FitResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Zero-aperture fit for {}", self.epoch)?;
        writeln!(
            f,
            "  RA : {}° ± {}\"  (slope {:.6e} deg/ap)",
            self.ra0, self.ra0_err, self.slope_ra
        )?;
        writeln!(
            f,
            "  Dec: {}° ± {}\"  (slope {:.6e} deg/ap)",
            self.dec0, self.dec0_err, self.slope_dec
        )?;
        write!(
            f,
            "  points: {} included, {} excluded, template row {}{}",
            self.n_included(),
            self.n_excluded(),
            self.template_row,
            if self.weighted { "" } else { " (unweighted)" }
        )
    }
}

/// Why a group produced no fit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum InsufficientReason {
    /// Fewer usable included points than required.
    TooFewPoints { usable: usize, required: usize },
    /// The template row lacks the rms values the uncertainty is derived from.
    TemplateUnusable(RowId),
    /// The regression or the rounding hit a non-finite value.
    NumericFailure(String),
}

impl fmt::Display for InsufficientReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InsufficientReason::TooFewPoints { usable, required } => {
                write!(f, "{usable} usable point(s), at least {required} required")
            }
            InsufficientReason::TemplateUnusable(row) => {
                write!(f, "template row {row} has no usable rms values")
            }
            InsufficientReason::NumericFailure(msg) => write!(f, "numerical failure: {msg}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum FitOutcome {
    Fitted(FitResult),
    InsufficientData(InsufficientReason),
}

impl FitOutcome {
    pub fn is_fitted(&self) -> bool {
        matches!(self, FitOutcome::Fitted(_))
    }

    pub fn fitted(&self) -> Option<&FitResult> {
        match self {
            FitOutcome::Fitted(result) => Some(result),
            FitOutcome::InsufficientData(_) => None,
        }
    }

    pub fn into_fitted(self) -> Option<FitResult> {
        match self {
            FitOutcome::Fitted(result) => Some(result),
            FitOutcome::InsufficientData(_) => None,
        }
    }
}
