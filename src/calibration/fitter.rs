//! # Calibration fitter
//!
//! Turns one epoch group and its working set into a [`FitOutcome`].
//!
//! The fitter never fails past its boundary: every numerical problem (zero or
//! non-finite uncertainties with no fallback left, non-finite coordinates,
//! non-finite rounded values) is reported as
//! [`FitOutcome::InsufficientData`] with [`InsufficientReason::NumericFailure`].
//!
//! ## Template row
//!
//! The zero-aperture uncertainty comes from one row of the group, the *template*:
//!
//! - the picked row, looked up among the included rows first and then in the whole
//!   group (a picked row may itself be excluded from the fit);
//! - without a pick, the first usable included row.
use log::{debug, warn};

use crate::{
    apzero_errors::ApZeroError,
    constants::{ArcSec, Degree, EpochLabel, RowId, ARCSEC_PER_DEGREE, RADEG},
    groups::normalize_epoch,
    observations::{FitPoint, Observation},
    precision::format_with_floor,
    working_set::{Partition, WorkingSet},
};

use super::{
    fit_result::{FitOutcome, FitResult, InsufficientReason, ResidualPoint, ResidualSeries},
    linear_fit::{weighted_linear_fit, LinearFit},
    CalibrationParams, Weighting,
};

/// Everything the fitter needs from one group.
#[derive(Debug, Clone, PartialEq)]
pub struct FitInput<'a> {
    pub epoch: EpochLabel,
    /// Usable points of the included rows, table order
    pub included: Vec<FitPoint>,
    /// Usable points of the excluded rows, table order
    pub excluded: Vec<FitPoint>,
    /// Picked row id, if any
    pub picked: Option<RowId>,
    /// Resolved template row
    pub template: Option<&'a Observation>,
}

impl<'a> FitInput<'a> {
    /// Split a group according to its working set.
    ///
    /// Arguments
    /// -----------------
    /// * `epoch`: label of the group.
    /// * `group`: the group's rows, table order.
    /// * `working_set`: exclusions and pick of the group.
    pub fn from_group(epoch: &str, group: &[&'a Observation], working_set: &WorkingSet) -> Self {
        let partition = Partition::of(group, working_set);
        let lookup = |id: &RowId| group.iter().copied().find(|obs| obs.row_id == *id);

        let usable = |ids: &[RowId]| -> Vec<FitPoint> {
            ids.iter()
                .filter_map(lookup)
                .filter_map(Observation::fit_point)
                .collect()
        };

        let picked = working_set.picked();
        let template = match picked {
            Some(id) => partition
                .included
                .iter()
                .find(|included| **included == id)
                .and_then(lookup)
                .or_else(|| lookup(&id)),
            None => partition
                .included
                .iter()
                .filter_map(lookup)
                .find(|obs| obs.is_usable()),
        };

        FitInput {
            epoch: normalize_epoch(epoch),
            included: usable(&partition.included),
            excluded: usable(&partition.excluded),
            picked,
            template,
        }
    }
}

/// Fit the group and extrapolate to aperture = 0.
///
/// Arguments
/// -----------------
/// * `input`: the split group, see [`FitInput::from_group`].
/// * `params`: calibration parameters.
///
/// Return
/// ----------
/// * [`FitOutcome::Fitted`] with the rounded zero point and residual series, or
///   [`FitOutcome::InsufficientData`] with the reason.
pub fn calibrate(input: &FitInput<'_>, params: &CalibrationParams) -> FitOutcome {
    let usable = input.included.len();
    if usable < params.min_points {
        debug!(
            "{}: {usable} usable included point(s), {} required",
            input.epoch, params.min_points
        );
        return FitOutcome::InsufficientData(InsufficientReason::TooFewPoints {
            usable,
            required: params.min_points,
        });
    }

    let template = match (input.template, input.picked) {
        (Some(template), _) => template,
        (None, Some(id)) => {
            return FitOutcome::InsufficientData(InsufficientReason::TemplateUnusable(id))
        }
        (None, None) => {
            return FitOutcome::InsufficientData(InsufficientReason::TooFewPoints {
                usable: 0,
                required: params.min_points,
            })
        }
    };
    let (Some(rms_ra), Some(rms_dec)) = (template.rms_ra, template.rms_dec) else {
        return FitOutcome::InsufficientData(InsufficientReason::TemplateUnusable(
            template.row_id,
        ));
    };

    let (ra_fit, dec_fit, weighted) = match fit_axes(&input.included, params) {
        Ok(fits) => fits,
        Err(err) => {
            warn!("{}: fit abandoned: {err}", input.epoch);
            return FitOutcome::InsufficientData(InsufficientReason::NumericFailure(
                err.to_string(),
            ));
        }
    };

    let ra0 = format_with_floor(
        ra_fit.intercept,
        params.uncertainty_scale * rms_ra,
        params.uncertainty_floor,
    );
    let dec0 = format_with_floor(
        dec_fit.intercept,
        params.uncertainty_scale * rms_dec,
        params.uncertainty_floor,
    );

    if [ra0.value, dec0.value, ra0.uncertainty, dec0.uncertainty]
        .iter()
        .any(|v| !v.is_finite())
    {
        warn!("{}: non-finite zero-aperture values", input.epoch);
        return FitOutcome::InsufficientData(InsufficientReason::NumericFailure(
            "non-finite zero-aperture position or uncertainty".into(),
        ));
    }

    let cos_dec0 = (dec0.value * RADEG).cos();
    debug!(
        "{}: ra0 = {} ± {}\", dec0 = {} ± {}\" from {usable} point(s), template row {}",
        input.epoch, ra0.value, ra0.uncertainty, dec0.value, dec0.uncertainty, template.row_id
    );

    FitOutcome::Fitted(FitResult {
        epoch: input.epoch.clone(),
        template_row: template.row_id,
        slope_ra: ra_fit.slope,
        intercept_ra: ra_fit.intercept,
        slope_dec: dec_fit.slope,
        intercept_dec: dec_fit.intercept,
        ra0: ra0.value,
        dec0: dec0.value,
        ra0_err: ra0.uncertainty,
        dec0_err: dec0.uncertainty,
        weighted,
        included: residuals(&input.included, ra0.value, dec0.value, cos_dec0),
        excluded: residuals(&input.excluded, ra0.value, dec0.value, cos_dec0),
    })
}

/// Fit RA and Dec against aperture, retrying unweighted if allowed.
///
/// Return
/// ----------
/// * `(ra_fit, dec_fit, weighted)`, where `weighted` tells whether weights were applied.
fn fit_axes(
    points: &[FitPoint],
    params: &CalibrationParams,
) -> Result<(LinearFit, LinearFit, bool), ApZeroError> {
    let x: Vec<f64> = points.iter().map(|p| p.phot_ap).collect();
    let ra: Vec<Degree> = points.iter().map(|p| p.ra).collect();
    let dec: Vec<Degree> = points.iter().map(|p| p.dec).collect();

    // σ in degrees, like the coordinates
    let weights = |sigma: fn(&FitPoint) -> ArcSec| -> Option<Vec<f64>> {
        points
            .iter()
            .map(|p| params.weighting.weight(sigma(p) / ARCSEC_PER_DEGREE))
            .collect()
    };
    let w_ra = weights(|p| p.rms_ra);
    let w_dec = weights(|p| p.rms_dec);

    let is_weighted = params.weighting != Weighting::Uniform;
    match fit_pair(&x, &ra, &dec, w_ra.as_deref(), w_dec.as_deref()) {
        Ok((ra_fit, dec_fit)) => Ok((ra_fit, dec_fit, is_weighted)),
        Err(err) if is_weighted && params.unweighted_fallback => {
            debug!("weighted fit failed ({err}), retrying unweighted");
            let (ra_fit, dec_fit) = fit_pair(&x, &ra, &dec, None, None)?;
            Ok((ra_fit, dec_fit, false))
        }
        Err(err) => Err(err),
    }
}

fn fit_pair(
    x: &[f64],
    ra: &[Degree],
    dec: &[Degree],
    w_ra: Option<&[f64]>,
    w_dec: Option<&[f64]>,
) -> Result<(LinearFit, LinearFit), ApZeroError> {
    Ok((
        weighted_linear_fit(x, ra, w_ra)?,
        weighted_linear_fit(x, dec, w_dec)?,
    ))
}

fn residuals(points: &[FitPoint], ra0: Degree, dec0: Degree, cos_dec0: f64) -> ResidualSeries {
    ResidualSeries {
        ra: points
            .iter()
            .map(|p| ResidualPoint {
                row_id: p.row_id,
                phot_ap: p.phot_ap,
                offset: cos_dec0 * (p.ra - ra0) * ARCSEC_PER_DEGREE,
                sigma: p.rms_ra,
            })
            .collect(),
        dec: points
            .iter()
            .map(|p| ResidualPoint {
                row_id: p.row_id,
                phot_ap: p.phot_ap,
                offset: (p.dec - dec0) * ARCSEC_PER_DEGREE,
                sigma: p.rms_dec,
            })
            .collect(),
    }
}
