//! # Observations
//!
//! One [`Observation`] is one measured row of a source table: an epoch label, an
//! equatorial position in **degrees**, a photometric aperture, 1-sigma positional
//! uncertainties in **arcseconds**, free text notes, and every other column of
//! the source schema carried verbatim as a passthrough [`CellValue`].
//!
//! The numeric fields are `Option`s: a value is either a finite number or absent,
//! never a partially parsed string. An observation lacking any of the five fields
//! needed by the fit (`ra`, `dec`, `photAp`, `rmsRA`, `rmsDec`) still belongs to
//! its table and group but yields no [`FitPoint`].
//!
//! ## See also
//! ------------
//! * [`ObservationTable`](crate::observations::table::ObservationTable) – Ordered rows plus column order.
//! * [`FitPoint`] – The fully numeric view used by the calibration fitter.
pub mod table;

use std::collections::BTreeMap;

use serde::Serialize;

use crate::constants::{
    Aperture, ArcSec, Degree, EpochLabel, RowId, DEC_COLUMN, NOTES_COLUMN, OBS_TIME_COLUMN,
    PHOT_AP_COLUMN, RA_COLUMN, RMS_DEC_COLUMN, RMS_RA_COLUMN,
};

/// A single cell of a source or derived row.
///
/// Serialised untagged: numbers as JSON numbers, text as strings, `Missing` as `null`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CellValue {
    Number(f64),
    Text(String),
    Missing,
}

impl CellValue {
    /// Wrap a raw text cell, mapping blank text to [`CellValue::Missing`].
    pub fn from_raw(raw: &str) -> Self {
        if raw.trim().is_empty() {
            CellValue::Missing
        } else {
            CellValue::Text(raw.to_string())
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, CellValue::Missing)
    }
}

impl From<Option<f64>> for CellValue {
    fn from(value: Option<f64>) -> Self {
        value.map_or(CellValue::Missing, CellValue::Number)
    }
}

impl std::fmt::Display for CellValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CellValue::Number(v) => write!(f, "{v}"),
            CellValue::Text(s) => write!(f, "{s}"),
            CellValue::Missing => Ok(()),
        }
    }
}

/// A measured row of the source table.
///
/// # Fields
///
/// * `row_id` - Stable identifier assigned when the table was built (position of the raw record)
/// * `epoch` - Normalized epoch label, the grouping key
/// * `ra`, `dec` - Position in degrees
/// * `phot_ap` - Photometric aperture size
/// * `rms_ra`, `rms_dec` - 1-sigma uncertainties in arcseconds
/// * `notes` - Free text notes (empty when the cell was blank)
/// * `passthrough` - Every other column, verbatim
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub row_id: RowId,
    pub epoch: EpochLabel,
    pub ra: Option<Degree>,
    pub dec: Option<Degree>,
    pub phot_ap: Option<Aperture>,
    pub rms_ra: Option<ArcSec>,
    pub rms_dec: Option<ArcSec>,
    pub notes: String,
    pub passthrough: BTreeMap<String, CellValue>,
}

/// The fully numeric view of an [`Observation`], available only when all five
/// fit fields are present.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitPoint {
    pub row_id: RowId,
    pub phot_ap: Aperture,
    pub ra: Degree,
    pub dec: Degree,
    pub rms_ra: ArcSec,
    pub rms_dec: ArcSec,
}

impl Observation {
    /// Create an observation with no passthrough columns and empty notes.
    pub fn new(
        row_id: RowId,
        epoch: impl Into<EpochLabel>,
        ra: Option<Degree>,
        dec: Option<Degree>,
        phot_ap: Option<Aperture>,
        rms_ra: Option<ArcSec>,
        rms_dec: Option<ArcSec>,
    ) -> Self {
        Observation {
            row_id,
            epoch: epoch.into(),
            ra,
            dec,
            phot_ap,
            rms_ra,
            rms_dec,
            notes: String::new(),
            passthrough: BTreeMap::new(),
        }
    }

    /// Numeric view used by the fitter, `None` if any of the five fields is absent.
    pub fn fit_point(&self) -> Option<FitPoint> {
        Some(FitPoint {
            row_id: self.row_id,
            phot_ap: self.phot_ap?,
            ra: self.ra?,
            dec: self.dec?,
            rms_ra: self.rms_ra?,
            rms_dec: self.rms_dec?,
        })
    }

    pub fn is_usable(&self) -> bool {
        self.fit_point().is_some()
    }

    /// Value of any column of the source schema for this row.
    ///
    /// Core columns are read from the typed fields, anything else from the
    /// passthrough map. Unknown columns read as [`CellValue::Missing`].
    pub fn cell(&self, column: &str) -> CellValue {
        match column {
            OBS_TIME_COLUMN => CellValue::Text(self.epoch.clone()),
            RA_COLUMN => self.ra.into(),
            DEC_COLUMN => self.dec.into(),
            PHOT_AP_COLUMN => self.phot_ap.into(),
            RMS_RA_COLUMN => self.rms_ra.into(),
            RMS_DEC_COLUMN => self.rms_dec.into(),
            NOTES_COLUMN => CellValue::Text(self.notes.clone()),
            other => self
                .passthrough
                .get(other)
                .cloned()
                .unwrap_or(CellValue::Missing),
        }
    }
}

#[cfg(test)]
mod observation_test {
    use super::*;

    fn sample() -> Observation {
        let mut obs = Observation::new(
            3,
            "2024-01-01T00:00",
            Some(10.5),
            Some(-5.25),
            Some(2.0),
            Some(0.02),
            Some(0.03),
        );
        obs.notes = "K".to_string();
        obs.passthrough
            .insert("stn".to_string(), CellValue::Text("F51".to_string()));
        obs
    }

    #[test]
    fn test_fit_point_requires_all_fields() {
        let obs = sample();
        let point = obs.fit_point().unwrap();
        assert_eq!(point.row_id, 3);
        assert_eq!(point.phot_ap, 2.0);

        let mut partial = sample();
        partial.rms_dec = None;
        assert!(partial.fit_point().is_none());
        assert!(!partial.is_usable());
    }

    #[test]
    fn test_cell_lookup() {
        let obs = sample();
        assert_eq!(obs.cell("ra"), CellValue::Number(10.5));
        assert_eq!(obs.cell("notes"), CellValue::Text("K".to_string()));
        assert_eq!(obs.cell("stn"), CellValue::Text("F51".to_string()));
        assert_eq!(obs.cell("mag"), CellValue::Missing);
    }

    #[test]
    fn test_cell_value_from_raw() {
        assert_eq!(CellValue::from_raw("  "), CellValue::Missing);
        assert_eq!(CellValue::from_raw("abc"), CellValue::Text("abc".into()));
    }
}
