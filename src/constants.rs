//! # Constants and type definitions for apzero
//!
//! This module centralizes the **unit conversions**, the **column names** of the
//! observation schema, the default values of the calibration policy, and the
//! **type aliases** used throughout the crate.
//!
//! ## Overview
//!
//! - Angle conversions (degrees ↔ arcseconds ↔ radians)
//! - Core type aliases (`Degree`, `ArcSec`, `RowId`, …)
//! - Names of the columns the calibration engine reads from a source table
//! - Defaults of [`CalibrationParams`](crate::calibration::CalibrationParams)

// -------------------------------------------------------------------------------------------------
// Unit conversions
// -------------------------------------------------------------------------------------------------

/// Arcseconds in one degree
pub const ARCSEC_PER_DEGREE: f64 = 3600.0;

/// Degrees → radians
pub const RADEG: f64 = std::f64::consts::PI / 180.0;

// -------------------------------------------------------------------------------------------------
// Type aliases
// -------------------------------------------------------------------------------------------------

/// Angle in degrees
pub type Degree = f64;
/// Angle in arcseconds
pub type ArcSec = f64;
/// Photometric aperture size (instrument units)
pub type Aperture = f64;
/// Stable identifier of a row, assigned when the table is built
pub type RowId = usize;
/// Epoch label of an observation group (normalized, see [`crate::groups::normalize_epoch`])
pub type EpochLabel = String;

// -------------------------------------------------------------------------------------------------
// Source table schema
// -------------------------------------------------------------------------------------------------

/// Epoch label column, the grouping key
pub const OBS_TIME_COLUMN: &str = "obsTime";
/// Right ascension column (degrees)
pub const RA_COLUMN: &str = "ra";
/// Declination column (degrees)
pub const DEC_COLUMN: &str = "dec";
/// Photometric aperture column
pub const PHOT_AP_COLUMN: &str = "photAp";
/// 1-sigma RA uncertainty column (arcseconds)
pub const RMS_RA_COLUMN: &str = "rmsRA";
/// 1-sigma Dec uncertainty column (arcseconds)
pub const RMS_DEC_COLUMN: &str = "rmsDec";
/// Free text notes column
pub const NOTES_COLUMN: &str = "notes";

/// Columns that must be present in any source table.
pub const REQUIRED_COLUMNS: [&str; 2] = [OBS_TIME_COLUMN, PHOT_AP_COLUMN];

/// Columns holding numeric values, coerced when the table is built.
pub const NUMERIC_COLUMNS: [&str; 5] = [
    RA_COLUMN,
    DEC_COLUMN,
    PHOT_AP_COLUMN,
    RMS_RA_COLUMN,
    RMS_DEC_COLUMN,
];

// -------------------------------------------------------------------------------------------------
// Calibration policy defaults
// -------------------------------------------------------------------------------------------------

/// Minimum number of usable included points for a fit
pub const MIN_FIT_POINTS: usize = 2;

/// Zero-aperture uncertainty = this factor × template rms
pub const DEFAULT_UNCERTAINTY_SCALE: f64 = 2.0;

/// Floor applied before taking `log10` of an uncertainty
pub const UNCERTAINTY_FLOOR: f64 = 1e-12;

/// Prefix marking the notes of a derived row
pub const DERIVED_NOTE_FLAG: char = 'e';
