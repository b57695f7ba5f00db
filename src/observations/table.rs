//! # Observation table
//!
//! [`ObservationTable`] is the in-memory form of a loaded source file: the source
//! column order plus the ordered [`Observation`] rows. Reading the file itself
//! (delimited text, XML) is the loader's business; this module only turns already
//! split records into typed rows.
//!
//! ## Construction rules
//!
//! - Header names are trimmed and must be unique once trimmed.
//! - `obsTime` and `photAp` columns are required.
//! - Records whose `obsTime` cell is blank are dropped.
//! - The **position of the raw record** becomes its `row_id`, so identifiers stay
//!   stable whatever the later filtering or display order.
//! - `ra`, `dec`, `photAp`, `rmsRA`, `rmsDec` are coerced to numbers: anything that
//!   does not parse to a finite `f64` becomes absent.
//! - Every other column is kept verbatim as passthrough text.
use std::collections::BTreeMap;

use itertools::Itertools;

use crate::{
    apzero_errors::ApZeroError,
    constants::{
        RowId, DEC_COLUMN, NOTES_COLUMN, NUMERIC_COLUMNS, OBS_TIME_COLUMN, PHOT_AP_COLUMN,
        RA_COLUMN, REQUIRED_COLUMNS, RMS_DEC_COLUMN, RMS_RA_COLUMN,
    },
    groups::normalize_epoch,
};

use super::{CellValue, Observation};

/// Identity of the loaded source (typically the uploaded file name).
///
/// Loading a table under a different identity discards every working set and
/// staged row of the session.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceId(String);

impl SourceId {
    pub fn new(id: impl Into<String>) -> Self {
        SourceId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SourceId {
    fn from(s: &str) -> Self {
        SourceId(s.to_string())
    }
}

impl From<String> for SourceId {
    fn from(s: String) -> Self {
        SourceId(s)
    }
}

impl std::fmt::Display for SourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ObservationTable {
    columns: Vec<String>,
    rows: Vec<Observation>,
}

impl ObservationTable {
    /// Build a table from a header and split records.
    ///
    /// Arguments
    /// -----------------
    /// * `columns`: header names, in source order.
    /// * `records`: one iterator of raw cells per record, aligned with `columns`.
    ///
    /// Return
    /// ----------
    /// * The typed table, or
    ///   - [`ApZeroError::DuplicateColumn`] if two header names are equal after trimming,
    ///   - [`ApZeroError::MissingColumn`] if `obsTime` or `photAp` is absent from the header,
    ///   - [`ApZeroError::RaggedRecord`] if a record does not have one cell per column.
    pub fn from_records<C, S, I, R, T>(columns: C, records: I) -> Result<Self, ApZeroError>
    where
        C: IntoIterator<Item = S>,
        S: AsRef<str>,
        I: IntoIterator<Item = R>,
        R: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        let columns: Vec<String> = columns
            .into_iter()
            .map(|c| c.as_ref().trim().to_string())
            .collect();

        if let Some(duplicate) = columns.iter().duplicates().next() {
            return Err(ApZeroError::DuplicateColumn(duplicate.clone()));
        }

        for required in REQUIRED_COLUMNS {
            if !columns.iter().any(|c| c == required) {
                return Err(ApZeroError::MissingColumn(required.to_string()));
            }
        }

        let mut rows = Vec::new();
        for (row_id, record) in records.into_iter().enumerate() {
            let cells: Vec<T> = record.into_iter().collect();
            if cells.len() != columns.len() {
                return Err(ApZeroError::RaggedRecord {
                    row: row_id,
                    expected: columns.len(),
                    found: cells.len(),
                });
            }

            let by_name: BTreeMap<&str, &str> = columns
                .iter()
                .map(String::as_str)
                .zip(cells.iter().map(AsRef::as_ref))
                .collect();

            if let Some(obs) = observation_from_cells(row_id, &by_name) {
                rows.push(obs);
            }
        }

        Ok(ObservationTable { columns, rows })
    }

    /// Build a table from already typed rows.
    ///
    /// The caller is responsible for row id uniqueness; epoch labels are normalized.
    pub fn from_observations(columns: Vec<String>, rows: Vec<Observation>) -> Self {
        let rows = rows
            .into_iter()
            .map(|mut obs| {
                obs.epoch = normalize_epoch(&obs.epoch);
                obs
            })
            .collect();
        ObservationTable { columns, rows }
    }

    /// Source column order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Observation] {
        &self.rows
    }

    pub fn row(&self, row_id: RowId) -> Option<&Observation> {
        self.rows.iter().find(|obs| obs.row_id == row_id)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Coerce a raw cell into a finite number, or absent.
pub fn coerce_numeric(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

fn observation_from_cells(row_id: RowId, by_name: &BTreeMap<&str, &str>) -> Option<Observation> {
    let epoch = normalize_epoch(by_name.get(OBS_TIME_COLUMN)?);
    if epoch.is_empty() {
        return None;
    }

    let numeric = |column: &str| by_name.get(column).and_then(|raw| coerce_numeric(raw));

    let passthrough = by_name
        .iter()
        .filter(|(name, _)| {
            let name: &str = name;
            name != OBS_TIME_COLUMN && name != NOTES_COLUMN && !NUMERIC_COLUMNS.contains(&name)
        })
        .map(|(name, raw)| (name.to_string(), CellValue::from_raw(raw)))
        .collect();

    Some(Observation {
        row_id,
        epoch,
        ra: numeric(RA_COLUMN),
        dec: numeric(DEC_COLUMN),
        phot_ap: numeric(PHOT_AP_COLUMN),
        rms_ra: numeric(RMS_RA_COLUMN),
        rms_dec: numeric(RMS_DEC_COLUMN),
        notes: by_name
            .get(NOTES_COLUMN)
            .map(|s| s.to_string())
            .unwrap_or_default(),
        passthrough,
    })
}
