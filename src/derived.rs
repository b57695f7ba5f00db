//! # Derived collection
//!
//! Confirmed calibrated rows, in confirmation order. The collection outlives the
//! source file they were computed from: loading another table never touches it.
//!
//! Storage is behind the [`DerivedStore`] trait so a host can plug its own
//! persistence; [`InMemoryDerivedStore`] keeps the rows in a `Vec`.
//!
//! A [`DerivedRow`] is a flat, ordered list of cells following the column order of
//! the source table it came from. It serialises as a map in that order, which is the
//! row-dict layout hosts persist.
use std::collections::BTreeSet;

use log::info;
use serde::{ser::SerializeMap, Serialize, Serializer};

use crate::{
    apzero_errors::ApZeroError,
    observations::{CellValue, Observation},
};

/// One confirmed calibrated row.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DerivedRow {
    cells: Vec<(String, CellValue)>,
}

impl DerivedRow {
    /// Lay out `observation` in `columns` order.
    pub fn from_observation(observation: &Observation, columns: &[String]) -> Self {
        DerivedRow {
            cells: columns
                .iter()
                .map(|column| (column.clone(), observation.cell(column)))
                .collect(),
        }
    }

    pub fn cells(&self) -> &[(String, CellValue)] {
        &self.cells
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.cells.iter().map(|(column, _)| column.as_str())
    }

    pub fn get(&self, column: &str) -> Option<&CellValue> {
        self.cells
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

impl Serialize for DerivedRow {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.cells.len()))?;
        for (column, value) in &self.cells {
            map.serialize_entry(column, value)?;
        }
        map.end()
    }
}

/// Append-only ordered storage of confirmed rows.
///
/// Implementors must keep confirmation order, and positional deletion must never
/// reorder the surviving rows.
pub trait DerivedStore {
    /// All rows, confirmation order.
    fn rows(&self) -> &[DerivedRow];

    /// Append a row.
    ///
    /// Return
    /// ----------
    /// * The position of the new row.
    fn push(&mut self, row: DerivedRow) -> usize;

    /// Delete the rows at `positions`.
    ///
    /// Duplicate positions are ignored. If any position is out of range nothing is
    /// deleted.
    ///
    /// Return
    /// ----------
    /// * The number of deleted rows, or [`ApZeroError::InvalidDerivedPosition`].
    fn delete_positions(&mut self, positions: &[usize]) -> Result<usize, ApZeroError>;

    /// Drop every row.
    fn clear(&mut self);

    fn len(&self) -> usize {
        self.rows().len()
    }

    fn is_empty(&self) -> bool {
        self.rows().is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct InMemoryDerivedStore {
    rows: Vec<DerivedRow>,
}

impl InMemoryDerivedStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DerivedStore for InMemoryDerivedStore {
    fn rows(&self) -> &[DerivedRow] {
        &self.rows
    }

    fn push(&mut self, row: DerivedRow) -> usize {
        self.rows.push(row);
        self.rows.len() - 1
    }

    fn delete_positions(&mut self, positions: &[usize]) -> Result<usize, ApZeroError> {
        let len = self.rows.len();
        if let Some(&position) = positions.iter().find(|&&p| p >= len) {
            return Err(ApZeroError::InvalidDerivedPosition { position, len });
        }

        let doomed: BTreeSet<usize> = positions.iter().copied().collect();
        let mut index = 0;
        self.rows.retain(|_| {
            let keep = !doomed.contains(&index);
            index += 1;
            keep
        });

        info!("deleted {} derived row(s), {} left", doomed.len(), self.rows.len());
        Ok(doomed.len())
    }

    fn clear(&mut self) {
        self.rows.clear();
    }
}
