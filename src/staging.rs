//! # Staging and confirmation
//!
//! A group's calibrated row goes through two steps before it lands in the derived
//! collection:
//!
//! ```text
//!   EMPTY ──stage──▶ STAGED ──confirm──▶ EMPTY   (row appended)
//!     ▲                │
//!     └────discard─────┘   (group change, reload, failed refit)
//! ```
//!
//! [`StagingArea`] holds at most one [`StagedRow`] per group. Staging overwrites,
//! it never merges, so a staged row always comes from the latest fit of its group.
//! Groups never share staging state.
use std::collections::{hash_map::Entry, HashMap};

use serde::Serialize;

use crate::{
    calibration::fit_result::FitResult,
    constants::{EpochLabel, RowId},
    derived::DerivedRow,
    groups::normalize_epoch,
    observations::Observation,
};

/// A computed but unconfirmed calibrated observation.
///
/// The observation is a copy of the template row with the position and its
/// uncertainties replaced by the zero-aperture values, and the notes prefixed
/// by the derived flag. `row` is the same observation laid out in source column order,
/// the exact value appended on confirmation.
#[derive(Debug, Clone, PartialEq)]
pub struct StagedRow {
    pub epoch: EpochLabel,
    pub template_row: RowId,
    pub observation: Observation,
    pub row: DerivedRow,
    /// Whether the fit behind this row was weighted
    pub weighted: bool,
}

impl StagedRow {
    /// Build the candidate row from a fit.
    ///
    /// Arguments
    /// -----------------
    /// * `template`: the picked observation.
    /// * `fit`: the fit of its group.
    /// * `columns`: column order of the source table.
    /// * `note_flag`: prefix added to the notes.
    pub fn from_fit(
        template: &Observation,
        fit: &FitResult,
        columns: &[String],
        note_flag: char,
    ) -> Self {
        let mut observation = template.clone();
        observation.ra = Some(fit.ra0);
        observation.dec = Some(fit.dec0);
        observation.rms_ra = Some(fit.ra0_err);
        observation.rms_dec = Some(fit.dec0_err);
        observation.notes = format!("{note_flag}{}", template.notes);

        StagedRow {
            epoch: fit.epoch.clone(),
            template_row: template.row_id,
            row: DerivedRow::from_observation(&observation, columns),
            observation,
            weighted: fit.weighted,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StagingState {
    Empty,
    Staged,
}

/// Result of a confirmation.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfirmOutcome {
    /// The staged row was appended to the derived collection at `position`.
    Appended { position: usize, row: DerivedRow },
    /// The group had no staged row.
    NothingToConfirm,
}

impl ConfirmOutcome {
    pub fn is_appended(&self) -> bool {
        matches!(self, ConfirmOutcome::Appended { .. })
    }
}

/// Pending rows, one per group at most.
#[derive(Debug, Clone, Default)]
pub struct StagingArea {
    staged: HashMap<EpochLabel, StagedRow>,
}

impl StagingArea {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage `row` for its group, replacing any previous candidate.
    pub fn stage(&mut self, row: StagedRow) -> &StagedRow {
        match self.staged.entry(row.epoch.clone()) {
            Entry::Occupied(mut slot) => {
                slot.insert(row);
                slot.into_mut()
            }
            Entry::Vacant(slot) => slot.insert(row),
        }
    }

    pub fn get(&self, epoch: &str) -> Option<&StagedRow> {
        self.staged.get(&normalize_epoch(epoch))
    }

    pub fn state(&self, epoch: &str) -> StagingState {
        if self.get(epoch).is_some() {
            StagingState::Staged
        } else {
            StagingState::Empty
        }
    }

    /// Remove and return the candidate of `epoch`, leaving the group `EMPTY`.
    pub fn take(&mut self, epoch: &str) -> Option<StagedRow> {
        self.staged.remove(&normalize_epoch(epoch))
    }

    /// Return
    /// ----------
    /// * `true` if a candidate was discarded.
    pub fn discard(&mut self, epoch: &str) -> bool {
        self.take(epoch).is_some()
    }

    pub fn clear(&mut self) {
        self.staged.clear();
    }

    pub fn len(&self) -> usize {
        self.staged.len()
    }

    pub fn is_empty(&self) -> bool {
        self.staged.is_empty()
    }
}
