//! # Calibration session
//!
//! [`Session`] is the explicit context of one user's calibration work. It owns every
//! piece of mutable state the engine needs and exposes all the operations a host
//! (web handler, CLI, notebook) calls:
//!
//! | Operation | Effect |
//! |---|---|
//! | [`load_source`](Session::load_source) | install a parsed table, discarding file-scoped state when the source changes |
//! | [`list_groups`](Session::list_groups) | ordered `(epoch, count)` index |
//! | [`select_group`](Session::select_group) | change the active group, resetting staging |
//! | [`set_excluded`](Session::set_excluded) / [`set_picked`](Session::set_picked) / [`update_working_set`](Session::update_working_set) | edit a working set, then restage |
//! | [`fit`](Session::fit) | run the calibration of a group |
//! | [`stage`](Session::stage) | recompute and hold the group's candidate row |
//! | [`confirm`](Session::confirm) | append the candidate to the derived collection |
//! | [`delete_derived`](Session::delete_derived) / [`clear_derived`](Session::clear_derived) | edit the derived collection |
//!
//! ## State lifecycle
//!
//! * **Source-scoped**: working sets and staged rows. Dropped by loading a different
//!   source, by [`unload_source`](Session::unload_source) and by [`reset`](Session::reset).
//!   Reloading the *same* source keeps the working sets, minus any row id that no
//!   longer belongs to its group, and empties staging.
//! * **Selection-scoped**: staging is emptied whenever the active group changes.
//! * **Session-scoped**: the derived collection, only dropped by `reset` or `clear_derived`.
//!
//! Every mutating operation validates its arguments before writing anything, so an
//! `Err` always leaves the session as it was.
//!
//! ## Staging policy
//!
//! A group is staged only when its working set has a picked row and the fit
//! succeeds. Any working-set edit recomputes the candidate; if the new state cannot
//! be fitted, the previous candidate is discarded rather than kept stale.
//!
//! ## Example
//!
//! ```rust
//! use apzero::observations::table::{ObservationTable, SourceId};
//! use apzero::session::Session;
//! use apzero::staging::ConfirmOutcome;
//!
//! let header = ["obsTime", "ra", "dec", "photAp", "rmsRA", "rmsDec", "notes"];
//! let records = vec![
//!     vec!["2024-01-01T00:00", "150.00002", "-20.5", "1", "0.02", "0.02", ""],
//!     vec!["2024-01-01T00:00", "150.00004", "-20.5", "2", "0.02", "0.02", ""],
//!     vec!["2024-01-01T00:00", "150.00006", "-20.5", "3", "0.02", "0.02", ""],
//! ];
//! let table = ObservationTable::from_records(header, records).unwrap();
//!
//! let mut session = Session::new();
//! session.load_source(SourceId::new("night1.csv"), table);
//!
//! let epoch = session.list_groups().unwrap()[0].epoch.clone();
//! session.update_working_set(&epoch, [], Some(0)).unwrap();
//!
//! let staged = session.stage(&epoch).unwrap().expect("staged row");
//! assert_eq!(staged.observation.notes, "e");
//!
//! assert!(session.confirm(&epoch).unwrap().is_appended());
//! assert_eq!(session.confirm(&epoch).unwrap(), ConfirmOutcome::NothingToConfirm);
//! assert_eq!(session.derived_collection().len(), 1);
//! ```
use log::{info, warn};

use crate::{
    apzero_errors::ApZeroError,
    calibration::{
        fit_result::FitOutcome,
        fitter::{calibrate, FitInput},
        CalibrationParams,
    },
    constants::{EpochLabel, RowId},
    derived::{DerivedRow, DerivedStore, InMemoryDerivedStore},
    groups::{group_rows, normalize_epoch, GroupEntry, GroupIndex},
    observations::{
        table::{ObservationTable, SourceId},
        Observation,
    },
    staging::{ConfirmOutcome, StagedRow, StagingArea, StagingState},
    working_set::{check_membership, WorkingSet, WorkingSets},
};

/// A group row together with its working-set status.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupRow<'a> {
    pub observation: &'a Observation,
    pub excluded: bool,
    pub picked: bool,
}

#[derive(Debug, Clone)]
struct LoadedSource {
    id: SourceId,
    table: ObservationTable,
}

/// Per-user calibration context.
///
/// Generic over the derived row storage; [`InMemoryDerivedStore`] by default.
#[derive(Debug, Clone)]
pub struct Session<S: DerivedStore = InMemoryDerivedStore> {
    params: CalibrationParams,
    source: Option<LoadedSource>,
    active_group: Option<EpochLabel>,
    working_sets: WorkingSets,
    staging: StagingArea,
    derived: S,
}

impl Default for Session<InMemoryDerivedStore> {
    fn default() -> Self {
        Self::new()
    }
}

impl Session<InMemoryDerivedStore> {
    /// Empty session with default calibration parameters.
    pub fn new() -> Self {
        Self::with_params(CalibrationParams::default())
    }

    pub fn with_params(params: CalibrationParams) -> Self {
        Self::with_store(params, InMemoryDerivedStore::new())
    }
}

impl<S: DerivedStore> Session<S> {
    /// Session persisting its derived rows in `store`.
    pub fn with_store(params: CalibrationParams, store: S) -> Self {
        Session {
            params,
            source: None,
            active_group: None,
            working_sets: WorkingSets::new(),
            staging: StagingArea::new(),
            derived: store,
        }
    }

    pub fn params(&self) -> &CalibrationParams {
        &self.params
    }

    // ---------------------------------------------------------------------------------------------
    // Source lifecycle
    // ---------------------------------------------------------------------------------------------

    /// Install a parsed source table.
    ///
    /// Arguments
    /// -----------------
    /// * `id`: identity of the source file.
    /// * `table`: its parsed rows.
    ///
    /// Return
    /// ----------
    /// * `true` if `id` differs from the previously loaded source, in which case the
    ///   working sets and the active group were discarded. On a same-id reload, working
    ///   sets are pruned to the rows each group still holds and the active group is
    ///   cleared if its label disappeared. Staging is emptied either way.
    pub fn load_source(&mut self, id: SourceId, table: ObservationTable) -> bool {
        let changed = self.source.as_ref().map_or(true, |loaded| loaded.id != id);
        if changed {
            self.working_sets.clear_all();
            self.active_group = None;
        } else {
            let pruned = self.working_sets.retain_members(&table);
            if pruned > 0 {
                warn!("reload of {id}: pruned {pruned} working set(s) referring to moved rows");
            }
            let active_gone = self
                .active_group
                .as_deref()
                .is_some_and(|active| group_rows(&table, active).is_empty());
            if active_gone {
                self.active_group = None;
            }
        }
        self.staging.clear();

        info!(
            "loaded source {id} ({} rows, {} columns){}",
            table.len(),
            table.columns().len(),
            if changed { "" } else { ", working sets kept" }
        );
        self.source = Some(LoadedSource { id, table });
        changed
    }

    /// Drop the source table and all state scoped to it. Derived rows are kept.
    pub fn unload_source(&mut self) {
        self.source = None;
        self.active_group = None;
        self.working_sets.clear_all();
        self.staging.clear();
    }

    /// Drop everything, derived rows included.
    pub fn reset(&mut self) {
        self.unload_source();
        self.derived.clear();
        info!("session reset");
    }

    pub fn source_id(&self) -> Option<&SourceId> {
        self.source.as_ref().map(|loaded| &loaded.id)
    }

    pub fn table(&self) -> Option<&ObservationTable> {
        self.source.as_ref().map(|loaded| &loaded.table)
    }

    // ---------------------------------------------------------------------------------------------
    // Groups
    // ---------------------------------------------------------------------------------------------

    /// Epoch groups of the loaded table, in display order.
    pub fn list_groups(&self) -> Result<Vec<GroupEntry>, ApZeroError> {
        Ok(GroupIndex::build(self.loaded_table()?).entries().to_vec())
    }

    /// Change the active group, `None` to clear the selection.
    ///
    /// Any actual change empties the staging of every group. Working sets are kept.
    pub fn select_group(&mut self, epoch: Option<&str>) -> Result<(), ApZeroError> {
        let selection = match epoch {
            Some(label) => Some(self.group(label)?.0),
            None => {
                self.loaded_table()?;
                None
            }
        };

        if selection != self.active_group {
            self.staging.clear();
            info!("active group: {}", selection.as_deref().unwrap_or("<none>"));
            self.active_group = selection;
        }
        Ok(())
    }

    pub fn active_group(&self) -> Option<&str> {
        self.active_group.as_deref()
    }

    /// Rows of a group with their exclusion and pick flags, table order.
    pub fn group_rows(&self, epoch: &str) -> Result<Vec<GroupRow<'_>>, ApZeroError> {
        let (epoch, rows) = self.group(epoch)?;
        let working_set = self.working_sets.get(&epoch);
        Ok(rows
            .into_iter()
            .map(|observation| GroupRow {
                excluded: working_set.is_excluded(observation.row_id),
                picked: working_set.picked() == Some(observation.row_id),
                observation,
            })
            .collect())
    }

    // ---------------------------------------------------------------------------------------------
    // Working sets
    // ---------------------------------------------------------------------------------------------

    pub fn get_working_set(&self, epoch: &str) -> Result<WorkingSet, ApZeroError> {
        let (epoch, _) = self.group(epoch)?;
        Ok(self.working_sets.get(&epoch))
    }

    /// Replace the excluded rows of a group, then restage it.
    pub fn set_excluded(
        &mut self,
        epoch: &str,
        row_ids: impl IntoIterator<Item = RowId>,
    ) -> Result<(), ApZeroError> {
        let row_ids: Vec<RowId> = row_ids.into_iter().collect();
        let (epoch, rows) = self.group(epoch)?;
        check_membership(&epoch, &rows, row_ids.iter().copied())?;

        self.working_sets.set_excluded(&epoch, row_ids);
        self.restage(&epoch)?;
        Ok(())
    }

    /// Pick the template row of a group, then restage it.
    pub fn set_picked(&mut self, epoch: &str, row_id: RowId) -> Result<(), ApZeroError> {
        let (epoch, rows) = self.group(epoch)?;
        check_membership(&epoch, &rows, [row_id])?;

        self.working_sets.set_picked(&epoch, row_id);
        self.restage(&epoch)?;
        Ok(())
    }

    /// Exclusions and pick in one update, as a form submission would send them.
    ///
    /// Arguments
    /// -----------------
    /// * `excluded`: the complete excluded set (replacement semantics).
    /// * `picked`: new template row; `None` keeps the current pick.
    ///
    /// Return
    /// ----------
    /// * The staged row after the update, if the group could be staged.
    pub fn update_working_set(
        &mut self,
        epoch: &str,
        excluded: impl IntoIterator<Item = RowId>,
        picked: Option<RowId>,
    ) -> Result<Option<&StagedRow>, ApZeroError> {
        let excluded: Vec<RowId> = excluded.into_iter().collect();
        let (epoch, rows) = self.group(epoch)?;
        check_membership(&epoch, &rows, excluded.iter().copied().chain(picked))?;

        self.working_sets.set_excluded(&epoch, excluded);
        if let Some(row_id) = picked {
            self.working_sets.set_picked(&epoch, row_id);
        }
        self.restage(&epoch)
    }

    /// Forget the working set and staged row of a group.
    ///
    /// Return
    /// ----------
    /// * `true` if the group had a working set.
    pub fn clear_excluded(&mut self, epoch: &str) -> Result<bool, ApZeroError> {
        let (epoch, _) = self.group(epoch)?;
        self.staging.discard(&epoch);
        Ok(self.working_sets.clear_excluded(&epoch))
    }

    // ---------------------------------------------------------------------------------------------
    // Calibration and staging
    // ---------------------------------------------------------------------------------------------

    /// Calibrate a group with its current working set.
    pub fn fit(&self, epoch: &str) -> Result<FitOutcome, ApZeroError> {
        let (epoch, rows) = self.group(epoch)?;
        let working_set = self.working_sets.get(&epoch);
        let input = FitInput::from_group(&epoch, &rows, &working_set);
        Ok(calibrate(&input, &self.params))
    }

    /// Recompute the candidate row of a group and hold it.
    ///
    /// Return
    /// ----------
    /// * The staged row, or `None` when the group has no pick or cannot be fitted
    ///   (any previous candidate is then discarded).
    pub fn stage(&mut self, epoch: &str) -> Result<Option<&StagedRow>, ApZeroError> {
        let (epoch, _) = self.group(epoch)?;
        self.restage(&epoch)
    }

    /// The candidate currently held for a group, without recomputing it.
    pub fn staged(&self, epoch: &str) -> Option<&StagedRow> {
        self.staging.get(epoch)
    }

    pub fn staging_state(&self, epoch: &str) -> StagingState {
        self.staging.state(epoch)
    }

    /// Move the candidate of a group to the derived collection.
    ///
    /// Return
    /// ----------
    /// * [`ConfirmOutcome::Appended`] with the row and its position, the group is
    ///   `EMPTY` afterwards; [`ConfirmOutcome::NothingToConfirm`] if nothing was staged.
    pub fn confirm(&mut self, epoch: &str) -> Result<ConfirmOutcome, ApZeroError> {
        self.loaded_table()?;
        let Some(staged) = self.staging.take(epoch) else {
            warn!("confirm on {}: nothing staged", normalize_epoch(epoch));
            return Ok(ConfirmOutcome::NothingToConfirm);
        };

        let position = self.derived.push(staged.row.clone());
        info!(
            "confirmed {} (template row {}) at derived position {position}",
            staged.epoch, staged.template_row
        );
        Ok(ConfirmOutcome::Appended {
            position,
            row: staged.row,
        })
    }

    // ---------------------------------------------------------------------------------------------
    // Derived collection
    // ---------------------------------------------------------------------------------------------

    pub fn derived_collection(&self) -> &[DerivedRow] {
        self.derived.rows()
    }

    pub fn derived_store(&self) -> &S {
        &self.derived
    }

    /// Delete derived rows by position, see [`DerivedStore::delete_positions`].
    pub fn delete_derived(&mut self, positions: &[usize]) -> Result<usize, ApZeroError> {
        self.derived.delete_positions(positions)
    }

    pub fn clear_derived(&mut self) {
        self.derived.clear();
        info!("derived collection cleared");
    }

    // ---------------------------------------------------------------------------------------------
    // Internals
    // ---------------------------------------------------------------------------------------------

    fn loaded_table(&self) -> Result<&ObservationTable, ApZeroError> {
        self.source
            .as_ref()
            .map(|loaded| &loaded.table)
            .ok_or(ApZeroError::NoActiveSource)
    }

    /// Normalized label and rows of an existing group.
    fn group(&self, epoch: &str) -> Result<(EpochLabel, Vec<&Observation>), ApZeroError> {
        let table = self.loaded_table()?;
        let epoch = normalize_epoch(epoch);
        let rows = group_rows(table, &epoch);
        if rows.is_empty() {
            return Err(ApZeroError::UnknownEpoch(epoch));
        }
        Ok((epoch, rows))
    }

    /// Candidate row for the current working set of an existing group.
    fn candidate(&self, epoch: &str) -> Result<Option<StagedRow>, ApZeroError> {
        let table = self.loaded_table()?;
        let (epoch, rows) = self.group(epoch)?;
        let working_set = self.working_sets.get(&epoch);
        if working_set.picked().is_none() {
            return Ok(None);
        }

        let input = FitInput::from_group(&epoch, &rows, &working_set);
        match calibrate(&input, &self.params) {
            FitOutcome::Fitted(fit) => Ok(input.template.map(|template| {
                StagedRow::from_fit(
                    template,
                    &fit,
                    table.columns(),
                    self.params.derived_note_flag,
                )
            })),
            FitOutcome::InsufficientData(reason) => {
                warn!("{epoch}: cannot stage, {reason}");
                Ok(None)
            }
        }
    }

    fn restage(&mut self, epoch: &str) -> Result<Option<&StagedRow>, ApZeroError> {
        match self.candidate(epoch)? {
            Some(row) => {
                info!("staged {} from template row {}", row.epoch, row.template_row);
                Ok(Some(self.staging.stage(row)))
            }
            None => {
                self.staging.discard(epoch);
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod session_test {
    use super::*;

    const EPOCH: &str = "2024-01-01T00:00";

    fn table() -> ObservationTable {
        let columns = ["obsTime", "ra", "dec", "photAp", "rmsRA", "rmsDec", "notes"]
            .iter()
            .map(|c| c.to_string())
            .collect();
        let mut rows: Vec<Observation> = (0..4)
            .map(|i| {
                let ap = (i + 1) as f64;
                Observation::new(
                    i,
                    EPOCH,
                    Some(150.0 + 2e-5 * ap),
                    Some(-20.5),
                    Some(ap),
                    Some(0.02),
                    Some(0.02),
                )
            })
            .collect();
        rows.push(Observation::new(
            4,
            "later",
            Some(1.0),
            Some(1.0),
            Some(1.0),
            Some(0.1),
            Some(0.1),
        ));
        ObservationTable::from_observations(columns, rows)
    }

    fn loaded() -> Session {
        let mut session = Session::new();
        session.load_source(SourceId::new("a.csv"), table());
        session
    }

    #[test]
    fn test_no_active_source() {
        let mut session = Session::new();
        assert_eq!(session.list_groups().unwrap_err(), ApZeroError::NoActiveSource);
        assert_eq!(session.fit(EPOCH).unwrap_err(), ApZeroError::NoActiveSource);
        assert_eq!(
            session.set_excluded(EPOCH, [1]).unwrap_err(),
            ApZeroError::NoActiveSource
        );
        assert_eq!(session.confirm(EPOCH).unwrap_err(), ApZeroError::NoActiveSource);
        assert_eq!(
            session.select_group(None).unwrap_err(),
            ApZeroError::NoActiveSource
        );
    }

    #[test]
    fn test_unknown_epoch_and_row() {
        let mut session = loaded();
        assert_eq!(
            session.get_working_set("nope").unwrap_err(),
            ApZeroError::UnknownEpoch("nope".into())
        );
        let err = session.set_excluded(EPOCH, [0, 4]).unwrap_err();
        assert_eq!(
            err,
            ApZeroError::UnknownRow {
                epoch: EPOCH.into(),
                row_id: 4
            }
        );
        assert!(session.get_working_set(EPOCH).unwrap().is_empty());
    }

    #[test]
    fn test_stage_requires_pick() {
        let mut session = loaded();
        session.set_excluded(EPOCH, [3]).unwrap();
        assert!(session.stage(EPOCH).unwrap().is_none());
        assert_eq!(session.staging_state(EPOCH), StagingState::Empty);

        session.set_picked(EPOCH, 1).unwrap();
        assert_eq!(session.staging_state(EPOCH), StagingState::Staged);
        assert_eq!(session.staged(EPOCH).unwrap().template_row, 1);
    }

    #[test]
    fn test_unfittable_update_discards_candidate() {
        let mut session = loaded();
        session.update_working_set(EPOCH, [], Some(0)).unwrap();
        assert_eq!(session.staging_state(EPOCH), StagingState::Staged);

        let staged = session.update_working_set(EPOCH, [1, 2, 3], None).unwrap();
        assert!(staged.is_none());
        assert_eq!(session.staging_state(EPOCH), StagingState::Empty);
        assert_eq!(session.get_working_set(EPOCH).unwrap().picked(), Some(0));
    }

    #[test]
    fn test_group_rows_flags() {
        let mut session = loaded();
        session.update_working_set(EPOCH, [2], Some(1)).unwrap();
        let rows = session.group_rows(EPOCH).unwrap();
        assert_eq!(rows.len(), 4);
        assert!(rows[2].excluded && !rows[2].picked);
        assert!(rows[1].picked && !rows[1].excluded);
    }

    #[test]
    fn test_select_group_resets_staging_only() {
        let mut session = loaded();
        session.select_group(Some(EPOCH)).unwrap();
        session.update_working_set(EPOCH, [3], Some(0)).unwrap();

        // same selection: nothing changes
        session.select_group(Some(EPOCH)).unwrap();
        assert_eq!(session.staging_state(EPOCH), StagingState::Staged);

        session.select_group(Some("later")).unwrap();
        assert_eq!(session.active_group(), Some("later"));
        assert_eq!(session.staging_state(EPOCH), StagingState::Empty);
        assert!(session.get_working_set(EPOCH).unwrap().is_excluded(3));
    }

    #[test]
    fn test_reload_semantics() {
        let mut session = loaded();
        session.update_working_set(EPOCH, [3], Some(0)).unwrap();

        assert!(!session.load_source(SourceId::new("a.csv"), table()));
        assert_eq!(session.staging_state(EPOCH), StagingState::Empty);
        assert!(session.get_working_set(EPOCH).unwrap().is_excluded(3));

        assert!(session.load_source(SourceId::new("b.csv"), table()));
        assert!(session.get_working_set(EPOCH).unwrap().is_empty());
    }

    #[test]
    fn test_reload_prunes_rows_that_changed_group() {
        let mut session = loaded();
        session.select_group(Some("later")).unwrap();
        session.update_working_set(EPOCH, [1, 2], Some(2)).unwrap();
        session.update_working_set("later", [], Some(4)).unwrap();

        // same file, rows 2 and 4 now carry a new label and the later group is gone
        let mut rows = table().rows().to_vec();
        rows[2].epoch = "renamed".to_string();
        rows[4].epoch = "renamed".to_string();
        let edited = ObservationTable::from_observations(table().columns().to_vec(), rows);
        assert!(!session.load_source(SourceId::new("a.csv"), edited));

        let ws = session.get_working_set(EPOCH).unwrap();
        assert_eq!(ws, WorkingSet::new([1], None));
        assert!(session.get_working_set("renamed").unwrap().is_empty());
        assert_eq!(
            session.get_working_set("later").unwrap_err(),
            ApZeroError::UnknownEpoch("later".into())
        );
        assert_eq!(session.active_group(), None);

        // the stale pick no longer leaks into the fit
        let fit = session.fit(EPOCH).unwrap().into_fitted().unwrap();
        assert_eq!(fit.template_row, 0);
        assert!(session.stage(EPOCH).unwrap().is_none());
        assert_eq!(
            session.set_picked(EPOCH, 2).unwrap_err(),
            ApZeroError::UnknownRow {
                epoch: EPOCH.into(),
                row_id: 2
            }
        );
    }

    #[test]
    fn test_reset_and_unload() {
        let mut session = loaded();
        session.update_working_set(EPOCH, [], Some(0)).unwrap();
        session.confirm(EPOCH).unwrap();

        session.unload_source();
        assert!(session.source_id().is_none());
        assert_eq!(session.derived_collection().len(), 1);

        session.load_source(SourceId::new("a.csv"), table());
        session.reset();
        assert!(session.table().is_none());
        assert!(session.derived_collection().is_empty());
    }

    #[test]
    fn test_clear_excluded_drops_staging() {
        let mut session = loaded();
        session.update_working_set(EPOCH, [3], Some(0)).unwrap();
        assert!(session.clear_excluded(EPOCH).unwrap());
        assert_eq!(session.staging_state(EPOCH), StagingState::Empty);
        assert!(!session.clear_excluded(EPOCH).unwrap());
    }
}
