//! # Working sets
//!
//! A [`WorkingSet`] is the per-group interactive state: which rows the user
//! excluded from the fit, and which row was picked as the template of the
//! calibrated output. It is pure state; no computation happens here.
//!
//! [`WorkingSets`] keys them by normalized epoch label. A group without an entry
//! behaves as an empty working set (nothing excluded, nothing picked), so
//! [`WorkingSets::clear_excluded`] simply removes the entry.
//!
//! Exclusion updates have **replacement** semantics: the new set is the whole
//! truth, and any previously excluded row left out of it is included again.
use std::collections::{BTreeSet, HashMap};

use crate::{
    apzero_errors::ApZeroError,
    constants::{EpochLabel, RowId},
    groups::{group_rows, normalize_epoch},
    observations::{table::ObservationTable, Observation},
};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct WorkingSet {
    excluded: BTreeSet<RowId>,
    picked: Option<RowId>,
}

impl WorkingSet {
    pub fn new(excluded: impl IntoIterator<Item = RowId>, picked: Option<RowId>) -> Self {
        WorkingSet {
            excluded: excluded.into_iter().collect(),
            picked,
        }
    }

    pub fn excluded(&self) -> &BTreeSet<RowId> {
        &self.excluded
    }

    pub fn picked(&self) -> Option<RowId> {
        self.picked
    }

    pub fn is_excluded(&self, row_id: RowId) -> bool {
        self.excluded.contains(&row_id)
    }

    pub fn is_empty(&self) -> bool {
        self.excluded.is_empty() && self.picked.is_none()
    }
}

/// Working sets of every group of the loaded source.
#[derive(Debug, Clone, Default)]
pub struct WorkingSets {
    sets: HashMap<EpochLabel, WorkingSet>,
}

impl WorkingSets {
    pub fn new() -> Self {
        Self::default()
    }

    /// Working set of `epoch`, empty if the group was never touched.
    pub fn get(&self, epoch: &str) -> WorkingSet {
        self.sets
            .get(&normalize_epoch(epoch))
            .cloned()
            .unwrap_or_default()
    }

    /// Replace the excluded set of `epoch`.
    pub fn set_excluded(&mut self, epoch: &str, row_ids: impl IntoIterator<Item = RowId>) {
        self.sets.entry(normalize_epoch(epoch)).or_default().excluded =
            row_ids.into_iter().collect();
    }

    pub fn set_picked(&mut self, epoch: &str, row_id: RowId) {
        self.sets.entry(normalize_epoch(epoch)).or_default().picked = Some(row_id);
    }

    /// Drop the working set of `epoch` (no exclusions, no pick).
    ///
    /// Return
    /// ----------
    /// * `true` if the group had a working set.
    pub fn clear_excluded(&mut self, epoch: &str) -> bool {
        self.sets.remove(&normalize_epoch(epoch)).is_some()
    }

    /// Keep only the state that still refers to `table`.
    ///
    /// Groups whose label no longer exists are dropped. Inside surviving groups,
    /// excluded ids and the pick are kept only if the row is still a member.
    /// A working set left empty is removed.
    ///
    /// Return
    /// ----------
    /// * The number of groups whose working set changed.
    pub fn retain_members(&mut self, table: &ObservationTable) -> usize {
        let mut changed = 0;
        self.sets.retain(|epoch, set| {
            let members: BTreeSet<RowId> = group_rows(table, epoch)
                .into_iter()
                .map(|obs| obs.row_id)
                .collect();
            let before = set.clone();
            set.excluded.retain(|id| members.contains(id));
            set.picked = set.picked.filter(|id| members.contains(id));
            if *set != before {
                changed += 1;
            }
            !set.is_empty()
        });
        changed
    }

    /// Drop every working set, used when a new source is loaded.
    pub fn clear_all(&mut self) {
        self.sets.clear();
    }

    pub fn len(&self) -> usize {
        self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }
}

/// Included/excluded split of one group's rows.
///
/// Invariant: `included ∪ excluded` is exactly the group and the two are disjoint.
/// Both keep table order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Partition {
    pub included: Vec<RowId>,
    pub excluded: Vec<RowId>,
}

impl Partition {
    /// Split `group` according to `working_set`.
    pub fn of(group: &[&Observation], working_set: &WorkingSet) -> Self {
        let (excluded, included): (Vec<RowId>, Vec<RowId>) = group
            .iter()
            .map(|obs| obs.row_id)
            .partition(|id| working_set.is_excluded(*id));
        Partition { included, excluded }
    }
}

/// Check that every id in `row_ids` belongs to `group`.
pub fn check_membership(
    epoch: &str,
    group: &[&Observation],
    row_ids: impl IntoIterator<Item = RowId>,
) -> Result<(), ApZeroError> {
    for row_id in row_ids {
        if !group.iter().any(|obs| obs.row_id == row_id) {
            return Err(ApZeroError::UnknownRow {
                epoch: normalize_epoch(epoch),
                row_id,
            });
        }
    }
    Ok(())
}
