//! # Group index
//!
//! Observations sharing an epoch label form a **group**. Groups are never stored:
//! they are recomputed from the source table whenever they are needed, so they
//! cannot drift from the loaded rows.
//!
//! ## Display order
//!
//! [`GroupIndex::build`] lists the distinct labels in a stable, human friendly order:
//!
//! 1. labels readable as timestamps ([`parse_epoch_label`]) first, chronologically,
//!    ties broken by the label text;
//! 2. free-text labels after them, lexicographically.
use std::cmp::Ordering;

use hifitime::Epoch;
use itertools::Itertools;
use serde::Serialize;

use crate::{
    constants::EpochLabel,
    observations::{table::ObservationTable, Observation},
    time::parse_epoch_label,
};

/// Normalized form of an epoch label, used for every group comparison.
pub fn normalize_epoch(label: &str) -> EpochLabel {
    label.trim().to_string()
}

/// One line of the group index: an epoch label and how many rows carry it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupEntry {
    pub epoch: EpochLabel,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GroupIndex {
    entries: Vec<GroupEntry>,
}

impl GroupIndex {
    /// Cluster the table rows by epoch label and order the groups for display.
    ///
    /// Arguments
    /// -----------------
    /// * `table`: the loaded source table.
    ///
    /// Return
    /// ----------
    /// * The ordered group index. Pure function of `table`.
    pub fn build(table: &ObservationTable) -> Self {
        let counts = table.rows().iter().map(|obs| obs.epoch.as_str()).counts();

        let entries = counts
            .into_iter()
            .map(|(label, count)| (parse_epoch_label(label), label, count))
            .sorted_by(|(ta, la, _), (tb, lb, _)| compare_labels(ta.as_ref(), la, tb.as_ref(), lb))
            .map(|(_, label, count)| GroupEntry {
                epoch: label.to_string(),
                count,
            })
            .collect();

        GroupIndex { entries }
    }

    pub fn entries(&self) -> &[GroupEntry] {
        &self.entries
    }

    pub fn epochs(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.epoch.as_str())
    }

    pub fn count(&self, epoch: &str) -> Option<usize> {
        let epoch = normalize_epoch(epoch);
        self.entries
            .iter()
            .find(|e| e.epoch == epoch)
            .map(|e| e.count)
    }

    pub fn contains(&self, epoch: &str) -> bool {
        self.count(epoch).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn compare_labels(ta: Option<&Epoch>, la: &str, tb: Option<&Epoch>, lb: &str) -> Ordering {
    match (ta, tb) {
        (Some(a), Some(b)) => a
            .partial_cmp(b)
            .unwrap_or(Ordering::Equal)
            .then_with(|| la.cmp(lb)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => la.cmp(lb),
    }
}

/// Rows of the group labelled `epoch`, in table order. Empty if no row carries the label.
pub fn group_rows<'a>(table: &'a ObservationTable, epoch: &str) -> Vec<&'a Observation> {
    let epoch = normalize_epoch(epoch);
    table
        .rows()
        .iter()
        .filter(|obs| obs.epoch == epoch)
        .collect()
}

#[cfg(test)]
mod groups_test {
    use super::*;

    fn table_with_epochs(epochs: &[&str]) -> ObservationTable {
        let rows = epochs
            .iter()
            .enumerate()
            .map(|(i, e)| Observation::new(i, *e, None, None, None, None, None))
            .collect();
        ObservationTable::from_observations(vec!["obsTime".into(), "photAp".into()], rows)
    }

    #[test]
    fn test_chronological_then_free_text() {
        let table = table_with_epochs(&[
            "zeta",
            "2024-01-02T00:00",
            "alpha",
            "2023-12-31",
            "2024-01-02T00:00",
            "2024-01-01T12:00",
        ]);
        let index = GroupIndex::build(&table);

        let epochs: Vec<&str> = index.epochs().collect();
        assert_eq!(
            epochs,
            vec![
                "2023-12-31",
                "2024-01-01T12:00",
                "2024-01-02T00:00",
                "alpha",
                "zeta"
            ]
        );
        assert_eq!(index.count("2024-01-02T00:00"), Some(2));
        assert_eq!(index.count(" alpha "), Some(1));
        assert_eq!(index.count("missing"), None);
    }

    #[test]
    fn test_same_instant_ties_broken_by_label() {
        let table = table_with_epochs(&["2024-01-01 00:00:00", "2024-01-01T00:00"]);
        let index = GroupIndex::build(&table);
        let epochs: Vec<&str> = index.epochs().collect();
        assert_eq!(epochs, vec!["2024-01-01 00:00:00", "2024-01-01T00:00"]);
    }

    #[test]
    fn test_group_rows_uses_normalized_labels() {
        let table = table_with_epochs(&[" night1", "night1 ", "night2"]);
        let rows = group_rows(&table, "night1");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].row_id, 0);
        assert_eq!(rows[1].row_id, 1);
        assert!(group_rows(&table, "night3").is_empty());
    }

    #[test]
    fn test_empty_table() {
        let index = GroupIndex::build(&ObservationTable::default());
        assert!(index.is_empty());
    }
}
