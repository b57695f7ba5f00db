mod common;

use apzero::apzero_errors::ApZeroError;
use apzero::observations::table::SourceId;
use apzero::observations::CellValue;
use apzero::session::Session;
use apzero::staging::{ConfirmOutcome, StagingState};

use crate::common::{init_logger, linear_records, record, table, EPOCH};

const LATER: &str = "2024-01-02 03:00";

fn two_group_session() -> Session {
    init_logger();
    let mut records = linear_records(EPOCH, &[1.0, 2.0, 3.0, 4.0], 0.02);
    records.extend(linear_records(LATER, &[2.0, 4.0, 6.0], 0.05));
    let mut session = Session::new();
    session.load_source(SourceId::new("night.csv"), table(records));
    session
}

#[test]
fn groups_are_listed_chronologically_then_by_label() {
    init_logger();
    let mut records = vec![record("zzz", 1.0, 1.0, 1.0, 0.1)];
    records.extend(linear_records(LATER, &[1.0, 2.0], 0.1));
    records.push(record("abc", 1.0, 1.0, 1.0, 0.1));
    records.extend(linear_records(EPOCH, &[1.0], 0.1));

    let mut session = Session::new();
    session.load_source(SourceId::new("mixed.csv"), table(records));

    let groups = session.list_groups().unwrap();
    let labels: Vec<&str> = groups.iter().map(|g| g.epoch.as_str()).collect();
    assert_eq!(labels, vec![EPOCH, LATER, "abc", "zzz"]);
    assert_eq!(groups[1].count, 2);
}

#[test]
fn staging_is_idempotent() {
    let mut session = two_group_session();
    session.update_working_set(EPOCH, [1], Some(0)).unwrap();

    let first = session.stage(EPOCH).unwrap().cloned().unwrap();
    let second = session.stage(EPOCH).unwrap().cloned().unwrap();
    assert_eq!(first, second);

    let bits = |v: Option<f64>| v.map(f64::to_bits);
    assert_eq!(bits(first.observation.ra), bits(second.observation.ra));
    assert_eq!(bits(first.observation.dec), bits(second.observation.dec));
}

#[test]
fn staging_follows_the_working_set() {
    let mut session = two_group_session();
    session.update_working_set(EPOCH, [], Some(0)).unwrap();
    let before = session.staged(EPOCH).cloned().unwrap();

    session.set_excluded(EPOCH, [0, 1]).unwrap();
    let after = session.staged(EPOCH).cloned().unwrap();
    let fresh = session.fit(EPOCH).unwrap().into_fitted().unwrap();

    assert_eq!(after.observation.ra, Some(fresh.ra0));
    assert_eq!(after.observation.rms_ra, Some(fresh.ra0_err));
    assert_eq!(after.template_row, before.template_row);

    session.set_picked(EPOCH, 3).unwrap();
    assert_eq!(session.staged(EPOCH).unwrap().template_row, 3);
}

#[test]
fn confirm_consumes_the_staged_row() {
    let mut session = two_group_session();
    session.update_working_set(EPOCH, [], Some(2)).unwrap();
    let staged = session.staged(EPOCH).cloned().unwrap();

    let outcome = session.confirm(EPOCH).unwrap();
    assert_eq!(
        outcome,
        ConfirmOutcome::Appended {
            position: 0,
            row: staged.row.clone()
        }
    );
    assert_eq!(session.staging_state(EPOCH), StagingState::Empty);
    assert_eq!(session.derived_collection().len(), 1);
    assert_eq!(session.confirm(EPOCH).unwrap(), ConfirmOutcome::NothingToConfirm);
    assert_eq!(session.derived_collection().len(), 1);

    let row = &session.derived_collection()[0];
    assert_eq!(row.get("notes"), Some(&CellValue::Text("eK".into())));
    assert_eq!(row.get("photAp"), Some(&CellValue::Number(3.0)));
    assert_eq!(row.get("stn"), Some(&CellValue::Text("F51".into())));
}

#[test]
fn staging_of_one_group_never_touches_another() {
    let mut session = two_group_session();
    session.update_working_set(EPOCH, [], Some(0)).unwrap();
    session.update_working_set(LATER, [], Some(4)).unwrap();

    session.confirm(LATER).unwrap();
    assert_eq!(session.staging_state(EPOCH), StagingState::Staged);

    session.clear_excluded(LATER).unwrap();
    assert_eq!(session.staging_state(EPOCH), StagingState::Staged);
}

#[test]
fn partition_covers_every_group_row() {
    let mut session = two_group_session();
    let cases: [Vec<usize>; 4] = [vec![], vec![0], vec![1, 3], vec![0, 1, 2, 3]];
    for excluded in cases {
        session.set_excluded(EPOCH, excluded.clone()).unwrap();
        let rows = session.group_rows(EPOCH).unwrap();
        let (out, kept): (Vec<_>, Vec<_>) = rows.iter().partition(|r| r.excluded);

        assert_eq!(out.len() + kept.len(), 4);
        let mut ids: Vec<usize> = out.iter().map(|r| r.observation.row_id).collect();
        assert_eq!(ids, excluded);
        ids.extend(kept.iter().map(|r| r.observation.row_id));
        ids.sort_unstable();
        assert_eq!(ids, vec![0, 1, 2, 3]);
    }
}

#[test]
fn failed_updates_leave_the_session_untouched() {
    let mut session = two_group_session();
    session.update_working_set(EPOCH, [1], Some(0)).unwrap();
    let staged = session.staged(EPOCH).cloned();

    // row 5 belongs to the other group
    let err = session.update_working_set(EPOCH, [5], Some(2)).unwrap_err();
    assert_eq!(
        err,
        ApZeroError::UnknownRow {
            epoch: EPOCH.into(),
            row_id: 5
        }
    );
    let ws = session.get_working_set(EPOCH).unwrap();
    assert!(ws.is_excluded(1));
    assert_eq!(ws.picked(), Some(0));
    assert_eq!(session.staged(EPOCH).cloned(), staged);
}

#[test]
fn derived_rows_survive_a_new_source() {
    let mut session = two_group_session();
    session.update_working_set(EPOCH, [], Some(0)).unwrap();
    session.confirm(EPOCH).unwrap();
    session.update_working_set(LATER, [], Some(5)).unwrap();
    session.confirm(LATER).unwrap();

    let changed = session.load_source(
        SourceId::new("other.csv"),
        table(linear_records(EPOCH, &[1.0, 2.0], 0.02)),
    );
    assert!(changed);
    assert_eq!(session.derived_collection().len(), 2);
    assert!(session.get_working_set(EPOCH).unwrap().is_empty());

    assert_eq!(
        session.delete_derived(&[0, 7]).unwrap_err(),
        ApZeroError::InvalidDerivedPosition {
            position: 7,
            len: 2
        }
    );
    assert_eq!(session.delete_derived(&[0]).unwrap(), 1);
    assert_eq!(
        session.derived_collection()[0].get("obsTime"),
        Some(&CellValue::Text(LATER.into()))
    );

    session.clear_derived();
    assert!(session.derived_collection().is_empty());
}
