use thiserror::Error;

use crate::constants::RowId;

#[derive(Error, Debug)]
pub enum ApZeroError {
    #[error("No source table is loaded")]
    NoActiveSource,

    #[error("Unknown epoch group: {0}")]
    UnknownEpoch(String),

    #[error("Row {row_id} does not belong to epoch group {epoch}")]
    UnknownRow { epoch: String, row_id: RowId },

    #[error("Required column '{0}' not found in the source table")]
    MissingColumn(String),

    #[error("Column '{0}' appears more than once in the source header")]
    DuplicateColumn(String),

    #[error("Record {row} has {found} fields, expected {expected}")]
    RaggedRecord {
        row: usize,
        expected: usize,
        found: usize,
    },

    #[error("Numerical failure: {0}")]
    NumericFailure(String),

    #[error("Invalid calibration parameter: {0}")]
    InvalidCalibrationParameter(String),

    #[error("Derived row position {position} out of range (collection holds {len} rows)")]
    InvalidDerivedPosition { position: usize, len: usize },

    #[error("Session state lock poisoned: {0}")]
    SessionPoisoned(String),
}

impl PartialEq for ApZeroError {
    fn eq(&self, other: &Self) -> bool {
        use ApZeroError::*;
        match (self, other) {
            (NoActiveSource, NoActiveSource) => true,
            (UnknownEpoch(a), UnknownEpoch(b)) => a == b,
            (
                UnknownRow {
                    epoch: e1,
                    row_id: r1,
                },
                UnknownRow {
                    epoch: e2,
                    row_id: r2,
                },
            ) => e1 == e2 && r1 == r2,
            (MissingColumn(a), MissingColumn(b)) => a == b,
            (DuplicateColumn(a), DuplicateColumn(b)) => a == b,
            (
                RaggedRecord {
                    row: r1,
                    expected: e1,
                    found: f1,
                },
                RaggedRecord {
                    row: r2,
                    expected: e2,
                    found: f2,
                },
            ) => r1 == r2 && e1 == e2 && f1 == f2,
            (NumericFailure(a), NumericFailure(b)) => a == b,
            (InvalidCalibrationParameter(a), InvalidCalibrationParameter(b)) => a == b,
            (
                InvalidDerivedPosition {
                    position: p1,
                    len: l1,
                },
                InvalidDerivedPosition {
                    position: p2,
                    len: l2,
                },
            ) => p1 == p2 && l1 == l2,

            // poisoned locks carry a diagnostic only: same variant is enough
            (SessionPoisoned(_), SessionPoisoned(_)) => true,

            _ => false,
        }
    }
}
