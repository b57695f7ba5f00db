#![allow(dead_code)]

use apzero::observations::table::ObservationTable;

pub const EPOCH: &str = "2024-01-01T00:00";

/// Header of the fixture tables, in source order.
pub const HEADER: [&str; 9] = [
    "obsTime", "stn", "ra", "dec", "photAp", "rmsRA", "rmsDec", "mag", "notes",
];

pub const RA_INTERCEPT: f64 = 150.123456789;
pub const RA_SLOPE: f64 = 2.0e-5;
pub const DEC_INTERCEPT: f64 = -20.5;
pub const DEC_SLOPE: f64 = -1.0e-5;

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// One raw record of the fixture schema.
pub fn record(epoch: &str, ra: f64, dec: f64, phot_ap: f64, rms: f64) -> Vec<String> {
    vec![
        epoch.to_string(),
        "F51".to_string(),
        format!("{ra}"),
        format!("{dec}"),
        format!("{phot_ap}"),
        format!("{rms}"),
        format!("{rms}"),
        "21".to_string(),
        "K".to_string(),
    ]
}

/// Records lying exactly on the fixture lines, one per aperture.
pub fn linear_records(epoch: &str, apertures: &[f64], rms: f64) -> Vec<Vec<String>> {
    apertures
        .iter()
        .map(|ap| {
            record(
                epoch,
                RA_INTERCEPT + RA_SLOPE * ap,
                DEC_INTERCEPT + DEC_SLOPE * ap,
                *ap,
                rms,
            )
        })
        .collect()
}

pub fn table(records: Vec<Vec<String>>) -> ObservationTable {
    ObservationTable::from_records(HEADER, records).expect("fixture table")
}
