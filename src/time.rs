//! # Epoch label parsing
//!
//! Epoch labels are opaque strings as far as grouping is concerned, but the
//! group index is displayed in chronological order whenever a label can be read
//! as a timestamp. This module turns a label into a [`hifitime::Epoch`] (UTC).
//!
//! Accepted forms, in order:
//!
//! 1. Calendar dates with an optional clock time, `-` or `/` date separators and
//!    a `T` or blank between date and time: `2024-01-01`, `2024-01-01T00:00`,
//!    `2024/01/01 03:04:05.25`, optionally suffixed with `Z` or `UTC`.
//! 2. Compact dates: `20240101`, `20240101T0304`, `20240101 03:04:05`.
//! 3. Month names, full or abbreviated to at least three letters, either before or
//!    after the day: `Jan 1 2024`, `January 1, 2024 03:00`, `1 Jan 2024`.
//! 4. Anything [`hifitime`] parses on its own (`"2024-01-01T00:00:00 TAI"`,
//!    `"2024-01-01T05:00:00+05:00"`, …).
//!
//! Labels that match none of them are free text and sort after every timestamp.
use std::str::FromStr;
use std::sync::LazyLock;

use hifitime::Epoch;
use regex::Regex;

/// Optional clock time after a date, shared by the month-name patterns.
const CLOCK_SUFFIX: &str =
    r"(?:[T ]\s*(\d{1,2}):(\d{2})(?::(\d{2})(?:\.(\d{1,9}))?)?)?\s*(?:Z|UTC)?$";

static CALENDAR_LABEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(\d{4})[-/](\d{1,2})[-/](\d{1,2})(?:[T ](\d{1,2}):(\d{2})(?::(\d{2})(?:\.(\d{1,9}))?)?)?\s*(?:Z|UTC)?$",
    )
    .expect("calendar label pattern is a valid regex")
});

static COMPACT_LABEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(\d{4})(\d{2})(\d{2})(?:[T ](\d{2}):?(\d{2})(?::?(\d{2})(?:\.(\d{1,9}))?)?)?\s*(?:Z|UTC)?$",
    )
    .expect("compact label pattern is a valid regex")
});

static MONTH_FIRST_LABEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i)^([a-z]{{3,9}})\.?\s+(\d{{1,2}}),?\s+(\d{{4}}){CLOCK_SUFFIX}"
    ))
    .expect("month-first label pattern is a valid regex")
});

static DAY_FIRST_LABEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i)^(\d{{1,2}})\s+([a-z]{{3,9}})\.?,?\s+(\d{{4}}){CLOCK_SUFFIX}"
    ))
    .expect("day-first label pattern is a valid regex")
});

const MONTH_NAMES: [&str; 12] = [
    "january",
    "february",
    "march",
    "april",
    "may",
    "june",
    "july",
    "august",
    "september",
    "october",
    "november",
    "december",
];

/// Parse an epoch label into a UTC [`Epoch`].
///
/// Arguments
/// ---------
/// * `label`: the epoch label as found in the `obsTime` column
///
/// Return
/// ------
/// * `Some(epoch)` when the label reads as a timestamp, `None` for free text or
///   impossible dates (e.g. `2024-02-30`)
pub fn parse_epoch_label(label: &str) -> Option<Epoch> {
    let label = label.trim();
    if label.is_empty() {
        return None;
    }

    for pattern in [&*CALENDAR_LABEL, &*COMPACT_LABEL] {
        if let Some(caps) = pattern.captures(label) {
            let field = |i: usize| caps.get(i).map(|m| m.as_str());
            let month = u8::from_str(field(2)?).ok()?;
            let day = u8::from_str(field(3)?).ok()?;
            return epoch_from_fields(field(1)?, month, day, [4, 5, 6, 7].map(field));
        }
    }

    if let Some(caps) = MONTH_FIRST_LABEL.captures(label) {
        let field = |i: usize| caps.get(i).map(|m| m.as_str());
        let month = month_number(field(1)?)?;
        let day = u8::from_str(field(2)?).ok()?;
        return epoch_from_fields(field(3)?, month, day, [4, 5, 6, 7].map(field));
    }

    if let Some(caps) = DAY_FIRST_LABEL.captures(label) {
        let field = |i: usize| caps.get(i).map(|m| m.as_str());
        let month = month_number(field(2)?)?;
        let day = u8::from_str(field(1)?).ok()?;
        return epoch_from_fields(field(3)?, month, day, [4, 5, 6, 7].map(field));
    }

    Epoch::from_str(label).ok()
}

/// Build a UTC epoch from matched date fields and the optional
/// `[hour, minute, second, fraction]` clock fields.
fn epoch_from_fields(year: &str, month: u8, day: u8, clock: [Option<&str>; 4]) -> Option<Epoch> {
    let year = i32::from_str(year).ok()?;
    let [hour, minute, second, fraction] = clock;
    let hour = hour.map_or(Some(0), |s| u8::from_str(s).ok())?;
    let minute = minute.map_or(Some(0), |s| u8::from_str(s).ok())?;
    let second = second.map_or(Some(0), |s| u8::from_str(s).ok())?;
    let nanos = fraction.map_or(Some(0), fraction_to_nanos)?;

    if hour > 23 || minute > 59 || second > 60 {
        return None;
    }

    Epoch::maybe_from_gregorian_utc(year, month, day, hour, minute, second, nanos).ok()
}

/// Month number of an English month name or of its prefix of three letters or more.
fn month_number(name: &str) -> Option<u8> {
    let name = name.to_ascii_lowercase();
    if name.len() < 3 {
        return None;
    }
    MONTH_NAMES
        .iter()
        .position(|full| full.starts_with(&name))
        .map(|index| index as u8 + 1)
}

/// Convert the digits after the decimal point of a seconds field to nanoseconds.
fn fraction_to_nanos(digits: &str) -> Option<u32> {
    let value = u32::from_str(digits).ok()?;
    let missing = 9u32.checked_sub(digits.len() as u32)?;
    Some(value * 10u32.pow(missing))
}
