//! # apzero
//!
//! Zero-aperture astrometric calibration of grouped optical observations.
//!
//! Observations sharing an epoch are fitted, position against photometric aperture,
//! and extrapolated to aperture = 0. The result is rounded so that it never shows more
//! precision than its own uncertainty, staged for review and appended to a derived
//! collection once confirmed.
//!
//! Start from [`session::Session`].
pub mod apzero_errors;
pub mod calibration;
pub mod constants;
pub mod derived;
pub mod groups;
pub mod observations;
pub mod precision;
pub mod registry;
pub mod session;
pub mod staging;
pub mod time;
pub mod working_set;
