//! Shared building blocks for the cohort EDA pipeline.
//!
//! Holds the event and aggregate row models, the error taxonomy, the small
//! statistics kernel, timestamp handling and the run configuration used by
//! the data, report and binary crates.

pub mod error;
pub mod formatting;
pub mod models;
pub mod settings;
pub mod stats;
pub mod time_utils;

pub use error::{EdaError, Result};
