//! Aggregation pipeline for clinical event exports.
//!
//! Reads the raw event table, cleans and time-augments it, and derives the
//! fixed set of aggregate tables handed to the presentation layer.

pub mod aggregator;
pub mod cleaning;
pub mod cohort;
pub mod pipeline;
pub mod reader;
pub mod temporal;
pub mod trend;

pub use eda_core as core;
