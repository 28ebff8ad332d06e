//! End-to-end aggregation pipeline.
//!
//! Stages run in a fixed order over immutable inputs:
//!
//! 1. read the CSV into [`Event`]s (any malformed row aborts the run),
//! 2. sort and drop sentinel diagnoses,
//! 3. derive patient- and dataset-relative months,
//! 4. build every aggregate table from the time-augmented events.
//!
//! Each table depends only on the stage-3 output, never on another table.

use std::collections::BTreeSet;
use std::path::Path;
use std::time::Instant;

use chrono::{DateTime, Utc};
use eda_core::error::Result;
use eda_core::models::{Event, GroupLevel, TimedEvent};
use eda_core::settings::PipelineConfig;
use eda_core::time_utils::TimezoneHandler;
use serde::Serialize;
use tracing::{debug, info};

use crate::aggregator::{monthly_activity, unit_summary, MonthlyActivityRow, UnitRow};
use crate::cleaning::clean_events;
use crate::cohort::{
    diagnosis_summary, division_patients, patient_summary, DiagnosisPatientRow,
    DivisionPatientRow, PatientRow,
};
use crate::reader::read_events;
use crate::temporal::{derive_temporal_features, within_window};
use crate::trend::{activity_trend, ActivityTrendRow};

// ── Public types ──────────────────────────────────────────────────────────────

/// Every table produced by one run. Deterministic for a given input.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AggregateTables {
    /// Cleaned, time-augmented events (all months).
    pub events: Vec<TimedEvent>,
    /// Cleaned events restricted to the trend window.
    pub windowed_events: Vec<TimedEvent>,
    pub monthly_by_division: Vec<MonthlyActivityRow>,
    pub monthly_by_unit: Vec<MonthlyActivityRow>,
    pub trend_by_unit: Vec<ActivityTrendRow>,
    pub trend_by_division: Vec<ActivityTrendRow>,
    pub patients: Vec<PatientRow>,
    pub units: Vec<UnitRow>,
    pub diagnosis_patients: Vec<DiagnosisPatientRow>,
    pub division_patients: Vec<DivisionPatientRow>,
}

/// Counts and timings describing one run.
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
pub struct RunMetadata {
    pub rows_read: usize,
    pub rows_excluded: usize,
    pub rows_kept: usize,
    pub patients: usize,
    pub units: usize,
    pub divisions: usize,
    pub dataset_start: Option<DateTime<Utc>>,
    pub dataset_end: Option<DateTime<Utc>>,
    pub trend_window_months: u32,
    /// Wall-clock seconds spent reading the input file.
    pub load_time_seconds: f64,
    /// Wall-clock seconds spent cleaning and deriving time features.
    pub transform_time_seconds: f64,
    /// Wall-clock seconds spent building the aggregate tables.
    pub aggregate_time_seconds: f64,
}

/// The complete output of a pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub tables: AggregateTables,
    pub metadata: RunMetadata,
}

// ── Pipeline ──────────────────────────────────────────────────────────────────

/// Load → clean → derive → aggregate, configured once per run.
///
/// # Example
/// ```no_run
/// use eda_core::settings::PipelineConfig;
/// use eda_data::pipeline::Pipeline;
///
/// let pipeline = Pipeline::new(PipelineConfig::default())?;
/// let output = pipeline.run_file("events.csv".as_ref())?;
/// println!("{} patients", output.tables.patients.len());
/// # Ok::<(), eda_core::EdaError>(())
/// ```
#[derive(Debug, Clone)]
pub struct Pipeline {
    config: PipelineConfig,
    timezone: TimezoneHandler,
}

impl Pipeline {
    /// Build a pipeline for `config`. Fails with `EdaError::Config` when the
    /// config does not validate, e.g. an unknown timezone name.
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        let timezone = TimezoneHandler::new(&config.timezone);
        debug!("Naive timestamps are read in {}", timezone.default_tz());
        Ok(Self { config, timezone })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Read `path` and run every stage. Fails before building any table if
    /// the file is missing, lacks a required column or holds a bad value.
    pub fn run_file(&self, path: &Path) -> Result<PipelineOutput> {
        let load_start = Instant::now();
        let events = read_events(path, &self.timezone)?;
        let load_time = load_start.elapsed().as_secs_f64();

        let mut output = self.run_events(events);
        output.metadata.load_time_seconds = load_time;
        Ok(output)
    }

    /// Run the in-memory stages on already-typed events.
    pub fn run_events(&self, events: Vec<Event>) -> PipelineOutput {
        let rows_read = events.len();

        // ── Clean + derive ───────────────────────────────────────────────────
        let transform_start = Instant::now();
        let cleaned = clean_events(events, &self.config);
        let timed = derive_temporal_features(&cleaned.events);
        let transform_time = transform_start.elapsed().as_secs_f64();

        // ── Aggregate ────────────────────────────────────────────────────────
        let aggregate_start = Instant::now();
        let tables = self.aggregate(timed);
        let aggregate_time = aggregate_start.elapsed().as_secs_f64();

        let metadata = RunMetadata {
            rows_read,
            rows_excluded: cleaned.excluded,
            rows_kept: tables.events.len(),
            patients: distinct(&tables.events, |e| e.patient_id.as_str()),
            units: distinct(&tables.events, |e| e.unit.as_str()),
            divisions: distinct(&tables.events, |e| e.division.as_str()),
            dataset_start: tables.events.iter().map(|e| e.timestamp).min(),
            dataset_end: tables.events.iter().map(|e| e.timestamp).max(),
            trend_window_months: self.config.trend_window_months,
            load_time_seconds: 0.0,
            transform_time_seconds: transform_time,
            aggregate_time_seconds: aggregate_time,
        };

        info!(
            "Pipeline kept {} of {} events for {} patients; {} patient rows, {} unit rows",
            metadata.rows_kept,
            metadata.rows_read,
            metadata.patients,
            tables.patients.len(),
            tables.units.len()
        );
        debug!(
            "Stage timings: transform {:.3}s, aggregate {:.3}s",
            transform_time, aggregate_time
        );

        PipelineOutput { tables, metadata }
    }

    /// Build every aggregate table from the time-augmented events.
    pub fn aggregate(&self, events: Vec<TimedEvent>) -> AggregateTables {
        let window = self.config.trend_window_months;

        let monthly_by_unit = monthly_activity(&events, GroupLevel::Unit);
        let monthly_by_division = monthly_activity(&events, GroupLevel::Division);
        let trend_by_unit = activity_trend(&monthly_by_unit, window);
        let trend_by_division = activity_trend(&monthly_by_division, window);

        let tables = AggregateTables {
            windowed_events: within_window(&events, window),
            patients: patient_summary(&events),
            units: unit_summary(&events, self.config.min_unit_activities),
            diagnosis_patients: diagnosis_summary(&events),
            division_patients: division_patients(&events, |d| {
                self.config.is_excluded_division(d)
            }),
            monthly_by_division,
            monthly_by_unit,
            trend_by_unit,
            trend_by_division,
            events,
        };

        debug!(
            "Aggregated {} unit-months, {} division-months, {} diagnosis rows, {} division rows",
            tables.monthly_by_unit.len(),
            tables.monthly_by_division.len(),
            tables.diagnosis_patients.len(),
            tables.division_patients.len()
        );
        tables
    }
}

fn distinct<'a, F>(events: &'a [TimedEvent], key: F) -> usize
where
    F: Fn(&'a TimedEvent) -> &'a str,
{
    events.iter().map(key).collect::<BTreeSet<_>>().len()
}

// ── Tests ─────────────────────────────────────────────────────────────────────
