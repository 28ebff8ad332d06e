use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Serialize;
use tracing::{debug, info};

use eda_core::error::{EdaError, Result};
use eda_core::models::TimedEvent;
use eda_data::aggregator::{MonthlyActivityRow, UnitRow};
use eda_data::cohort::{DiagnosisPatientRow, DivisionPatientRow, PatientRow};
use eda_data::pipeline::{PipelineOutput, RunMetadata};
use eda_data::trend::ActivityTrendRow;

// ── Table names ───────────────────────────────────────────────────────────────

pub const EVENTS_WINDOWED: &str = "events_windowed";
pub const MONTHLY_BY_DIVISION: &str = "monthly_activity_by_division";
pub const MONTHLY_BY_UNIT: &str = "monthly_activity_by_unit";
pub const TREND_BY_UNIT: &str = "activity_trend_by_unit";
pub const TREND_BY_DIVISION: &str = "activity_trend_by_division";
pub const PATIENTS: &str = "patients";
pub const UNITS: &str = "units";
pub const DIAGNOSIS_PATIENTS: &str = "diagnosis_patients";
pub const DIVISION_PATIENTS: &str = "division_patients";
pub const METADATA_FILE: &str = "metadata.json";

// ── Column layouts ────────────────────────────────────────────────────────────

/// A row type written as one line of an output table.
///
/// `COLUMNS` lists the serialized field names in declaration order. CSV
/// headers come from it, so an empty table still carries its header line.
pub trait TableRow: Serialize {
    const COLUMNS: &'static [&'static str];
}

impl TableRow for TimedEvent {
    const COLUMNS: &'static [&'static str] = &[
        "patient_id",
        "event_id",
        "timestamp",
        "activity",
        "unit",
        "division",
        "age",
        "diagnosis",
        "days_since_patient_start",
        "months_since_patient_start",
        "days_since_dataset_start",
        "months_since_dataset_start",
    ];
}

impl TableRow for MonthlyActivityRow {
    const COLUMNS: &'static [&'static str] = &[
        "months_passed",
        "group_level",
        "group_name",
        "activities_count",
        "patient_count",
        "average_age",
        "first_ts",
        "last_ts",
    ];
}

impl TableRow for ActivityTrendRow {
    const COLUMNS: &'static [&'static str] = &[
        "months_passed",
        "group_level",
        "group_name",
        "activities_count",
        "patient_count",
        "average_age",
        "first_ts",
        "last_ts",
        "normalized_activities_count",
        "group_mean_normalized",
        "zscore",
    ];
}

impl TableRow for PatientRow {
    const COLUMNS: &'static [&'static str] = &[
        "patient_id",
        "event_count",
        "first_ts",
        "last_ts",
        "age",
        "cancer_type",
        "start_month",
        "end_month",
        "treatment_time_days",
        "treatment_time_months",
    ];
}

impl TableRow for UnitRow {
    const COLUMNS: &'static [&'static str] = &[
        "unit_name",
        "activities_count",
        "median_activities",
        "distinct_activities",
        "first_occurrence",
        "last_occurrence",
        "timespan_days",
    ];
}

impl TableRow for DiagnosisPatientRow {
    const COLUMNS: &'static [&'static str] = &[
        "patient_diagnosis",
        "patient_id",
        "first_ts",
        "last_ts",
        "event_count",
        "patient_age",
        "start_month",
        "end_month",
        "treatment_time_months",
        "average_age",
        "age_deviation",
        "avg_treatment_time_months",
        "treatment_time_deviation",
        "case_count",
    ];
}

impl TableRow for DivisionPatientRow {
    const COLUMNS: &'static [&'static str] =
        &["division", "patient_id", "first_ts", "last_ts", "age"];
}

// ── OutputFormat ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Csv,
    Json,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Csv => "csv",
            OutputFormat::Json => "json",
        }
    }
}

impl FromStr for OutputFormat {
    type Err = EdaError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "csv" => Ok(OutputFormat::Csv),
            "json" => Ok(OutputFormat::Json),
            other => Err(EdaError::Config(format!(
                "Unknown output format {other:?} (expected csv or json)"
            ))),
        }
    }
}

// ── TableWriter ───────────────────────────────────────────────────────────────

/// Writes each aggregate table to `<output_dir>/<name>.<ext>`.
///
/// Missing values become empty CSV cells or JSON `null`. A CSV table with no
/// rows is a header line only; a JSON table with no rows is `[]`.
#[derive(Debug, Clone)]
pub struct TableWriter {
    output_dir: PathBuf,
    format: OutputFormat,
}

impl TableWriter {
    pub fn new(output_dir: impl Into<PathBuf>, format: OutputFormat) -> Self {
        Self {
            output_dir: output_dir.into(),
            format,
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Write every table plus `metadata.json`, creating the output directory
    /// if needed. Returns the written paths in a fixed order.
    pub fn write_all(&self, output: &PipelineOutput) -> Result<Vec<PathBuf>> {
        fs::create_dir_all(&self.output_dir)?;

        let tables = &output.tables;
        let written = vec![
            self.write_table(EVENTS_WINDOWED, &tables.windowed_events)?,
            self.write_table(MONTHLY_BY_DIVISION, &tables.monthly_by_division)?,
            self.write_table(MONTHLY_BY_UNIT, &tables.monthly_by_unit)?,
            self.write_table(TREND_BY_UNIT, &tables.trend_by_unit)?,
            self.write_table(TREND_BY_DIVISION, &tables.trend_by_division)?,
            self.write_table(PATIENTS, &tables.patients)?,
            self.write_table(UNITS, &tables.units)?,
            self.write_table(DIAGNOSIS_PATIENTS, &tables.diagnosis_patients)?,
            self.write_table(DIVISION_PATIENTS, &tables.division_patients)?,
            self.write_metadata(&output.metadata)?,
        ];

        info!(
            "Wrote {} files to {}",
            written.len(),
            self.output_dir.display()
        );
        Ok(written)
    }

    /// Write one table in the configured format.
    pub fn write_table<T: TableRow>(&self, name: &str, rows: &[T]) -> Result<PathBuf> {
        let path = self
            .output_dir
            .join(format!("{name}.{}", self.format.extension()));
        match self.format {
            OutputFormat::Csv => write_csv(&path, rows)?,
            OutputFormat::Json => write_json(&path, rows)?,
        }
        debug!("Wrote {} rows to {}", rows.len(), path.display());
        Ok(path)
    }

    /// Metadata is always JSON, whatever the table format.
    pub fn write_metadata(&self, metadata: &RunMetadata) -> Result<PathBuf> {
        let path = self.output_dir.join(METADATA_FILE);
        write_json(&path, metadata)?;
        Ok(path)
    }
}

fn write_csv<T: TableRow>(path: &Path, rows: &[T]) -> Result<()> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)?;
    writer.write_record(T::COLUMNS)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, value)?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeDelta, TimeZone, Utc};
    use eda_core::models::{Event, PatientId};
    use eda_core::settings::PipelineConfig;
    use eda_data::pipeline::Pipeline;
    use tempfile::TempDir;

    fn event(patient: &str, days: i64, unit: &str, age: Option<f64>) -> Event {
        Event {
            patient_id: PatientId::new(patient),
            event_id: format!("{patient}-{days}-{unit}"),
            timestamp: Utc.with_ymd_and_hms(2021, 3, 1, 8, 0, 0).unwrap()
                + TimeDelta::days(days),
            activity: "Consultation".to_string(),
            unit: unit.to_string(),
            division: "Oncology".to_string(),
            age,
            diagnosis: "Breast cancer".to_string(),
        }
    }

    fn sample_output() -> PipelineOutput {
        let events = vec![
            event("1", 0, "Ward 1", Some(61.0)),
            event("1", 45, "Ward 1", Some(61.0)),
            event("2", 3, "Ward 1", None),
            event("2", 90, "Ward 2", None),
        ];
        Pipeline::new(PipelineConfig::default())
            .unwrap()
            .run_events(events)
    }

    #[test]
    fn test_output_format_from_str() {
        assert_eq!("csv".parse::<OutputFormat>().unwrap(), OutputFormat::Csv);
        assert_eq!("JSON".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
        assert!(matches!(
            "parquet".parse::<OutputFormat>(),
            Err(EdaError::Config(_))
        ));
    }

    #[test]
    fn test_write_all_csv_creates_every_file() {
        let tmp = TempDir::new().expect("tempdir");
        let out_dir = tmp.path().join("nested").join("out");
        let writer = TableWriter::new(&out_dir, OutputFormat::Csv);

        let written = writer.write_all(&sample_output()).expect("write");
        assert_eq!(written.len(), 10);
        for name in [
            EVENTS_WINDOWED,
            MONTHLY_BY_DIVISION,
            MONTHLY_BY_UNIT,
            TREND_BY_UNIT,
            TREND_BY_DIVISION,
            PATIENTS,
            UNITS,
            DIAGNOSIS_PATIENTS,
            DIVISION_PATIENTS,
        ] {
            assert!(out_dir.join(format!("{name}.csv")).is_file(), "{name}");
        }
        assert!(out_dir.join(METADATA_FILE).is_file());
    }

    #[test]
    fn test_csv_missing_age_is_empty_cell() {
        let tmp = TempDir::new().expect("tempdir");
        let writer = TableWriter::new(tmp.path(), OutputFormat::Csv);
        let path = writer
            .write_table(PATIENTS, &sample_output().tables.patients)
            .expect("write");

        let mut reader = csv::Reader::from_path(&path).expect("open");
        let headers = reader.headers().expect("headers").clone();
        let age_idx = headers.iter().position(|h| h == "age").expect("age column");
        let id_idx = headers
            .iter()
            .position(|h| h == "patient_id")
            .expect("id column");

        let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 2);
        let patient2 = rows.iter().find(|r| &r[id_idx] == "2").unwrap();
        assert_eq!(&patient2[age_idx], "");
        let patient1 = rows.iter().find(|r| &r[id_idx] == "1").unwrap();
        assert_eq!(&patient1[age_idx], "61.0");
    }

    #[test]
    fn test_json_tables_use_null_for_missing() {
        let tmp = TempDir::new().expect("tempdir");
        let writer = TableWriter::new(tmp.path(), OutputFormat::Json);
        writer.write_all(&sample_output()).expect("write");

        let content = fs::read_to_string(tmp.path().join("patients.json")).unwrap();
        let value: serde_json::Value = serde_json::from_str(&content).unwrap();
        let rows = value.as_array().expect("array of rows");
        assert_eq!(rows.len(), 2);
        assert!(rows
            .iter()
            .any(|r| r["patient_id"] == "2" && r["age"].is_null()));
    }

    #[test]
    fn test_metadata_written_as_json() {
        let tmp = TempDir::new().expect("tempdir");
        let writer = TableWriter::new(tmp.path(), OutputFormat::Csv);
        let path = writer.write_metadata(&sample_output().metadata).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(value["rows_read"], 4);
        assert_eq!(value["patients"], 2);
        assert_eq!(value["trend_window_months"], 36);
    }

    /// Header the `csv` crate derives from the row's serde field names.
    fn serde_header<T: TableRow>(rows: &[T]) -> String {
        let first = rows.first().expect("table has at least one row");
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.serialize(first).unwrap();
        let bytes = writer.into_inner().unwrap();
        let text = String::from_utf8(bytes).unwrap();
        text.lines().next().unwrap().to_string()
    }

    fn assert_columns_match<T: TableRow>(rows: &[T]) {
        assert_eq!(serde_header(rows), T::COLUMNS.join(","));
    }

    #[test]
    fn test_columns_match_serialized_fields() {
        let tables = sample_output().tables;
        assert_columns_match(&tables.windowed_events);
        assert_columns_match(&tables.monthly_by_unit);
        assert_columns_match(&tables.trend_by_division);
        assert_columns_match(&tables.patients);
        assert_columns_match(&tables.units);
        assert_columns_match(&tables.diagnosis_patients);
        assert_columns_match(&tables.division_patients);
    }

    #[test]
    fn test_empty_csv_table_keeps_header() {
        let tmp = TempDir::new().expect("tempdir");
        let writer = TableWriter::new(tmp.path(), OutputFormat::Csv);
        let empty: Vec<UnitRow> = Vec::new();
        let path = writer.write_table(UNITS, &empty).unwrap();
        assert_eq!(
            fs::read_to_string(path).unwrap(),
            "unit_name,activities_count,median_activities,distinct_activities,\
             first_occurrence,last_occurrence,timespan_days\n"
        );
    }

    #[test]
    fn test_empty_window_still_writes_trend_headers() {
        let tmp = TempDir::new().expect("tempdir");
        let mut output = sample_output();
        output.tables.trend_by_unit.clear();
        output.tables.windowed_events.clear();
        TableWriter::new(tmp.path(), OutputFormat::Csv)
            .write_all(&output)
            .unwrap();

        let path = tmp.path().join(format!("{TREND_BY_UNIT}.csv"));
        let mut reader = csv::Reader::from_path(path).unwrap();
        let headers: Vec<String> = reader
            .headers()
            .unwrap()
            .iter()
            .map(String::from)
            .collect();
        assert_eq!(headers, ActivityTrendRow::COLUMNS);
        assert_eq!(reader.records().count(), 0);
    }

    #[test]
    fn test_empty_json_table_is_empty_array() {
        let tmp = TempDir::new().expect("tempdir");
        let writer = TableWriter::new(tmp.path(), OutputFormat::Json);
        let empty: Vec<PatientRow> = Vec::new();
        let path = writer.write_table(PATIENTS, &empty).unwrap();
        assert_eq!(fs::read_to_string(path).unwrap().trim(), "[]");
    }
}
