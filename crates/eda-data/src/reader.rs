//! CSV ingestion for clinical event exports.
//!
//! Converts every record into an [`Event`], failing fast on the first
//! malformed row: the pipeline never continues with partial data.

use std::io::Read;
use std::path::Path;

use eda_core::error::{EdaError, Result};
use eda_core::models::{Event, PatientId};
use eda_core::time_utils::TimezoneHandler;
use serde::Deserialize;
use tracing::debug;

/// Header names every input file must carry.
pub const REQUIRED_COLUMNS: [&str; 8] = [
    COL_PATIENT_ID,
    COL_EVENT_ID,
    COL_TIMESTAMP,
    COL_ACTIVITY,
    COL_UNIT,
    COL_DIVISION,
    COL_AGE,
    COL_DIAGNOSIS,
];

pub const COL_PATIENT_ID: &str = "patient.id";
pub const COL_EVENT_ID: &str = "event.id";
pub const COL_TIMESTAMP: &str = "event.timestamp";
pub const COL_ACTIVITY: &str = "event.name";
pub const COL_UNIT: &str = "org.unit.name";
pub const COL_DIVISION: &str = "org.division.name";
pub const COL_AGE: &str = "patient.age";
pub const COL_DIAGNOSIS: &str = "patient.diagnosis";

/// One record exactly as it appears in the file, before typing.
#[derive(Debug, Deserialize)]
struct RawEventRecord {
    #[serde(rename = "patient.id")]
    patient_id: String,
    #[serde(rename = "event.id")]
    event_id: String,
    #[serde(rename = "event.timestamp")]
    timestamp: String,
    #[serde(rename = "event.name")]
    activity: String,
    #[serde(rename = "org.unit.name")]
    unit: String,
    #[serde(rename = "org.division.name")]
    division: String,
    #[serde(rename = "patient.age")]
    age: String,
    #[serde(rename = "patient.diagnosis")]
    diagnosis: String,
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Load every event from the CSV file at `path`.
///
/// Naive timestamps are interpreted in the zone of `tz`.
pub fn read_events(path: &Path, tz: &TimezoneHandler) -> Result<Vec<Event>> {
    let file = std::fs::File::open(path).map_err(|source| EdaError::FileRead {
        path: path.to_path_buf(),
        source,
    })?;
    let events = read_events_from(file, path, tz)?;
    debug!("Read {} events from {}", events.len(), path.display());
    Ok(events)
}

/// Load events from any reader. `source` is only used in error messages.
pub fn read_events_from<R: Read>(
    reader: R,
    source: &Path,
    tz: &TimezoneHandler,
) -> Result<Vec<Event>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = rdr.headers()?.clone();
    let missing: Vec<String> = REQUIRED_COLUMNS
        .iter()
        .filter(|col| !headers.iter().any(|h| h == **col))
        .map(|col| col.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(EdaError::MissingColumns {
            path: source.to_path_buf(),
            columns: missing,
        });
    }

    let mut events = Vec::new();
    for result in rdr.records() {
        let record = result?;
        let row = record.position().map_or(0, |p| p.line());
        let raw: RawEventRecord = record.deserialize(Some(&headers))?;
        events.push(to_event(raw, row, tz)?);
    }
    Ok(events)
}

// ── Internal helpers ──────────────────────────────────────────────────────────

fn to_event(raw: RawEventRecord, row: u64, tz: &TimezoneHandler) -> Result<Event> {
    let timestamp = tz
        .parse_timestamp(&raw.timestamp)
        .ok_or_else(|| EdaError::TimestampParse {
            row,
            value: raw.timestamp.clone(),
        })?;

    Ok(Event {
        patient_id: PatientId::new(raw.patient_id),
        event_id: raw.event_id,
        timestamp,
        activity: raw.activity,
        unit: raw.unit,
        division: raw.division,
        age: parse_optional_number(&raw.age, COL_AGE, row)?,
        diagnosis: raw.diagnosis,
    })
}

/// Empty cells and `NaN` are missing values; anything else must parse.
fn parse_optional_number(value: &str, column: &str, row: u64) -> Result<Option<f64>> {
    if value.is_empty() {
        return Ok(None);
    }
    match value.parse::<f64>() {
        Ok(v) if v.is_nan() => Ok(None),
        Ok(v) => Ok(Some(v)),
        Err(_) => Err(EdaError::InvalidNumber {
            row,
            column: column.to_string(),
            value: value.to_string(),
        }),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use std::io::Write;
    use tempfile::TempDir;

    const HEADER: &str = "patient.id,event.id,event.timestamp,event.name,org.unit.name,org.division.name,patient.age,patient.diagnosis";

    fn read(body: &str) -> Result<Vec<Event>> {
        read_events_from(
            body.as_bytes(),
            Path::new("inline.csv"),
            &TimezoneHandler::default(),
        )
    }

    #[test]
    fn test_read_basic_rows() {
        let body = format!(
            "{HEADER}\n\
             1,e1,2019-03-01 08:00:00,Consultation,Gyn Ward,Women's Health,54,Ovarian cancer\n\
             2,e2,2019-03-02T09:30:00Z,Surgery,OR 3,Surgery,61.5,Cervical cancer\n"
        );
        let events = read(&body).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].patient_id.as_str(), "1");
        assert_eq!(
            events[0].timestamp,
            Utc.with_ymd_and_hms(2019, 3, 1, 8, 0, 0).unwrap()
        );
        assert_eq!(events[0].division, "Women's Health");
        assert_eq!(events[1].age, Some(61.5));
        assert_eq!(events[1].activity, "Surgery");
    }

    #[test]
    fn test_extra_columns_and_order_are_tolerated() {
        let body = "patient.diagnosis,extra,patient.age,org.division.name,org.unit.name,event.name,event.timestamp,event.id,patient.id\n\
                    Vulvar cancer,x,70,Oncology,Unit A,Chemo,2020-01-01,e9,P9\n";
        let events = read(body).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].patient_id.as_str(), "P9");
        assert_eq!(events[0].diagnosis, "Vulvar cancer");
    }

    #[test]
    fn test_missing_columns_reported() {
        let body = "patient.id,event.id,event.timestamp\n1,e1,2020-01-01\n";
        match read(body) {
            Err(EdaError::MissingColumns { columns, .. }) => {
                assert_eq!(columns.len(), 5);
                assert!(columns.contains(&"patient.age".to_string()));
                assert!(columns.contains(&"patient.diagnosis".to_string()));
            }
            other => panic!("expected MissingColumns, got {other:?}"),
        }
    }

    #[test]
    fn test_unparsable_timestamp_is_fatal() {
        let body = format!(
            "{HEADER}\n\
             1,e1,2019-03-01 08:00:00,A,U,D,54,Ovarian cancer\n\
             1,e2,someday,A,U,D,54,Ovarian cancer\n"
        );
        match read(&body) {
            Err(EdaError::TimestampParse { row, value }) => {
                assert_eq!(row, 3);
                assert_eq!(value, "someday");
            }
            other => panic!("expected TimestampParse, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_age_is_none() {
        let body = format!(
            "{HEADER}\n\
             1,e1,2019-03-01,A,U,D,,Ovarian cancer\n\
             1,e2,2019-03-02,A,U,D,NaN,Ovarian cancer\n"
        );
        let events = read(&body).unwrap();
        assert_eq!(events[0].age, None);
        assert_eq!(events[1].age, None);
    }

    #[test]
    fn test_non_numeric_age_is_fatal() {
        let body = format!("{HEADER}\n1,e1,2019-03-01,A,U,D,old,Ovarian cancer\n");
        assert!(matches!(
            read(&body),
            Err(EdaError::InvalidNumber { row: 2, .. })
        ));
    }

    #[test]
    fn test_ragged_row_is_fatal() {
        let body = format!("{HEADER}\n1,e1,2019-03-01,A,U\n");
        assert!(matches!(read(&body), Err(EdaError::Csv(_))));
    }

    #[test]
    fn test_header_only_yields_no_events() {
        let events = read(&format!("{HEADER}\n")).unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn test_read_events_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("events.csv");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "{HEADER}").unwrap();
        writeln!(file, "1,e1,2019-03-01,A,U,D,40,Ovarian cancer").unwrap();
        drop(file);

        let events = read_events(&path, &TimezoneHandler::default()).unwrap();
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn test_read_events_missing_file() {
        let err = read_events(
            Path::new("/tmp/does-not-exist-cohort-eda.csv"),
            &TimezoneHandler::default(),
        )
        .unwrap_err();
        assert!(matches!(err, EdaError::FileRead { .. }));
    }
}
