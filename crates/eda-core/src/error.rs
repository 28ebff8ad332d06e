use std::path::PathBuf;
use thiserror::Error;

/// All errors produced by the EDA pipeline.
///
/// Every variant is fatal: the pipeline stops before building any aggregate
/// table. Data-quality conditions (sentinel diagnoses, zero-duration patients,
/// undefined z-scores) are handled by exclusion or missing values instead.
#[derive(Error, Debug)]
pub enum EdaError {
    /// The input file could not be opened or read from disk.
    #[error("Failed to read file {path}: {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// One or more required columns are absent from the header row.
    #[error("Missing required columns in {path}: {}", columns.join(", "))]
    MissingColumns { path: PathBuf, columns: Vec<String> },

    /// A delimited record could not be decoded.
    #[error("Failed to parse CSV: {0}")]
    Csv(#[from] csv::Error),

    /// A timestamp cell did not match any recognised format.
    #[error("Invalid timestamp on row {row}: {value:?}")]
    TimestampParse { row: u64, value: String },

    /// A non-empty numeric cell could not be parsed as a number.
    #[error("Invalid number in column {column} on row {row}: {value:?}")]
    InvalidNumber {
        row: u64,
        column: String,
        value: String,
    },

    /// A JSON document could not be parsed or produced.
    #[error("Failed to parse JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// A configuration value is missing or invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Pass-through for any raw I/O error that does not carry a path.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Catch-all for errors from third-party crates via `anyhow`.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Convenience alias used throughout the EDA crates.
pub type Result<T> = std::result::Result<T, EdaError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_file_read() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
        let err = EdaError::FileRead {
            path: PathBuf::from("/data/events.csv"),
            source: io_err,
        };
        let msg = err.to_string();
        assert!(msg.contains("Failed to read file"));
        assert!(msg.contains("/data/events.csv"));
        assert!(msg.contains("no such file"));
    }

    #[test]
    fn test_error_display_missing_columns() {
        let err = EdaError::MissingColumns {
            path: PathBuf::from("events.csv"),
            columns: vec!["patient.age".to_string(), "event.id".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "Missing required columns in events.csv: patient.age, event.id"
        );
    }

    #[test]
    fn test_error_display_timestamp_parse() {
        let err = EdaError::TimestampParse {
            row: 4,
            value: "yesterday".to_string(),
        };
        assert_eq!(err.to_string(), "Invalid timestamp on row 4: \"yesterday\"");
    }

    #[test]
    fn test_error_display_invalid_number() {
        let err = EdaError::InvalidNumber {
            row: 2,
            column: "patient.age".to_string(),
            value: "forty".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid number in column patient.age on row 2: \"forty\""
        );
    }

    #[test]
    fn test_error_display_config() {
        let err = EdaError::Config("trend window must be positive".to_string());
        assert_eq!(
            err.to_string(),
            "Configuration error: trend window must be positive"
        );
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: EdaError = io_err.into();
        assert!(err.to_string().contains("denied"));
    }

    #[test]
    fn test_error_from_serde_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("{invalid}").unwrap_err();
        let err: EdaError = json_err.into();
        assert!(err.to_string().contains("Failed to parse JSON"));
    }
}
