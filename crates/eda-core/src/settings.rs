use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{EdaError, Result};
use crate::time_utils::{get_system_timezone, TimezoneHandler};

/// Timezone value that resolves to the system zone at run time.
pub const AUTO_TIMEZONE: &str = "auto";

// ── Settings (CLI) ─────────────────────────────────────────────────────────────

/// Aggregate a clinical event export into per-month, per-patient, per-unit
/// and per-diagnosis summary tables
#[derive(Parser, Debug, Clone)]
#[command(
    name = "cohort-eda",
    about = "Aggregate a clinical event export into chart-ready summary tables",
    version
)]
pub struct Settings {
    /// Input CSV file with one row per clinical event
    pub input: PathBuf,

    /// Directory the aggregate tables are written to
    #[arg(long, default_value = "eda-output")]
    pub output_dir: PathBuf,

    /// Output table format
    #[arg(long, default_value = "csv", value_parser = ["csv", "json"])]
    pub format: String,

    /// Pipeline config file (JSON); defaults to ~/.cohort-eda/config.json when present
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Last dataset month (inclusive) kept in the activity trend tables
    #[arg(long)]
    pub trend_window: Option<u32>,

    /// Minimum number of activities a unit needs to appear in the unit table
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    pub min_unit_activities: Option<u64>,

    /// Timezone for timestamps without an offset ("auto" uses the system zone)
    #[arg(long)]
    pub timezone: Option<String>,

    /// Logging level
    #[arg(long, default_value = "INFO", value_parser = ["DEBUG", "INFO", "WARNING", "ERROR", "CRITICAL"])]
    pub log_level: String,

    /// Log file path
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long)]
    pub debug: bool,

    /// Do not print the run summary
    #[arg(long)]
    pub no_summary: bool,

    /// Persist the effective pipeline config to the config path
    #[arg(long)]
    pub save_config: bool,
}

impl Settings {
    /// Log level after applying `--debug`.
    pub fn effective_log_level(&self) -> &str {
        if self.debug {
            "DEBUG"
        } else {
            &self.log_level
        }
    }

    /// Build the effective [`PipelineConfig`]: defaults, then the config
    /// file, then any flag given on the command line.
    pub fn resolve_config(&self) -> Result<PipelineConfig> {
        let config_path = self
            .config
            .clone()
            .unwrap_or_else(PipelineConfig::config_path);
        self.resolve_config_at(&config_path)
    }

    /// Same as [`Settings::resolve_config`] with an explicit default config
    /// location, so tests can redirect to a temporary directory.
    pub fn resolve_config_at(&self, config_path: &Path) -> Result<PipelineConfig> {
        let mut config = if self.config.is_some() || config_path.exists() {
            PipelineConfig::load_from(config_path)?
        } else {
            PipelineConfig::default()
        };

        if let Some(window) = self.trend_window {
            config.trend_window_months = window;
        }
        if let Some(min) = self.min_unit_activities {
            config.min_unit_activities = min;
        }
        if let Some(tz) = &self.timezone {
            config.timezone = tz.clone();
        }

        // "auto" is persisted as given and only resolved for this run.
        let mut resolved = config.clone();
        if resolved.timezone == AUTO_TIMEZONE {
            resolved.timezone = get_system_timezone();
        }
        resolved.validate()?;

        if self.save_config {
            config.save_to(config_path)?;
            debug!("Saved pipeline config to {}", config_path.display());
        }

        Ok(resolved)
    }
}

// ── PipelineConfig ─────────────────────────────────────────────────────────────

/// Tunable exclusion rules and windows for one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Diagnoses marking rows that are not cancer cases.
    pub excluded_diagnoses: Vec<String>,
    /// Division dropped from the division-by-patient table.
    pub excluded_division: String,
    /// Last dataset month (inclusive) of the activity trend window.
    pub trend_window_months: u32,
    /// Units with fewer activities than this are left out of the unit table.
    pub min_unit_activities: u64,
    /// IANA zone applied to timestamps that carry no offset.
    pub timezone: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            excluded_diagnoses: vec![
                "No cancer diagnosed".to_string(),
                "Unspecified tumor".to_string(),
            ],
            excluded_division: "Other".to_string(),
            trend_window_months: 36,
            min_unit_activities: 2,
            timezone: "UTC".to_string(),
        }
    }
}

impl PipelineConfig {
    /// Default location: `~/.cohort-eda/config.json`.
    pub fn config_path() -> PathBuf {
        Self::config_path_in(&dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")))
    }

    /// Config path rooted at `base_dir`.
    pub fn config_path_in(base_dir: &Path) -> PathBuf {
        base_dir.join(".cohort-eda").join("config.json")
    }

    /// Load a config file. Fields absent from the file keep their defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| EdaError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Atomically write the config, creating parent directories if needed.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;

        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, &json)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.min_unit_activities == 0 {
            return Err(EdaError::Config(
                "min_unit_activities must be at least 1".to_string(),
            ));
        }
        if !TimezoneHandler::validate_timezone(&self.timezone) {
            return Err(EdaError::Config(format!(
                "unknown timezone \"{}\"",
                self.timezone
            )));
        }
        Ok(())
    }

    /// Whether `diagnosis` is one of the non-case sentinels.
    ///
    /// Surrounding whitespace is ignored and the comparison is ASCII
    /// case-insensitive.
    pub fn is_excluded_diagnosis(&self, diagnosis: &str) -> bool {
        let d = diagnosis.trim();
        self.excluded_diagnoses
            .iter()
            .any(|s| s.trim().eq_ignore_ascii_case(d))
    }

    /// Same matching rules as [`PipelineConfig::is_excluded_diagnosis`].
    pub fn is_excluded_division(&self, division: &str) -> bool {
        division
            .trim()
            .eq_ignore_ascii_case(self.excluded_division.trim())
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────
