use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

// ── PatientId ─────────────────────────────────────────────────────────────────

/// Opaque patient identifier as it appears in the source file.
///
/// Ordering is numeric when both identifiers are integers, so `"9"` sorts
/// before `"10"`; purely numeric ids sort before any non-numeric ones and
/// non-numeric ids fall back to plain string order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PatientId(String);

impl PatientId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn numeric(&self) -> Option<i64> {
        self.0.parse().ok()
    }
}

impl Ord for PatientId {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.numeric(), other.numeric()) {
            (Some(a), Some(b)) => a.cmp(&b).then_with(|| self.0.cmp(&other.0)),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => self.0.cmp(&other.0),
        }
    }
}

impl PartialOrd for PatientId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for PatientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PatientId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

// ── Event ─────────────────────────────────────────────────────────────────────

/// One timestamped clinical activity record, as loaded from the input file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub patient_id: PatientId,
    pub event_id: String,
    /// UTC instant of the activity.
    pub timestamp: DateTime<Utc>,
    /// Activity / event name.
    pub activity: String,
    /// Organizational unit that performed the activity.
    pub unit: String,
    /// Organizational division the unit belongs to.
    pub division: String,
    /// Patient age at event time; `None` when the cell was empty.
    pub age: Option<f64>,
    pub diagnosis: String,
}

impl Event {
    /// Stable ordering key used by the cleaning stage: patient, then time,
    /// then event id as the tiebreak for identical timestamps.
    pub fn ordering_key(&self) -> (&PatientId, DateTime<Utc>, &str) {
        (&self.patient_id, self.timestamp, self.event_id.as_str())
    }
}

// ── TimedEvent ────────────────────────────────────────────────────────────────

/// An [`Event`] augmented with the derived temporal fields.
///
/// Kept flat (no nested struct) so the row serializes directly to CSV.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimedEvent {
    pub patient_id: PatientId,
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub activity: String,
    pub unit: String,
    pub division: String,
    pub age: Option<f64>,
    pub diagnosis: String,
    /// Fractional days since this patient's earliest event.
    pub days_since_patient_start: f64,
    pub months_since_patient_start: u32,
    /// Fractional days since the earliest event in the whole dataset.
    pub days_since_dataset_start: f64,
    pub months_since_dataset_start: u32,
}

impl TimedEvent {
    /// The grouping label for `level`.
    pub fn group_name(&self, level: GroupLevel) -> &str {
        match level {
            GroupLevel::Unit => &self.unit,
            GroupLevel::Division => &self.division,
        }
    }
}

// ── GroupLevel ────────────────────────────────────────────────────────────────

/// Organizational level used as the second half of a time bucket key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupLevel {
    Unit,
    Division,
}

impl fmt::Display for GroupLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupLevel::Unit => f.write_str("unit"),
            GroupLevel::Division => f.write_str("division"),
        }
    }
}
