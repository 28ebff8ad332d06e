//! Grouped reductions over the time-augmented event table.
//!
//! [`EventStats`] plays the role of a one-pass accumulator for every
//! aggregate table: rows are fed in table order, so "first" and "last" are
//! arrival-order reductions while "earliest" and "latest" are min / max.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, TimeDelta, Utc};
use eda_core::models::{GroupLevel, PatientId, TimedEvent};
use eda_core::time_utils::days_elapsed;
use serde::Serialize;

// ── EventStats ────────────────────────────────────────────────────────────────

/// Reductions accumulated over one non-empty group of events.
#[derive(Debug, Clone)]
pub struct EventStats {
    pub count: u64,
    /// Timestamp of the first row in arrival order.
    pub first_ts: DateTime<Utc>,
    /// Timestamp of the last row in arrival order.
    pub last_ts: DateTime<Utc>,
    pub earliest_ts: DateTime<Utc>,
    pub latest_ts: DateTime<Utc>,
    /// Diagnosis of the last row in arrival order.
    pub last_diagnosis: String,
    /// `(min, max)` of `months_since_patient_start`.
    pub patient_months: (u32, u32),
    /// `(min, max)` of `months_since_dataset_start`.
    pub dataset_months: (u32, u32),
    age_sum: f64,
    age_count: u64,
    patients: HashSet<PatientId>,
    activities: HashSet<String>,
}

impl EventStats {
    fn new(event: &TimedEvent) -> Self {
        let mut stats = Self {
            count: 0,
            first_ts: event.timestamp,
            last_ts: event.timestamp,
            earliest_ts: event.timestamp,
            latest_ts: event.timestamp,
            last_diagnosis: String::new(),
            patient_months: (event.months_since_patient_start, event.months_since_patient_start),
            dataset_months: (event.months_since_dataset_start, event.months_since_dataset_start),
            age_sum: 0.0,
            age_count: 0,
            patients: HashSet::new(),
            activities: HashSet::new(),
        };
        stats.add_event(event);
        stats
    }

    /// Accumulate `event` into the group.
    pub fn add_event(&mut self, event: &TimedEvent) {
        self.count += 1;
        self.last_ts = event.timestamp;
        self.earliest_ts = self.earliest_ts.min(event.timestamp);
        self.latest_ts = self.latest_ts.max(event.timestamp);
        self.last_diagnosis.clone_from(&event.diagnosis);

        let pm = event.months_since_patient_start;
        self.patient_months = (self.patient_months.0.min(pm), self.patient_months.1.max(pm));
        let dm = event.months_since_dataset_start;
        self.dataset_months = (self.dataset_months.0.min(dm), self.dataset_months.1.max(dm));

        if let Some(age) = event.age {
            self.age_sum += age;
            self.age_count += 1;
        }
        if !self.patients.contains(&event.patient_id) {
            self.patients.insert(event.patient_id.clone());
        }
        if !self.activities.contains(&event.activity) {
            self.activities.insert(event.activity.clone());
        }
    }

    /// Fold `events` into one accumulator; `None` for an empty input.
    pub fn from_events<'a, I>(events: I) -> Option<Self>
    where
        I: IntoIterator<Item = &'a TimedEvent>,
    {
        let mut iter = events.into_iter();
        let mut stats = Self::new(iter.next()?);
        for event in iter {
            stats.add_event(event);
        }
        Some(stats)
    }

    /// Mean age over rows that carry one.
    pub fn mean_age(&self) -> Option<f64> {
        (self.age_count > 0).then(|| self.age_sum / self.age_count as f64)
    }

    /// Number of distinct patient identifiers in the group.
    pub fn patient_count(&self) -> u64 {
        self.patients.len() as u64
    }

    /// Number of distinct activity names in the group.
    pub fn distinct_activities(&self) -> u64 {
        self.activities.len() as u64
    }

    /// Duration from the first to the last row in arrival order.
    pub fn elapsed(&self) -> TimeDelta {
        self.last_ts - self.first_ts
    }
}

/// Group `events` by `key`, accumulating each group in table order.
///
/// The map iterates in key order, which gives every aggregate table a
/// deterministic row order.
pub fn group_events<'a, K, F>(events: &'a [TimedEvent], key: F) -> BTreeMap<K, EventStats>
where
    K: Ord,
    F: Fn(&'a TimedEvent) -> K,
{
    let mut groups: BTreeMap<K, EventStats> = BTreeMap::new();
    for event in events {
        groups
            .entry(key(event))
            .and_modify(|stats| stats.add_event(event))
            .or_insert_with(|| EventStats::new(event));
    }
    groups
}

// ── Monthly activity ──────────────────────────────────────────────────────────

/// Activity in one (dataset month, unit or division) bucket.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyActivityRow {
    pub months_passed: u32,
    pub group_level: GroupLevel,
    pub group_name: String,
    pub activities_count: u64,
    /// Distinct patients seen in the bucket.
    pub patient_count: u64,
    pub average_age: Option<f64>,
    pub first_ts: DateTime<Utc>,
    pub last_ts: DateTime<Utc>,
}

/// Bucket events by dataset month and organizational `level`.
///
/// Rows are ordered by month, then ascending activity count, then name.
pub fn monthly_activity(events: &[TimedEvent], level: GroupLevel) -> Vec<MonthlyActivityRow> {
    let groups = group_events(events, |e| (e.months_since_dataset_start, e.group_name(level)));

    let mut rows: Vec<MonthlyActivityRow> = groups
        .into_iter()
        .map(|((month, name), stats)| MonthlyActivityRow {
            months_passed: month,
            group_level: level,
            group_name: name.to_string(),
            activities_count: stats.count,
            patient_count: stats.patient_count(),
            average_age: stats.mean_age(),
            first_ts: stats.earliest_ts,
            last_ts: stats.latest_ts,
        })
        .collect();

    rows.sort_by_key(|r| (r.months_passed, r.activities_count));
    rows
}

// ── Unit summary ──────────────────────────────────────────────────────────────

/// Lifetime activity of one organizational unit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnitRow {
    pub unit_name: String,
    pub activities_count: u64,
    /// Event count per unit. Not a median: the column keeps the name the
    /// dashboard charts were built against.
    pub median_activities: u64,
    /// Distinct activity names performed by the unit.
    pub distinct_activities: u64,
    pub first_occurrence: DateTime<Utc>,
    pub last_occurrence: DateTime<Utc>,
    pub timespan_days: f64,
}

/// Summarize every unit, dropping units with fewer than `min_activities`
/// events. Most active units come first.
pub fn unit_summary(events: &[TimedEvent], min_activities: u64) -> Vec<UnitRow> {
    let groups = group_events(events, |e| e.unit.as_str());

    let mut rows: Vec<UnitRow> = groups
        .into_iter()
        .filter(|(_, stats)| stats.count >= min_activities)
        .map(|(name, stats)| UnitRow {
            unit_name: name.to_string(),
            activities_count: stats.count,
            median_activities: stats.count,
            distinct_activities: stats.distinct_activities(),
            first_occurrence: stats.earliest_ts,
            last_occurrence: stats.latest_ts,
            timespan_days: days_elapsed(stats.latest_ts - stats.earliest_ts),
        })
        .collect();

    rows.sort_by(|a, b| b.activities_count.cmp(&a.activities_count));
    rows
}

// ── Tests ─────────────────────────────────────────────────────────────────────
