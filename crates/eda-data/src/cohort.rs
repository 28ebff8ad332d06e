//! Per-patient aggregate tables: patients, diagnosis × patient and
//! division × patient.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use eda_core::models::{PatientId, TimedEvent};
use eda_core::stats::{mean, round_to, sample_std};
use eda_core::time_utils::days_elapsed;
use serde::Serialize;

use crate::aggregator::group_events;

// ── Patients ──────────────────────────────────────────────────────────────────

/// One patient's course through the dataset.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatientRow {
    pub patient_id: PatientId,
    pub event_count: u64,
    pub first_ts: DateTime<Utc>,
    pub last_ts: DateTime<Utc>,
    pub age: Option<f64>,
    /// Diagnosis on the patient's most recent event.
    pub cancer_type: String,
    pub start_month: u32,
    pub end_month: u32,
    pub treatment_time_days: f64,
    pub treatment_time_months: u32,
}

/// Summarize every patient. Patients whose first and last event coincide
/// are dropped; rows are ordered by treatment months, then patient id.
pub fn patient_summary(events: &[TimedEvent]) -> Vec<PatientRow> {
    let groups = group_events(events, |e| &e.patient_id);

    let mut rows: Vec<PatientRow> = groups
        .into_iter()
        .filter(|(_, stats)| stats.elapsed() != chrono::TimeDelta::zero())
        .map(|(patient_id, stats)| {
            let (start_month, end_month) = stats.patient_months;
            PatientRow {
                patient_id: patient_id.clone(),
                event_count: stats.count,
                first_ts: stats.first_ts,
                last_ts: stats.last_ts,
                age: stats.mean_age(),
                cancer_type: stats.last_diagnosis.clone(),
                start_month,
                end_month,
                treatment_time_days: days_elapsed(stats.elapsed()),
                treatment_time_months: end_month - start_month,
            }
        })
        .collect();

    rows.sort_by_key(|r| r.treatment_time_months);
    rows
}

// ── Diagnosis × patient ───────────────────────────────────────────────────────

/// A patient's course under one diagnosis, with that diagnosis' cohort
/// statistics broadcast onto the row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiagnosisPatientRow {
    pub patient_diagnosis: String,
    pub patient_id: PatientId,
    pub first_ts: DateTime<Utc>,
    pub last_ts: DateTime<Utc>,
    pub event_count: u64,
    pub patient_age: Option<f64>,
    /// Dataset-relative month of the first event.
    pub start_month: u32,
    /// Dataset-relative month of the last event.
    pub end_month: u32,
    pub treatment_time_months: u32,
    pub average_age: Option<f64>,
    pub age_deviation: Option<f64>,
    pub avg_treatment_time_months: Option<f64>,
    pub treatment_time_deviation: Option<f64>,
    /// Patients with this diagnosis in the table.
    pub case_count: u64,
}

#[derive(Debug, Default)]
struct DiagnosisCohort {
    ages: Vec<Option<f64>>,
    treatment_months: Vec<Option<f64>>,
}

/// Summarize every (diagnosis, patient) pair.
///
/// Age statistics cover every patient with the diagnosis; treatment-time
/// statistics and `case_count` cover only the rows that survive the
/// zero-duration exclusion. Broadcast values are rounded to one decimal and
/// deviations use the sample (n − 1) convention.
pub fn diagnosis_summary(events: &[TimedEvent]) -> Vec<DiagnosisPatientRow> {
    let groups = group_events(events, |e| (e.diagnosis.as_str(), &e.patient_id));

    let mut cohorts: BTreeMap<&str, DiagnosisCohort> = BTreeMap::new();
    for ((diagnosis, _), stats) in &groups {
        cohorts.entry(*diagnosis).or_default().ages.push(stats.mean_age());
    }

    let mut rows: Vec<DiagnosisPatientRow> = groups
        .iter()
        .filter(|(_, stats)| stats.elapsed() != chrono::TimeDelta::zero())
        .map(|((diagnosis, patient_id), stats)| {
            let (start_month, end_month) = stats.dataset_months;
            DiagnosisPatientRow {
                patient_diagnosis: diagnosis.to_string(),
                patient_id: (*patient_id).clone(),
                first_ts: stats.first_ts,
                last_ts: stats.last_ts,
                event_count: stats.count,
                patient_age: stats.mean_age(),
                start_month,
                end_month,
                treatment_time_months: end_month - start_month,
                average_age: None,
                age_deviation: None,
                avg_treatment_time_months: None,
                treatment_time_deviation: None,
                case_count: 0,
            }
        })
        .collect();

    for row in &rows {
        if let Some(cohort) = cohorts.get_mut(row.patient_diagnosis.as_str()) {
            cohort
                .treatment_months
                .push(Some(f64::from(row.treatment_time_months)));
        }
    }

    for row in &mut rows {
        let Some(cohort) = cohorts.get(row.patient_diagnosis.as_str()) else {
            continue;
        };
        let round1 = |v: f64| round_to(v, 1);
        row.average_age = mean(cohort.ages.iter().copied()).map(round1);
        row.age_deviation = sample_std(cohort.ages.iter().copied()).map(round1);
        row.avg_treatment_time_months = mean(cohort.treatment_months.iter().copied()).map(round1);
        row.treatment_time_deviation =
            sample_std(cohort.treatment_months.iter().copied()).map(round1);
        row.case_count = cohort.treatment_months.len() as u64;
    }

    rows
}

// ── Division × patient ────────────────────────────────────────────────────────

/// A patient's contact with one organizational division.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DivisionPatientRow {
    pub division: String,
    pub patient_id: PatientId,
    pub first_ts: DateTime<Utc>,
    pub last_ts: DateTime<Utc>,
    pub age: Option<f64>,
}

/// Summarize every (division, patient) pair, leaving out rows for which
/// `is_excluded(division)` holds.
pub fn division_patients<F>(events: &[TimedEvent], is_excluded: F) -> Vec<DivisionPatientRow>
where
    F: Fn(&str) -> bool,
{
    group_events(events, |e| (e.division.as_str(), &e.patient_id))
        .into_iter()
        .filter(|((division, _), _)| !is_excluded(division))
        .map(|((division, patient_id), stats)| DivisionPatientRow {
            division: division.to_string(),
            patient_id: patient_id.clone(),
            first_ts: stats.first_ts,
            last_ts: stats.last_ts,
            age: stats.mean_age(),
        })
        .collect()
}

// ── Tests ─────────────────────────────────────────────────────────────────────
