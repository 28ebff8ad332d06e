//! Patient- and dataset-relative elapsed time for every event.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use eda_core::models::{Event, PatientId, TimedEvent};
use eda_core::time_utils::{days_elapsed, months_elapsed};
use tracing::debug;

/// Attach `days_since_*` / `months_since_*` to every event.
///
/// Baselines are each patient's own earliest timestamp and the earliest
/// timestamp of the whole table. The result is stably re-sorted by
/// `months_since_dataset_start`, so per-patient chronological order from the
/// cleaning stage survives inside each month.
pub fn derive_temporal_features(events: &[Event]) -> Vec<TimedEvent> {
    let Some(dataset_start) = events.iter().map(|e| e.timestamp).min() else {
        return Vec::new();
    };

    let mut patient_start: HashMap<&PatientId, DateTime<Utc>> = HashMap::new();
    for event in events {
        patient_start
            .entry(&event.patient_id)
            .and_modify(|ts| *ts = (*ts).min(event.timestamp))
            .or_insert(event.timestamp);
    }

    let mut timed: Vec<TimedEvent> = events
        .iter()
        .map(|event| {
            let own_start = patient_start
                .get(&event.patient_id)
                .copied()
                .unwrap_or(event.timestamp);
            let since_patient = event.timestamp - own_start;
            let since_dataset = event.timestamp - dataset_start;
            TimedEvent {
                patient_id: event.patient_id.clone(),
                event_id: event.event_id.clone(),
                timestamp: event.timestamp,
                activity: event.activity.clone(),
                unit: event.unit.clone(),
                division: event.division.clone(),
                age: event.age,
                diagnosis: event.diagnosis.clone(),
                days_since_patient_start: days_elapsed(since_patient),
                months_since_patient_start: months_elapsed(since_patient),
                days_since_dataset_start: days_elapsed(since_dataset),
                months_since_dataset_start: months_elapsed(since_dataset),
            }
        })
        .collect();

    timed.sort_by_key(|e| e.months_since_dataset_start);

    debug!(
        "Derived temporal features for {} events across {} patients (dataset start {})",
        timed.len(),
        patient_start.len(),
        dataset_start
    );
    timed
}

/// Events whose dataset month lies in `0..=max_month`.
pub fn within_window(events: &[TimedEvent], max_month: u32) -> Vec<TimedEvent> {
    events
        .iter()
        .filter(|e| e.months_since_dataset_start <= max_month)
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeDelta, TimeZone};

    fn base() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2018, 1, 1, 0, 0, 0).unwrap()
    }

    fn make_event(patient: &str, days: i64) -> Event {
        Event {
            patient_id: PatientId::from(patient),
            event_id: format!("{patient}-{days}"),
            timestamp: base() + TimeDelta::days(days),
            activity: "Visit".to_string(),
            unit: "Unit".to_string(),
            division: "Division".to_string(),
            age: None,
            diagnosis: "Ovarian cancer".to_string(),
        }
    }

    fn find<'a>(timed: &'a [TimedEvent], id: &str) -> &'a TimedEvent {
        timed.iter().find(|e| e.event_id == id).unwrap()
    }

    #[test]
    fn test_empty_input() {
        assert!(derive_temporal_features(&[]).is_empty());
    }

    #[test]
    fn test_patient_first_event_is_month_zero() {
        let events = vec![make_event("1", 10), make_event("1", 100), make_event("2", 400)];
        let timed = derive_temporal_features(&events);
        assert_eq!(find(&timed, "1-10").months_since_patient_start, 0);
        assert_eq!(find(&timed, "1-10").days_since_patient_start, 0.0);
        assert_eq!(find(&timed, "2-400").months_since_patient_start, 0);
        // 90 days after patient 1's start: 2.96 months → 2.
        assert_eq!(find(&timed, "1-100").months_since_patient_start, 2);
    }

    #[test]
    fn test_dataset_relative_months_truncate() {
        let events = vec![
            make_event("1", 0),
            make_event("1", 29),
            make_event("1", 31),
            make_event("2", 60),
        ];
        let timed = derive_temporal_features(&events);
        assert_eq!(find(&timed, "1-0").months_since_dataset_start, 0);
        assert_eq!(find(&timed, "1-29").months_since_dataset_start, 0);
        assert_eq!(find(&timed, "1-31").months_since_dataset_start, 1);
        assert_eq!(find(&timed, "2-60").months_since_dataset_start, 1);
        assert_eq!(find(&timed, "2-60").days_since_dataset_start, 60.0);
        // Patient 2 has a single event, so its own baseline is that event.
        assert_eq!(find(&timed, "2-60").months_since_patient_start, 0);
    }

    #[test]
    fn test_resorted_by_dataset_month_stably() {
        // Input is patient-major (as produced by cleaning).
        let events = vec![
            make_event("1", 0),
            make_event("1", 200),
            make_event("2", 5),
            make_event("2", 6),
        ];
        let timed = derive_temporal_features(&events);
        let ids: Vec<&str> = timed.iter().map(|e| e.event_id.as_str()).collect();
        assert_eq!(ids, vec!["1-0", "2-5", "2-6", "1-200"]);
    }

    #[test]
    fn test_months_monotone_in_timestamp() {
        let events: Vec<Event> = (0..400).step_by(7).map(|d| make_event("1", d)).collect();
        let mut timed = derive_temporal_features(&events);
        timed.sort_by_key(|e| e.timestamp);
        assert!(timed
            .windows(2)
            .all(|w| w[0].months_since_dataset_start <= w[1].months_since_dataset_start));
    }

    #[test]
    fn test_within_window_is_inclusive() {
        let events = vec![make_event("1", 0), make_event("1", 62), make_event("1", 95)];
        let timed = derive_temporal_features(&events);
        // 62 days → month 2, 95 days → month 3.
        let windowed = within_window(&timed, 2);
        assert_eq!(windowed.len(), 2);
        assert!(windowed.iter().all(|e| e.months_since_dataset_start <= 2));
    }
}
