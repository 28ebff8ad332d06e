//! Ordering and sentinel-diagnosis exclusion.
//!
//! Runs before temporal derivation so excluded rows never move a patient's
//! first-event baseline.

use eda_core::models::Event;
use eda_core::settings::PipelineConfig;
use tracing::debug;

/// Cleaned event table plus how many rows were excluded.
#[derive(Debug, Clone, PartialEq)]
pub struct CleanedEvents {
    pub events: Vec<Event>,
    pub excluded: usize,
}

/// Sort by (patient, timestamp, event id) and drop rows carrying a
/// non-case diagnosis.
pub fn clean_events(mut events: Vec<Event>, config: &PipelineConfig) -> CleanedEvents {
    sort_events(&mut events);

    let before = events.len();
    events.retain(|e| !config.is_excluded_diagnosis(&e.diagnosis));
    let excluded = before - events.len();

    debug!(
        "Cleaning kept {} of {} events ({} excluded by diagnosis)",
        events.len(),
        before,
        excluded
    );

    CleanedEvents { events, excluded }
}

/// Stable sort into per-patient chronological order.
pub fn sort_events(events: &mut [Event]) {
    events.sort_by(|a, b| a.ordering_key().cmp(&b.ordering_key()));
}
