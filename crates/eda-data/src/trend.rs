//! Population-normalized activity trends with per-group z-scores.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use eda_core::models::GroupLevel;
use eda_core::stats::{mean, z_scores};
use serde::Serialize;

use crate::aggregator::MonthlyActivityRow;

/// A monthly activity bucket enriched for trend charts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActivityTrendRow {
    pub months_passed: u32,
    pub group_level: GroupLevel,
    pub group_name: String,
    pub activities_count: u64,
    pub patient_count: u64,
    pub average_age: Option<f64>,
    pub first_ts: DateTime<Utc>,
    pub last_ts: DateTime<Utc>,
    /// Events per distinct patient in the bucket.
    pub normalized_activities_count: f64,
    /// Mean of `normalized_activities_count` over this group's series.
    pub group_mean_normalized: f64,
    /// Standard score within this group's own series; `None` when the
    /// series has a single point or no variance.
    pub zscore: Option<f64>,
}

/// Events per distinct patient. An empty bucket normalizes to zero.
pub fn normalized_activities(activities: u64, patients: u64) -> f64 {
    if patients == 0 {
        return 0.0;
    }
    activities as f64 / patients as f64
}

/// Restrict `rows` to months `0..=window_months`, normalize every bucket by
/// its patient count and standardize each group's series independently.
///
/// Statistics use only the windowed rows. Output is ordered by month, then
/// group name.
pub fn activity_trend(rows: &[MonthlyActivityRow], window_months: u32) -> Vec<ActivityTrendRow> {
    let mut windowed: Vec<&MonthlyActivityRow> = rows
        .iter()
        .filter(|r| r.months_passed <= window_months)
        .collect();
    windowed.sort_by(|a, b| {
        (a.months_passed, &a.group_name).cmp(&(b.months_passed, &b.group_name))
    });

    let normalized: Vec<f64> = windowed
        .iter()
        .map(|r| normalized_activities(r.activities_count, r.patient_count))
        .collect();

    let mut series: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    for (idx, row) in windowed.iter().enumerate() {
        series.entry(row.group_name.as_str()).or_default().push(idx);
    }

    let mut group_mean = vec![0.0; windowed.len()];
    let mut zscore = vec![None; windowed.len()];
    for indices in series.values() {
        let values: Vec<Option<f64>> = indices.iter().map(|&i| Some(normalized[i])).collect();
        let m = mean(values.iter().copied()).unwrap_or(0.0);
        for (&i, z) in indices.iter().zip(z_scores(&values)) {
            group_mean[i] = m;
            zscore[i] = z;
        }
    }

    windowed
        .into_iter()
        .enumerate()
        .map(|(i, r)| ActivityTrendRow {
            months_passed: r.months_passed,
            group_level: r.group_level,
            group_name: r.group_name.clone(),
            activities_count: r.activities_count,
            patient_count: r.patient_count,
            average_age: r.average_age,
            first_ts: r.first_ts,
            last_ts: r.last_ts,
            normalized_activities_count: normalized[i],
            group_mean_normalized: group_mean[i],
            zscore: zscore[i],
        })
        .collect()
}
