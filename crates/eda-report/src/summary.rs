//! Plain-text run summary printed after the tables are written.

use eda_core::formatting::{
    format_count, format_months, format_number, format_optional, percentage, MISSING,
};
use eda_core::stats::{mean, percentile};
use eda_data::pipeline::PipelineOutput;

/// Units listed under "Top units".
const TOP_UNITS: usize = 5;

/// Render the run summary: row counts, dataset span, treatment-time
/// percentiles and the busiest units.
pub fn render_summary(output: &PipelineOutput) -> String {
    let meta = &output.metadata;
    let tables = &output.tables;
    let mut out = String::new();

    out.push_str("Cohort EDA summary\n");
    out.push_str(&line("Events read", format_count(meta.rows_read as u64)));
    out.push_str(&line(
        "Events excluded",
        format!(
            "{} ({}%)",
            format_count(meta.rows_excluded as u64),
            percentage(meta.rows_excluded as f64, meta.rows_read as f64, 1)
        ),
    ));
    out.push_str(&line("Events kept", format_count(meta.rows_kept as u64)));
    out.push_str(&line("Patients", format_count(meta.patients as u64)));
    out.push_str(&line("Units", format_count(meta.units as u64)));
    out.push_str(&line("Divisions", format_count(meta.divisions as u64)));

    let span = match (meta.dataset_start, meta.dataset_end) {
        (Some(start), Some(end)) => format!(
            "{} to {}",
            start.format("%Y-%m-%d"),
            end.format("%Y-%m-%d")
        ),
        _ => MISSING.to_string(),
    };
    out.push_str(&line("Dataset span", span));

    let mean_age = mean(tables.patients.iter().map(|p| p.age));
    out.push_str(&line("Mean patient age", format_optional(mean_age, 1)));

    let mut months: Vec<f64> = tables
        .patients
        .iter()
        .map(|p| f64::from(p.treatment_time_months))
        .collect();
    months.sort_by(f64::total_cmp);
    let treatment = match (percentile(&months, 50.0), percentile(&months, 90.0)) {
        (Some(median), Some(p90)) => format!(
            "median {}, p90 {}",
            format_months(median),
            format_months(p90)
        ),
        _ => MISSING.to_string(),
    };
    out.push_str(&line("Treatment time", treatment));

    out.push_str("  Top units:\n");
    if tables.units.is_empty() {
        out.push_str(&format!("    {MISSING}\n"));
    }
    for (rank, unit) in tables.units.iter().take(TOP_UNITS).enumerate() {
        out.push_str(&format!(
            "    {}. {} ({} activities over {} days)\n",
            rank + 1,
            unit.unit_name,
            format_count(unit.activities_count),
            format_number(unit.timespan_days, 0)
        ));
    }

    out
}

fn line(label: &str, value: String) -> String {
    format!("  {:<18}{}\n", format!("{label}:"), value)
}
