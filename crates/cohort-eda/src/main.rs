mod bootstrap;

use anyhow::{Context, Result};
use clap::Parser;
use eda_core::settings::Settings;
use eda_data::pipeline::Pipeline;
use eda_report::{render_summary, OutputFormat, TableWriter};

fn main() -> Result<()> {
    let settings = Settings::parse();

    bootstrap::setup_logging(settings.effective_log_level(), settings.log_file.as_deref())?;

    tracing::info!("cohort-eda v{} starting", env!("CARGO_PKG_VERSION"));

    let config = settings
        .resolve_config()
        .context("Failed to resolve pipeline configuration")?;
    let pipeline = Pipeline::new(config).context("Invalid pipeline configuration")?;
    tracing::info!(
        "Trend window: {} months, min unit activities: {}, timezone: {}",
        pipeline.config().trend_window_months,
        pipeline.config().min_unit_activities,
        pipeline.config().timezone
    );

    let format: OutputFormat = settings.format.parse()?;

    let output = pipeline
        .run_file(&settings.input)
        .with_context(|| format!("Failed to process {}", settings.input.display()))?;

    let writer = TableWriter::new(&settings.output_dir, format);
    writer
        .write_all(&output)
        .with_context(|| format!("Failed to write tables to {}", writer.output_dir().display()))?;

    if !settings.no_summary {
        print!("{}", render_summary(&output));
    }

    Ok(())
}
