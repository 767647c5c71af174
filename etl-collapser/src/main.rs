//! Collapser service binary.
//!
//! Runs one window of the property collapsing pipeline against ClickHouse and exits. Meant to
//! be triggered on a fixed cadence by an external scheduler, which re-runs failed windows.

use chrono::{DateTime, Utc};
use clap::Parser;
use etl_config::Environment;
use etl_config::shared::CollapserConfig;
use etl_telemetry::metrics::init_metrics;
use etl_telemetry::tracing::init_tracing;
use tracing::info;

use crate::config::load_collapser_config;
use crate::core::start_collapser_with_config;
use crate::error::{CollapserError, CollapserResult};

mod config;
mod core;
mod error;

/// Collapses the property change events of one window into sign-annotated rows.
#[derive(Parser, Debug)]
#[command(name = "etl-collapser")]
#[command(about = "Collapses property change events of one window into ClickHouse")]
struct Args {
    /// Exclusive end of the window to process, in RFC 3339. Defaults to the end of the latest
    /// fully elapsed window.
    #[arg(long, value_parser = parse_window_end)]
    window_end: Option<DateTime<Utc>>,
}

fn parse_window_end(value: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(value).map(|end| end.with_timezone(&Utc))
}

fn main() {
    if let Err(err) = run() {
        eprint!("{}", err.render_report());
        std::process::exit(1);
    }
}

/// Loads configuration, initializes telemetry, starts the async runtime and processes the
/// window.
fn run() -> CollapserResult<()> {
    let args = Args::parse();

    let collapser_config = load_collapser_config()?;
    let environment = Environment::load()?;

    init_tracing(env!("CARGO_BIN_NAME"), environment).map_err(CollapserError::config)?;
    init_metrics(
        collapser_config.metrics_port,
        Some(&collapser_config.pipeline.name),
    )
    .map_err(CollapserError::config)?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async_main(collapser_config, args.window_end))
}

async fn async_main(
    collapser_config: CollapserConfig,
    window_end: Option<DateTime<Utc>>,
) -> CollapserResult<()> {
    let outcome = start_collapser_with_config(collapser_config, window_end).await?;

    info!(
        window = %outcome.window,
        fingerprint = %outcome.fingerprint,
        records_processed = outcome.records_processed,
        replayed = outcome.replayed,
        "collapser finished"
    );

    Ok(())
}
