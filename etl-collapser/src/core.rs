use std::time::Duration;

use chrono::{DateTime, Utc};
use etl::destination::{BatchWriter, LatestStateReader};
use etl::error::EtlResult;
use etl::pipeline::{Pipeline, WindowOutcome};
use etl::policy::{RetryDirective, build_error_handling_policy};
use etl::refresh::AggregateRefresher;
use etl::source::EventSource;
use etl::store::state::WindowStateStore;
use etl::types::Window;
use etl_config::shared::{CollapserConfig, RetryConfig};
use etl_destinations::clickhouse::{
    ClickHouseClient, ClickHouseDestination, ClickHouseMartRefresher, ClickHouseStagingSource,
    ClickHouseWindowStateStore, ensure_tables,
};
use tracing::{error, info, warn};

use crate::error::CollapserResult;

/// Starts the collapser for a single window using the provided configuration.
///
/// Connects to ClickHouse, creates missing tables, resolves the window to process and runs it
/// with bounded retries.
pub async fn start_collapser_with_config(
    config: CollapserConfig,
    window_end: Option<DateTime<Utc>>,
) -> CollapserResult<WindowOutcome> {
    log_config(&config);

    let client = ClickHouseClient::from_config(&config.clickhouse);
    client.ping().await?;
    ensure_tables(&client, &config.clickhouse.tables).await?;

    let window = resolve_window(window_end, config.pipeline.window_length(), Utc::now())?;

    let tables = &config.clickhouse.tables;
    let source = ClickHouseStagingSource::new(
        client.clone(),
        &tables.staging,
        &config.pipeline.staging_topic,
    );
    let destination =
        ClickHouseDestination::from_config(client.clone(), &config.clickhouse, &config.pipeline);
    let state_store = ClickHouseWindowStateStore::new(client.clone(), &tables.state);
    let refresher = ClickHouseMartRefresher::new(client, &tables.collapsing, &tables.mart);

    let pipeline = Pipeline::new(
        config.pipeline.clone(),
        source,
        destination,
        state_store,
        refresher,
    );

    let outcome = run_with_retries(&pipeline, &window, &config.retry).await?;

    Ok(outcome)
}

/// Returns the window ending at `window_end`, or the latest window completed before `now`.
pub fn resolve_window(
    window_end: Option<DateTime<Utc>>,
    window_length: Duration,
    now: DateTime<Utc>,
) -> EtlResult<Window> {
    match window_end {
        Some(end) => Window::ending_at(end, window_length),
        None => Window::latest_completed(now, window_length),
    }
}

/// Runs `window` on `pipeline`, re-running it after a fixed delay while the failure is
/// retriable and fewer than `retry.max_retries` retries were made.
///
/// Re-running is safe: a failed window is left `RUNNING` and a completed one replays as a
/// no-op.
pub async fn run_with_retries<Src, D, S, A>(
    pipeline: &Pipeline<Src, D, S, A>,
    window: &Window,
    retry: &RetryConfig,
) -> EtlResult<WindowOutcome>
where
    Src: EventSource + Send + Sync,
    D: LatestStateReader + BatchWriter + Clone + Send + Sync,
    S: WindowStateStore + Send + Sync,
    A: AggregateRefresher + Send + Sync,
{
    let mut attempt = 0u32;

    loop {
        let err = match pipeline.run_window(window).await {
            Ok(outcome) => return Ok(outcome),
            Err(err) => err,
        };

        let policy = build_error_handling_policy(&err);
        if policy.retry_directive() == RetryDirective::NoRetry || attempt >= retry.max_retries {
            error!(
                window = %window,
                attempts = attempt + 1,
                error_kind = ?err.kind(),
                solution = policy.solution().unwrap_or_default(),
                "window failed"
            );

            return Err(err);
        }

        attempt += 1;
        warn!(
            window = %window,
            attempt,
            max_retries = retry.max_retries,
            delay_ms = retry.delay_ms,
            error_kind = ?err.kind(),
            "window failed, retrying"
        );

        tokio::time::sleep(retry.delay()).await;
    }
}

fn log_config(config: &CollapserConfig) {
    info!(
        pipeline = %config.pipeline.name,
        window_minutes = config.pipeline.window_minutes,
        staging_topic = %config.pipeline.staging_topic,
        batch_max_size = config.pipeline.batch.max_size,
        max_keys_per_lookup = config.pipeline.max_keys_per_lookup,
        execution_timeout_ms = config.pipeline.execution_timeout_ms,
        "pipeline config"
    );
    info!(
        url = %config.clickhouse.url,
        user = %config.clickhouse.user,
        database = %config.clickhouse.database,
        collapsing_table = %config.clickhouse.tables.collapsing,
        state_table = %config.clickhouse.tables.state,
        "clickhouse config"
    );
    info!(
        max_retries = config.retry.max_retries,
        delay_ms = config.retry.delay_ms,
        "retry config"
    );
}
