use std::sync::Arc;
use std::time::Instant;

use etl_config::shared::PipelineConfig;
use metrics::{counter, histogram};
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{Instrument, error, info, info_span, warn};

use crate::collapsing::{CollapseStats, CollapsingEncoder, StateResolver, classify_events};
use crate::conversions::event::parse_change_event;
use crate::destination::{BatchWriter, LatestStateReader};
use crate::error::{ErrorKind, EtlError, EtlResult};
#[cfg(feature = "failpoints")]
use crate::failpoints::{RUN_WINDOW_AFTER_BEGIN, RUN_WINDOW_BEFORE_COMPLETE, etl_fail_point};
use crate::metrics::{
    ERROR_KIND_LABEL, ETL_COLLAPSE_DROPPED_EVENTS_TOTAL, ETL_COLLAPSE_ROWS_WRITTEN_TOTAL,
    ETL_COLLAPSE_WINDOW_DURATION_SECONDS, ETL_COLLAPSE_WINDOWS_TOTAL, OUTCOME_LABEL,
    PIPELINE_NAME_LABEL, register_metrics,
};
use crate::refresh::AggregateRefresher;
use crate::source::EventSource;
use crate::state::{ProcessingWindowState, WindowBegin, WindowCoordinator};
use crate::store::state::WindowStateStore;
use crate::types::{ChangeEvent, Window, WindowFingerprint};

/// Result of the `run` stage of a window, before it is marked completed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WindowRun {
    /// Raw payloads returned by the source for the window.
    pub payloads_fetched: u64,
    /// Rows acknowledged by the row store.
    pub rows_written: u64,
    pub stats: CollapseStats,
}

/// Result of a window execution.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowOutcome {
    pub window: Window,
    pub fingerprint: WindowFingerprint,
    /// Rows written by the window. On replay, the count stored by the original run.
    pub records_processed: u64,
    /// `true` when the window had already completed and nothing ran.
    pub replayed: bool,
    /// Statistics of this execution. Zeroed on replay.
    pub stats: CollapseStats,
}

impl WindowOutcome {
    fn replayed(state: ProcessingWindowState) -> Self {
        Self {
            window: state.window,
            fingerprint: state.fingerprint,
            records_processed: state.records_processed,
            replayed: true,
            stats: CollapseStats::default(),
        }
    }

    fn outcome_label(&self) -> &'static str {
        if self.replayed { "replayed" } else { "completed" }
    }
}

/// Windowed collapsing pipeline.
///
/// A window is executed in three stages: [`Pipeline::begin`] records it as running,
/// [`Pipeline::run`] turns its raw payloads into collapsing rows and appends them, and
/// [`Pipeline::complete`] records the number of rows written. [`Pipeline::run_window`] composes
/// the stages under the configured deadline and triggers the aggregate refresh.
///
/// Windows submitted to the same pipeline never overlap. Lookups of one window must observe
/// the rows written by the previous one.
#[derive(Debug)]
pub struct Pipeline<Src, D, S, A> {
    config: Arc<PipelineConfig>,
    source: Src,
    resolver: StateResolver<D>,
    destination: D,
    coordinator: WindowCoordinator<S>,
    refresher: A,
    run_lock: Mutex<()>,
}

impl<Src, D, S, A> Pipeline<Src, D, S, A>
where
    Src: EventSource + Send + Sync,
    D: LatestStateReader + BatchWriter + Clone + Send + Sync,
    S: WindowStateStore + Send + Sync,
    A: AggregateRefresher + Send + Sync,
{
    pub fn new(
        config: PipelineConfig,
        source: Src,
        destination: D,
        state_store: S,
        refresher: A,
    ) -> Self {
        register_metrics();

        let coordinator = WindowCoordinator::new(config.name.clone(), state_store);

        Self {
            config: Arc::new(config),
            source,
            resolver: StateResolver::new(destination.clone()),
            destination,
            coordinator,
            refresher,
            run_lock: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn fingerprint(&self, window: &Window) -> WindowFingerprint {
        self.coordinator.fingerprint(window)
    }

    /// Opens `window`. Must run before any event of the window is fetched.
    pub async fn begin(&self, window: &Window) -> EtlResult<WindowBegin> {
        self.coordinator.begin(window).await
    }

    /// Fetches, parses, classifies, resolves and encodes the events of `window`, then appends
    /// the resulting rows in a single call.
    ///
    /// Nothing is written unless every stage before the append succeeded. Payloads that fail
    /// to parse are dropped and counted.
    pub async fn run(&self, window: &Window) -> EtlResult<WindowRun> {
        let payloads = self.source.fetch_raw_events(window).await?;
        let payloads_fetched = payloads.len() as u64;

        let (events, dropped_events) = self.parse_payloads(window, &payloads);
        let classified = classify_events(events);

        let update_keys = classified
            .iter()
            .filter(|event| event.is_update())
            .map(|event| event.key());
        let resolved = self.resolver.resolve(update_keys).await?;

        let mut encoder = CollapsingEncoder::new(resolved);
        encoder.extend(&classified);
        let (rows, mut stats) = encoder.finish();
        stats.dropped_events = dropped_events;

        let rows_written = if rows.is_empty() {
            0
        } else {
            self.destination.append_rows(rows).await?
        };

        counter!(
            ETL_COLLAPSE_ROWS_WRITTEN_TOTAL,
            PIPELINE_NAME_LABEL => self.config.name.clone()
        )
        .increment(rows_written);

        info!(
            payloads_fetched,
            inserts = stats.inserts,
            updates = stats.updates,
            fallback_inserts = stats.fallback_inserts,
            dropped_events = stats.dropped_events,
            rows_written,
            destination = D::name(),
            "window rows written"
        );

        Ok(WindowRun {
            payloads_fetched,
            rows_written,
            stats,
        })
    }

    /// Marks the running window completed with the rows written by `run`.
    pub async fn complete(
        &self,
        state: ProcessingWindowState,
        run: WindowRun,
    ) -> EtlResult<WindowOutcome> {
        let state = self.coordinator.complete(state, run.rows_written).await?;

        Ok(WindowOutcome {
            window: state.window,
            fingerprint: state.fingerprint,
            records_processed: state.records_processed,
            replayed: false,
            stats: run.stats,
        })
    }

    /// Executes `window` end to end.
    ///
    /// A window that already completed returns its stored count without touching the source,
    /// the row store or the refresher. If the deadline expires the window is left running and
    /// [`ErrorKind::WindowTimeout`] is returned. The aggregate refresh runs only when rows were
    /// written. Its failure is returned even though the window stays completed.
    pub async fn run_window(&self, window: &Window) -> EtlResult<WindowOutcome> {
        let _run_guard = self.run_lock.lock().await;

        let span = info_span!(
            "window",
            pipeline_name = %self.config.name,
            window_start = %window.start(),
            window_end = %window.end(),
            fingerprint = %self.fingerprint(window),
        );

        let started = Instant::now();
        let result = self.run_window_inner(window).instrument(span).await;
        self.record_window_metrics(&result, started);

        result
    }

    async fn run_window_inner(&self, window: &Window) -> EtlResult<WindowOutcome> {
        let deadline = self.config.execution_timeout();
        let outcome = match timeout(deadline, self.execute(window)).await {
            Ok(result) => result?,
            Err(elapsed) => {
                warn!(
                    timeout_ms = deadline.as_millis() as u64,
                    "window execution timed out, leaving it running"
                );
                return Err(elapsed.into());
            }
        };

        if outcome.replayed || outcome.records_processed == 0 {
            return Ok(outcome);
        }

        if let Err(err) = self.refresher.refresh().await {
            error!(
                error = %err,
                records_processed = outcome.records_processed,
                "aggregate refresh failed after the window completed"
            );
            return Err(err);
        }

        info!(records_processed = outcome.records_processed, "aggregate refresh triggered");

        Ok(outcome)
    }

    async fn execute(&self, window: &Window) -> EtlResult<WindowOutcome> {
        let state = match self.begin(window).await? {
            WindowBegin::Fresh(state) => state,
            WindowBegin::AlreadyCompleted(state) => return Ok(WindowOutcome::replayed(state)),
        };

        #[cfg(feature = "failpoints")]
        etl_fail_point(RUN_WINDOW_AFTER_BEGIN)?;

        let run = self.run(window).await?;

        #[cfg(feature = "failpoints")]
        etl_fail_point(RUN_WINDOW_BEFORE_COMPLETE)?;

        self.complete(state, run).await
    }

    fn parse_payloads(&self, window: &Window, payloads: &[String]) -> (Vec<ChangeEvent>, u64) {
        let mut events = Vec::with_capacity(payloads.len());
        let mut dropped = 0;

        for (position, payload) in payloads.iter().enumerate() {
            match parse_change_event(payload) {
                Ok(event) => events.push(event),
                Err(err) => {
                    dropped += 1;
                    error!(
                        %window,
                        position,
                        error = %err,
                        "dropping malformed payload"
                    );
                }
            }
        }

        if dropped > 0 {
            counter!(
                ETL_COLLAPSE_DROPPED_EVENTS_TOTAL,
                PIPELINE_NAME_LABEL => self.config.name.clone()
            )
            .increment(dropped);
        }

        (events, dropped)
    }

    fn record_window_metrics(&self, result: &EtlResult<WindowOutcome>, started: Instant) {
        let outcome = match result {
            Ok(outcome) => outcome.outcome_label(),
            Err(_) => "failed",
        };

        histogram!(
            ETL_COLLAPSE_WINDOW_DURATION_SECONDS,
            PIPELINE_NAME_LABEL => self.config.name.clone(),
            OUTCOME_LABEL => outcome
        )
        .record(started.elapsed().as_secs_f64());

        match result {
            Ok(_) => counter!(
                ETL_COLLAPSE_WINDOWS_TOTAL,
                PIPELINE_NAME_LABEL => self.config.name.clone(),
                OUTCOME_LABEL => outcome
            )
            .increment(1),
            Err(err) => counter!(
                ETL_COLLAPSE_WINDOWS_TOTAL,
                PIPELINE_NAME_LABEL => self.config.name.clone(),
                OUTCOME_LABEL => outcome,
                ERROR_KIND_LABEL => error_kind_label(err)
            )
            .increment(1),
        }
    }

    pub fn source(&self) -> &Src {
        &self.source
    }

    pub fn destination(&self) -> &D {
        &self.destination
    }

    pub fn state_store(&self) -> &S {
        self.coordinator.store()
    }

    pub fn refresher(&self) -> &A {
        &self.refresher
    }
}

fn error_kind_label(err: &EtlError) -> String {
    let kind: ErrorKind = err.kind();
    format!("{kind:?}")
}
