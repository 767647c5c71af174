use chrono::Utc;
use tracing::{info, warn};

use crate::error::EtlResult;
use crate::state::ProcessingWindowState;
use crate::store::state::WindowStateStore;
use crate::types::{Window, WindowFingerprint};

/// Result of opening a window.
#[derive(Debug, Clone, PartialEq)]
pub enum WindowBegin {
    /// The window must be processed. Its running record has been stored.
    Fresh(ProcessingWindowState),
    /// The window already completed. Nothing downstream may run again.
    AlreadyCompleted(ProcessingWindowState),
}

impl WindowBegin {
    /// Returns the row count recorded by a previous completed run.
    pub fn completed_records(&self) -> Option<u64> {
        match self {
            WindowBegin::Fresh(_) => None,
            WindowBegin::AlreadyCompleted(state) => Some(state.records_processed),
        }
    }
}

/// Guards windows against duplicate and partial execution.
///
/// `NONE -> RUNNING -> COMPLETED`, keyed by the window fingerprint. A record found running on
/// entry was left behind by an interrupted attempt. It is overwritten with a new running
/// record and the window is processed from scratch. Whether to re-run such windows is the
/// caller's decision.
#[derive(Debug, Clone)]
pub struct WindowCoordinator<S> {
    pipeline_name: String,
    store: S,
}

impl<S> WindowCoordinator<S>
where
    S: WindowStateStore,
{
    pub fn new(pipeline_name: impl Into<String>, store: S) -> Self {
        Self {
            pipeline_name: pipeline_name.into(),
            store,
        }
    }

    pub fn pipeline_name(&self) -> &str {
        &self.pipeline_name
    }

    pub fn fingerprint(&self, window: &Window) -> WindowFingerprint {
        WindowFingerprint::new(&self.pipeline_name, window.end())
    }

    /// Opens `window`, writing its running record unless it already completed.
    pub async fn begin(&self, window: &Window) -> EtlResult<WindowBegin> {
        let fingerprint = self.fingerprint(window);

        match self.store.get_window_state(&fingerprint).await? {
            Some(state) if state.is_completed() => {
                info!(
                    %window,
                    %fingerprint,
                    records_processed = state.records_processed,
                    "window already completed, skipping"
                );
                return Ok(WindowBegin::AlreadyCompleted(state));
            }
            Some(state) => {
                warn!(
                    %window,
                    %fingerprint,
                    previous_started_at = %state.started_at,
                    "window was left running by a previous attempt, processing it again"
                );
            }
            None => {}
        }

        let state = ProcessingWindowState::running(&self.pipeline_name, *window, Utc::now());
        self.store.store_window_state(state.clone()).await?;

        info!(%window, %fingerprint, "window started");

        Ok(WindowBegin::Fresh(state))
    }

    /// Marks a running window completed with the number of rows it wrote.
    pub async fn complete(
        &self,
        mut state: ProcessingWindowState,
        records_processed: u64,
    ) -> EtlResult<ProcessingWindowState> {
        state.complete(records_processed, Utc::now())?;
        self.store.store_window_state(state.clone()).await?;

        info!(
            window = %state.window,
            fingerprint = %state.fingerprint,
            records_processed,
            "window completed"
        );

        Ok(state)
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}
