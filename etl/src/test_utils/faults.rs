use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use crate::destination::{BatchWriter, LatestStateReader};
use crate::error::{ErrorKind, EtlResult};
use crate::etl_error;
use crate::refresh::AggregateRefresher;
use crate::source::EventSource;
use crate::state::{ProcessingWindowState, WindowStatus};
use crate::store::state::WindowStateStore;
use crate::types::{CollapsingRow, EntityKey, Window, WindowFingerprint};

/// Row store wrapper that fails lookups or appends on demand.
#[derive(Debug, Clone)]
pub struct FaultyDestination<D> {
    inner: D,
    fail_lookups: Arc<AtomicBool>,
    fail_appends: Arc<AtomicBool>,
}

impl<D> FaultyDestination<D> {
    pub fn wrap(inner: D) -> Self {
        Self {
            inner,
            fail_lookups: Arc::new(AtomicBool::new(false)),
            fail_appends: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn fail_lookups(&self, fail: bool) {
        self.fail_lookups.store(fail, Ordering::SeqCst);
    }

    pub fn fail_appends(&self, fail: bool) {
        self.fail_appends.store(fail, Ordering::SeqCst);
    }

    pub fn inner(&self) -> &D {
        &self.inner
    }
}

impl<D> LatestStateReader for FaultyDestination<D>
where
    D: LatestStateReader + Sync,
{
    async fn fetch_latest_rows(&self, keys: &[EntityKey]) -> EtlResult<Vec<CollapsingRow>> {
        if self.fail_lookups.load(Ordering::SeqCst) {
            return Err(etl_error!(
                ErrorKind::StateLookupFailed,
                "Injected latest state lookup failure"
            ));
        }

        self.inner.fetch_latest_rows(keys).await
    }
}

impl<D> BatchWriter for FaultyDestination<D>
where
    D: BatchWriter + Sync,
{
    fn name() -> &'static str {
        D::name()
    }

    async fn append_rows(&self, rows: Vec<CollapsingRow>) -> EtlResult<u64> {
        if self.fail_appends.load(Ordering::SeqCst) {
            return Err(etl_error!(
                ErrorKind::DestinationWriteFailed,
                "Injected row append failure"
            ));
        }

        self.inner.append_rows(rows).await
    }
}

/// State store wrapper that can reject the completion of windows.
#[derive(Debug, Clone)]
pub struct FaultyStateStore<S> {
    inner: S,
    fail_completions: Arc<AtomicBool>,
}

impl<S> FaultyStateStore<S> {
    pub fn wrap(inner: S) -> Self {
        Self {
            inner,
            fail_completions: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn fail_completions(&self, fail: bool) {
        self.fail_completions.store(fail, Ordering::SeqCst);
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }
}

impl<S> WindowStateStore for FaultyStateStore<S>
where
    S: WindowStateStore + Sync,
{
    async fn get_window_state(
        &self,
        fingerprint: &WindowFingerprint,
    ) -> EtlResult<Option<ProcessingWindowState>> {
        self.inner.get_window_state(fingerprint).await
    }

    async fn store_window_state(&self, state: ProcessingWindowState) -> EtlResult<()> {
        if state.status == WindowStatus::Completed && self.fail_completions.load(Ordering::SeqCst)
        {
            return Err(etl_error!(
                ErrorKind::StateStoreFailed,
                "Injected window completion failure"
            ));
        }

        self.inner.store_window_state(state).await
    }
}

/// Refresher that counts calls and fails on demand.
#[derive(Debug, Clone, Default)]
pub struct FaultyRefresher {
    refreshes: Arc<AtomicU64>,
    fail: Arc<AtomicBool>,
}

impl FaultyRefresher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Returns the number of refresh attempts, failed ones included.
    pub fn refresh_count(&self) -> u64 {
        self.refreshes.load(Ordering::SeqCst)
    }
}

impl AggregateRefresher for FaultyRefresher {
    async fn refresh(&self) -> EtlResult<()> {
        self.refreshes.fetch_add(1, Ordering::SeqCst);

        if self.fail.load(Ordering::SeqCst) {
            return Err(etl_error!(
                ErrorKind::AggregateRefreshFailed,
                "Injected aggregate refresh failure"
            ));
        }

        Ok(())
    }
}

/// Source wrapper that sleeps before every fetch.
#[derive(Debug, Clone)]
pub struct SlowSource<S> {
    inner: S,
    delay: Duration,
}

impl<S> SlowSource<S> {
    pub fn wrap(inner: S, delay: Duration) -> Self {
        Self { inner, delay }
    }
}

impl<S> EventSource for SlowSource<S>
where
    S: EventSource + Sync,
{
    fn name() -> &'static str {
        S::name()
    }

    async fn fetch_raw_events(&self, window: &Window) -> EtlResult<Vec<String>> {
        tokio::time::sleep(self.delay).await;
        self.inner.fetch_raw_events(window).await
    }
}
