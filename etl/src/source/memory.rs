use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::error::EtlResult;
use crate::source::EventSource;
use crate::types::Window;

#[derive(Debug, Default)]
struct Inner {
    /// Payloads with their consumption timestamp, in delivery order.
    payloads: Vec<(DateTime<Utc>, String)>,
    fetches: u64,
}

/// In-memory staging log.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    inner: Arc<Mutex<Inner>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a payload consumed at `consumed_at`.
    pub async fn push(&self, consumed_at: DateTime<Utc>, payload: impl Into<String>) {
        let mut inner = self.inner.lock().await;
        inner.payloads.push((consumed_at, payload.into()));
    }

    /// Returns how many times payloads were fetched.
    pub async fn fetch_count(&self) -> u64 {
        let inner = self.inner.lock().await;
        inner.fetches
    }
}

impl EventSource for MemorySource {
    fn name() -> &'static str {
        "memory"
    }

    async fn fetch_raw_events(&self, window: &Window) -> EtlResult<Vec<String>> {
        let mut inner = self.inner.lock().await;
        inner.fetches += 1;

        // Stable sort keeps insertion order for equal timestamps.
        let mut payloads: Vec<_> = inner
            .payloads
            .iter()
            .filter(|(consumed_at, _)| window.contains(*consumed_at))
            .collect();
        payloads.sort_by_key(|(consumed_at, _)| *consumed_at);

        Ok(payloads
            .into_iter()
            .map(|(_, payload)| payload.clone())
            .collect())
    }
}
