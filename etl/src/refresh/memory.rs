use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::EtlResult;
use crate::refresh::AggregateRefresher;

/// Refresher that only counts how many times it was triggered.
#[derive(Debug, Clone, Default)]
pub struct MemoryRefresher {
    refreshes: Arc<AtomicU64>,
}

impl MemoryRefresher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn refresh_count(&self) -> u64 {
        self.refreshes.load(Ordering::SeqCst)
    }
}

impl AggregateRefresher for MemoryRefresher {
    async fn refresh(&self) -> EtlResult<()> {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
