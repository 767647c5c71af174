use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::error::EtlResult;
use crate::state::ProcessingWindowState;
use crate::store::state::WindowStateStore;
use crate::types::WindowFingerprint;

#[derive(Debug, Default)]
struct Inner {
    /// Latest record per fingerprint.
    window_states: HashMap<WindowFingerprint, ProcessingWindowState>,
    /// Every stored record in write order.
    history: Vec<ProcessingWindowState>,
}

/// In-memory [`WindowStateStore`] for tests and local runs.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the latest record of every window.
    pub async fn window_states(&self) -> HashMap<WindowFingerprint, ProcessingWindowState> {
        let inner = self.inner.lock().await;
        inner.window_states.clone()
    }

    /// Returns every record ever stored, oldest first.
    pub async fn history(&self) -> Vec<ProcessingWindowState> {
        let inner = self.inner.lock().await;
        inner.history.clone()
    }
}

impl WindowStateStore for MemoryStore {
    async fn get_window_state(
        &self,
        fingerprint: &WindowFingerprint,
    ) -> EtlResult<Option<ProcessingWindowState>> {
        let inner = self.inner.lock().await;
        Ok(inner.window_states.get(fingerprint).cloned())
    }

    async fn store_window_state(&self, state: ProcessingWindowState) -> EtlResult<()> {
        let mut inner = self.inner.lock().await;
        inner.history.push(state.clone());
        inner
            .window_states
            .insert(state.fingerprint.clone(), state);

        Ok(())
    }
}
