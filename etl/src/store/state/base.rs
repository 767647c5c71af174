use std::future::Future;

use crate::error::EtlResult;
use crate::state::ProcessingWindowState;
use crate::types::WindowFingerprint;

/// Storage of [`ProcessingWindowState`] records keyed by window fingerprint.
///
/// Implementations must offer read-your-writes consistency for a single writer: a state
/// stored by [`WindowStateStore::store_window_state`] is returned by the next
/// [`WindowStateStore::get_window_state`] call.
pub trait WindowStateStore {
    /// Returns the state recorded for `fingerprint`.
    ///
    /// When several records exist, a completed one takes precedence.
    fn get_window_state(
        &self,
        fingerprint: &WindowFingerprint,
    ) -> impl Future<Output = EtlResult<Option<ProcessingWindowState>>> + Send;

    /// Records `state`, replacing whatever was stored for its fingerprint.
    fn store_window_state(
        &self,
        state: ProcessingWindowState,
    ) -> impl Future<Output = EtlResult<()>> + Send;
}
