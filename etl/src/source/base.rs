use std::future::Future;

use crate::error::EtlResult;
use crate::types::Window;

/// Read-only access to the staging log holding raw change payloads.
pub trait EventSource {
    /// Returns the name of the source, used in logs.
    fn name() -> &'static str;

    /// Returns the raw payloads consumed within `window`, in delivery order.
    ///
    /// Delivery order must be the causal order per key: successive events of one key are
    /// chained in exactly this order.
    fn fetch_raw_events(&self, window: &Window) -> impl Future<Output = EtlResult<Vec<String>>> + Send;
}
