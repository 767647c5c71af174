use std::future::Future;

use crate::error::EtlResult;

/// Zero-argument signal telling a downstream collaborator that aggregates may be recomputed.
///
/// Only fired for windows that wrote at least one row. Implementations must compute from
/// summed signs rather than row counts, since rows may not be merged yet.
pub trait AggregateRefresher {
    fn refresh(&self) -> impl Future<Output = EtlResult<()>> + Send;
}
