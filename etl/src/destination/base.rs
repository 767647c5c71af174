use std::future::Future;

use crate::error::EtlResult;
use crate::types::{CollapsingRow, EntityKey};

/// Read side of the row store, used to find the live row of keys receiving updates.
pub trait LatestStateReader {
    /// Returns persisted `+1` rows for `keys`, ordered by key then version descending.
    ///
    /// Because the store merges rows in the background, a key may appear several times.
    /// Callers must keep only the first row per key. `keys` is never empty and holds no
    /// duplicates.
    fn fetch_latest_rows(
        &self,
        keys: &[EntityKey],
    ) -> impl Future<Output = EtlResult<Vec<CollapsingRow>>> + Send;
}

/// Append-only write side of the row store.
///
/// Writes are at-least-once: appending the same rows twice is tolerated since readers sum
/// signs. Row order within one call must be preserved.
pub trait BatchWriter {
    /// Returns the name of the writer, used in logs.
    fn name() -> &'static str;

    /// Appends `rows` and returns how many were written.
    fn append_rows(&self, rows: Vec<CollapsingRow>) -> impl Future<Output = EtlResult<u64>> + Send;
}
