use std::collections::{BTreeSet, HashMap};
use std::time::Instant;

use metrics::histogram;
use tracing::debug;

use crate::destination::LatestStateReader;
use crate::error::EtlResult;
use crate::metrics::ETL_COLLAPSE_STATE_LOOKUP_DURATION_SECONDS;
use crate::types::{CollapsingRow, EntityKey};

/// Live `+1` rows of the keys that received updates, at most one per key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedState {
    rows: HashMap<EntityKey, CollapsingRow>,
}

impl ResolvedState {
    /// Reduces lookup results to the highest-version `+1` row per requested key.
    ///
    /// Rows with a `-1` sign or for keys that were not requested are ignored. When two rows
    /// share the highest version the first one wins.
    pub(crate) fn reduce(requested: &BTreeSet<EntityKey>, rows: Vec<CollapsingRow>) -> Self {
        let mut latest: HashMap<EntityKey, CollapsingRow> = HashMap::with_capacity(requested.len());

        for row in rows {
            if !row.is_state() || !requested.contains(&row.key) {
                continue;
            }

            match latest.get(&row.key) {
                Some(current) if current.version >= row.version => {}
                _ => {
                    latest.insert(row.key.clone(), row);
                }
            }
        }

        Self { rows: latest }
    }

    pub fn get(&self, key: &EntityKey) -> Option<&CollapsingRow> {
        self.rows.get(key)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn into_rows(self) -> HashMap<EntityKey, CollapsingRow> {
        self.rows
    }
}

/// Batched lookup of the latest persisted state of keys receiving updates.
///
/// Lookup failures are returned unchanged. The resolver never retries, the window is
/// expected to abort.
#[derive(Debug, Clone)]
pub struct StateResolver<R> {
    reader: R,
}

impl<R> StateResolver<R>
where
    R: LatestStateReader,
{
    pub fn new(reader: R) -> Self {
        Self { reader }
    }

    /// Resolves the live row of every distinct key in `keys` with a single lookup.
    ///
    /// No lookup is issued when `keys` is empty.
    pub async fn resolve<'a, I>(&self, keys: I) -> EtlResult<ResolvedState>
    where
        I: IntoIterator<Item = &'a EntityKey>,
    {
        let requested: BTreeSet<EntityKey> = keys.into_iter().cloned().collect();
        if requested.is_empty() {
            return Ok(ResolvedState::default());
        }

        let keys: Vec<EntityKey> = requested.iter().cloned().collect();

        let started = Instant::now();
        let rows = self.reader.fetch_latest_rows(&keys).await?;
        histogram!(ETL_COLLAPSE_STATE_LOOKUP_DURATION_SECONDS)
            .record(started.elapsed().as_secs_f64());

        let returned_rows = rows.len();
        let resolved = ResolvedState::reduce(&requested, rows);

        debug!(
            requested_keys = keys.len(),
            returned_rows,
            resolved_keys = resolved.len(),
            "resolved latest state for updated keys"
        );

        Ok(resolved)
    }

    pub fn reader(&self) -> &R {
        &self.reader
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::error::ErrorKind;
    use crate::etl_error;
    use crate::types::{PropertyAttributes, Sign};

    #[derive(Clone, Default)]
    struct StubReader {
        rows: Vec<CollapsingRow>,
        requested: Arc<std::sync::Mutex<Vec<Vec<EntityKey>>>>,
        calls: Arc<AtomicUsize>,
        fail: bool,
    }

    impl LatestStateReader for StubReader {
        async fn fetch_latest_rows(&self, keys: &[EntityKey]) -> EtlResult<Vec<CollapsingRow>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.requested.lock().unwrap().push(keys.to_vec());
            if self.fail {
                return Err(etl_error!(
                    ErrorKind::StateLookupFailed,
                    "Latest state lookup failed"
                ));
            }
            Ok(self.rows.clone())
        }
    }

    fn row(entity: &str, version: u64, sign: Sign, status: &str) -> CollapsingRow {
        CollapsingRow {
            key: EntityKey::new("t", entity),
            version,
            sign,
            created_at: None,
            modified_at: None,
            attributes: PropertyAttributes {
                status: Some(status.to_string()),
                ..Default::default()
            },
        }
    }

    #[tokio::test]
    async fn empty_key_set_skips_lookup() {
        let reader = StubReader::default();
        let resolver = StateResolver::new(reader.clone());

        let resolved = resolver.resolve(std::iter::empty()).await.unwrap();

        assert!(resolved.is_empty());
        assert_eq!(reader.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn duplicate_keys_are_requested_once() {
        let reader = StubReader::default();
        let resolver = StateResolver::new(reader.clone());
        let a = EntityKey::new("t", "a");
        let b = EntityKey::new("t", "b");

        resolver.resolve([&a, &b, &a, &a]).await.unwrap();

        assert_eq!(reader.calls.load(Ordering::SeqCst), 1);
        assert_eq!(*reader.requested.lock().unwrap(), vec![vec![a, b]]);
    }

    #[tokio::test]
    async fn keeps_highest_version_state_row_per_key() {
        let reader = StubReader {
            rows: vec![
                row("a", 3, Sign::State, "v3"),
                row("a", 2, Sign::State, "v2"),
                row("a", 4, Sign::Cancel, "cancelled"),
                row("b", 1, Sign::State, "b1"),
                row("c", 9, Sign::State, "unrequested"),
            ],
            ..Default::default()
        };
        let resolver = StateResolver::new(reader);
        let a = EntityKey::new("t", "a");
        let b = EntityKey::new("t", "b");
        let missing = EntityKey::new("t", "missing");

        let resolved = resolver.resolve([&a, &b, &missing]).await.unwrap();

        assert_eq!(resolved.len(), 2);
        assert_eq!(resolved.get(&a), Some(&row("a", 3, Sign::State, "v3")));
        assert_eq!(resolved.get(&b), Some(&row("b", 1, Sign::State, "b1")));
        assert_eq!(resolved.get(&missing), None);
        assert_eq!(resolved.get(&EntityKey::new("t", "c")), None);
    }

    #[tokio::test]
    async fn out_of_order_rows_still_resolve_to_highest_version() {
        let reader = StubReader {
            rows: vec![row("a", 1, Sign::State, "v1"), row("a", 5, Sign::State, "v5")],
            ..Default::default()
        };
        let a = EntityKey::new("t", "a");

        let resolved = StateResolver::new(reader).resolve([&a]).await.unwrap();

        assert_eq!(resolved.get(&a).map(|row| row.version), Some(5));
    }

    #[tokio::test]
    async fn lookup_failure_is_propagated() {
        let reader = StubReader {
            fail: true,
            ..Default::default()
        };
        let a = EntityKey::new("t", "a");

        let err = StateResolver::new(reader).resolve([&a]).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::StateLookupFailed);
    }
}
