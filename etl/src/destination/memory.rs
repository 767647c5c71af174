use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::info;

use crate::destination::{BatchWriter, LatestStateReader};
use crate::error::EtlResult;
use crate::types::{CollapsingRow, EntityKey, Sign};

#[derive(Debug, Default)]
struct Inner {
    /// Every appended row in append order. Rows are never merged.
    rows: Vec<CollapsingRow>,
    /// Keys of every lookup, in call order.
    lookups: Vec<Vec<EntityKey>>,
    append_calls: u64,
}

/// In-memory row store behaving like an unmerged collapsing table.
///
/// Rows are kept exactly as appended, so lookups see cancelled history the same way a
/// collapsing table does before its background merges run. The inspection helpers compute
/// what a fully merged table would contain.
#[derive(Debug, Clone, Default)]
pub struct MemoryDestination {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryDestination {
    pub fn new() -> Self {
        Self::default()
    }

    /// Preloads persisted rows without counting an append call.
    pub async fn seed(&self, rows: Vec<CollapsingRow>) {
        let mut inner = self.inner.lock().await;
        inner.rows.extend(rows);
    }

    /// Returns a copy of all rows in append order.
    pub async fn rows(&self) -> Vec<CollapsingRow> {
        let inner = self.inner.lock().await;
        inner.rows.clone()
    }

    /// Returns the keys requested by each lookup.
    pub async fn lookups(&self) -> Vec<Vec<EntityKey>> {
        let inner = self.inner.lock().await;
        inner.lookups.clone()
    }

    pub async fn append_calls(&self) -> u64 {
        let inner = self.inner.lock().await;
        inner.append_calls
    }

    /// Returns `sum(sign)` per key over every row ever written.
    pub async fn sum_of_signs(&self) -> BTreeMap<EntityKey, i64> {
        let inner = self.inner.lock().await;

        let mut sums = BTreeMap::new();
        for row in &inner.rows {
            *sums.entry(row.key.clone()).or_insert(0) += i64::from(row.sign.as_i8());
        }

        sums
    }

    /// Returns the `+1` rows that survive collapsing, per key.
    ///
    /// Each `-1` row removes one `+1` row that is identical apart from its sign.
    pub async fn live_rows(&self) -> BTreeMap<EntityKey, Vec<CollapsingRow>> {
        let inner = self.inner.lock().await;

        let mut live: BTreeMap<EntityKey, Vec<CollapsingRow>> = BTreeMap::new();
        for row in &inner.rows {
            let rows = live.entry(row.key.clone()).or_default();
            match row.sign {
                Sign::State => rows.push(row.clone()),
                Sign::Cancel => {
                    let cancelled = CollapsingRow {
                        sign: Sign::State,
                        ..row.clone()
                    };
                    if let Some(position) = rows.iter().position(|live| *live == cancelled) {
                        rows.remove(position);
                    }
                }
            }
        }

        live.retain(|_, rows| !rows.is_empty());
        live
    }

    pub async fn clear(&self) {
        let mut inner = self.inner.lock().await;
        inner.rows.clear();
        inner.lookups.clear();
        inner.append_calls = 0;
    }
}

impl LatestStateReader for MemoryDestination {
    async fn fetch_latest_rows(&self, keys: &[EntityKey]) -> EtlResult<Vec<CollapsingRow>> {
        let mut inner = self.inner.lock().await;
        inner.lookups.push(keys.to_vec());

        let requested: HashSet<&EntityKey> = keys.iter().collect();
        let mut rows: Vec<CollapsingRow> = inner
            .rows
            .iter()
            .filter(|row| row.is_state() && requested.contains(&row.key))
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.key.cmp(&b.key).then(b.version.cmp(&a.version)));

        Ok(rows)
    }
}

impl BatchWriter for MemoryDestination {
    fn name() -> &'static str {
        "memory"
    }

    async fn append_rows(&self, rows: Vec<CollapsingRow>) -> EtlResult<u64> {
        let mut inner = self.inner.lock().await;

        let written = rows.len() as u64;
        info!(rows = written, "appending rows to memory destination");

        inner.append_calls += 1;
        inner.rows.extend(rows);

        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PropertyAttributes;

    fn row(entity: &str, version: u64, sign: Sign) -> CollapsingRow {
        CollapsingRow {
            key: EntityKey::new("t", entity),
            version,
            sign,
            created_at: None,
            modified_at: None,
            attributes: PropertyAttributes::default(),
        }
    }

    #[tokio::test]
    async fn lookup_returns_state_rows_by_key_then_version_descending() {
        let destination = MemoryDestination::new();
        destination
            .seed(vec![
                row("b", 1, Sign::State),
                row("a", 1, Sign::State),
                row("a", 1, Sign::Cancel),
                row("a", 2, Sign::State),
                row("c", 1, Sign::State),
            ])
            .await;

        let rows = destination
            .fetch_latest_rows(&[EntityKey::new("t", "a"), EntityKey::new("t", "b")])
            .await
            .unwrap();

        assert_eq!(
            rows,
            vec![
                row("a", 2, Sign::State),
                row("a", 1, Sign::State),
                row("b", 1, Sign::State),
            ]
        );
    }

    #[tokio::test]
    async fn live_rows_net_out_cancelled_pairs() {
        let destination = MemoryDestination::new();
        destination
            .append_rows(vec![
                row("a", 1, Sign::State),
                row("a", 1, Sign::Cancel),
                row("a", 2, Sign::State),
            ])
            .await
            .unwrap();

        let live = destination.live_rows().await;
        assert_eq!(live.len(), 1);
        assert_eq!(live[&EntityKey::new("t", "a")], vec![row("a", 2, Sign::State)]);
        assert_eq!(destination.sum_of_signs().await[&EntityKey::new("t", "a")], 1);
        assert_eq!(destination.append_calls().await, 1);
    }
}
