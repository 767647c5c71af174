use etl::destination::{BatchWriter, LatestStateReader};
use etl::error::{ErrorKind, EtlResult};
use etl::types::{CollapsingRow, EntityKey};
use etl_config::shared::{ClickHouseConfig, PipelineConfig};
use tracing::debug;

use crate::clickhouse::client::ClickHouseClient;
use crate::clickhouse::metrics::register_metrics;
use crate::clickhouse::models::PropertyCollapsingRow;
use crate::clickhouse::schema::COLLAPSING_COLUMNS;

/// Row store backed by a ClickHouse `CollapsingMergeTree` table.
///
/// Lookups only consider `sign = 1` rows and never use `FINAL`: unmerged duplicates are
/// returned and the caller keeps the highest version per key.
#[derive(Clone)]
pub struct ClickHouseDestination {
    client: ClickHouseClient,
    table_name: String,
    max_keys_per_lookup: usize,
    max_rows_per_insert: usize,
}

impl ClickHouseDestination {
    pub fn new(
        client: ClickHouseClient,
        table_name: impl Into<String>,
        max_keys_per_lookup: usize,
        max_rows_per_insert: usize,
    ) -> Self {
        register_metrics();

        Self {
            client,
            table_name: table_name.into(),
            max_keys_per_lookup: max_keys_per_lookup.max(1),
            max_rows_per_insert: max_rows_per_insert.max(1),
        }
    }

    pub fn from_config(
        client: ClickHouseClient,
        clickhouse: &ClickHouseConfig,
        pipeline: &PipelineConfig,
    ) -> Self {
        Self::new(
            client,
            &clickhouse.tables.collapsing,
            pipeline.max_keys_per_lookup,
            pipeline.batch.max_size,
        )
    }

    fn lookup_sql(&self) -> String {
        format!(
            "SELECT {COLLAPSING_COLUMNS} FROM `{}` \
             WHERE has(?, (tenant_id, property_id)) AND sign = 1 \
             ORDER BY tenant_id, property_id, version DESC",
            self.table_name
        )
    }
}

impl LatestStateReader for ClickHouseDestination {
    async fn fetch_latest_rows(&self, keys: &[EntityKey]) -> EtlResult<Vec<CollapsingRow>> {
        let sql = self.lookup_sql();
        let mut rows = Vec::new();

        for chunk in keys.chunks(self.max_keys_per_lookup) {
            let tuples: Vec<(String, String)> = chunk
                .iter()
                .map(|key| (key.tenant_id.clone(), key.entity_id.clone()))
                .collect();

            let query = self.client.query(&sql).bind(tuples);
            let fetched: Vec<PropertyCollapsingRow> = self
                .client
                .fetch_all(
                    query,
                    ErrorKind::StateLookupFailed,
                    "ClickHouse latest state lookup failed",
                )
                .await?;

            debug!(
                table = %self.table_name,
                keys = chunk.len(),
                rows = fetched.len(),
                "fetched latest rows"
            );

            for row in fetched {
                rows.push(CollapsingRow::try_from(row)?);
            }
        }

        // Chunks are individually ordered; restore the global order across chunks.
        rows.sort_by(|a, b| a.key.cmp(&b.key).then(b.version.cmp(&a.version)));

        Ok(rows)
    }
}

impl BatchWriter for ClickHouseDestination {
    fn name() -> &'static str {
        "clickhouse"
    }

    async fn append_rows(&self, rows: Vec<CollapsingRow>) -> EtlResult<u64> {
        if rows.is_empty() {
            return Ok(0);
        }

        let table_rows: Vec<PropertyCollapsingRow> =
            rows.iter().map(PropertyCollapsingRow::from).collect();

        self.client
            .insert_rows(&self.table_name, &table_rows, self.max_rows_per_insert)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_filters_live_rows_without_final() {
        let client = ClickHouseClient::new("http://localhost:8123", "default", None, "default");
        let destination = ClickHouseDestination::new(client, "property_collapsing", 0, 10);

        let sql = destination.lookup_sql();
        assert!(sql.contains("FROM `property_collapsing` WHERE"));
        assert!(sql.contains("has(?, (tenant_id, property_id)) AND sign = 1"));
        assert!(sql.ends_with("ORDER BY tenant_id, property_id, version DESC"));
        assert!(!sql.contains("FINAL"));
        assert_eq!(destination.max_keys_per_lookup, 1);
    }
}
