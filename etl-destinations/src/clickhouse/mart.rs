use etl::error::{ErrorKind, EtlResult};
use etl::refresh::AggregateRefresher;
use tracing::info;

use crate::clickhouse::client::ClickHouseClient;

/// Recomputes today's live property count per tenant from summed signs.
///
/// A refresh appends a snapshot for the current day; the replacing engine of the mart keeps
/// one row per `(snapshot_date, tenant_id)` after merges.
#[derive(Clone)]
pub struct ClickHouseMartRefresher {
    client: ClickHouseClient,
    collapsing_table: String,
    mart_table: String,
}

impl ClickHouseMartRefresher {
    pub fn new(
        client: ClickHouseClient,
        collapsing_table: impl Into<String>,
        mart_table: impl Into<String>,
    ) -> Self {
        Self {
            client,
            collapsing_table: collapsing_table.into(),
            mart_table: mart_table.into(),
        }
    }

    fn refresh_sql(&self) -> String {
        format!(
            "INSERT INTO `{}` (snapshot_date, tenant_id, property_count) \
             SELECT today() AS snapshot_date, tenant_id, sum(sign) AS property_count \
             FROM `{}` \
             WHERE status = 'ACTIVE' \
             GROUP BY tenant_id \
             HAVING property_count > 0",
            self.mart_table, self.collapsing_table
        )
    }
}

impl AggregateRefresher for ClickHouseMartRefresher {
    async fn refresh(&self) -> EtlResult<()> {
        self.client
            .execute(
                &self.refresh_sql(),
                ErrorKind::AggregateRefreshFailed,
                "ClickHouse mart refresh failed",
            )
            .await?;

        info!(mart = %self.mart_table, "refreshed property count mart");

        Ok(())
    }
}
