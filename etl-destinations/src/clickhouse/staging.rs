use etl::error::{ErrorKind, EtlResult};
use etl::source::EventSource;
use etl::types::Window;
use tracing::debug;

use crate::clickhouse::client::ClickHouseClient;
use crate::clickhouse::models::StagingPayloadRow;

/// Event source reading raw payloads of one topic from a ClickHouse staging table.
///
/// Payloads are returned ordered by consumption time, which is the delivery order of the
/// upstream log.
#[derive(Clone)]
pub struct ClickHouseStagingSource {
    client: ClickHouseClient,
    table_name: String,
    topic: String,
}

impl ClickHouseStagingSource {
    pub fn new(
        client: ClickHouseClient,
        table_name: impl Into<String>,
        topic: impl Into<String>,
    ) -> Self {
        Self {
            client,
            table_name: table_name.into(),
            topic: topic.into(),
        }
    }

    fn select_sql(&self) -> String {
        format!(
            "SELECT payload FROM `{}` \
             WHERE topic = ? \
             AND _consumed_at >= fromUnixTimestamp64Milli(toInt64(?), 'UTC') \
             AND _consumed_at < fromUnixTimestamp64Milli(toInt64(?), 'UTC') \
             ORDER BY _consumed_at",
            self.table_name
        )
    }
}

impl EventSource for ClickHouseStagingSource {
    fn name() -> &'static str {
        "clickhouse_staging"
    }

    async fn fetch_raw_events(&self, window: &Window) -> EtlResult<Vec<String>> {
        let query = self
            .client
            .query(&self.select_sql())
            .bind(self.topic.as_str())
            .bind(window.start().timestamp_millis())
            .bind(window.end().timestamp_millis());

        let rows: Vec<StagingPayloadRow> = self
            .client
            .fetch_all(
                query,
                ErrorKind::SourceQueryFailed,
                "ClickHouse staging query failed",
            )
            .await?;

        debug!(
            topic = %self.topic,
            window = %window,
            payloads = rows.len(),
            "fetched staged payloads"
        );

        Ok(rows.into_iter().map(|row| row.payload).collect())
    }
}
