use chrono::Utc;
use etl::error::{ErrorKind, EtlResult};
use etl::etl_error;
use etl::state::ProcessingWindowState;
use etl::store::state::WindowStateStore;
use etl::types::WindowFingerprint;
use tracing::debug;

use crate::clickhouse::client::ClickHouseClient;
use crate::clickhouse::models::ProcessingStateRow;

const STATE_COLUMNS: &str = "pipeline_name, fingerprint, window_start, window_end, status, \
     records_processed, started_at, completed_at, updated_at";

/// Window state store backed by a ClickHouse `ReplacingMergeTree` table.
///
/// Each transition appends a row. Reads use `FINAL` and prefer a completed record, so a
/// late `RUNNING` row can never hide a finished window.
#[derive(Clone)]
pub struct ClickHouseWindowStateStore {
    client: ClickHouseClient,
    table_name: String,
}

impl ClickHouseWindowStateStore {
    pub fn new(client: ClickHouseClient, table_name: impl Into<String>) -> Self {
        Self {
            client,
            table_name: table_name.into(),
        }
    }

    fn select_sql(&self) -> String {
        format!(
            "SELECT {STATE_COLUMNS} FROM `{}` FINAL \
             WHERE fingerprint = ? \
             ORDER BY status = 'COMPLETED' DESC, updated_at DESC \
             LIMIT 1",
            self.table_name
        )
    }
}

impl WindowStateStore for ClickHouseWindowStateStore {
    async fn get_window_state(
        &self,
        fingerprint: &WindowFingerprint,
    ) -> EtlResult<Option<ProcessingWindowState>> {
        let query = self
            .client
            .query(&self.select_sql())
            .bind(fingerprint.as_str());

        let rows: Vec<ProcessingStateRow> = self
            .client
            .fetch_all(
                query,
                ErrorKind::StateStoreFailed,
                "ClickHouse window state read failed",
            )
            .await?;

        rows.into_iter()
            .next()
            .map(ProcessingWindowState::try_from)
            .transpose()
    }

    async fn store_window_state(&self, state: ProcessingWindowState) -> EtlResult<()> {
        let row = ProcessingStateRow::from_state(&state, Utc::now());

        self.client
            .insert_rows(&self.table_name, &[row], 1)
            .await
            .map_err(|err| {
                etl_error!(
                    ErrorKind::StateStoreFailed,
                    "ClickHouse window state write failed",
                    format!("{err}")
                )
            })?;

        debug!(
            fingerprint = %state.fingerprint.as_str(),
            status = %state.status.as_str(),
            "stored window state"
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completed_records_take_precedence() {
        let client = ClickHouseClient::new("http://localhost:8123", "default", None, "default");
        let store = ClickHouseWindowStateStore::new(client, "etl_processing_state");

        let sql = store.select_sql();
        assert!(sql.contains("FROM `etl_processing_state` FINAL"));
        assert!(sql.contains("ORDER BY status = 'COMPLETED' DESC, updated_at DESC"));
        assert!(sql.ends_with("LIMIT 1"));
    }
}
