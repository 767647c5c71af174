use etl::error::{ErrorKind, EtlResult};
use etl_config::shared::ClickHouseTablesConfig;
use tracing::info;

use crate::clickhouse::client::ClickHouseClient;

/// Columns of the collapsing table, in [`super::models::PropertyCollapsingRow`] order.
pub(crate) const COLLAPSING_COLUMNS: &str = "tenant_id, property_id, sign, version, \
     created_time, last_modified_time, id, survey_id, account_id, old_property_id, \
     property_type, usage_category, ownership_category, status, acknowledgement_number, \
     creation_reason, no_of_floors, source, channel, land_area, super_built_up_area, \
     created_by, last_modified_by";

/// Generates the DDL of the sign-collapsing row table.
///
/// Rows sharing `(tenant_id, property_id, version)` with opposite signs are removed by
/// background merges. Readers must not rely on merges having happened.
pub fn build_collapsing_table_sql(table_name: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS `{table_name}` (\n\
         \x20   tenant_id String,\n\
         \x20   property_id String,\n\
         \x20   sign Int8,\n\
         \x20   version UInt64,\n\
         \x20   created_time Nullable(DateTime64(3, 'UTC')),\n\
         \x20   last_modified_time Nullable(DateTime64(3, 'UTC')),\n\
         \x20   id Nullable(String),\n\
         \x20   survey_id Nullable(String),\n\
         \x20   account_id Nullable(String),\n\
         \x20   old_property_id Nullable(String),\n\
         \x20   property_type LowCardinality(Nullable(String)),\n\
         \x20   usage_category LowCardinality(Nullable(String)),\n\
         \x20   ownership_category LowCardinality(Nullable(String)),\n\
         \x20   status LowCardinality(Nullable(String)),\n\
         \x20   acknowledgement_number Nullable(String),\n\
         \x20   creation_reason LowCardinality(Nullable(String)),\n\
         \x20   no_of_floors Nullable(Int32),\n\
         \x20   source LowCardinality(Nullable(String)),\n\
         \x20   channel LowCardinality(Nullable(String)),\n\
         \x20   land_area Nullable(Float64),\n\
         \x20   super_built_up_area Nullable(Float64),\n\
         \x20   created_by Nullable(String),\n\
         \x20   last_modified_by Nullable(String)\n\
         ) ENGINE = CollapsingMergeTree(sign)\n\
         ORDER BY (tenant_id, property_id, version)"
    )
}

/// Generates the DDL of the window processing state table.
///
/// Every transition appends a row. The replacing engine keeps the most recently updated row
/// per window once parts are merged.
pub fn build_state_table_sql(table_name: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS `{table_name}` (\n\
         \x20   pipeline_name String,\n\
         \x20   fingerprint String,\n\
         \x20   window_start DateTime64(3, 'UTC'),\n\
         \x20   window_end DateTime64(3, 'UTC'),\n\
         \x20   status LowCardinality(String),\n\
         \x20   records_processed UInt64,\n\
         \x20   started_at DateTime64(3, 'UTC'),\n\
         \x20   completed_at Nullable(DateTime64(3, 'UTC')),\n\
         \x20   updated_at DateTime64(3, 'UTC')\n\
         ) ENGINE = ReplacingMergeTree(updated_at)\n\
         ORDER BY (pipeline_name, fingerprint)"
    )
}

/// Generates the DDL of the per-tenant live property count mart.
pub fn build_mart_table_sql(table_name: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS `{table_name}` (\n\
         \x20   snapshot_date Date,\n\
         \x20   tenant_id String,\n\
         \x20   property_count Int64\n\
         ) ENGINE = ReplacingMergeTree\n\
         ORDER BY (snapshot_date, tenant_id)"
    )
}

/// Generates the DDL of the staging table holding raw payloads.
///
/// In production the staging table is fed by the message log ingestion and already exists.
pub fn build_staging_table_sql(table_name: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS `{table_name}` (\n\
         \x20   topic LowCardinality(String),\n\
         \x20   payload String,\n\
         \x20   _consumed_at DateTime64(3, 'UTC') DEFAULT now64(3)\n\
         ) ENGINE = MergeTree\n\
         ORDER BY (topic, _consumed_at)"
    )
}

/// Creates the collapsing, state and mart tables when missing.
pub async fn ensure_tables(
    client: &ClickHouseClient,
    tables: &ClickHouseTablesConfig,
) -> EtlResult<()> {
    for (table_name, ddl) in [
        (&tables.collapsing, build_collapsing_table_sql(&tables.collapsing)),
        (&tables.state, build_state_table_sql(&tables.state)),
        (&tables.mart, build_mart_table_sql(&tables.mart)),
    ] {
        client
            .execute(&ddl, ErrorKind::DestinationQueryFailed, "ClickHouse DDL failed")
            .await?;
        info!(table = %table_name, "clickhouse table ready");
    }

    Ok(())
}

/// Creates the staging table when missing.
pub async fn ensure_staging_table(
    client: &ClickHouseClient,
    tables: &ClickHouseTablesConfig,
) -> EtlResult<()> {
    client
        .execute(
            &build_staging_table_sql(&tables.staging),
            ErrorKind::DestinationQueryFailed,
            "ClickHouse DDL failed",
        )
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collapsing_table_uses_sign_column_and_key_order() {
        let sql = build_collapsing_table_sql("property_collapsing");

        assert!(sql.starts_with("CREATE TABLE IF NOT EXISTS `property_collapsing` ("));
        assert!(sql.contains("ENGINE = CollapsingMergeTree(sign)"));
        assert!(sql.ends_with("ORDER BY (tenant_id, property_id, version)"));
    }

    #[test]
    fn collapsing_table_declares_every_row_column_in_order() {
        let sql = build_collapsing_table_sql("t");

        let mut position = 0;
        for column in COLLAPSING_COLUMNS.split(',').map(str::trim) {
            let needle = format!("    {column} ");
            let found = sql[position..]
                .find(&needle)
                .unwrap_or_else(|| panic!("column {column} missing or out of order"));
            position += found + needle.len();
        }
    }

    #[test]
    fn state_table_replaces_by_update_time() {
        let sql = build_state_table_sql("etl_processing_state");

        assert!(sql.contains("ENGINE = ReplacingMergeTree(updated_at)"));
        assert!(sql.contains("ORDER BY (pipeline_name, fingerprint)"));
    }
}
