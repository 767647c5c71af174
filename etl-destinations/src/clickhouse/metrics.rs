use std::sync::Once;

use metrics::{Unit, describe_histogram};

static REGISTER_METRICS: Once = Once::new();

/// Duration of a single INSERT statement from first write to server acknowledgement.
/// Labels: `table`.
pub const ETL_CH_INSERT_DURATION_SECONDS: &str = "etl_ch_insert_duration_seconds";

/// Duration of queries and statements other than row inserts.
/// Labels: `query`, the static description of the statement.
pub const ETL_CH_QUERY_DURATION_SECONDS: &str = "etl_ch_query_duration_seconds";

/// Register ClickHouse-specific metrics.
///
/// Safe to call multiple times, registration happens only once.
pub fn register_metrics() {
    REGISTER_METRICS.call_once(|| {
        describe_histogram!(
            ETL_CH_INSERT_DURATION_SECONDS,
            Unit::Seconds,
            "Duration of INSERT statements from first write to server acknowledgement, labeled by table"
        );

        describe_histogram!(
            ETL_CH_QUERY_DURATION_SECONDS,
            Unit::Seconds,
            "Duration of lookups, state reads, DDL and refresh statements sent to ClickHouse, labeled by query"
        );
    });
}
