//! Metric names recorded by the collapsing pipeline.

use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};

static REGISTER_METRICS: Once = Once::new();

/// Label for the pipeline name.
pub const PIPELINE_NAME_LABEL: &str = "pipeline_name";

/// Label for an event classification (`insert` or `update`).
pub const CLASSIFICATION_LABEL: &str = "classification";

/// Label for a window outcome (`completed`, `replayed`, `failed`).
pub const OUTCOME_LABEL: &str = "outcome";

/// Label for error kind.
pub const ERROR_KIND_LABEL: &str = "error_kind";

/// Counter of parsed events, labeled by classification.
pub const ETL_COLLAPSE_EVENTS_TOTAL: &str = "etl_collapse_events_total";

/// Counter of updates written without a cancellation because no prior state was found.
pub const ETL_COLLAPSE_FALLBACK_INSERTS_TOTAL: &str = "etl_collapse_fallback_inserts_total";

/// Counter of payloads dropped because they could not be parsed.
pub const ETL_COLLAPSE_DROPPED_EVENTS_TOTAL: &str = "etl_collapse_dropped_events_total";

/// Counter of collapsing rows appended to the row store.
pub const ETL_COLLAPSE_ROWS_WRITTEN_TOTAL: &str = "etl_collapse_rows_written_total";

/// Counter of window executions, labeled by pipeline name and outcome.
pub const ETL_COLLAPSE_WINDOWS_TOTAL: &str = "etl_collapse_windows_total";

/// Duration of a window execution, labeled by pipeline name and outcome.
pub const ETL_COLLAPSE_WINDOW_DURATION_SECONDS: &str = "etl_collapse_window_duration_seconds";

/// Duration of the batched latest-state lookup.
pub const ETL_COLLAPSE_STATE_LOOKUP_DURATION_SECONDS: &str =
    "etl_collapse_state_lookup_duration_seconds";

/// Registers descriptions of the pipeline metrics.
///
/// Safe to call multiple times, registration happens only once.
pub fn register_metrics() {
    REGISTER_METRICS.call_once(|| {
        describe_counter!(
            ETL_COLLAPSE_EVENTS_TOTAL,
            Unit::Count,
            "Parsed change events, labeled by classification"
        );
        describe_counter!(
            ETL_COLLAPSE_FALLBACK_INSERTS_TOTAL,
            Unit::Count,
            "Updates that had no prior state and were written without a cancellation row"
        );
        describe_counter!(
            ETL_COLLAPSE_DROPPED_EVENTS_TOTAL,
            Unit::Count,
            "Raw payloads skipped because they could not be parsed"
        );
        describe_counter!(
            ETL_COLLAPSE_ROWS_WRITTEN_TOTAL,
            Unit::Count,
            "Collapsing rows appended to the row store"
        );
        describe_counter!(
            ETL_COLLAPSE_WINDOWS_TOTAL,
            Unit::Count,
            "Window executions, labeled by pipeline name and outcome"
        );
        describe_histogram!(
            ETL_COLLAPSE_WINDOW_DURATION_SECONDS,
            Unit::Seconds,
            "Duration of window executions, labeled by pipeline name and outcome"
        );
        describe_histogram!(
            ETL_COLLAPSE_STATE_LOOKUP_DURATION_SECONDS,
            Unit::Seconds,
            "Duration of the batched latest-state lookup for updated keys"
        );
    });
}
