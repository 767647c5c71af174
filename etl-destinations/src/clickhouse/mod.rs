//! ClickHouse implementations of the collapser's collaborators.

pub mod client;
mod core;
mod mart;
mod metrics;
mod models;
mod schema;
mod staging;
mod state_store;
#[cfg(feature = "test-utils")]
pub mod test_utils;

pub use client::ClickHouseClient;
pub use core::ClickHouseDestination;
pub use mart::ClickHouseMartRefresher;
pub use models::{ProcessingStateRow, PropertyCollapsingRow, StagingPayloadRow};
pub use schema::{
    build_collapsing_table_sql, build_mart_table_sql, build_staging_table_sql,
    build_state_table_sql, ensure_staging_table, ensure_tables,
};
pub use staging::ClickHouseStagingSource;
pub use state_store::ClickHouseWindowStateStore;
