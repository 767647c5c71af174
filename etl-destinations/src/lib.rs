#[cfg(feature = "clickhouse")]
pub mod clickhouse;
