//! Configuration structs shared by the collapser binary and its libraries.

mod base;
mod batch;
mod clickhouse;
mod collapser;
mod pipeline;
mod retry;

pub use base::ValidationError;
pub use batch::BatchConfig;
pub use clickhouse::{ClickHouseConfig, ClickHouseTablesConfig};
pub use collapser::CollapserConfig;
pub use pipeline::PipelineConfig;
pub use retry::RetryConfig;
