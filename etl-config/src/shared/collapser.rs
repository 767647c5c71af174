use serde::Deserialize;

use crate::Config;
use crate::shared::{ClickHouseConfig, PipelineConfig, RetryConfig, ValidationError};

/// Top-level configuration of the `etl-collapser` service.
#[derive(Clone, Debug, Deserialize)]
pub struct CollapserConfig {
    pub pipeline: PipelineConfig,
    pub clickhouse: ClickHouseConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    /// Port of the Prometheus scrape endpoint.
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
}

impl CollapserConfig {
    pub const DEFAULT_METRICS_PORT: u16 = 9000;

    pub fn validate(&self) -> Result<(), ValidationError> {
        self.pipeline.validate()?;
        self.clickhouse.validate()?;
        self.retry.validate()?;

        Ok(())
    }
}

impl Config for CollapserConfig {
    const LIST_PARSE_KEYS: &'static [&'static str] = &[];
}

fn default_metrics_port() -> u16 {
    CollapserConfig::DEFAULT_METRICS_PORT
}
