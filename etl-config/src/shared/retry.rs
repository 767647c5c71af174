use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::shared::ValidationError;

/// Bounded retry applied by the collapser around a whole window execution.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct RetryConfig {
    /// Number of retries after the first attempt.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Fixed delay between attempts in milliseconds.
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,
}

impl RetryConfig {
    pub const DEFAULT_MAX_RETRIES: u32 = 3;

    /// Five minutes.
    pub const DEFAULT_DELAY_MS: u64 = 5 * 60 * 1000;

    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.max_retries > 100 {
            return Err(ValidationError::InvalidFieldValue {
                field: "retry.max_retries".to_string(),
                constraint: "must be at most 100".to_string(),
            });
        }

        Ok(())
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            delay_ms: default_delay_ms(),
        }
    }
}

fn default_max_retries() -> u32 {
    RetryConfig::DEFAULT_MAX_RETRIES
}

fn default_delay_ms() -> u64 {
    RetryConfig::DEFAULT_DELAY_MS
}
