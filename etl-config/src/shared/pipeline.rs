use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::shared::base::require_non_empty;
use crate::shared::{BatchConfig, ValidationError};

/// Configuration of one collapsing pipeline.
///
/// The pipeline name is part of every window fingerprint, so renaming a pipeline makes
/// all previously completed windows eligible to run again.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct PipelineConfig {
    /// Stable identity of the pipeline.
    pub name: String,
    /// Length of a processing window in minutes.
    #[serde(default = "default_window_minutes")]
    pub window_minutes: u32,
    /// Staging log topic the raw payloads are read from.
    #[serde(default = "default_staging_topic")]
    pub staging_topic: String,
    #[serde(default)]
    pub batch: BatchConfig,
    /// Maximum number of entity keys sent in a single latest-state lookup query.
    #[serde(default = "default_max_keys_per_lookup")]
    pub max_keys_per_lookup: usize,
    /// Deadline for one window execution in milliseconds.
    #[serde(default = "default_execution_timeout_ms")]
    pub execution_timeout_ms: u64,
}

impl PipelineConfig {
    pub const DEFAULT_WINDOW_MINUTES: u32 = 15;

    pub const DEFAULT_STAGING_TOPIC: &'static str = "property-events";

    pub const DEFAULT_MAX_KEYS_PER_LOOKUP: usize = 10_000;

    /// One hour.
    pub const DEFAULT_EXECUTION_TIMEOUT_MS: u64 = 60 * 60 * 1000;

    /// Creates a configuration with defaults for everything but the name.
    pub fn with_name(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            window_minutes: default_window_minutes(),
            staging_topic: default_staging_topic(),
            batch: BatchConfig::default(),
            max_keys_per_lookup: default_max_keys_per_lookup(),
            execution_timeout_ms: default_execution_timeout_ms(),
        }
    }

    /// Returns the window length.
    pub fn window_length(&self) -> Duration {
        Duration::from_secs(u64::from(self.window_minutes) * 60)
    }

    /// Returns the execution deadline of a single window.
    pub fn execution_timeout(&self) -> Duration {
        Duration::from_millis(self.execution_timeout_ms)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        require_non_empty("pipeline.name", &self.name)?;
        require_non_empty("pipeline.staging_topic", &self.staging_topic)?;
        self.batch.validate()?;

        if self.window_minutes == 0 {
            return Err(ValidationError::InvalidFieldValue {
                field: "pipeline.window_minutes".to_string(),
                constraint: "must be greater than 0".to_string(),
            });
        }

        // Windows are aligned to whole boundaries within a day.
        if (24 * 60) % self.window_minutes != 0 {
            return Err(ValidationError::InvalidFieldValue {
                field: "pipeline.window_minutes".to_string(),
                constraint: "must evenly divide a day".to_string(),
            });
        }

        if self.max_keys_per_lookup == 0 {
            return Err(ValidationError::InvalidFieldValue {
                field: "pipeline.max_keys_per_lookup".to_string(),
                constraint: "must be greater than 0".to_string(),
            });
        }

        if self.execution_timeout_ms == 0 {
            return Err(ValidationError::InvalidFieldValue {
                field: "pipeline.execution_timeout_ms".to_string(),
                constraint: "must be greater than 0".to_string(),
            });
        }

        Ok(())
    }
}

fn default_window_minutes() -> u32 {
    PipelineConfig::DEFAULT_WINDOW_MINUTES
}

fn default_staging_topic() -> String {
    PipelineConfig::DEFAULT_STAGING_TOPIC.to_string()
}

fn default_max_keys_per_lookup() -> usize {
    PipelineConfig::DEFAULT_MAX_KEYS_PER_LOOKUP
}

fn default_execution_timeout_ms() -> u64 {
    PipelineConfig::DEFAULT_EXECUTION_TIMEOUT_MS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_applied_when_fields_are_missing() {
        let config: PipelineConfig =
            serde_json::from_str(r#"{"name": "property_collapsing_etl"}"#).unwrap();

        assert_eq!(config, PipelineConfig::with_name("property_collapsing_etl"));
        assert_eq!(config.window_length(), Duration::from_secs(15 * 60));
        assert_eq!(config.batch.max_size, 10_000);
        assert_eq!(config.staging_topic, "property-events");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_window_that_does_not_divide_a_day() {
        let mut config = PipelineConfig::with_name("p");
        config.window_minutes = 7;

        assert!(matches!(
            config.validate(),
            Err(ValidationError::InvalidFieldValue { .. })
        ));
    }

    #[test]
    fn rejects_empty_name() {
        let config = PipelineConfig::with_name("  ");

        assert_eq!(
            config.validate(),
            Err(ValidationError::EmptyField("pipeline.name".to_string()))
        );
    }

    #[test]
    fn rejects_zero_batch_size() {
        let mut config = PipelineConfig::with_name("p");
        config.batch.max_size = 0;

        assert!(config.validate().is_err());
    }
}
