use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::shared::ValidationError;
use crate::shared::base::require_non_empty;

/// Connection settings for the ClickHouse server holding every table the collapser touches.
///
/// This intentionally does not implement [`Serialize`] to avoid leaking the password.
#[derive(Clone, Debug, Deserialize)]
pub struct ClickHouseConfig {
    /// HTTP(S) endpoint, e.g. `http://localhost:8123`.
    pub url: String,
    pub user: String,
    #[serde(default)]
    pub password: Option<SecretString>,
    pub database: String,
    #[serde(default)]
    pub tables: ClickHouseTablesConfig,
}

impl ClickHouseConfig {
    /// Returns the password, treating an empty secret as absent.
    pub fn password(&self) -> Option<String> {
        self.password
            .as_ref()
            .map(|password| password.expose_secret().to_string())
            .filter(|password| !password.is_empty())
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        require_non_empty("clickhouse.url", &self.url)?;
        require_non_empty("clickhouse.user", &self.user)?;
        require_non_empty("clickhouse.database", &self.database)?;

        if !(self.url.starts_with("http://") || self.url.starts_with("https://")) {
            return Err(ValidationError::InvalidFieldValue {
                field: "clickhouse.url".to_string(),
                constraint: "must start with http:// or https://".to_string(),
            });
        }

        self.tables.validate()
    }
}

/// Names of the ClickHouse tables used by the collapser.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ClickHouseTablesConfig {
    /// `CollapsingMergeTree` table receiving sign-annotated rows.
    #[serde(default = "default_collapsing_table")]
    pub collapsing: String,
    /// Window processing state table.
    #[serde(default = "default_state_table")]
    pub state: String,
    /// Staging table holding raw JSON payloads.
    #[serde(default = "default_staging_table")]
    pub staging: String,
    /// Per-tenant live property count mart.
    #[serde(default = "default_mart_table")]
    pub mart: String,
}

impl ClickHouseTablesConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        for (field, value) in [
            ("clickhouse.tables.collapsing", &self.collapsing),
            ("clickhouse.tables.state", &self.state),
            ("clickhouse.tables.staging", &self.staging),
            ("clickhouse.tables.mart", &self.mart),
        ] {
            require_non_empty(field, value)?;

            if !value
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_')
            {
                return Err(ValidationError::InvalidFieldValue {
                    field: field.to_string(),
                    constraint: "may only contain ASCII letters, digits and underscores"
                        .to_string(),
                });
            }
        }

        Ok(())
    }
}

impl Default for ClickHouseTablesConfig {
    fn default() -> Self {
        Self {
            collapsing: default_collapsing_table(),
            state: default_state_table(),
            staging: default_staging_table(),
            mart: default_mart_table(),
        }
    }
}

fn default_collapsing_table() -> String {
    "property_collapsing".to_string()
}

fn default_state_table() -> String {
    "etl_processing_state".to_string()
}

fn default_staging_table() -> String {
    "kafka_raw_json".to_string()
}

fn default_mart_table() -> String {
    "mart_property_count_by_tenant".to_string()
}
