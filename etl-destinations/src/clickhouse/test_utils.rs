//! Test utilities for the ClickHouse collaborators.

use clickhouse::Client;
use etl_config::shared::{ClickHouseTablesConfig, PipelineConfig};
use tokio::runtime::{Handle, RuntimeFlavor};
use uuid::Uuid;

use crate::clickhouse::{
    ClickHouseClient, ClickHouseDestination, ClickHouseMartRefresher, ClickHouseStagingSource,
    ClickHouseWindowStateStore, ensure_staging_table, ensure_tables,
};

/// ClickHouse HTTP URL (e.g. `http://localhost:8123`).
pub const CLICKHOUSE_URL_ENV: &str = "TESTS_CLICKHOUSE_URL";
/// ClickHouse user name (required).
pub const CLICKHOUSE_USER_ENV: &str = "TESTS_CLICKHOUSE_USER";
/// ClickHouse password (optional, omit or leave empty for passwordless access).
pub const CLICKHOUSE_PASSWORD_ENV: &str = "TESTS_CLICKHOUSE_PASSWORD";

/// Returns whether ClickHouse integration tests should be skipped.
///
/// Prints a warning and returns `true` when any required env var is missing.
pub fn skip_if_missing_clickhouse_env_vars() -> bool {
    let missing: Vec<&str> = [CLICKHOUSE_URL_ENV, CLICKHOUSE_USER_ENV]
        .iter()
        .copied()
        .filter(|var| std::env::var_os(var).is_none())
        .collect();

    if missing.is_empty() {
        return false;
    }

    eprintln!(
        "skipping clickhouse integration test: missing {}",
        missing.join(", ")
    );
    true
}

/// Returns the ClickHouse HTTP URL from the environment.
///
/// # Panics
///
/// Panics if [`CLICKHOUSE_URL_ENV`] is not set.
pub fn get_clickhouse_url() -> String {
    std::env::var(CLICKHOUSE_URL_ENV)
        .unwrap_or_else(|_| panic!("{CLICKHOUSE_URL_ENV} must be set"))
}

/// Returns the ClickHouse user name from the environment.
///
/// # Panics
///
/// Panics if [`CLICKHOUSE_USER_ENV`] is not set.
pub fn get_clickhouse_user() -> String {
    std::env::var(CLICKHOUSE_USER_ENV)
        .unwrap_or_else(|_| panic!("{CLICKHOUSE_USER_ENV} must be set"))
}

/// Returns the ClickHouse password from the environment, or `None` if unset.
pub fn get_clickhouse_password() -> Option<String> {
    std::env::var(CLICKHOUSE_PASSWORD_ENV)
        .ok()
        .filter(|s| !s.is_empty())
}

/// Generates a unique database name for test isolation.
pub fn random_database_name() -> String {
    format!("collapser_tests_{}", Uuid::new_v4().simple())
}

/// Table names used by tests.
pub fn test_tables() -> ClickHouseTablesConfig {
    ClickHouseTablesConfig::default()
}

/// Isolated ClickHouse database holding the collapser's tables.
///
/// The database is dropped on [`Drop`] when running on a multi-threaded runtime.
pub struct ClickHouseTestDatabase {
    /// Root client (no database selected) used for CREATE/DROP DATABASE.
    root_client: Client,
    client: ClickHouseClient,
    database: String,
    tables: ClickHouseTablesConfig,
}

impl ClickHouseTestDatabase {
    fn new(url: String, user: String, password: Option<String>, database: String) -> Self {
        let mut root_client = Client::default().with_url(&url).with_user(&user);
        if let Some(password) = &password {
            root_client = root_client.with_password(password);
        }

        Self {
            root_client,
            client: ClickHouseClient::new(url, user, password, &database),
            database,
            tables: test_tables(),
        }
    }

    pub fn client(&self) -> &ClickHouseClient {
        &self.client
    }

    pub fn tables(&self) -> &ClickHouseTablesConfig {
        &self.tables
    }

    /// Creates the test database and every table the collapser touches.
    pub async fn create_database(&self) {
        self.root_client
            .query(&format!("CREATE DATABASE IF NOT EXISTS `{}`", self.database))
            .execute()
            .await
            .expect("Failed to create test ClickHouse database");

        ensure_tables(&self.client, &self.tables)
            .await
            .expect("Failed to create collapser tables");
        ensure_staging_table(&self.client, &self.tables)
            .await
            .expect("Failed to create staging table");
    }

    /// Drops the test database from ClickHouse.
    pub async fn drop_database(&self) -> Result<(), clickhouse::error::Error> {
        self.root_client
            .query(&format!("DROP DATABASE IF EXISTS `{}`", self.database))
            .execute()
            .await
    }

    pub fn build_destination(&self, pipeline: &PipelineConfig) -> ClickHouseDestination {
        ClickHouseDestination::new(
            self.client.clone(),
            &self.tables.collapsing,
            pipeline.max_keys_per_lookup,
            pipeline.batch.max_size,
        )
    }

    pub fn build_state_store(&self) -> ClickHouseWindowStateStore {
        ClickHouseWindowStateStore::new(self.client.clone(), &self.tables.state)
    }

    pub fn build_source(&self, topic: &str) -> ClickHouseStagingSource {
        ClickHouseStagingSource::new(self.client.clone(), &self.tables.staging, topic)
    }

    pub fn build_refresher(&self) -> ClickHouseMartRefresher {
        ClickHouseMartRefresher::new(
            self.client.clone(),
            &self.tables.collapsing,
            &self.tables.mart,
        )
    }

    /// Stages `payloads` for `topic` with the given consumption timestamps in milliseconds.
    pub async fn stage_payloads(&self, topic: &str, payloads: &[(i64, String)]) {
        for (consumed_at_ms, payload) in payloads {
            self.client
                .query(&format!(
                    "INSERT INTO `{}` (topic, payload, _consumed_at) \
                     VALUES (?, ?, fromUnixTimestamp64Milli(toInt64(?), 'UTC'))",
                    self.tables.staging
                ))
                .bind(topic)
                .bind(payload.as_str())
                .bind(*consumed_at_ms)
                .execute()
                .await
                .expect("Failed to stage payload");
        }
    }

    /// Fetches all rows from the test database using the given SQL query.
    ///
    /// The caller is responsible for writing a SELECT whose columns match `T`'s fields in
    /// the correct order.
    pub async fn query<T>(&self, sql: &str) -> Vec<T>
    where
        T: for<'a> clickhouse::Row<Value<'a> = T> + serde::de::DeserializeOwned + 'static,
    {
        self.client
            .query(sql)
            .fetch_all::<T>()
            .await
            .expect("ClickHouse query failed")
    }
}

impl Drop for ClickHouseTestDatabase {
    fn drop(&mut self) {
        let Ok(handle) = Handle::try_current() else {
            return;
        };

        if handle.runtime_flavor() == RuntimeFlavor::MultiThread {
            let _ = tokio::task::block_in_place(|| handle.block_on(self.drop_database()));
        }
    }
}

/// Creates a fresh, isolated ClickHouse database for a single test.
///
/// The database is dropped automatically when the returned handle is dropped.
pub async fn setup_clickhouse_database() -> ClickHouseTestDatabase {
    let db = ClickHouseTestDatabase::new(
        get_clickhouse_url(),
        get_clickhouse_user(),
        get_clickhouse_password(),
        random_database_name(),
    );
    db.create_database().await;
    db
}
