use std::sync::Arc;
use std::time::Instant;

use clickhouse::query::Query;
use clickhouse::{Client, Compression, Row};
use etl::error::{ErrorKind, EtlResult};
use etl::etl_error;
use etl_config::shared::ClickHouseConfig;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::clickhouse::metrics::{ETL_CH_INSERT_DURATION_SECONDS, ETL_CH_QUERY_DURATION_SECONDS};

/// High-level ClickHouse client shared by the collapser's ClickHouse collaborators.
///
/// Cheaply cloneable. Every failure is mapped to the [`ErrorKind`] chosen by the caller so
/// that the retry policy can tell lookups, writes and state updates apart.
#[derive(Clone)]
pub struct ClickHouseClient {
    inner: Arc<Client>,
}

impl ClickHouseClient {
    /// Creates a new [`ClickHouseClient`].
    ///
    /// When `url` starts with `https://`, TLS is handled by the `rustls-tls` feature using
    /// webpki root certificates.
    pub fn new(
        url: impl Into<String>,
        user: impl Into<String>,
        password: Option<String>,
        database: impl Into<String>,
    ) -> Self {
        let mut client = Client::default()
            .with_url(url)
            .with_user(user)
            .with_database(database)
            .with_compression(Compression::Lz4);

        if let Some(password) = password {
            client = client.with_password(password);
        }

        Self {
            inner: Arc::new(client),
        }
    }

    pub fn from_config(config: &ClickHouseConfig) -> Self {
        Self::new(
            &config.url,
            &config.user,
            config.password(),
            &config.database,
        )
    }

    pub async fn ping(&self) -> EtlResult<()> {
        self.inner
            .query("SELECT 1")
            .fetch_one::<u8>()
            .await
            .map(|_| ())
            .map_err(|err| {
                etl_error!(
                    ErrorKind::DestinationConnectionFailed,
                    "ClickHouse connectivity check failed",
                    err
                )
            })
    }

    /// Executes a statement that returns no rows, e.g. DDL or `INSERT ... SELECT`.
    pub(crate) async fn execute(
        &self,
        sql: &str,
        kind: ErrorKind,
        description: &'static str,
    ) -> EtlResult<()> {
        let started = Instant::now();
        let result = self.inner.query(sql).execute().await;
        record_query_duration(description, started);

        result.map_err(|err| etl_error!(kind, description, format!("{err}")))
    }

    /// Runs `query` and fetches every row. The caller binds the parameters.
    pub(crate) async fn fetch_all<T>(
        &self,
        query: Query,
        kind: ErrorKind,
        description: &'static str,
    ) -> EtlResult<Vec<T>>
    where
        T: for<'a> Row<Value<'a> = T> + DeserializeOwned + 'static,
    {
        let started = Instant::now();
        let result = query.fetch_all::<T>().await;
        record_query_duration(description, started);

        result.map_err(|err| etl_error!(kind, description, format!("{err}")))
    }

    /// Starts a query on the underlying client.
    pub(crate) fn query(&self, sql: &str) -> Query {
        self.inner.query(sql)
    }

    /// Inserts `rows` into `table_name` in order, one INSERT statement per chunk of
    /// `max_rows_per_insert` rows.
    ///
    /// Chunks already committed stay committed when a later chunk fails.
    pub(crate) async fn insert_rows<T>(
        &self,
        table_name: &str,
        rows: &[T],
        max_rows_per_insert: usize,
    ) -> EtlResult<u64>
    where
        T: for<'a> Row<Value<'a> = T> + Serialize + 'static,
    {
        let mut written = 0u64;

        for chunk in rows.chunks(max_rows_per_insert.max(1)) {
            let started = Instant::now();

            let mut insert = self.inner.insert::<T>(table_name).await.map_err(|err| {
                etl_error!(
                    ErrorKind::DestinationWriteFailed,
                    "ClickHouse insert could not be started",
                    format!("Failed to start INSERT into '{table_name}': {err}")
                )
            })?;

            for row in chunk {
                insert.write(row).await.map_err(|err| {
                    etl_error!(
                        ErrorKind::DestinationWriteFailed,
                        "ClickHouse insert write failed",
                        format!("Failed to write row into '{table_name}': {err}")
                    )
                })?;
            }

            insert.end().await.map_err(|err| {
                etl_error!(
                    ErrorKind::DestinationWriteFailed,
                    "ClickHouse insert flush failed",
                    format!("Failed to flush INSERT into '{table_name}': {err}")
                )
            })?;

            metrics::histogram!(
                ETL_CH_INSERT_DURATION_SECONDS,
                "table" => table_name.to_string()
            )
            .record(started.elapsed().as_secs_f64());

            written += chunk.len() as u64;
        }

        Ok(written)
    }
}

fn record_query_duration(description: &'static str, started: Instant) {
    metrics::histogram!(ETL_CH_QUERY_DURATION_SECONDS, "query" => description)
        .record(started.elapsed().as_secs_f64());
}
