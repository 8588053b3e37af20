//! MySQL backend.
//!
//! Uses a sqlx pool capped at a single connection and connected lazily: the
//! first cycle opens it, and after a connection loss the next cycle opens a
//! fresh one. A lost connection costs exactly one failed cycle.

use async_trait::async_trait;
use sqlx::mysql::{MySqlConnectOptions, MySqlPoolOptions, MySqlSslMode};
use sqlx::MySqlPool;
use std::time::Duration;

use super::{InstanceRow, InstanceSource};
use crate::error::RefreshError;

const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(10);

/// The instances query with every column cast to text, so numeric label
/// columns decode the same way string ones do.
pub const MYSQL_INSTANCES_QUERY: &str =
    "SELECT CAST(address AS CHAR), CAST(job AS CHAR), CAST(zone AS CHAR) FROM instances";

/// Connection settings for the MySQL backend.
#[derive(Clone)]
pub struct MysqlSettings {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub database: String,
    pub ssl_mode: MySqlSslMode,
}

impl std::fmt::Debug for MysqlSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MysqlSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("database", &self.database)
            .field("ssl_mode", &self.ssl_mode)
            .finish()
    }
}

impl MysqlSettings {
    fn connect_options(&self) -> MySqlConnectOptions {
        let mut options = MySqlConnectOptions::new()
            .host(self.host.as_str())
            .port(self.port)
            .database(self.database.as_str())
            .ssl_mode(self.ssl_mode);

        if let Some(username) = &self.username {
            options = options.username(username);
        }

        if let Some(password) = &self.password {
            options = options.password(password);
        }

        options
    }
}

pub struct MysqlSource {
    pool: MySqlPool,
    instance: String,
}

impl MysqlSource {
    /// Build the source without touching the network.
    pub fn new(settings: &MysqlSettings) -> Self {
        Self::with_acquire_timeout(settings, ACQUIRE_TIMEOUT)
    }

    /// Like [`MysqlSource::new`], bounding how long a cycle waits for a
    /// connection.
    pub fn with_acquire_timeout(settings: &MysqlSettings, acquire_timeout: Duration) -> Self {
        let pool = MySqlPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(acquire_timeout)
            .connect_lazy_with(settings.connect_options());

        let instance = format!("{}:{}/{}", settings.host, settings.port, settings.database);
        tracing::info!(instance = %instance, "Configured MySQL instance source");

        Self { pool, instance }
    }
}

#[async_trait]
impl InstanceSource for MysqlSource {
    fn name(&self) -> &'static str {
        "mysql"
    }

    async fn fetch_instances(&mut self) -> Result<Vec<InstanceRow>, RefreshError> {
        let rows: Vec<(Option<String>, Option<String>, Option<String>)> =
            sqlx::query_as(MYSQL_INSTANCES_QUERY)
                .fetch_all(&self.pool)
                .await?;

        tracing::debug!(instance = %self.instance, rows = rows.len(), "Fetched instances");

        Ok(rows
            .into_iter()
            .map(|(address, job, zone)| InstanceRow { address, job, zone })
            .collect())
    }

    async fn close(self: Box<Self>) {
        self.pool.close().await;
        tracing::debug!(instance = %self.instance, "MySQL pool closed");
    }
}
