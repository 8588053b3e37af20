//! Startup configuration. Long flags, each with an environment fallback.

use anyhow::{bail, Result};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

use sqlx::mysql::MySqlSslMode;

use crate::source::mysql::MysqlSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Backend {
    Mysql,
    Sqlite,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SslMode {
    Disabled,
    Preferred,
    Required,
    VerifyCa,
    VerifyIdentity,
}

impl From<SslMode> for MySqlSslMode {
    fn from(mode: SslMode) -> Self {
        match mode {
            SslMode::Disabled => MySqlSslMode::Disabled,
            SslMode::Preferred => MySqlSslMode::Preferred,
            SslMode::Required => MySqlSslMode::Required,
            SslMode::VerifyCa => MySqlSslMode::VerifyCa,
            SslMode::VerifyIdentity => MySqlSslMode::VerifyIdentity,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

/// Poll an instances table and publish Prometheus file_sd target groups.
#[derive(Parser, Clone)]
#[command(name = "tgpoll", version, about, long_about = None)]
pub struct Config {
    /// Database backend holding the instances table
    #[arg(long, env = "TGPOLL_BACKEND", value_enum, default_value_t = Backend::Mysql)]
    pub backend: Backend,

    /// MySQL host
    #[arg(long, env = "TGPOLL_DB_HOST", default_value = "localhost")]
    pub db_host: String,

    /// MySQL port
    #[arg(long, env = "TGPOLL_DB_PORT", default_value_t = 3306)]
    pub db_port: u16,

    /// MySQL user
    #[arg(long, env = "TGPOLL_DB_USER")]
    pub db_user: Option<String>,

    /// MySQL password
    #[arg(long, env = "TGPOLL_DB_PASSWORD", hide_env_values = true)]
    pub db_password: Option<String>,

    /// TLS mode for the MySQL connection
    #[arg(long, env = "TGPOLL_DB_SSL_MODE", value_enum, default_value_t = SslMode::Preferred)]
    pub db_ssl_mode: SslMode,

    /// Schema name (mysql) or database file path (sqlite)
    #[arg(long, env = "TGPOLL_DATABASE", default_value = "testdb")]
    pub database: String,

    /// Canonical path of the published target group file
    #[arg(long, env = "TGPOLL_OUTPUT", default_value = "target_groups.json")]
    pub output: PathBuf,

    /// Seconds to wait between the end of one cycle and the start of the next
    #[arg(long, env = "TGPOLL_INTERVAL_SECS", default_value_t = 30)]
    pub interval_secs: u64,

    /// Log output format
    #[arg(long, env = "TGPOLL_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

impl Config {
    /// Reject values that would make the loop spin or publish nowhere.
    pub fn validate(&self) -> Result<()> {
        if self.interval_secs == 0 {
            bail!("--interval-secs must be greater than zero");
        }
        if self.output.file_name().is_none() {
            bail!("--output must name a file, got {}", self.output.display());
        }
        if self.database.trim().is_empty() {
            bail!("--database must not be empty");
        }
        Ok(())
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    /// Directory the temp and canonical files live in.
    pub fn output_dir(&self) -> PathBuf {
        match self.output.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }

    pub fn mysql_settings(&self) -> MysqlSettings {
        MysqlSettings {
            host: self.db_host.clone(),
            port: self.db_port,
            username: self.db_user.clone(),
            password: self.db_password.clone(),
            database: self.database.clone(),
            ssl_mode: self.db_ssl_mode.into(),
        }
    }
}
