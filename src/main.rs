//! tgpoll: Prometheus file_sd publisher for an instances table.
//!
//! Every cycle reads `address, job, zone` from the `instances` table,
//! groups the addresses by `(job, zone)`, and atomically replaces the
//! target group file. A failed cycle leaves the previous file in place.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::Path;
use tracing::info;

mod config;
mod discovery;
mod error;
mod source;

use config::{Backend, Config, LogFormat};
use discovery::publisher::Publisher;
use source::mysql::MysqlSource;
use source::sqlite::SqliteSource;
use source::InstanceSource;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::parse();

    init_tracing(config.log_format);

    info!("🎯 tgpoll v{}", env!("CARGO_PKG_VERSION"));

    config.validate()?;

    let output_dir = config.output_dir();
    std::fs::create_dir_all(&output_dir)
        .with_context(|| format!("Failed to create output directory {}", output_dir.display()))?;

    let mut source: Box<dyn InstanceSource> = match config.backend {
        Backend::Mysql => Box::new(MysqlSource::new(&config.mysql_settings())),
        Backend::Sqlite => Box::new(
            SqliteSource::open(Path::new(&config.database))
                .with_context(|| format!("Failed to open SQLite database {}", config.database))?,
        ),
    };

    let publisher = Publisher::new(config.output.clone());

    discovery::poller::run_poller(
        source.as_mut(),
        &publisher,
        config.interval(),
        shutdown_signal(),
    )
    .await;

    source.close().await;
    info!("Shutdown complete");
    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "tgpoll=info".into());

    match format {
        LogFormat::Text => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
    }
}

/// Resolves on ctrl-c, or SIGTERM on Unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("Shutdown signal received");
}
