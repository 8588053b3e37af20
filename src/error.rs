//! Refresh cycle errors.
//!
//! Every variant aborts the current cycle before the canonical file is
//! touched. The poller logs it and tries again after the normal delay.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum RefreshError {
    /// Connection loss or SQL error from the MySQL backend.
    #[error("mysql query failed: {0}")]
    Mysql(#[from] sqlx::Error),

    /// Connection or SQL error from the SQLite backend.
    #[error("sqlite query failed: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Target groups could not be serialized. Indicates a data-shape bug.
    #[error("failed to encode target groups: {0}")]
    Encode(#[from] serde_json::Error),

    /// Write, fsync or rename failure while publishing.
    #[error("{action} {}: {source}", path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl RefreshError {
    pub(crate) fn io(action: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            action,
            path: path.into(),
            source,
        }
    }

    /// Whether the failure came from the data source rather than the
    /// publish step.
    pub fn is_source(&self) -> bool {
        matches!(self, Self::Mysql(_) | Self::Sqlite(_))
    }
}
