//! SQLite backend, one long-lived connection.

use async_trait::async_trait;
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags, Row};
use std::path::Path;

use super::{InstanceRow, InstanceSource, INSTANCES_QUERY};
use crate::error::RefreshError;

pub struct SqliteSource {
    db: Connection,
}

impl SqliteSource {
    /// Open an existing database read-only. The schema is managed elsewhere.
    pub fn open(db_path: &Path) -> Result<Self, RefreshError> {
        let db = Connection::open_with_flags(
            db_path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        tracing::info!(path = %db_path.display(), "Opened SQLite instance source");
        Ok(Self { db })
    }

    #[cfg(test)]
    pub(crate) fn from_connection(db: Connection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl InstanceSource for SqliteSource {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    async fn fetch_instances(&mut self) -> Result<Vec<InstanceRow>, RefreshError> {
        let mut stmt = self.db.prepare_cached(INSTANCES_QUERY)?;
        let rows = stmt
            .query_map([], |row| {
                Ok(InstanceRow {
                    address: column_text(row, 0)?,
                    job: column_text(row, 1)?,
                    zone: column_text(row, 2)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    async fn close(self: Box<Self>) {
        if let Err((_, e)) = self.db.close() {
            tracing::warn!(error = %e, "Failed to close SQLite connection cleanly");
        }
    }
}

/// Render a column as text whatever its storage class. Labels only need
/// equality, so `zone = 1` and `zone = '1'` both become `"1"`.
fn column_text(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<String>> {
    Ok(match row.get_ref(idx)? {
        ValueRef::Null => None,
        ValueRef::Integer(i) => Some(i.to_string()),
        ValueRef::Real(f) => Some(f.to_string()),
        ValueRef::Text(t) | ValueRef::Blob(t) => Some(String::from_utf8_lossy(t).into_owned()),
    })
}
