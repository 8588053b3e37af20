//! Instance sources: read-only access to the `instances` table.
//!
//! A source runs one fixed query per refresh cycle and hands back every
//! row. It owns its connection for the lifetime of the process; the poller
//! borrows it for each cycle and closes it on shutdown.

use async_trait::async_trait;

use crate::error::RefreshError;

pub mod mysql;
pub mod sqlite;

/// The one query every backend runs. No filter, no ORDER BY: grouping
/// does not depend on row order. Backends may wrap columns in casts but
/// select the same rows.
pub const INSTANCES_QUERY: &str = "SELECT address, job, zone FROM instances";

/// One row of the `instances` table. Any column may be NULL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceRow {
    pub address: Option<String>,
    pub job: Option<String>,
    pub zone: Option<String>,
}

#[cfg(test)]
impl InstanceRow {
    pub fn new(address: &str, job: &str, zone: &str) -> Self {
        Self {
            address: Some(address.into()),
            job: Some(job.into()),
            zone: Some(zone.into()),
        }
    }
}

#[async_trait]
pub trait InstanceSource: Send {
    /// Short backend name for logs.
    fn name(&self) -> &'static str;

    /// Run [`INSTANCES_QUERY`] and return the full result set.
    async fn fetch_instances(&mut self) -> Result<Vec<InstanceRow>, RefreshError>;

    /// Release the underlying connection.
    async fn close(self: Box<Self>);
}
