//! Target groups, the unit of Prometheus file-based service discovery.
//!
//! Rows from the `instances` table are partitioned by their `(job, zone)`
//! pair. Each distinct pair becomes one [`TargetGroup`] whose `targets` keep
//! the order the source returned them in.

pub mod poller;
pub mod publisher;

use serde::Serialize;
use std::collections::HashMap;

use crate::error::RefreshError;
use crate::source::InstanceRow;

// ── Types ───────────────────────────────────────────────────────────

/// Label set attached to a group. Field order is the serialization order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Labels {
    pub job: String,
    pub zone: String,
}

/// A set of addresses sharing identical labels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TargetGroup {
    pub labels: Labels,
    pub targets: Vec<String>,
}

/// Result of partitioning one cycle's rows.
#[derive(Debug, Default)]
pub struct Grouping {
    pub groups: Vec<TargetGroup>,
    /// Rows dropped because their address was NULL.
    pub skipped: usize,
}

impl Grouping {
    pub fn target_count(&self) -> usize {
        self.groups.iter().map(|g| g.targets.len()).sum()
    }
}

// ── Grouping ────────────────────────────────────────────────────────

/// Partition rows by `(job, zone)` in a single pass.
///
/// Groups come out in first-seen order regardless of how the source sorted
/// its rows. A NULL label is keyed as the empty string; a NULL address has
/// nothing to scrape and is counted in [`Grouping::skipped`].
pub fn group_instances(rows: Vec<InstanceRow>) -> Grouping {
    let mut index: HashMap<Labels, usize> = HashMap::new();
    let mut out = Grouping::default();

    for row in rows {
        let Some(address) = row.address else {
            out.skipped += 1;
            continue;
        };

        let labels = Labels {
            job: row.job.unwrap_or_default(),
            zone: row.zone.unwrap_or_default(),
        };

        match index.get(&labels) {
            Some(&i) => out.groups[i].targets.push(address),
            None => {
                index.insert(labels.clone(), out.groups.len());
                out.groups.push(TargetGroup {
                    labels,
                    targets: vec![address],
                });
            }
        }
    }

    out
}

/// Encode groups as the compact JSON document Prometheus reads.
pub fn encode(groups: &[TargetGroup]) -> Result<Vec<u8>, RefreshError> {
    Ok(serde_json::to_vec(groups)?)
}
