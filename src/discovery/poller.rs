//! Refresh poller: query, group, publish, sleep, repeat.
//!
//! Runs once on startup and then again `interval` after each cycle ends.
//! Slow cycles push the schedule back; there is no catch-up.

use chrono::Utc;
use std::future::Future;
use tokio::time::{self, Duration};
use tracing::{debug, error, info, warn};

use super::publisher::Publisher;
use super::{encode, group_instances};
use crate::error::RefreshError;
use crate::source::InstanceSource;

/// Summary of one successful cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    pub groups: usize,
    pub targets: usize,
    pub skipped: usize,
    pub bytes: usize,
}

/// Execute one refresh cycle.
///
/// Either the canonical file is replaced with the full new snapshot or it is
/// left exactly as it was.
pub async fn refresh(
    source: &mut dyn InstanceSource,
    publisher: &Publisher,
) -> Result<CycleReport, RefreshError> {
    let rows = source.fetch_instances().await?;
    let grouping = group_instances(rows);

    if grouping.skipped > 0 {
        warn!(
            skipped = grouping.skipped,
            "Dropped instance rows with a NULL address"
        );
    }
    for group in &grouping.groups {
        debug!(
            job = %group.labels.job,
            zone = %group.labels.zone,
            targets = group.targets.len(),
            "Target group"
        );
    }

    let content = encode(&grouping.groups)?;
    publisher.publish(&content)?;

    Ok(CycleReport {
        groups: grouping.groups.len(),
        targets: grouping.target_count(),
        skipped: grouping.skipped,
        bytes: content.len(),
    })
}

/// Run refresh cycles until `shutdown` resolves.
///
/// A failed cycle is logged and retried after the normal delay; nothing is
/// published for it, so the file just goes stale.
pub async fn run_poller<F>(
    source: &mut dyn InstanceSource,
    publisher: &Publisher,
    interval: Duration,
    shutdown: F,
) where
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);

    info!(
        backend = source.name(),
        path = %publisher.path().display(),
        tmp_path = %publisher.tmp_path().display(),
        interval_secs = interval.as_secs(),
        "📡 Refresh poller starting"
    );

    loop {
        let cycle_start = Utc::now();
        let outcome = tokio::select! {
            res = refresh(source, publisher) => res,
            _ = &mut shutdown => break,
        };
        let duration_ms = (Utc::now() - cycle_start).num_milliseconds();

        match outcome {
            Ok(report) => info!(
                groups = report.groups,
                targets = report.targets,
                skipped = report.skipped,
                bytes = report.bytes,
                duration_ms,
                "Published target groups"
            ),
            Err(e @ RefreshError::Encode(_)) => error!(
                error = %e,
                "Target groups are not serializable, publish skipped"
            ),
            Err(e) if e.is_source() => error!(
                backend = source.name(),
                error = %e,
                "Instance query failed, keeping previous snapshot"
            ),
            Err(e) => error!(
                path = %publisher.path().display(),
                error = %e,
                "Publish failed, keeping previous snapshot"
            ),
        }

        tokio::select! {
            _ = time::sleep(interval) => {}
            _ = &mut shutdown => break,
        }
    }

    info!("Refresh poller stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::sqlite::tests::{memory_source, replace_rows};
    use crate::source::InstanceRow;
    use async_trait::async_trait;
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn row(address: &str, job: &str, zone: &str) -> InstanceRow {
        InstanceRow::new(address, job, zone)
    }

    /// Source that always fails, counting attempts.
    struct BrokenSource {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl InstanceSource for BrokenSource {
        fn name(&self) -> &'static str {
            "broken"
        }

        async fn fetch_instances(&mut self) -> Result<Vec<InstanceRow>, RefreshError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(rusqlite::Error::InvalidQuery.into())
        }

        async fn close(self: Box<Self>) {}
    }

    #[tokio::test]
    async fn test_end_to_end_publish() {
        let dir = tempfile::tempdir().unwrap();
        let publisher = Publisher::new(dir.path().join("target_groups.json"));
        let mut src = memory_source(&[
            row("10.0.0.1", "web", "us"),
            row("10.0.0.2", "web", "us"),
            row("10.0.0.3", "db", "eu"),
        ]);

        let report = refresh(&mut src, &publisher).await.unwrap();
        assert_eq!(report.groups, 2);
        assert_eq!(report.targets, 3);

        let published = fs::read_to_string(publisher.path()).unwrap();
        assert_eq!(
            published,
            r#"[{"labels":{"job":"web","zone":"us"},"targets":["10.0.0.1","10.0.0.2"]},{"labels":{"job":"db","zone":"eu"},"targets":["10.0.0.3"]}]"#
        );
    }

    #[tokio::test]
    async fn test_unchanged_table_is_byte_identical() {
        let dir = tempfile::tempdir().unwrap();
        let publisher = Publisher::new(dir.path().join("tg.json"));
        let mut src = memory_source(&[
            row("a1", "X", "1"),
            row("a2", "Y", "2"),
            row("a3", "X", "1"),
        ]);

        refresh(&mut src, &publisher).await.unwrap();
        let first = fs::read(publisher.path()).unwrap();
        refresh(&mut src, &publisher).await.unwrap();
        let second = fs::read(publisher.path()).unwrap();

        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_empty_table_publishes_empty_array() {
        let dir = tempfile::tempdir().unwrap();
        let publisher = Publisher::new(dir.path().join("tg.json"));
        let mut src = memory_source(&[]);

        let report = refresh(&mut src, &publisher).await.unwrap();
        assert_eq!(report.groups, 0);
        assert_eq!(fs::read(publisher.path()).unwrap(), b"[]");
    }

    #[tokio::test]
    async fn test_changed_table_converges_without_residue() {
        let dir = tempfile::tempdir().unwrap();
        let publisher = Publisher::new(dir.path().join("tg.json"));
        let mut src = memory_source(&[row("a1", "web", "us"), row("a2", "db", "eu")]);
        refresh(&mut src, &publisher).await.unwrap();

        replace_rows(&src, &[row("b1", "cache", "ap")]);
        refresh(&mut src, &publisher).await.unwrap();

        let published = fs::read_to_string(publisher.path()).unwrap();
        assert_eq!(
            published,
            r#"[{"labels":{"job":"cache","zone":"ap"},"targets":["b1"]}]"#
        );
    }

    #[tokio::test]
    async fn test_source_failure_keeps_previous_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let publisher = Publisher::new(dir.path().join("tg.json"));
        publisher.publish(b"[\"previous\"]").unwrap();

        let mut src = BrokenSource { calls: Arc::new(AtomicUsize::new(0)) };
        let err = refresh(&mut src, &publisher).await.unwrap_err();

        assert!(err.is_source());
        assert_eq!(fs::read(publisher.path()).unwrap(), b"[\"previous\"]");
        assert!(!publisher.tmp_path().exists());
    }

    #[tokio::test(start_paused = true)]
    async fn test_poller_retries_after_failure_until_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let publisher = Publisher::new(dir.path().join("tg.json"));
        let calls = Arc::new(AtomicUsize::new(0));
        let mut src = BrokenSource { calls: Arc::clone(&calls) };

        // Paused clock: sleeps auto-advance, so 95s elapse immediately.
        let shutdown = time::sleep(Duration::from_secs(95));
        run_poller(&mut src, &publisher, Duration::from_secs(30), shutdown).await;

        // Cycles at t=0, 30, 60, 90.
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert!(!publisher.path().exists());
    }

    #[tokio::test(start_paused = true)]
    async fn test_poller_publishes_first_cycle_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let publisher = Publisher::new(dir.path().join("tg.json"));
        let mut src = memory_source(&[row("a1", "web", "us")]);

        let shutdown = time::sleep(Duration::from_secs(1));
        run_poller(&mut src, &publisher, Duration::from_secs(30), shutdown).await;

        let published = fs::read_to_string(publisher.path()).unwrap();
        assert!(published.contains("\"a1\""));
    }
}
