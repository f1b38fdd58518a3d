/// Retry of stale marked releases
///
/// Only marks at least `mark_age_limit` old are touched: a younger mark may belong
/// to a saga call that is still in flight on another request path.
/// - unfinished: deploy again; commit on success, otherwise mark as deleted
/// - deleted: run the removal again; the record disappears on success
///
/// Failures are collected per release, the batch always runs to the end.

use crate::error::{Error, Result};
use crate::model::types::now_unix;
use crate::store::MarkedRelease;
use crate::sync::SyncController;

/// Outcome of one sweep
#[derive(Debug, Default)]
pub struct SweepReport {
    /// Unfinished releases that were deployed and committed
    pub committed: Vec<String>,
    /// Unfinished releases whose retry failed and that are now marked as deleted
    pub rolled_back: Vec<String>,
    /// Deleted releases that are now gone everywhere
    pub removed: Vec<String>,
    /// Marks younger than the age limit
    pub skipped: usize,
    pub errors: Vec<Error>,
}

impl SweepReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

impl SyncController {
    /// Retry every stale mark, serialized with the saga
    pub async fn retry_marked_releases(&self) -> Result<SweepReport> {
        let _guard = self.lock.lock().await;
        self.sweep_locked().await
    }

    /// Sweep body; the caller holds the lock
    pub(crate) async fn sweep_locked(&self) -> Result<SweepReport> {
        let now = now_unix();
        let limit = self.config.mark_age_limit;
        let (to_delete, unfinished) = self.store.get_marked_releases().await?;
        let mut report = SweepReport::default();

        for MarkedRelease { release, marks } in unfinished {
            if !marks.is_stale(limit, now) {
                report.skipped += 1;
                continue;
            }

            tracing::info!("🔁 Retrying deployment of unfinished release {}", release.id);
            let attempt = match self.deploy_release(&release).await {
                Ok(()) => self.commit_release(&release).await,
                Err(e) => Err(e),
            };

            match attempt {
                Ok(()) => {
                    tracing::info!("✅ Release {} committed by sweep", release.id);
                    report.committed.push(release.id);
                }
                Err(err) => {
                    tracing::warn!("⚠️ Retry of release {} failed, rolling back: {}", release.id, err);
                    self.roll_back_creation(&release, &err).await;
                    report.rolled_back.push(release.id);
                    report.errors.push(err);
                }
            }
        }

        for MarkedRelease { release, marks } in to_delete {
            if !marks.is_stale(limit, now) {
                report.skipped += 1;
                continue;
            }

            tracing::info!("🔁 Retrying removal of release {}", release.id);
            match self.remove_release(&release.id).await {
                Ok(()) => {
                    tracing::info!("✅ Release {} removed by sweep", release.id);
                    report.removed.push(release.id);
                }
                Err(err) => {
                    tracing::warn!("⚠️ Removal of release {} still failing: {}", release.id, err);
                    report.errors.push(err);
                }
            }
        }

        if report.skipped > 0 {
            tracing::debug!("Sweep skipped {} fresh mark(s)", report.skipped);
        }
        Ok(report)
    }
}
