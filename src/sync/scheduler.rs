/// Background reconciliation ticker
///
/// Registers one repeated job that runs a sweep followed by a cleanup through the
/// controller, so every tick takes the same lock as the saga. Tick failures are
/// logged and never stop the ticker.

use crate::error::{Error, Result};
use crate::sync::SyncController;
use std::{sync::Arc, time::Duration};
use tokio::sync::RwLock;
use tokio_cron_scheduler::{Job, JobScheduler};
use uuid::Uuid;

pub struct SyncScheduler {
    scheduler: Arc<RwLock<JobScheduler>>,
    controller: Arc<SyncController>,
    cycle: Duration,
    job_id: RwLock<Option<Uuid>>,
}

fn scheduler_error(err: impl std::fmt::Display) -> Error {
    Error::Scheduler(err.to_string())
}

impl SyncScheduler {
    pub async fn new(controller: Arc<SyncController>, cycle: Duration) -> Result<Self> {
        if cycle.is_zero() {
            return Err(Error::InvalidInput("cleanup cycle must be positive".to_string()));
        }
        let scheduler = JobScheduler::new().await.map_err(scheduler_error)?;

        Ok(Self {
            scheduler: Arc::new(RwLock::new(scheduler)),
            controller,
            cycle,
            job_id: RwLock::new(None),
        })
    }

    /// Register the reconciliation job and start ticking
    pub async fn start(&self) -> Result<()> {
        tracing::info!("⏰ Starting reconciliation ticker (every {:?})", self.cycle);

        let controller = Arc::clone(&self.controller);
        let job = Job::new_repeated_async(self.cycle, move |_uuid, _lock| {
            let controller = Arc::clone(&controller);
            Box::pin(async move {
                tracing::debug!("⏰ Reconciliation tick");
                controller.run_cycle().await;
            })
        })
        .map_err(scheduler_error)?;

        {
            let scheduler = self.scheduler.read().await;
            let id = scheduler.add(job).await.map_err(scheduler_error)?;
            *self.job_id.write().await = Some(id);
            scheduler.start().await.map_err(scheduler_error)?;
        }

        tracing::info!("✅ Reconciliation ticker started");
        Ok(())
    }

    pub async fn stop(&self) -> Result<()> {
        tracing::info!("⏹️ Stopping reconciliation ticker");

        if let Some(id) = self.job_id.write().await.take() {
            let scheduler = self.scheduler.read().await;
            scheduler.remove(&id).await.map_err(scheduler_error)?;
        }
        {
            let mut scheduler = self.scheduler.write().await;
            scheduler.shutdown().await.map_err(scheduler_error)?;
        }

        tracing::info!("✅ Reconciliation ticker stopped");
        Ok(())
    }
}
