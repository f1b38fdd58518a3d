/// Release creation and deletion saga
///
/// The record store, the process engine and the permission service cannot be
/// updated atomically. Every release transition therefore writes a durable mark
/// first and acts on the remote systems second:
///
/// - create: persist as unfinished, deploy, grant permissions, commit. Any
///   failure flips the mark to deleted; a half-created release is torn down,
///   never completed later.
/// - delete: mark as deleted, undeploy, revoke permissions, drop the record. A
///   failure leaves the mark for the sweeper.
///
/// All mark decisions happen under one process-wide lock shared with the sweeper
/// and the garbage collector.

use crate::bpmn::{bind_release, deployment_key, parse_release_info, validate_release_id, MaintenanceBinding};
use crate::config::SyncConfig;
use crate::engine::ProcessEngine;
use crate::error::{Error, Result};
use crate::model::types::now_unix;
use crate::model::{Release, SyncMarks};
use crate::notify::{Notification, Notifier};
use crate::permissions::{PermissionService, ResourcePermissions, RELEASE_TOPIC};
use crate::store::{MarkedRelease, ReleaseQuery, Store};
use crate::sync::resolver::InstanceResolver;
use reqwest::Client;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Reconciliation engine for releases and their instances
///
/// Owns the serialization lock. The periodic ticker is not part of the controller;
/// see [`crate::sync::SyncScheduler`].
pub struct SyncController {
    pub(crate) store: Store,
    pub(crate) engine: Arc<dyn ProcessEngine>,
    pub(crate) permissions: Arc<dyn PermissionService>,
    pub(crate) notifier: Arc<dyn Notifier>,
    /// Client for module delete callbacks
    pub(crate) http: Client,
    pub(crate) resolver: InstanceResolver,
    pub(crate) config: SyncConfig,
    /// Serializes saga steps, sweeps and cleanups
    pub(crate) lock: Mutex<()>,
}

impl SyncController {
    pub fn new(
        store: Store,
        engine: Arc<dyn ProcessEngine>,
        permissions: Arc<dyn PermissionService>,
        notifier: Arc<dyn Notifier>,
        http: Client,
        config: SyncConfig,
    ) -> Self {
        Self {
            resolver: InstanceResolver::new(store.clone()),
            store,
            engine,
            permissions,
            notifier,
            http,
            config,
            lock: Mutex::new(()),
        }
    }

    /// Underlying record store (privileged reads included)
    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn resolver(&self) -> &InstanceResolver {
        &self.resolver
    }

    /// Create and deploy a release
    ///
    /// On success the release is committed and its creator holds full rights. On
    /// failure the release is left marked as deleted and the underlying error is
    /// returned; definition errors are also recorded on the release and reported
    /// to the creator.
    pub async fn create_release(&self, mut release: Release) -> Result<Release> {
        validate_release_id(&release.id)?;
        if release.design_id.is_empty() {
            return Err(Error::InvalidInput("release needs a design id".to_string()));
        }
        if release.name.is_empty() {
            return Err(Error::InvalidInput("release needs a name".to_string()));
        }

        let _guard = self.lock.lock().await;

        match self.store.get_release_any(&release.id).await {
            Ok(_) => {
                return Err(Error::InvalidInput(format!("release {} already exists", release.id)));
            }
            Err(Error::NotFound { .. }) => {}
            Err(e) => return Err(e),
        }

        if release.created_at == 0 {
            release.created_at = now_unix();
        }
        release.last_error = None;

        // intent first: a crash from here on leaves an unfinished mark behind
        self.store.save_release(&release, SyncMarks::unfinished()).await?;
        tracing::info!("📝 Release {} ({}) marked as unfinished", release.id, release.name);

        match self.finish_creation(&mut release).await {
            Ok(()) => {
                tracing::info!("✅ Release {} deployed and committed", release.id);
                Ok(release)
            }
            Err(err) => {
                tracing::error!("❌ Creation of release {} failed: {}", release.id, err);
                self.roll_back_creation(&release, &err).await;
                Err(err)
            }
        }
    }

    async fn finish_creation(&self, release: &mut Release) -> Result<()> {
        release.parsed_info = parse_release_info(&release.bpmn, &release.id)?;
        self.store.save_release(release, SyncMarks::unfinished()).await?;
        self.deploy_release(release).await?;
        self.commit_release(release).await
    }

    /// Bind, (re)deploy and permission a release without touching its marks
    ///
    /// Safe to repeat: any deployment under the release's key is removed before the
    /// new one is created, and the permission write is an upsert.
    pub async fn deploy_release(&self, release: &Release) -> Result<()> {
        let key = deployment_key(&release.id);
        let info = parse_release_info(&release.bpmn, &release.id)?;
        let bindings: Vec<MaintenanceBinding> = info
            .maintenance_procedures
            .iter()
            .map(MaintenanceBinding::from)
            .collect();
        let bound = bind_release(&release.bpmn, &key, &bindings)?;

        self.engine.undeploy(&key).await?;
        let deployment_id = self.engine.deploy(&key, &bound, &release.svg).await?;
        tracing::debug!("🚀 Release {} deployed as {} ({})", release.id, key, deployment_id);

        self.permissions
            .set_permission(
                RELEASE_TOPIC,
                &release.id,
                &ResourcePermissions::owner(&release.creator_id),
            )
            .await?;
        Ok(())
    }

    /// Clear the marks of a deployed release and announce it to older instances
    pub(crate) async fn commit_release(&self, release: &Release) -> Result<()> {
        self.store.set_release_marks(&release.id, SyncMarks::committed()).await?;

        let latest = self.store.latest_committed_release(&release.design_id).await?;
        if latest.as_deref() == Some(release.id.as_str()) {
            let updated = self.store.set_new_release_id(&release.design_id, &release.id).await?;
            if updated > 0 {
                tracing::info!("🔔 {} instance(s) of design {} can move to release {}", updated, release.design_id, release.id);
            }
        }
        Ok(())
    }

    /// Flip a failed creation to deleted so the sweeper tears it down
    pub(crate) async fn roll_back_creation(&self, release: &Release, err: &Error) {
        if err.is_definition_error() {
            let message = err.to_string();
            if let Err(e) = self.store.set_release_error(&release.id, Some(&message)).await {
                tracing::warn!("⚠️ Unable to record error on release {}: {}", release.id, e);
            }
            self.notifier
                .notify(Notification {
                    user_id: release.creator_id.clone(),
                    title: format!("Release {} could not be deployed", release.name),
                    message,
                })
                .await;
        }

        match self.store.set_release_marks(&release.id, SyncMarks::deleted()).await {
            Ok(()) => tracing::info!("🗑️ Release {} marked as deleted after failed creation", release.id),
            // stays unfinished; the sweeper flips it on its next attempt
            Err(e) => tracing::error!("❌ Unable to mark release {} as deleted: {}", release.id, e),
        }
    }

    /// Delete a release everywhere
    ///
    /// Refused while instances still run on the release. Remote failures are
    /// returned; the release then stays marked as deleted (and invisible) until a
    /// sweep completes the removal.
    pub async fn delete_release(&self, id: &str) -> Result<()> {
        let _guard = self.lock.lock().await;

        // other marks may be due; settle them first so this call sees a consistent view
        match self.sweep_locked().await {
            Ok(report) if !report.is_clean() => {
                tracing::debug!("Opportunistic sweep left {} error(s)", report.errors.len());
            }
            Ok(_) => {}
            Err(e) => tracing::warn!("⚠️ Opportunistic sweep failed: {}", e),
        }

        let MarkedRelease { release, .. } = self.store.get_release_any(id).await?;

        let in_use = self.store.count_instances_for_release(id).await?;
        if in_use > 0 {
            return Err(Error::InUse(format!(
                "{} instance(s) still run on release {}",
                in_use, release.id
            )));
        }

        self.store.set_release_marks(id, SyncMarks::deleted()).await?;
        tracing::info!("🗑️ Release {} marked as deleted", id);

        match self.remove_release(id).await {
            Ok(()) => {
                tracing::info!("✅ Release {} removed", id);
                Ok(())
            }
            Err(e) => {
                tracing::warn!("⚠️ Removal of release {} incomplete, left for the sweeper: {}", id, e);
                Err(e)
            }
        }
    }

    /// Undeploy, revoke permissions, drop the record; every step is idempotent
    pub(crate) async fn remove_release(&self, id: &str) -> Result<()> {
        self.engine.undeploy(&deployment_key(id)).await?;
        self.permissions.delete_permission(RELEASE_TOPIC, id).await?;
        self.store.delete_release(id).await
    }

    /// Visible release (not marked as deleted)
    pub async fn get_release(&self, id: &str) -> Result<Release> {
        self.store.get_release(id).await
    }

    pub async fn list_releases(&self, query: &ReleaseQuery) -> Result<Vec<Release>> {
        self.store.list_releases(query).await
    }

    /// One background tick: sweep stale marks, then collect orphans
    pub async fn run_cycle(&self) {
        let _guard = self.lock.lock().await;

        match self.sweep_locked().await {
            Ok(report) if report.is_clean() => {
                tracing::debug!(
                    "Sweep clean: {} committed, {} removed",
                    report.committed.len(),
                    report.removed.len()
                );
            }
            Ok(report) => {
                for err in &report.errors {
                    tracing::warn!("⚠️ Sweep: {}", err);
                }
            }
            Err(e) => tracing::error!("❌ Sweep failed: {}", e),
        }

        for err in self.cleanup_locked(false).await {
            tracing::warn!("⚠️ Cleanup: {}", err);
        }
    }
}
