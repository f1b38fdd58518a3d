/// Orphan garbage collection
///
/// Three independent passes reconcile the record store with the process engine:
/// - instances: engine process instances whose business key resolves to no stored
///   instance are deleted together with their history; finished maintenance
///   aliases are dropped from their instances
/// - modules: modules of vanished instances get their delete callback invoked and
///   are removed
/// - variables: variables of vanished instances are removed
///
/// Each pass scans every page first and deletes afterwards, so removals never shift
/// the offsets of pages not yet read. Errors are collected, a pass never aborts on a
/// single record.

use crate::engine::InstanceState;
use crate::error::{Error, Result};
use crate::http::ensure_deleted;
use crate::model::{Module, Variable};
use crate::sync::SyncController;

const MODULE_CALLBACK: &str = "module callback";

impl SyncController {
    /// Run every garbage collection pass, serialized with the saga
    ///
    /// With `ignore_module_delete_errors` a failing module callback does not keep
    /// the module record alive.
    pub async fn cleanup(&self, ignore_module_delete_errors: bool) -> Vec<Error> {
        let _guard = self.lock.lock().await;
        self.cleanup_locked(ignore_module_delete_errors).await
    }

    /// Cleanup body; the caller holds the lock
    pub(crate) async fn cleanup_locked(&self, ignore_module_delete_errors: bool) -> Vec<Error> {
        let mut errors = Vec::new();

        tracing::debug!("🧹 Cleanup started");
        self.remove_orphaned_process_instances(&mut errors).await;
        self.prune_maintenance_aliases(&mut errors).await;
        self.remove_orphaned_modules(ignore_module_delete_errors, &mut errors).await;
        self.remove_orphaned_variables(&mut errors).await;

        if errors.is_empty() {
            tracing::debug!("🧹 Cleanup finished");
        } else {
            tracing::warn!("⚠️ Cleanup finished with {} error(s)", errors.len());
        }
        errors
    }

    async fn remove_orphaned_process_instances(&self, errors: &mut Vec<Error>) {
        let records = match self.engine.list_process_instances().await {
            Ok(records) => records,
            Err(e) => {
                errors.push(e);
                return;
            }
        };

        let mut known = self.resolver.cached();
        for record in records {
            let orphaned = match record.business_key.as_deref() {
                Some(key) => match known.exists(key).await {
                    Ok(exists) => !exists,
                    Err(e) => {
                        errors.push(e);
                        continue;
                    }
                },
                // nothing in the store can ever claim it
                None => true,
            };
            if !orphaned {
                continue;
            }

            tracing::info!(
                "🧹 Removing orphaned process instance {} (business key {:?})",
                record.id,
                record.business_key
            );
            if !record.is_finished() {
                if let Err(e) = self.engine.delete_process_instance(&record.id).await {
                    errors.push(e);
                    continue;
                }
            }
            if let Err(e) = self.engine.delete_process_instance_history(&record.id).await {
                errors.push(e);
            }
        }
    }

    /// Drop aliases whose maintenance sub-process is no longer running
    async fn prune_maintenance_aliases(&self, errors: &mut Vec<Error>) {
        let instances = match self.store.list_instances_in_maintenance().await {
            Ok(instances) => instances,
            Err(e) => {
                errors.push(e);
                return;
            }
        };

        for instance in instances {
            for maintenance_id in &instance.running_maintenance_ids {
                match self.engine.instance_state(maintenance_id).await {
                    Ok(InstanceState::Running) => {}
                    Ok(state) => {
                        tracing::debug!(
                            "Maintenance {} of instance {} is {:?}, dropping alias",
                            maintenance_id,
                            instance.id,
                            state
                        );
                        if let Err(e) = self.store.remove_maintenance_id(maintenance_id).await {
                            errors.push(e);
                        }
                    }
                    Err(e) => errors.push(e),
                }
            }
        }
    }

    async fn remove_orphaned_modules(&self, ignore_callback_errors: bool, errors: &mut Vec<Error>) {
        let page_size = self.config.page_size.max(1);
        let mut orphans = Vec::new();
        let mut known = self.resolver.cached();
        let mut offset = 0;

        loop {
            let page = match self.store.list_modules(page_size, offset).await {
                Ok(page) => page,
                Err(e) => {
                    errors.push(e);
                    return;
                }
            };
            let fetched = page.len() as i64;

            for module in page {
                match known.exists(&module.instance_id).await {
                    Ok(true) => {}
                    Ok(false) => orphans.push(module),
                    Err(e) => errors.push(e),
                }
            }

            if fetched < page_size {
                break;
            }
            offset += page_size;
        }

        for module in orphans {
            tracing::info!("🧹 Removing module {} of vanished instance {}", module.id, module.instance_id);
            if let Err(e) = self.remove_module(&module, ignore_callback_errors).await {
                errors.push(e);
            }
        }
    }

    async fn remove_orphaned_variables(&self, errors: &mut Vec<Error>) {
        let page_size = self.config.page_size.max(1);
        let mut orphans: Vec<Variable> = Vec::new();
        let mut known = self.resolver.cached();
        let mut offset = 0;

        loop {
            let page = match self.store.list_all_variables(page_size, offset).await {
                Ok(page) => page,
                Err(e) => {
                    errors.push(e);
                    return;
                }
            };
            let fetched = page.len() as i64;

            for variable in page {
                match known.exists(&variable.instance_id).await {
                    Ok(true) => {}
                    Ok(false) => orphans.push(variable),
                    Err(e) => errors.push(e),
                }
            }

            if fetched < page_size {
                break;
            }
            offset += page_size;
        }

        for variable in orphans {
            tracing::debug!("🧹 Removing variable {} of vanished instance {}", variable.name, variable.instance_id);
            if let Err(e) = self.store.delete_variable(&variable).await {
                errors.push(e);
            }
        }
    }

    /// Invoke the module's delete callback, then drop the record
    ///
    /// A failing callback keeps the record for the next pass unless
    /// `ignore_callback_errors` is set.
    pub(crate) async fn remove_module(&self, module: &Module, ignore_callback_errors: bool) -> Result<()> {
        if let Some(info) = &module.delete_info {
            if let Err(e) = self.call_delete_callback(&info.url, &info.user_id).await {
                if !ignore_callback_errors {
                    return Err(e);
                }
                tracing::warn!("⚠️ Ignoring failed delete callback of module {}: {}", module.id, e);
            }
        }
        self.store.delete_module(&module.id).await
    }

    async fn call_delete_callback(&self, url: &str, user_id: &str) -> Result<()> {
        let response = self
            .http
            .delete(url)
            .header("X-UserId", user_id)
            .send()
            .await
            .map_err(|e| Error::transport(MODULE_CALLBACK, e))?;
        ensure_deleted(MODULE_CALLBACK, response).await
    }
}
