/// Instance, maintenance, module and variable operations
///
/// Every operation that addresses an instance accepts either its id or one of its
/// running maintenance ids and works on the canonical record.

use crate::bpmn::deployment_key;
use crate::error::{Error, Result};
use crate::model::{Instance, InstanceParameter, Module, ParameterDescription, Variable};
use crate::sync::SyncController;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use uuid::Uuid;

/// Request for a new instance of a committed release
#[derive(Debug, Clone, Deserialize)]
pub struct CreateInstance {
    pub release_id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub parameters: Vec<InstanceParameter>,
}

impl SyncController {
    /// Persist an instance and start its process
    ///
    /// Holds the lock so a concurrent release deletion cannot miss the new
    /// instance between its in-use check and the undeploy.
    pub async fn create_instance(&self, user_id: &str, request: CreateInstance) -> Result<Instance> {
        if request.name.is_empty() {
            return Err(Error::InvalidInput("instance needs a name".to_string()));
        }

        let _guard = self.lock.lock().await;

        let marked = self.store.get_release_any(&request.release_id).await?;
        if marked.marks.is_deleted() {
            return Err(Error::not_found("release", &request.release_id));
        }
        if !marked.marks.is_committed() {
            return Err(Error::InvalidInput(format!(
                "release {} is not deployed yet",
                request.release_id
            )));
        }
        let release = marked.release;

        let variables = start_variables(&release.parsed_info.parameter_descriptions, &request.parameters)?;
        let latest = self.store.latest_committed_release(&release.design_id).await?;

        let instance = Instance {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            design_id: release.design_id.clone(),
            release_id: release.id.clone(),
            new_release_id: latest.filter(|id| *id != release.id),
            name: request.name,
            description: request.description,
            ready: false,
            error: None,
            parameters: request.parameters,
            running_maintenance_ids: Vec::new(),
        };

        self.store.save_instance(&instance).await?;

        let key = deployment_key(&release.id);
        if let Err(err) = self.engine.start_instance(&key, &instance.id, &variables).await {
            tracing::error!("❌ Unable to start instance {} of release {}: {}", instance.id, release.id, err);
            if let Err(e) = self.store.delete_instance(&instance.id).await {
                // the garbage collector has nothing to match it against; leave a trace
                tracing::error!("❌ Instance {} left behind after failed start: {}", instance.id, e);
            }
            return Err(err);
        }

        tracing::info!("▶️ Instance {} started on release {}", instance.id, release.id);
        Ok(instance)
    }

    /// Stop and remove an instance together with its modules and variables
    ///
    /// Module and variable removal is best effort; leftovers are orphans for the
    /// next cleanup.
    ///
    /// Runs under the lock so the collector never sees the instance gone while
    /// its modules are still being removed here.
    pub async fn delete_instance(&self, id_or_alias: &str) -> Result<()> {
        let _guard = self.lock.lock().await;
        let instance = self.resolver.resolve(id_or_alias).await?;

        self.engine.stop_instance(&instance.id).await?;
        for maintenance_id in &instance.running_maintenance_ids {
            self.engine.stop_instance(maintenance_id).await?;
        }

        self.store.delete_instance(&instance.id).await?;
        tracing::info!("🗑️ Instance {} deleted", instance.id);

        match self.store.list_modules_by_instance(&instance.id).await {
            Ok(modules) => {
                for module in modules {
                    if let Err(e) = self.remove_module(&module, false).await {
                        tracing::warn!("⚠️ Module {} left for cleanup: {}", module.id, e);
                    }
                }
            }
            Err(e) => tracing::warn!("⚠️ Modules of instance {} left for cleanup: {}", instance.id, e),
        }
        if let Err(e) = self.store.delete_variables_by_instance(&instance.id).await {
            tracing::warn!("⚠️ Variables of instance {} left for cleanup: {}", instance.id, e);
        }
        Ok(())
    }

    pub async fn get_instance(&self, id_or_alias: &str) -> Result<Instance> {
        self.resolver.resolve(id_or_alias).await
    }

    /// Readiness callback from the engine, possibly sent by a maintenance task
    pub async fn set_instance_ready(&self, id_or_alias: &str, ready: bool, error: Option<&str>) -> Result<()> {
        let id = self.resolver.canonical_id(id_or_alias).await?;
        self.store.set_instance_ready(&id, ready, error).await
    }

    /// Start a maintenance procedure on an instance; returns the maintenance id
    ///
    /// The alias is recorded before the engine is asked so that tasks of the new
    /// sub-process can address the instance from their first step.
    pub async fn start_maintenance_procedure(
        &self,
        id_or_alias: &str,
        public_event_id: &str,
        parameters: HashMap<String, Value>,
    ) -> Result<String> {
        let _guard = self.lock.lock().await;

        let instance = self.resolver.resolve(id_or_alias).await?;
        let release = self.store.get_release(&instance.release_id).await?;
        let procedure = release
            .parsed_info
            .maintenance_procedures
            .iter()
            .find(|p| p.public_event_id == public_event_id)
            .ok_or_else(|| {
                Error::InvalidInput(format!(
                    "release {} has no maintenance procedure {}",
                    release.id, public_event_id
                ))
            })?;

        let maintenance_id = Uuid::new_v4().to_string();
        self.store.append_maintenance_id(&instance.id, &maintenance_id).await?;

        if let Err(err) = self
            .engine
            .start_maintenance(&procedure.internal_event_id, &maintenance_id, &parameters)
            .await
        {
            tracing::error!("❌ Maintenance {} on instance {} failed to start: {}", public_event_id, instance.id, err);
            if let Err(e) = self.store.remove_maintenance_id(&maintenance_id).await {
                tracing::warn!("⚠️ Alias {} left for cleanup: {}", maintenance_id, e);
            }
            return Err(err);
        }

        tracing::info!("🔧 Maintenance {} ({}) started on instance {}", public_event_id, maintenance_id, instance.id);
        Ok(maintenance_id)
    }

    /// End-of-procedure callback; unknown ids are ignored
    pub async fn finish_maintenance(&self, maintenance_id: &str) -> Result<()> {
        if self.store.remove_maintenance_id(maintenance_id).await? {
            tracing::info!("🔧 Maintenance {} finished", maintenance_id);
        } else {
            tracing::debug!("Maintenance {} was not running", maintenance_id);
        }
        Ok(())
    }

    /// Store modules under their canonical instance
    pub async fn set_modules(&self, mut modules: Vec<Module>) -> Result<()> {
        let mut owners: HashMap<String, Instance> = HashMap::new();

        for module in &mut modules {
            if module.id.is_empty() {
                return Err(Error::InvalidInput("module needs an id".to_string()));
            }
            let instance = match owners.get(&module.instance_id) {
                Some(instance) => instance.clone(),
                None => {
                    let instance = self.resolver.resolve(&module.instance_id).await?;
                    owners.insert(module.instance_id.clone(), instance.clone());
                    instance
                }
            };
            module.instance_id = instance.id;
            module.user_id = instance.user_id;
            module.design_id = instance.design_id;
            module.release_id = instance.release_id;
        }

        self.store.save_modules(&modules).await
    }

    pub async fn list_modules(&self, id_or_alias: &str) -> Result<Vec<Module>> {
        let id = self.resolver.canonical_id(id_or_alias).await?;
        self.store.list_modules_by_instance(&id).await
    }

    /// Store a variable under its canonical instance
    pub async fn set_variable(&self, mut variable: Variable) -> Result<()> {
        if variable.name.is_empty() {
            return Err(Error::InvalidInput("variable needs a name".to_string()));
        }
        variable.instance_id = self.resolver.canonical_id(&variable.instance_id).await?;
        self.store.save_variable(&variable).await
    }

    pub async fn list_variables(&self, id_or_alias: &str) -> Result<Vec<Variable>> {
        let id = self.resolver.canonical_id(id_or_alias).await?;
        self.store.list_variables(&id).await
    }
}

/// Start variables: declared defaults overlaid with the chosen values
fn start_variables(
    descriptions: &[ParameterDescription],
    chosen: &[InstanceParameter],
) -> Result<HashMap<String, Value>> {
    let mut variables = HashMap::new();
    for description in descriptions {
        if let Some(default) = &description.default_value {
            variables.insert(description.id.clone(), typed_default(&description.value_type, default));
        }
    }

    for parameter in chosen {
        if !descriptions.iter().any(|d| d.id == parameter.id) {
            return Err(Error::InvalidInput(format!("unknown parameter {}", parameter.id)));
        }
        variables.insert(parameter.id.clone(), parameter.value.clone());
    }
    Ok(variables)
}

/// Form field defaults are strings in the definition; numbers and flags are typed
fn typed_default(value_type: &str, raw: &str) -> Value {
    match value_type {
        "long" => raw.parse::<i64>().map(Value::from).unwrap_or_else(|_| Value::from(raw)),
        "boolean" => raw.parse::<bool>().map(Value::from).unwrap_or_else(|_| Value::from(raw)),
        _ => Value::from(raw),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn description(id: &str, value_type: &str, default: Option<&str>) -> ParameterDescription {
        ParameterDescription {
            id: id.to_string(),
            label: id.to_string(),
            value_type: value_type.to_string(),
            default_value: default.map(str::to_string),
        }
    }

    #[test]
    fn defaults_are_typed_and_overridden() {
        let descriptions = vec![
            description("temperature", "long", Some("21")),
            description("room", "string", Some("kitchen")),
            description("force", "boolean", None),
        ];
        let chosen = vec![InstanceParameter {
            id: "room".to_string(),
            value: json!("bath"),
        }];

        let variables = start_variables(&descriptions, &chosen).unwrap();
        assert_eq!(variables.get("temperature"), Some(&json!(21)));
        assert_eq!(variables.get("room"), Some(&json!("bath")));
        assert!(!variables.contains_key("force"));
    }

    #[test]
    fn unknown_parameters_are_rejected() {
        let chosen = vec![InstanceParameter {
            id: "humidity".to_string(),
            value: json!(40),
        }];
        let err = start_variables(&[], &chosen).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }
}
