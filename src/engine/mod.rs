/// Process engine adapter
///
/// The engine is the deployment target of releases and runs their instances. It is
/// only reachable over the network, so every operation may fail or time out. All
/// removal operations are idempotent: a missing deployment or process instance is
/// success.

// Camunda REST implementation
pub mod camunda;

pub use camunda::CamundaClient;

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Process instance as recorded in the engine's history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessInstance {
    pub id: String,
    #[serde(default)]
    pub business_key: Option<String>,
    /// Set once the process instance has finished or was cancelled
    #[serde(default)]
    pub end_time: Option<String>,
}

impl ProcessInstance {
    pub fn is_finished(&self) -> bool {
        self.end_time.is_some()
    }
}

/// Engine-side state of a business key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceState {
    Running,
    Finished,
    Missing,
}

impl InstanceState {
    /// Fold the history records of one business key into a single state
    pub fn from_history(instances: &[ProcessInstance]) -> Self {
        if instances.is_empty() {
            Self::Missing
        } else if instances.iter().any(|i| !i.is_finished()) {
            Self::Running
        } else {
            Self::Finished
        }
    }
}

/// Operations the release lifecycle needs from the process engine
#[async_trait]
pub trait ProcessEngine: Send + Sync {
    /// Deploy a bound definition plus its diagram under `name`; returns the deployment id
    async fn deploy(&self, name: &str, definition: &str, diagram: &str) -> Result<String>;

    /// Remove every deployment named `deployment_key`, cascading to its instances
    async fn undeploy(&self, deployment_key: &str) -> Result<()>;

    /// Start the process deployed under `deployment_key`
    async fn start_instance(
        &self,
        deployment_key: &str,
        business_key: &str,
        variables: &HashMap<String, Value>,
    ) -> Result<()>;

    /// Start a maintenance sub-process by correlating its internal message
    async fn start_maintenance(
        &self,
        internal_event_id: &str,
        maintenance_id: &str,
        parameters: &HashMap<String, Value>,
    ) -> Result<()>;

    /// Stop every running process instance carrying `business_key`
    async fn stop_instance(&self, business_key: &str) -> Result<()>;

    async fn instance_state(&self, business_key: &str) -> Result<InstanceState>;

    /// All process instances the engine knows about, finished ones included
    async fn list_process_instances(&self) -> Result<Vec<ProcessInstance>>;

    async fn delete_process_instance(&self, id: &str) -> Result<()>;

    async fn delete_process_instance_history(&self, id: &str) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(end_time: Option<&str>) -> ProcessInstance {
        ProcessInstance {
            id: "p".to_string(),
            business_key: Some("b".to_string()),
            end_time: end_time.map(str::to_string),
        }
    }

    #[test]
    fn history_folds_into_a_state() {
        assert_eq!(InstanceState::from_history(&[]), InstanceState::Missing);
        assert_eq!(
            InstanceState::from_history(&[record(Some("2024-01-01")), record(None)]),
            InstanceState::Running
        );
        assert_eq!(
            InstanceState::from_history(&[record(Some("2024-01-01"))]),
            InstanceState::Finished
        );
    }

    #[test]
    fn history_records_deserialize_from_camunda_json() {
        let raw = r#"{"id":"p1","businessKey":"i1","endTime":null,"state":"ACTIVE"}"#;
        let parsed: ProcessInstance = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.business_key.as_deref(), Some("i1"));
        assert!(!parsed.is_finished());
    }
}
