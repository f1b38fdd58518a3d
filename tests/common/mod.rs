//! Shared fixtures: in-memory store plus scriptable engine and permission fakes

#![allow(dead_code)]

use async_trait::async_trait;
use relsync::config::SyncConfig;
use relsync::engine::{InstanceState, ProcessEngine, ProcessInstance};
use relsync::error::{Error, Result};
use relsync::model::{ParsedInfo, Release};
use relsync::notify::{Notification, Notifier};
use relsync::permissions::{PermissionService, ResourcePermissions, Right};
use relsync::store::Store;
use relsync::sync::SyncController;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const DEFINITION: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<bpmn:definitions xmlns:bpmn="http://www.omg.org/spec/BPMN/20100524/MODEL" xmlns:camunda="http://camunda.org/schema/1.0/bpmn" id="Definitions_1">
  <bpmn:process id="Process_main" name="Heating" isExecutable="true">
    <bpmn:startEvent id="Start_main" name="start">
      <bpmn:extensionElements>
        <camunda:formData>
          <camunda:formField id="temperature" label="Temperature" type="long" defaultValue="21" />
        </camunda:formData>
      </bpmn:extensionElements>
    </bpmn:startEvent>
    <bpmn:startEvent id="Start_reset" name="Reset thermostat">
      <bpmn:messageEventDefinition id="MessageDef_1" messageRef="Message_reset" />
    </bpmn:startEvent>
  </bpmn:process>
  <bpmn:message id="Message_reset" name="reset" />
</bpmn:definitions>"#;

/// Parses as XML but declares no process
pub const DEFINITION_WITHOUT_PROCESS: &str =
    r#"<bpmn:definitions xmlns:bpmn="http://www.omg.org/spec/BPMN/20100524/MODEL"></bpmn:definitions>"#;

fn engine_down() -> Error {
    Error::remote("process engine", "connection refused")
}

/// In-memory process engine with a failure switch
#[derive(Default)]
pub struct MockEngine {
    pub failing: AtomicBool,
    /// deployment name -> deployment ids
    pub deployments: Mutex<HashMap<String, Vec<String>>>,
    pub processes: Mutex<Vec<ProcessInstance>>,
    pub deploy_calls: AtomicUsize,
    pub undeploy_calls: AtomicUsize,
    pub started: Mutex<Vec<(String, String, HashMap<String, Value>)>>,
    pub maintenance_started: Mutex<Vec<(String, String)>>,
    next_id: AtomicUsize,
}

impl MockEngine {
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            Err(engine_down())
        } else {
            Ok(())
        }
    }

    fn next_id(&self, prefix: &str) -> String {
        format!("{}-{}", prefix, self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    pub fn deployment_count(&self, name: &str) -> usize {
        self.deployments
            .lock()
            .unwrap()
            .get(name)
            .map(Vec::len)
            .unwrap_or(0)
    }

    /// Adds a process instance the store knows nothing about
    pub fn inject_process(&self, business_key: Option<&str>, finished: bool) -> String {
        let id = self.next_id("proc");
        self.processes.lock().unwrap().push(ProcessInstance {
            id: id.clone(),
            business_key: business_key.map(str::to_string),
            end_time: finished.then(|| "2024-01-01T00:00:00".to_string()),
        });
        id
    }

    pub fn has_process(&self, id: &str) -> bool {
        self.processes.lock().unwrap().iter().any(|p| p.id == id)
    }

    pub fn finish_business_key(&self, business_key: &str) {
        for process in self.processes.lock().unwrap().iter_mut() {
            if process.business_key.as_deref() == Some(business_key) {
                process.end_time = Some("2024-01-01T00:00:00".to_string());
            }
        }
    }
}

#[async_trait]
impl ProcessEngine for MockEngine {
    async fn deploy(&self, name: &str, _definition: &str, _diagram: &str) -> Result<String> {
        self.deploy_calls.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        let id = self.next_id("deployment");
        self.deployments
            .lock()
            .unwrap()
            .entry(name.to_string())
            .or_default()
            .push(id.clone());
        Ok(id)
    }

    async fn undeploy(&self, deployment_key: &str) -> Result<()> {
        self.undeploy_calls.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        self.deployments.lock().unwrap().remove(deployment_key);
        Ok(())
    }

    async fn start_instance(
        &self,
        deployment_key: &str,
        business_key: &str,
        variables: &HashMap<String, Value>,
    ) -> Result<()> {
        self.check()?;
        if self.deployment_count(deployment_key) == 0 {
            return Err(Error::remote("process engine", "no deployment"));
        }
        self.inject_process(Some(business_key), false);
        self.started.lock().unwrap().push((
            deployment_key.to_string(),
            business_key.to_string(),
            variables.clone(),
        ));
        Ok(())
    }

    async fn start_maintenance(
        &self,
        internal_event_id: &str,
        maintenance_id: &str,
        _parameters: &HashMap<String, Value>,
    ) -> Result<()> {
        self.check()?;
        self.inject_process(Some(maintenance_id), false);
        self.maintenance_started
            .lock()
            .unwrap()
            .push((internal_event_id.to_string(), maintenance_id.to_string()));
        Ok(())
    }

    async fn stop_instance(&self, business_key: &str) -> Result<()> {
        self.check()?;
        self.finish_business_key(business_key);
        Ok(())
    }

    async fn instance_state(&self, business_key: &str) -> Result<InstanceState> {
        self.check()?;
        let processes = self.processes.lock().unwrap();
        let records: Vec<ProcessInstance> = processes
            .iter()
            .filter(|p| p.business_key.as_deref() == Some(business_key))
            .cloned()
            .collect();
        Ok(InstanceState::from_history(&records))
    }

    async fn list_process_instances(&self) -> Result<Vec<ProcessInstance>> {
        self.check()?;
        Ok(self.processes.lock().unwrap().clone())
    }

    async fn delete_process_instance(&self, id: &str) -> Result<()> {
        self.check()?;
        for process in self.processes.lock().unwrap().iter_mut() {
            if process.id == id {
                process.end_time = Some("2024-01-01T00:00:00".to_string());
            }
        }
        Ok(())
    }

    async fn delete_process_instance_history(&self, id: &str) -> Result<()> {
        self.check()?;
        self.processes.lock().unwrap().retain(|p| p.id != id);
        Ok(())
    }
}

#[derive(Default)]
pub struct MockPermissions {
    pub failing: AtomicBool,
    pub records: Mutex<HashMap<String, ResourcePermissions>>,
}

impl MockPermissions {
    pub fn get(&self, resource_id: &str) -> Option<ResourcePermissions> {
        self.records.lock().unwrap().get(resource_id).cloned()
    }
}

#[async_trait]
impl PermissionService for MockPermissions {
    async fn set_permission(
        &self,
        _topic: &str,
        resource_id: &str,
        permissions: &ResourcePermissions,
    ) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::remote("permission service", "unavailable"));
        }
        self.records
            .lock()
            .unwrap()
            .insert(resource_id.to_string(), permissions.clone());
        Ok(())
    }

    async fn delete_permission(&self, _topic: &str, resource_id: &str) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::remote("permission service", "unavailable"));
        }
        self.records.lock().unwrap().remove(resource_id);
        Ok(())
    }

    async fn check_access(&self, _token: &str, _topic: &str, _resource_id: &str, _right: Right) -> Result<bool> {
        Ok(true)
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<Notification>>,
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, notification: Notification) {
        self.sent.lock().unwrap().push(notification);
    }
}

pub struct Harness {
    pub controller: Arc<SyncController>,
    pub store: Store,
    pub engine: Arc<MockEngine>,
    pub permissions: Arc<MockPermissions>,
    pub notifier: Arc<RecordingNotifier>,
}

/// Harness whose sweeper treats every mark as stale
pub async fn harness() -> Harness {
    harness_with(SyncConfig {
        mark_age_limit: Duration::ZERO,
        cleanup_cycle: Duration::from_secs(60),
        page_size: 2,
    })
    .await
}

pub async fn harness_with(config: SyncConfig) -> Harness {
    let store = Store::in_memory().await.unwrap();
    let engine = Arc::new(MockEngine::default());
    let permissions = Arc::new(MockPermissions::default());
    let notifier = Arc::new(RecordingNotifier::default());

    let controller = Arc::new(SyncController::new(
        store.clone(),
        engine.clone(),
        permissions.clone(),
        notifier.clone(),
        reqwest::Client::builder().no_proxy().build().unwrap(),
        config,
    ));

    Harness {
        controller,
        store,
        engine,
        permissions,
        notifier,
    }
}

pub fn release(id: &str, design_id: &str) -> Release {
    Release {
        id: id.to_string(),
        design_id: design_id.to_string(),
        name: format!("release {}", id),
        description: String::new(),
        bpmn: DEFINITION.to_string(),
        svg: "<svg/>".to_string(),
        created_at: 0,
        creator_id: "user-1".to_string(),
        parsed_info: ParsedInfo::default(),
        last_error: None,
    }
}
