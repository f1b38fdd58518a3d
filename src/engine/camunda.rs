/// Camunda 7 REST implementation of the process engine adapter
///
/// Deployments are named by the release's deployment key, so undeploying needs
/// nothing but the key: every deployment with that name is removed.

use crate::engine::{InstanceState, ProcessEngine, ProcessInstance};
use crate::error::{Error, Result};
use crate::http::{ensure_deleted, ensure_success};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::collections::HashMap;

const SERVICE: &str = "process engine";

/// Page size used when walking the engine's process-instance history
const HISTORY_PAGE_SIZE: usize = 100;

#[derive(Debug, Clone)]
pub struct CamundaClient {
    client: Client,
    /// Base URL including `/engine-rest`, without trailing slash
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct Deployment {
    id: String,
}

#[derive(Debug, Deserialize)]
struct RuntimeInstance {
    id: String,
}

impl CamundaClient {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn deployments_named(&self, name: &str) -> Result<Vec<Deployment>> {
        let response = self
            .client
            .get(self.url("/deployment"))
            .query(&[("name", name)])
            .send()
            .await
            .map_err(|e| Error::transport(SERVICE, e))?;
        let response = ensure_success(SERVICE, response).await?;
        response.json().await.map_err(|e| Error::transport(SERVICE, e))
    }

    async fn history(&self, query: &[(&str, String)]) -> Result<Vec<ProcessInstance>> {
        let mut all = Vec::new();
        let mut first_result = 0usize;

        loop {
            let response = self
                .client
                .get(self.url("/history/process-instance"))
                .query(query)
                .query(&[("firstResult", first_result), ("maxResults", HISTORY_PAGE_SIZE)])
                .send()
                .await
                .map_err(|e| Error::transport(SERVICE, e))?;
            let response = ensure_success(SERVICE, response).await?;
            let page: Vec<ProcessInstance> =
                response.json().await.map_err(|e| Error::transport(SERVICE, e))?;

            let fetched = page.len();
            all.extend(page);
            if fetched < HISTORY_PAGE_SIZE {
                break;
            }
            first_result += HISTORY_PAGE_SIZE;
        }

        Ok(all)
    }
}

/// `{"name": {"value": ...}}` as expected by Camunda's start / message endpoints
fn camunda_variables(variables: &HashMap<String, Value>) -> Value {
    let map: Map<String, Value> = variables
        .iter()
        .map(|(name, value)| (name.clone(), json!({ "value": value })))
        .collect();
    Value::Object(map)
}

#[async_trait]
impl ProcessEngine for CamundaClient {
    async fn deploy(&self, name: &str, definition: &str, diagram: &str) -> Result<String> {
        let mut form = Form::new()
            .text("deployment-name", name.to_string())
            .text("deployment-source", "relsync")
            .text("enable-duplicate-filtering", "false")
            .part(
                "definition",
                Part::text(definition.to_string()).file_name(format!("{}.bpmn", name)),
            );
        if !diagram.is_empty() {
            form = form.part(
                "diagram",
                Part::text(diagram.to_string()).file_name(format!("{}.svg", name)),
            );
        }

        let response = self
            .client
            .post(self.url("/deployment/create"))
            .multipart(form)
            .send()
            .await
            .map_err(|e| Error::transport(SERVICE, e))?;

        // Camunda answers 400 when it cannot parse the definition
        if response.status() == StatusCode::BAD_REQUEST {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::InvalidDefinition(crate::error::redact_urls(&body)));
        }
        let response = ensure_success(SERVICE, response).await?;
        let deployment: Deployment = response.json().await.map_err(|e| Error::transport(SERVICE, e))?;

        tracing::debug!("Deployed {} as deployment {}", name, deployment.id);
        Ok(deployment.id)
    }

    async fn undeploy(&self, deployment_key: &str) -> Result<()> {
        let deployments = self.deployments_named(deployment_key).await?;
        if deployments.is_empty() {
            tracing::debug!("No deployment named {}, nothing to undeploy", deployment_key);
        }

        for deployment in deployments {
            let response = self
                .client
                .delete(self.url(&format!("/deployment/{}", deployment.id)))
                .query(&[("cascade", "true"), ("skipIoMappings", "true")])
                .send()
                .await
                .map_err(|e| Error::transport(SERVICE, e))?;
            ensure_deleted(SERVICE, response).await?;
            tracing::debug!("Removed deployment {} ({})", deployment.id, deployment_key);
        }
        Ok(())
    }

    async fn start_instance(
        &self,
        deployment_key: &str,
        business_key: &str,
        variables: &HashMap<String, Value>,
    ) -> Result<()> {
        let body = json!({
            "businessKey": business_key,
            "variables": camunda_variables(variables),
        });
        let response = self
            .client
            .post(self.url(&format!("/process-definition/key/{}/start", deployment_key)))
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::transport(SERVICE, e))?;
        ensure_success(SERVICE, response).await?;
        Ok(())
    }

    async fn start_maintenance(
        &self,
        internal_event_id: &str,
        maintenance_id: &str,
        parameters: &HashMap<String, Value>,
    ) -> Result<()> {
        let body = json!({
            "messageName": internal_event_id,
            "businessKey": maintenance_id,
            "processVariables": camunda_variables(parameters),
        });
        let response = self
            .client
            .post(self.url("/message"))
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::transport(SERVICE, e))?;
        ensure_success(SERVICE, response).await?;
        Ok(())
    }

    async fn stop_instance(&self, business_key: &str) -> Result<()> {
        let response = self
            .client
            .get(self.url("/process-instance"))
            .query(&[("businessKey", business_key)])
            .send()
            .await
            .map_err(|e| Error::transport(SERVICE, e))?;
        let response = ensure_success(SERVICE, response).await?;
        let running: Vec<RuntimeInstance> =
            response.json().await.map_err(|e| Error::transport(SERVICE, e))?;

        for instance in running {
            self.delete_process_instance(&instance.id).await?;
        }
        Ok(())
    }

    async fn instance_state(&self, business_key: &str) -> Result<InstanceState> {
        let records = self
            .history(&[("processInstanceBusinessKey", business_key.to_string())])
            .await?;
        Ok(InstanceState::from_history(&records))
    }

    async fn list_process_instances(&self) -> Result<Vec<ProcessInstance>> {
        self.history(&[]).await
    }

    async fn delete_process_instance(&self, id: &str) -> Result<()> {
        let response = self
            .client
            .delete(self.url(&format!("/process-instance/{}", id)))
            .query(&[("skipIoMappings", "true")])
            .send()
            .await
            .map_err(|e| Error::transport(SERVICE, e))?;
        ensure_deleted(SERVICE, response).await
    }

    async fn delete_process_instance_history(&self, id: &str) -> Result<()> {
        let response = self
            .client
            .delete(self.url(&format!("/history/process-instance/{}", id)))
            .send()
            .await
            .map_err(|e| Error::transport(SERVICE, e))?;
        ensure_deleted(SERVICE, response).await
    }
}
