/// HTTP client for the permission service
///
/// Endpoints:
/// - PUT    /permissions/{topic}/{id}          body: ResourcePermissions
/// - DELETE /permissions/{topic}/{id}
/// - GET    /check/{topic}/{id}?rights={r}     answers a JSON bool

use crate::error::{Error, Result};
use crate::http::{ensure_deleted, ensure_success};
use crate::permissions::{PermissionService, ResourcePermissions, Right};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};

const SERVICE: &str = "permission service";

#[derive(Debug, Clone)]
pub struct PermissionClient {
    client: Client,
    base_url: String,
}

impl PermissionClient {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn permission_url(&self, topic: &str, resource_id: &str) -> String {
        format!("{}/permissions/{}/{}", self.base_url, topic, resource_id)
    }
}

#[async_trait]
impl PermissionService for PermissionClient {
    async fn set_permission(
        &self,
        topic: &str,
        resource_id: &str,
        permissions: &ResourcePermissions,
    ) -> Result<()> {
        let response = self
            .client
            .put(self.permission_url(topic, resource_id))
            .json(permissions)
            .send()
            .await
            .map_err(|e| Error::transport(SERVICE, e))?;
        ensure_success(SERVICE, response).await?;
        Ok(())
    }

    async fn delete_permission(&self, topic: &str, resource_id: &str) -> Result<()> {
        let response = self
            .client
            .delete(self.permission_url(topic, resource_id))
            .send()
            .await
            .map_err(|e| Error::transport(SERVICE, e))?;
        ensure_deleted(SERVICE, response).await
    }

    async fn check_access(&self, token: &str, topic: &str, resource_id: &str, right: Right) -> Result<bool> {
        let response = self
            .client
            .get(format!("{}/check/{}/{}", self.base_url, topic, resource_id))
            .query(&[("rights", right.as_str())])
            .header(reqwest::header::AUTHORIZATION, token)
            .send()
            .await
            .map_err(|e| Error::transport(SERVICE, e))?;

        // unknown resource: nobody has access
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        let response = ensure_success(SERVICE, response).await?;
        response.json().await.map_err(|e| Error::transport(SERVICE, e))
    }
}
