/// HTTP API Layer
///
/// Thin REST surface over the sync controller. It handles:
/// - Release creation, listing, lookup and deletion
/// - Instance lifecycle and maintenance procedures
/// - Module and variable writes from workflow tasks
/// - Manual cleanup runs
///
/// The caller's identity comes from the `X-UserId` header; the bearer token is only
/// forwarded to the permission service.

// Release endpoints
pub mod releases;

// Instance, maintenance, module and variable endpoints
pub mod instances;

pub use instances::create_instance_routes;
pub use releases::create_release_routes;

use crate::error::Error;
use crate::permissions::{PermissionService, Right, RELEASE_TOPIC};
use crate::sync::SyncController;
use axum::{
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use std::sync::Arc;

/// Application state shared by all handlers
#[derive(Clone)]
pub struct AppState {
    pub controller: Arc<SyncController>,
    pub permissions: Arc<dyn PermissionService>,
}

/// Error response: `{"error": "..."}` with a status derived from the error kind
#[derive(Debug)]
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            Error::InvalidDefinition(_) | Error::InvalidInput(_) => StatusCode::BAD_REQUEST,
            Error::InUse(_) => StatusCode::CONFLICT,
            Error::Forbidden(_) => StatusCode::FORBIDDEN,
            Error::Remote { .. } => StatusCode::BAD_GATEWAY,
            Error::Store(_) | Error::Serialization(_) | Error::Scheduler(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self.0);
        }
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// Caller id from the `X-UserId` header
pub(crate) fn user_id(headers: &HeaderMap) -> ApiResult<String> {
    headers
        .get("X-UserId")
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ApiError(Error::InvalidInput("missing X-UserId header".to_string())))
}

/// Bearer token from the `Authorization` header
fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get("Authorization")?.to_str().ok()?;
    Some(value.strip_prefix("Bearer ").unwrap_or(value))
}

/// Require `right` on a release for the caller's token
pub(crate) async fn authorize_release(
    state: &AppState,
    headers: &HeaderMap,
    release_id: &str,
    right: Right,
) -> ApiResult<()> {
    let token = bearer_token(headers)
        .ok_or_else(|| ApiError(Error::Forbidden("missing bearer token".to_string())))?;

    if state
        .permissions
        .check_access(token, RELEASE_TOPIC, release_id, right)
        .await?
    {
        Ok(())
    } else {
        Err(ApiError(Error::Forbidden(format!(
            "no '{}' right on release {}",
            right.as_str(),
            release_id
        ))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn error_kinds_map_to_statuses() {
        assert_eq!(ApiError(Error::not_found("release", "r1")).status(), StatusCode::NOT_FOUND);
        assert_eq!(ApiError(Error::InUse("r1".into())).status(), StatusCode::CONFLICT);
        assert_eq!(ApiError(Error::remote("process engine", "boom")).status(), StatusCode::BAD_GATEWAY);
        assert_eq!(
            ApiError(Error::InvalidDefinition("no process".into())).status(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn identity_headers_are_read() {
        let mut headers = HeaderMap::new();
        assert!(user_id(&headers).is_err());
        assert_eq!(bearer_token(&headers), None);

        headers.insert("X-UserId", HeaderValue::from_static("user-1"));
        headers.insert("Authorization", HeaderValue::from_static("Bearer abc"));
        assert_eq!(user_id(&headers).unwrap(), "user-1");
        assert_eq!(bearer_token(&headers), Some("abc"));
    }
}
