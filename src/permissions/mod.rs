/// Permission adapter
///
/// Access records for releases live in an external permission service. The
/// lifecycle grants the creator full rights once a release is committed and
/// removes the record when the release is removed.

// HTTP implementation
pub mod http;

pub use http::PermissionClient;

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Permission topic of release resources
pub const RELEASE_TOPIC: &str = "releases";

/// Single access right, encoded as one letter of "rwxa"
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Right {
    Read,
    Write,
    Execute,
    Administrate,
}

impl Right {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Read => "r",
            Self::Write => "w",
            Self::Execute => "x",
            Self::Administrate => "a",
        }
    }
}

/// Rights per user on one resource, e.g. {"user-1": "rwxa"}
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourcePermissions {
    pub user_rights: BTreeMap<String, String>,
}

impl ResourcePermissions {
    /// Full rights for the owner of a resource
    pub fn owner(user_id: &str) -> Self {
        let mut user_rights = BTreeMap::new();
        user_rights.insert(user_id.to_string(), "rwxa".to_string());
        Self { user_rights }
    }
}

#[async_trait]
pub trait PermissionService: Send + Sync {
    /// Create or replace the access record of a resource
    async fn set_permission(
        &self,
        topic: &str,
        resource_id: &str,
        permissions: &ResourcePermissions,
    ) -> Result<()>;

    /// Remove the access record of a resource; a missing record is success
    async fn delete_permission(&self, topic: &str, resource_id: &str) -> Result<()>;

    /// Whether the bearer of `token` holds `right` on the resource
    async fn check_access(&self, token: &str, topic: &str, resource_id: &str, right: Right) -> Result<bool>;
}
