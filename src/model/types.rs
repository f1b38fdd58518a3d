/// Core record definitions
///
/// These are persisted in the record store as rows with JSON columns and are the
/// payloads of the HTTP API.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

/// A deployable, immutable version of a design's workflow definition
///
/// The process-engine deployment is never referenced by a stored handle. Its key
/// is always recomputed from `id` (see [`crate::bpmn::deployment_key`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Release {
    /// Release id; ASCII alphanumerics and '-' only (UUIDs in practice)
    pub id: String,
    /// Design this release was cut from
    pub design_id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// BPMN 2.0 XML as authored
    pub bpmn: String,
    /// Rendered SVG diagram, shipped to the engine next to the definition
    #[serde(default)]
    pub svg: String,
    /// Unix timestamp (seconds)
    #[serde(default)]
    pub created_at: i64,
    #[serde(default)]
    pub creator_id: String,
    #[serde(default)]
    pub parsed_info: ParsedInfo,
    /// Last definition-level deployment failure, if any
    #[serde(default)]
    pub last_error: Option<String>,
}

/// Information extracted from the workflow definition at release creation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsedInfo {
    /// Start form fields of the main process
    pub parameter_descriptions: Vec<ParameterDescription>,
    /// Message-started maintenance sub-processes
    pub maintenance_procedures: Vec<MaintenanceProcedure>,
}

/// A single start parameter of a process or maintenance procedure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterDescription {
    pub id: String,
    pub label: String,
    #[serde(rename = "type")]
    pub value_type: String,
    pub default_value: Option<String>,
}

/// Maintenance procedure declared in the definition
///
/// Users address it by `public_event_id` (the BPMN message name as authored); the
/// deployed definition listens on `internal_event_id`, which is release-scoped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaintenanceProcedure {
    /// Id of the message start event in the definition
    pub bpmn_id: String,
    pub name: String,
    pub public_event_id: String,
    pub internal_event_id: String,
    pub parameter_descriptions: Vec<ParameterDescription>,
}

/// Durable intent flags stored next to a release
///
/// `marked_as_unfinished` and `marked_as_deleted` are never both set; the
/// constructors are the only way to produce a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncMarks {
    marked_at_unix_timestamp: i64,
    marked_as_unfinished: bool,
    marked_as_deleted: bool,
}

impl SyncMarks {
    /// Stable state: deployed and permissioned
    pub fn committed() -> Self {
        Self {
            marked_at_unix_timestamp: now_unix(),
            marked_as_unfinished: false,
            marked_as_deleted: false,
        }
    }

    /// Creation in progress
    pub fn unfinished() -> Self {
        Self {
            marked_at_unix_timestamp: now_unix(),
            marked_as_unfinished: true,
            marked_as_deleted: false,
        }
    }

    /// Scheduled for full removal
    pub fn deleted() -> Self {
        Self {
            marked_at_unix_timestamp: now_unix(),
            marked_as_unfinished: false,
            marked_as_deleted: true,
        }
    }

    /// Rebuild marks read back from the store
    ///
    /// A row carrying both flags is treated as deleted: tearing down is the safe
    /// direction for a record in an unknown state.
    pub fn from_stored(marked_at: i64, unfinished: bool, deleted: bool) -> Self {
        Self {
            marked_at_unix_timestamp: marked_at,
            marked_as_unfinished: unfinished && !deleted,
            marked_as_deleted: deleted,
        }
    }

    pub fn marked_at(&self) -> i64 {
        self.marked_at_unix_timestamp
    }

    pub fn is_unfinished(&self) -> bool {
        self.marked_as_unfinished
    }

    pub fn is_deleted(&self) -> bool {
        self.marked_as_deleted
    }

    pub fn is_committed(&self) -> bool {
        !self.marked_as_unfinished && !self.marked_as_deleted
    }

    /// Whether the mark is at least `limit` old at `now` (unix seconds)
    pub fn is_stale(&self, limit: Duration, now: i64) -> bool {
        let limit = i64::try_from(limit.as_secs()).unwrap_or(i64::MAX);
        now.saturating_sub(self.marked_at_unix_timestamp) >= limit
    }
}

/// A running or finished execution of a release
///
/// `id` doubles as the business key of the engine process instance. Each running
/// maintenance procedure adds its own business key to `running_maintenance_ids`,
/// and any of those keys resolves to this record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instance {
    pub id: String,
    pub user_id: String,
    pub design_id: String,
    pub release_id: String,
    /// Set when a newer release of the same design has been committed
    #[serde(default)]
    pub new_release_id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub ready: bool,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub parameters: Vec<InstanceParameter>,
    #[serde(default)]
    pub running_maintenance_ids: Vec<String>,
}

/// A start parameter value chosen by the user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceParameter {
    pub id: String,
    pub value: Value,
}

/// Side-effect state created by a workflow task on behalf of an instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Module {
    pub id: String,
    #[serde(default)]
    pub user_id: String,
    pub instance_id: String,
    #[serde(default)]
    pub design_id: String,
    #[serde(default)]
    pub release_id: String,
    pub module_type: String,
    #[serde(default)]
    pub module_data: Value,
    /// Remote callback releasing whatever the module represents
    #[serde(default)]
    pub delete_info: Option<DeleteInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteInfo {
    /// Receives an HTTP DELETE
    pub url: String,
    /// Forwarded as `X-UserId`
    pub user_id: String,
}

/// Key/value state of an instance, keyed by (instance_id, user_id, name)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    pub instance_id: String,
    #[serde(default)]
    pub user_id: String,
    pub name: String,
    pub value: Value,
}

/// Current unix time in seconds
pub fn now_unix() -> i64 {
    chrono::Utc::now().timestamp()
}
