/// Instance, maintenance, module and variable endpoints
///
/// Most of these are called by workflow tasks running in the process engine. Any
/// `{id}` may be an instance id or a running maintenance id.

use crate::api::{user_id, ApiResult, AppState};
use crate::model::{Instance, Module, Variable};
use crate::sync::CreateInstance;
use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::Json,
    routing::{get, post, put},
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;

#[derive(Debug, Deserialize)]
pub struct ReadyRequest {
    pub ready: bool,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CleanupParams {
    #[serde(default)]
    pub ignore_module_delete_errors: bool,
}

pub fn create_instance_routes() -> Router<AppState> {
    Router::new()
        .route("/instances", post(create_instance))
        .route("/instances/{id}", get(get_instance).delete(delete_instance))
        .route("/instances/{id}/ready", put(set_ready))
        .route("/instances/{id}/maintenance/{event_id}", post(start_maintenance))
        .route("/maintenance/{id}/finished", post(finish_maintenance))
        .route("/modules", put(set_modules))
        .route("/instances/{id}/modules", get(list_modules))
        .route("/variables", put(set_variable))
        .route("/instances/{id}/variables", get(list_variables))
        .route("/cleanup", post(run_cleanup))
}

/// POST /instances
async fn create_instance(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CreateInstance>,
) -> ApiResult<(StatusCode, Json<Instance>)> {
    let user = user_id(&headers)?;
    let instance = state.controller.create_instance(&user, payload).await?;
    Ok((StatusCode::CREATED, Json(instance)))
}

async fn get_instance(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<Instance>> {
    Ok(Json(state.controller.get_instance(&id).await?))
}

async fn delete_instance(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<StatusCode> {
    state.controller.delete_instance(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// PUT /instances/{id}/ready
async fn set_ready(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<ReadyRequest>,
) -> ApiResult<StatusCode> {
    state
        .controller
        .set_instance_ready(&id, payload.ready, payload.error.as_deref())
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /instances/{id}/maintenance/{event_id}
/// Body: maintenance parameters as a flat JSON object
async fn start_maintenance(
    State(state): State<AppState>,
    Path((id, event_id)): Path<(String, String)>,
    payload: Option<Json<HashMap<String, Value>>>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let parameters = payload.map(|Json(p)| p).unwrap_or_default();
    let maintenance_id = state
        .controller
        .start_maintenance_procedure(&id, &event_id, parameters)
        .await?;
    Ok((StatusCode::ACCEPTED, Json(json!({ "maintenance_id": maintenance_id }))))
}

/// POST /maintenance/{id}/finished
async fn finish_maintenance(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<StatusCode> {
    state.controller.finish_maintenance(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// PUT /modules
async fn set_modules(State(state): State<AppState>, Json(modules): Json<Vec<Module>>) -> ApiResult<StatusCode> {
    state.controller.set_modules(modules).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_modules(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<Value>> {
    let modules = state.controller.list_modules(&id).await?;
    Ok(Json(json!({ "modules": modules })))
}

/// PUT /variables
async fn set_variable(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(mut variable): Json<Variable>,
) -> ApiResult<StatusCode> {
    if variable.user_id.is_empty() {
        variable.user_id = user_id(&headers)?;
    }
    state.controller.set_variable(variable).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_variables(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<Value>> {
    let variables = state.controller.list_variables(&id).await?;
    Ok(Json(json!({ "variables": variables })))
}

/// POST /cleanup?ignore_module_delete_errors=bool
/// Returns: { "errors": ["..."] }
async fn run_cleanup(
    State(state): State<AppState>,
    Query(params): Query<CleanupParams>,
) -> Json<Value> {
    let errors: Vec<String> = state
        .controller
        .cleanup(params.ignore_module_delete_errors)
        .await
        .iter()
        .map(ToString::to_string)
        .collect();
    Json(json!({ "errors": errors }))
}
