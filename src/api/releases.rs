/// Release REST endpoints
///
/// Creation and deletion run the full saga synchronously; the response reports
/// the outcome of the first attempt. A failed deletion is retried in the
/// background, the release stays hidden meanwhile.

use crate::api::{authorize_release, user_id, ApiResult, AppState};
use crate::model::{ParsedInfo, Release};
use crate::permissions::Right;
use crate::store::ReleaseQuery;
use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::Json,
    routing::get,
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

/// Request body for release creation
#[derive(Debug, Deserialize)]
pub struct CreateReleaseRequest {
    /// Generated when absent
    #[serde(default)]
    pub id: Option<String>,
    pub design_id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub bpmn: String,
    #[serde(default)]
    pub svg: String,
}

pub fn create_release_routes() -> Router<AppState> {
    Router::new()
        .route("/releases", get(list_releases).post(create_release))
        .route("/releases/{id}", get(get_release).delete(delete_release))
}

/// POST /releases
async fn create_release(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CreateReleaseRequest>,
) -> ApiResult<(StatusCode, Json<Release>)> {
    let creator_id = user_id(&headers)?;

    let release = Release {
        id: payload.id.unwrap_or_else(|| Uuid::new_v4().to_string()),
        design_id: payload.design_id,
        name: payload.name,
        description: payload.description,
        bpmn: payload.bpmn,
        svg: payload.svg,
        created_at: 0,
        creator_id,
        parsed_info: ParsedInfo::default(),
        last_error: None,
    };

    let created = state.controller.create_release(release).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// GET /releases?design_id=&limit=&offset=&sort=
async fn list_releases(
    State(state): State<AppState>,
    Query(query): Query<ReleaseQuery>,
) -> ApiResult<Json<Value>> {
    let releases = state.controller.list_releases(&query).await?;
    Ok(Json(json!({ "releases": releases })))
}

/// GET /releases/{id}
async fn get_release(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<Json<Release>> {
    authorize_release(&state, &headers, &id, Right::Read).await?;
    Ok(Json(state.controller.get_release(&id).await?))
}

/// DELETE /releases/{id}
async fn delete_release(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    authorize_release(&state, &headers, &id, Right::Administrate).await?;
    state.controller.delete_release(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}
