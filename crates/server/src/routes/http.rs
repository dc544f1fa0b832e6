//! Read-only HTTP surface over project state, documented with utoipa so
//! operators get a browsable `/docs` page alongside the WebSocket hub.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::get;
use axum::Router;
use serde::Deserialize;
use swarm_common::{Agent, ErrorBody, FileLease, Task};
use swarm_core::{Outcome, Request};

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/projects", get(list_projects))
        .route("/api/projects/:project_id/status", get(project_status))
        .route("/api/projects/:project_id/agents", get(list_agents))
        .route("/api/projects/:project_id/tasks", get(list_tasks))
        .route("/api/projects/:project_id/leases", get(list_leases))
        .route("/api/projects/:project_id/logs", get(replay_log))
        .route("/health", get(health))
}

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<ErrorBody>)>;

async fn run(state: &AppState, project_id: &str, req: Request) -> Result<serde_json::Value, (StatusCode, Json<ErrorBody>)> {
    let handle = state.registry.get_or_spawn(project_id).await.map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorBody { code: "internal", message: e.to_string() }),
        )
    })?;
    match handle.request(req).await {
        Ok(Outcome::Value(v)) => Ok(v),
        Ok(Outcome::Subscribed { .. }) => Ok(serde_json::Value::Null),
        Err(e) => {
            let status = match e.code() {
                "not_found" => StatusCode::NOT_FOUND,
                "unauthenticated" => StatusCode::UNAUTHORIZED,
                "forbidden" => StatusCode::FORBIDDEN,
                "conflict" | "stale_epoch" | "precondition" => StatusCode::CONFLICT,
                "invalid_request" | "invalid_path" => StatusCode::BAD_REQUEST,
                "stopped" => StatusCode::SERVICE_UNAVAILABLE,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
            Err((status, Json(ErrorBody { code: e.code(), message: e.to_string() })))
        }
    }
}

/// List every project id this server has ever created an actor for.
#[utoipa::path(get, path = "/api/projects", responses((status = 200, description = "Known project ids")))]
pub async fn list_projects(State(state): State<AppState>) -> Json<Vec<String>> {
    Json(state.registry.list_ids())
}

/// Full project projection: agents, tasks, leases, orchestrator, votes.
#[utoipa::path(
    get,
    path = "/api/projects/{project_id}/status",
    params(("project_id" = String, Path, description = "Project identifier")),
    responses((status = 200, description = "Project snapshot"))
)]
pub async fn project_status(State(state): State<AppState>, Path(project_id): Path<String>) -> ApiResult<serde_json::Value> {
    Ok(Json(run(&state, &project_id, Request::Status).await?))
}

#[utoipa::path(
    get,
    path = "/api/projects/{project_id}/agents",
    params(("project_id" = String, Path, description = "Project identifier")),
    responses((status = 200, description = "Registered agents"))
)]
pub async fn list_agents(State(state): State<AppState>, Path(project_id): Path<String>) -> ApiResult<Vec<Agent>> {
    let value = run(&state, &project_id, Request::AgentList).await?;
    Ok(Json(serde_json::from_value(value).unwrap_or_default()))
}

#[utoipa::path(
    get,
    path = "/api/projects/{project_id}/tasks",
    params(("project_id" = String, Path, description = "Project identifier")),
    responses((status = 200, description = "Tasks on the board"))
)]
pub async fn list_tasks(State(state): State<AppState>, Path(project_id): Path<String>) -> ApiResult<Vec<Task>> {
    let value = run(&state, &project_id, Request::TaskList).await?;
    Ok(Json(serde_json::from_value(value).unwrap_or_default()))
}

#[utoipa::path(
    get,
    path = "/api/projects/{project_id}/leases",
    params(("project_id" = String, Path, description = "Project identifier")),
    responses((status = 200, description = "Active file leases"))
)]
pub async fn list_leases(State(state): State<AppState>, Path(project_id): Path<String>) -> ApiResult<Vec<FileLease>> {
    let value = run(&state, &project_id, Request::FileList).await?;
    Ok(Json(serde_json::from_value(value).unwrap_or_default()))
}

#[derive(Deserialize)]
pub struct ReplayParams {
    #[serde(default)]
    pub since_seq: u64,
    #[serde(default)]
    pub max: Option<usize>,
}

#[utoipa::path(
    get,
    path = "/api/projects/{project_id}/logs",
    params(
        ("project_id" = String, Path, description = "Project identifier"),
        ("since_seq" = u64, Query, description = "Return events after this sequence number"),
        ("max" = Option<usize>, Query, description = "Maximum events to return"),
    ),
    responses((status = 200, description = "Event log slice"))
)]
pub async fn replay_log(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
    Query(params): Query<ReplayParams>,
) -> ApiResult<serde_json::Value> {
    let req = Request::Replay { since_seq: params.since_seq, max: params.max };
    Ok(Json(run(&state, &project_id, req).await?))
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}
