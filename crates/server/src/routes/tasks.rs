use std::collections::BTreeMap;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    response::Json as ResponseJson,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use openclaw_db::models::{Event, Task, TaskStatus, task::CreateTask};
use openclaw_services::{BatchTaskDraft, UpdateTask};
use openclaw_utils::response::ApiResponse;

use crate::{AppState, error::ApiError};

pub async fn create_task(
    State(state): State<AppState>,
    Path(team_id): Path<Uuid>,
    Json(payload): Json<CreateTask>,
) -> Result<ResponseJson<ApiResponse<Task>>, ApiError> {
    let task = state.tasks().create_task(team_id, &payload).await?;
    Ok(ResponseJson(ApiResponse::success(task)))
}

#[derive(Debug, Deserialize)]
pub struct BatchCreateRequest {
    pub tasks: Vec<BatchTaskDraft>,
}

pub async fn batch_create_tasks(
    State(state): State<AppState>,
    Path(team_id): Path<Uuid>,
    Json(payload): Json<BatchCreateRequest>,
) -> Result<ResponseJson<ApiResponse<Vec<Task>>>, ApiError> {
    let tasks = state
        .tasks()
        .batch_create_tasks(team_id, &payload.tasks)
        .await?;
    Ok(ResponseJson(ApiResponse::success(tasks)))
}

#[derive(Debug, Deserialize)]
pub struct ListTasksQuery {
    pub status: Option<TaskStatus>,
    pub assignee_id: Option<Uuid>,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    100
}

pub async fn list_tasks(
    State(state): State<AppState>,
    Path(team_id): Path<Uuid>,
    Query(query): Query<ListTasksQuery>,
) -> Result<ResponseJson<ApiResponse<Vec<Task>>>, ApiError> {
    let tasks = state
        .tasks()
        .list_tasks(
            team_id,
            query.status,
            query.assignee_id,
            query.limit.clamp(1, 500),
            query.offset.max(0),
        )
        .await?;
    Ok(ResponseJson(ApiResponse::success(tasks)))
}

pub async fn get_task(
    State(state): State<AppState>,
    Path(task_id): Path<i64>,
) -> Result<ResponseJson<ApiResponse<Task>>, ApiError> {
    Ok(ResponseJson(ApiResponse::success(
        state.tasks().get_task(task_id).await?,
    )))
}

pub async fn update_task(
    State(state): State<AppState>,
    Path(task_id): Path<i64>,
    Json(payload): Json<UpdateTask>,
) -> Result<ResponseJson<ApiResponse<Task>>, ApiError> {
    Ok(ResponseJson(ApiResponse::success(
        state.tasks().update_task(task_id, &payload).await?,
    )))
}

#[derive(Debug, Deserialize)]
pub struct StatusChangeRequest {
    pub status: TaskStatus,
    pub actor_id: Option<Uuid>,
}

/// Entry point to the DAG-enforced state machine. Invalid transitions and
/// blocked dependencies are 409s: the request is well-formed but conflicts
/// with current state.
pub async fn change_status(
    State(state): State<AppState>,
    Path(task_id): Path<i64>,
    Json(payload): Json<StatusChangeRequest>,
) -> Result<ResponseJson<ApiResponse<Task>>, ApiError> {
    let task = state
        .tasks()
        .change_status(task_id, payload.status, payload.actor_id)
        .await?;
    Ok(ResponseJson(ApiResponse::success(task)))
}

#[derive(Debug, Deserialize)]
pub struct AssignRequest {
    pub assignee_id: Uuid,
}

pub async fn assign_task(
    State(state): State<AppState>,
    Path(task_id): Path<i64>,
    Json(payload): Json<AssignRequest>,
) -> Result<ResponseJson<ApiResponse<Task>>, ApiError> {
    Ok(ResponseJson(ApiResponse::success(
        state.tasks().assign_task(task_id, payload.assignee_id).await?,
    )))
}

pub async fn task_events(
    State(state): State<AppState>,
    Path(task_id): Path<i64>,
) -> Result<ResponseJson<ApiResponse<Vec<Event>>>, ApiError> {
    state.tasks().get_task(task_id).await?;
    Ok(ResponseJson(ApiResponse::success(
        state.tasks().task_events(task_id).await?,
    )))
}

#[derive(Debug, Deserialize)]
pub struct SaveContextRequest {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Serialize)]
pub struct ContextResponse {
    pub task_id: i64,
    pub context: BTreeMap<String, String>,
}

pub async fn save_context(
    State(state): State<AppState>,
    Path(task_id): Path<i64>,
    Json(payload): Json<SaveContextRequest>,
) -> Result<ResponseJson<ApiResponse<ContextResponse>>, ApiError> {
    let task = state
        .tasks()
        .save_context(task_id, &payload.key, &payload.value)
        .await?;
    Ok(ResponseJson(ApiResponse::success(ContextResponse {
        task_id,
        context: task.metadata.context,
    })))
}

pub async fn read_context(
    State(state): State<AppState>,
    Path(task_id): Path<i64>,
) -> Result<ResponseJson<ApiResponse<ContextResponse>>, ApiError> {
    let context = state.tasks().read_context(task_id).await?;
    Ok(ResponseJson(ApiResponse::success(ContextResponse {
        task_id,
        context,
    })))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/teams/{team_id}/tasks", get(list_tasks).post(create_task))
        .route("/teams/{team_id}/tasks/batch", post(batch_create_tasks))
        .route("/tasks/{task_id}", get(get_task).patch(update_task))
        .route("/tasks/{task_id}/status", post(change_status))
        .route("/tasks/{task_id}/assign", post(assign_task))
        .route("/tasks/{task_id}/events", get(task_events))
        .route("/tasks/{task_id}/context", get(read_context).post(save_context))
}
