use axum::{
    Json, Router,
    extract::{Path, Query, State},
    response::Json as ResponseJson,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use openclaw_services::{PrInfo, git::{CommitInfo, DiffFile, WorktreeInfo}};
use openclaw_utils::response::ApiResponse;

use crate::{AppState, error::ApiError};

#[derive(Debug, Deserialize)]
pub struct RepoQuery {
    pub repo_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct PushQuery {
    pub repo_id: Uuid,
    #[serde(default)]
    pub force: bool,
}

#[derive(Debug, Serialize)]
pub struct PushResult {
    pub ok: bool,
    pub stderr: String,
}

pub async fn push_branch(
    State(state): State<AppState>,
    Path(task_id): Path<i64>,
    Query(query): Query<PushQuery>,
) -> Result<ResponseJson<ApiResponse<PushResult>>, ApiError> {
    let result = state
        .git()
        .push_branch(task_id, query.repo_id, query.force)
        .await?;
    Ok(ResponseJson(ApiResponse::success(PushResult {
        ok: result.ok(),
        stderr: result.stderr,
    })))
}

#[derive(Debug, Default, Deserialize)]
pub struct CreatePrBody {
    pub repo_id: Option<Uuid>,
    pub title: Option<String>,
    pub body: Option<String>,
    #[serde(default)]
    pub draft: bool,
    pub base_branch: Option<String>,
}

pub async fn create_pr(
    State(state): State<AppState>,
    Path(task_id): Path<i64>,
    Json(body): Json<CreatePrBody>,
) -> Result<ResponseJson<ApiResponse<PrInfo>>, ApiError> {
    let repo_id = match body.repo_id {
        Some(id) => id,
        None => {
            let task = state.tasks().get_task(task_id).await?;
            *task.repo_ids.first().ok_or_else(|| {
                ApiError::Validation("task has no repositories; pass repo_id".into())
            })?
        }
    };
    let info = state
        .prs()
        .create_pr(
            task_id,
            repo_id,
            body.title.as_deref(),
            body.body.as_deref(),
            body.draft,
            body.base_branch.as_deref(),
        )
        .await?;
    Ok(ResponseJson(ApiResponse::success(info)))
}

pub async fn worktree_info(
    State(state): State<AppState>,
    Path(task_id): Path<i64>,
    Query(query): Query<RepoQuery>,
) -> Result<ResponseJson<ApiResponse<WorktreeInfo>>, ApiError> {
    Ok(ResponseJson(ApiResponse::success(
        state.git().worktree_info(task_id, query.repo_id).await?,
    )))
}

pub async fn create_worktree(
    State(state): State<AppState>,
    Path(task_id): Path<i64>,
    Query(query): Query<RepoQuery>,
) -> Result<ResponseJson<ApiResponse<WorktreeInfo>>, ApiError> {
    Ok(ResponseJson(ApiResponse::success(
        state.git().create_worktree(task_id, query.repo_id).await?,
    )))
}

#[derive(Debug, Serialize)]
pub struct DiffResponse {
    pub task_id: i64,
    pub diff: String,
}

pub async fn task_diff(
    State(state): State<AppState>,
    Path(task_id): Path<i64>,
    Query(query): Query<RepoQuery>,
) -> Result<ResponseJson<ApiResponse<DiffResponse>>, ApiError> {
    let diff = state.git().diff(task_id, query.repo_id).await?;
    Ok(ResponseJson(ApiResponse::success(DiffResponse {
        task_id,
        diff,
    })))
}

pub async fn changed_files(
    State(state): State<AppState>,
    Path(task_id): Path<i64>,
    Query(query): Query<RepoQuery>,
) -> Result<ResponseJson<ApiResponse<Vec<DiffFile>>>, ApiError> {
    Ok(ResponseJson(ApiResponse::success(
        state.git().changed_files(task_id, query.repo_id).await?,
    )))
}

#[derive(Debug, Deserialize)]
pub struct FileQuery {
    pub repo_id: Uuid,
    pub path: String,
}

#[derive(Debug, Serialize)]
pub struct FileContentResponse {
    pub path: String,
    pub content: String,
}

pub async fn file_content(
    State(state): State<AppState>,
    Path(task_id): Path<i64>,
    Query(query): Query<FileQuery>,
) -> Result<ResponseJson<ApiResponse<FileContentResponse>>, ApiError> {
    let content = state
        .git()
        .file_content(task_id, query.repo_id, &query.path)
        .await?;
    Ok(ResponseJson(ApiResponse::success(FileContentResponse {
        path: query.path,
        content,
    })))
}

#[derive(Debug, Deserialize)]
pub struct LogQuery {
    pub repo_id: Uuid,
    #[serde(default = "default_log_limit")]
    pub limit: usize,
}

fn default_log_limit() -> usize {
    20
}

pub async fn commit_log(
    State(state): State<AppState>,
    Path(task_id): Path<i64>,
    Query(query): Query<LogQuery>,
) -> Result<ResponseJson<ApiResponse<Vec<CommitInfo>>>, ApiError> {
    Ok(ResponseJson(ApiResponse::success(
        state
            .git()
            .commit_log(task_id, query.repo_id, query.limit.min(100))
            .await?,
    )))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/tasks/{task_id}/push", post(push_branch))
        .route("/tasks/{task_id}/pr", post(create_pr))
        .route("/tasks/{task_id}/worktree", get(worktree_info).post(create_worktree))
        .route("/tasks/{task_id}/diff", get(task_diff))
        .route("/tasks/{task_id}/files", get(changed_files))
        .route("/tasks/{task_id}/file-content", get(file_content))
        .route("/tasks/{task_id}/commits", get(commit_log))
}
