use axum::{
    Json, Router,
    extract::{Path, Query, State},
    response::Json as ResponseJson,
    routing::{get, post},
};
use serde::Deserialize;
use uuid::Uuid;

use openclaw_db::models::{MergeJob, MergeStrategy, ReviewComment, ReviewVerdict, ReviewerType};
use openclaw_services::{MergeStatus, ReviewWithComments};
use openclaw_utils::response::ApiResponse;

use crate::{AppState, error::ApiError};

#[derive(Debug, Default, Deserialize)]
pub struct RequestReviewBody {
    pub reviewer_id: Option<Uuid>,
    pub reviewer_type: Option<ReviewerType>,
}

pub async fn request_review(
    State(state): State<AppState>,
    Path(task_id): Path<i64>,
    Json(body): Json<RequestReviewBody>,
) -> Result<ResponseJson<ApiResponse<ReviewWithComments>>, ApiError> {
    let review = state
        .reviews()
        .request_review(task_id, body.reviewer_id, body.reviewer_type)
        .await?;
    Ok(ResponseJson(ApiResponse::success(review)))
}

pub async fn list_reviews(
    State(state): State<AppState>,
    Path(task_id): Path<i64>,
) -> Result<ResponseJson<ApiResponse<Vec<ReviewWithComments>>>, ApiError> {
    Ok(ResponseJson(ApiResponse::success(
        state.reviews().list_reviews(task_id).await?,
    )))
}

pub async fn get_review(
    State(state): State<AppState>,
    Path(review_id): Path<i64>,
) -> Result<ResponseJson<ApiResponse<ReviewWithComments>>, ApiError> {
    Ok(ResponseJson(ApiResponse::success(
        state.reviews().get_review(review_id).await?,
    )))
}

#[derive(Debug, Deserialize)]
pub struct AddCommentBody {
    pub author_id: Uuid,
    #[serde(default = "default_author_type")]
    pub author_type: ReviewerType,
    pub content: String,
    pub file_path: Option<String>,
    pub line_number: Option<i64>,
}

fn default_author_type() -> ReviewerType {
    ReviewerType::User
}

pub async fn add_comment(
    State(state): State<AppState>,
    Path(review_id): Path<i64>,
    Json(payload): Json<AddCommentBody>,
) -> Result<ResponseJson<ApiResponse<ReviewComment>>, ApiError> {
    let comment = state
        .reviews()
        .add_comment(
            review_id,
            payload.author_id,
            payload.author_type,
            &payload.content,
            payload.file_path.as_deref(),
            payload.line_number,
        )
        .await?;
    Ok(ResponseJson(ApiResponse::success(comment)))
}

#[derive(Debug, Default, Deserialize)]
pub struct VerdictBody {
    pub verdict: Option<ReviewVerdict>,
    pub summary: Option<String>,
    pub reviewer_id: Option<Uuid>,
    pub reviewer_type: Option<ReviewerType>,
}

pub async fn submit_verdict(
    State(state): State<AppState>,
    Path(review_id): Path<i64>,
    Json(payload): Json<VerdictBody>,
) -> Result<ResponseJson<ApiResponse<ReviewWithComments>>, ApiError> {
    let verdict = payload
        .verdict
        .ok_or_else(|| ApiError::Validation("verdict is required".into()))?;
    let review = state
        .reviews()
        .submit_verdict(
            review_id,
            verdict,
            payload.summary.as_deref(),
            payload.reviewer_id,
            payload.reviewer_type,
        )
        .await?;
    Ok(ResponseJson(ApiResponse::success(review)))
}

/// Shorthand for a human verdict on the latest open review of a task.
async fn verdict_on_latest(
    state: &AppState,
    task_id: i64,
    verdict: ReviewVerdict,
    body: VerdictBody,
) -> Result<ReviewWithComments, ApiError> {
    let latest = state
        .reviews()
        .latest_review(task_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("no review found for this task".into()))?;
    Ok(state
        .reviews()
        .submit_verdict(
            latest.id,
            verdict,
            body.summary.as_deref(),
            body.reviewer_id,
            body.reviewer_type.or(Some(ReviewerType::User)),
        )
        .await?)
}

pub async fn approve_task(
    State(state): State<AppState>,
    Path(task_id): Path<i64>,
    Json(body): Json<VerdictBody>,
) -> Result<ResponseJson<ApiResponse<ReviewWithComments>>, ApiError> {
    let review = verdict_on_latest(&state, task_id, ReviewVerdict::Approve, body).await?;
    Ok(ResponseJson(ApiResponse::success(review)))
}

pub async fn reject_task(
    State(state): State<AppState>,
    Path(task_id): Path<i64>,
    Json(body): Json<VerdictBody>,
) -> Result<ResponseJson<ApiResponse<ReviewWithComments>>, ApiError> {
    let review = verdict_on_latest(&state, task_id, ReviewVerdict::Reject, body).await?;
    Ok(ResponseJson(ApiResponse::success(review)))
}

pub async fn merge_status(
    State(state): State<AppState>,
    Path(task_id): Path<i64>,
) -> Result<ResponseJson<ApiResponse<MergeStatus>>, ApiError> {
    state.tasks().get_task(task_id).await?;
    Ok(ResponseJson(ApiResponse::success(
        state.reviews().merge_status(task_id).await?,
    )))
}

#[derive(Debug, Deserialize)]
pub struct MergeQuery {
    pub repo_id: Uuid,
    #[serde(default = "default_strategy")]
    pub strategy: MergeStrategy,
}

fn default_strategy() -> MergeStrategy {
    MergeStrategy::Rebase
}

pub async fn queue_merge(
    State(state): State<AppState>,
    Path(task_id): Path<i64>,
    Query(query): Query<MergeQuery>,
) -> Result<ResponseJson<ApiResponse<MergeJob>>, ApiError> {
    let job = state
        .reviews()
        .create_merge_job(task_id, query.repo_id, query.strategy)
        .await?;
    Ok(ResponseJson(ApiResponse::success(job)))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/tasks/{task_id}/reviews", get(list_reviews).post(request_review))
        .route("/reviews/{review_id}", get(get_review))
        .route("/reviews/{review_id}/comments", post(add_comment))
        .route("/reviews/{review_id}/verdict", post(submit_verdict))
        .route("/tasks/{task_id}/approve", post(approve_task))
        .route("/tasks/{task_id}/reject", post(reject_task))
        .route("/tasks/{task_id}/merge-status", get(merge_status))
        .route("/tasks/{task_id}/merge", post(queue_merge))
}
