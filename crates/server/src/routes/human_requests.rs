use axum::{
    Json, Router,
    extract::{Path, Query, State},
    response::Json as ResponseJson,
    routing::{get, post},
};
use serde::Deserialize;
use uuid::Uuid;

use openclaw_db::models::{HumanRequest, RequestKind, RequestStatus};
use openclaw_utils::response::ApiResponse;

use crate::{AppState, error::ApiError};

#[derive(Debug, Deserialize)]
pub struct CreateRequestBody {
    pub team_id: Uuid,
    pub agent_id: Uuid,
    pub kind: RequestKind,
    pub question: String,
    pub task_id: Option<i64>,
    #[serde(default)]
    pub options: Vec<String>,
    pub timeout_minutes: Option<i64>,
}

pub async fn create_request(
    State(state): State<AppState>,
    Json(payload): Json<CreateRequestBody>,
) -> Result<ResponseJson<ApiResponse<HumanRequest>>, ApiError> {
    let request = state
        .human_loop()
        .create_request(
            payload.team_id,
            payload.agent_id,
            payload.kind,
            &payload.question,
            payload.task_id,
            &payload.options,
            payload.timeout_minutes,
        )
        .await?;
    Ok(ResponseJson(ApiResponse::success(request)))
}

#[derive(Debug, Deserialize)]
pub struct RespondBody {
    pub response: String,
    pub responded_by: Option<Uuid>,
}

pub async fn respond(
    State(state): State<AppState>,
    Path(request_id): Path<i64>,
    Json(payload): Json<RespondBody>,
) -> Result<ResponseJson<ApiResponse<HumanRequest>>, ApiError> {
    let request = state
        .human_loop()
        .respond(request_id, &payload.response, payload.responded_by)
        .await?;
    Ok(ResponseJson(ApiResponse::success(request)))
}

pub async fn get_request(
    State(state): State<AppState>,
    Path(request_id): Path<i64>,
) -> Result<ResponseJson<ApiResponse<HumanRequest>>, ApiError> {
    Ok(ResponseJson(ApiResponse::success(
        state.human_loop().get_request(request_id).await?,
    )))
}

#[derive(Debug, Deserialize)]
pub struct ListRequestsQuery {
    pub status: Option<RequestStatus>,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    50
}

pub async fn list_requests(
    State(state): State<AppState>,
    Path(team_id): Path<Uuid>,
    Query(query): Query<ListRequestsQuery>,
) -> Result<ResponseJson<ApiResponse<Vec<HumanRequest>>>, ApiError> {
    let requests = state
        .human_loop()
        .list_requests(team_id, query.status, query.limit.clamp(1, 200))
        .await?;
    Ok(ResponseJson(ApiResponse::success(requests)))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/human-requests", post(create_request))
        .route("/human-requests/{request_id}", get(get_request))
        .route("/human-requests/{request_id}/respond", post(respond))
        .route("/teams/{team_id}/human-requests", get(list_requests))
}
