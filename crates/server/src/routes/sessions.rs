use axum::{
    Json, Router,
    extract::{Path, Query, State},
    response::Json as ResponseJson,
    routing::{get, post},
};
use serde::Deserialize;
use uuid::Uuid;

use openclaw_db::models::Session;
use openclaw_services::{BudgetStatus, CostSummary};
use openclaw_utils::response::ApiResponse;

use crate::{AppState, error::ApiError};

#[derive(Debug, Deserialize)]
pub struct StartSessionRequest {
    pub agent_id: Uuid,
    pub task_id: Option<i64>,
    pub model: Option<String>,
}

pub async fn start_session(
    State(state): State<AppState>,
    Json(payload): Json<StartSessionRequest>,
) -> Result<ResponseJson<ApiResponse<Session>>, ApiError> {
    let session = state
        .sessions()
        .start_session(payload.agent_id, payload.task_id, payload.model.as_deref())
        .await?;
    Ok(ResponseJson(ApiResponse::success(session)))
}

#[derive(Debug, Default, Deserialize)]
pub struct RecordUsageRequest {
    #[serde(default)]
    pub tokens_in: i64,
    #[serde(default)]
    pub tokens_out: i64,
    #[serde(default)]
    pub cache_read: i64,
    #[serde(default)]
    pub cache_write: i64,
}

pub async fn record_usage(
    State(state): State<AppState>,
    Path(session_id): Path<i64>,
    Json(payload): Json<RecordUsageRequest>,
) -> Result<ResponseJson<ApiResponse<Session>>, ApiError> {
    let session = state
        .sessions()
        .record_usage(
            session_id,
            payload.tokens_in,
            payload.tokens_out,
            payload.cache_read,
            payload.cache_write,
        )
        .await?;
    Ok(ResponseJson(ApiResponse::success(session)))
}

#[derive(Debug, Default, Deserialize)]
pub struct EndSessionRequest {
    pub error: Option<String>,
}

pub async fn end_session(
    State(state): State<AppState>,
    Path(session_id): Path<i64>,
    Json(payload): Json<EndSessionRequest>,
) -> Result<ResponseJson<ApiResponse<Session>>, ApiError> {
    let error = payload.error;
    let session = state
        .sessions()
        .end_session(session_id, error.as_deref())
        .await?;
    Ok(ResponseJson(ApiResponse::success(session)))
}

#[derive(Debug, Deserialize)]
pub struct BudgetQuery {
    pub task_id: Option<i64>,
}

pub async fn agent_budget(
    State(state): State<AppState>,
    Path(agent_id): Path<Uuid>,
    Query(query): Query<BudgetQuery>,
) -> Result<ResponseJson<ApiResponse<BudgetStatus>>, ApiError> {
    let agent = state.teams().get_agent(agent_id).await?;
    let status = state.sessions().check_budget(&agent, query.task_id).await?;
    Ok(ResponseJson(ApiResponse::success(status)))
}

#[derive(Debug, Deserialize)]
pub struct CostsQuery {
    #[serde(default = "default_days")]
    pub days: i64,
}

fn default_days() -> i64 {
    7
}

pub async fn team_costs(
    State(state): State<AppState>,
    Path(team_id): Path<Uuid>,
    Query(query): Query<CostsQuery>,
) -> Result<ResponseJson<ApiResponse<CostSummary>>, ApiError> {
    state.teams().get_team(team_id).await?;
    let summary = state
        .sessions()
        .cost_summary(team_id, query.days.clamp(1, 365))
        .await?;
    Ok(ResponseJson(ApiResponse::success(summary)))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/sessions/start", post(start_session))
        .route("/sessions/{session_id}/usage", post(record_usage))
        .route("/sessions/{session_id}/end", post(end_session))
        .route("/agents/{agent_id}/budget", get(agent_budget))
        .route("/teams/{team_id}/costs", get(team_costs))
}
