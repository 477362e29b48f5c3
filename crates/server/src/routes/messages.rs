use axum::{
    Json, Router,
    extract::{Path, Query, State},
    response::Json as ResponseJson,
    routing::{get, post},
};
use serde::Deserialize;
use uuid::Uuid;

use openclaw_db::models::{ActorType, Message};
use openclaw_utils::response::ApiResponse;

use crate::{AppState, error::ApiError};

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub sender_id: Uuid,
    pub sender_type: ActorType,
    pub recipient_id: Uuid,
    pub recipient_type: ActorType,
    pub task_id: Option<i64>,
    pub content: String,
}

pub async fn send_message(
    State(state): State<AppState>,
    Path(team_id): Path<Uuid>,
    Json(payload): Json<SendMessageRequest>,
) -> Result<ResponseJson<ApiResponse<Message>>, ApiError> {
    let message = state
        .messages()
        .send_message(
            team_id,
            payload.sender_id,
            payload.sender_type,
            payload.recipient_id,
            payload.recipient_type,
            payload.task_id,
            &payload.content,
        )
        .await?;
    Ok(ResponseJson(ApiResponse::success(message)))
}

#[derive(Debug, Deserialize)]
pub struct InboxQuery {
    #[serde(default = "default_unprocessed")]
    pub unprocessed_only: bool,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_unprocessed() -> bool {
    true
}

fn default_limit() -> i64 {
    50
}

pub async fn get_inbox(
    State(state): State<AppState>,
    Path(agent_id): Path<Uuid>,
    Query(query): Query<InboxQuery>,
) -> Result<ResponseJson<ApiResponse<Vec<Message>>>, ApiError> {
    let inbox = state
        .messages()
        .get_inbox(agent_id, query.unprocessed_only, query.limit.clamp(1, 200))
        .await?;
    Ok(ResponseJson(ApiResponse::success(inbox)))
}

pub async fn mark_processed(
    State(state): State<AppState>,
    Path(message_id): Path<i64>,
) -> Result<ResponseJson<ApiResponse<()>>, ApiError> {
    state.messages().mark_processed(message_id).await?;
    Ok(ResponseJson(ApiResponse::success(())))
}

pub async fn mark_seen(
    State(state): State<AppState>,
    Path(message_id): Path<i64>,
) -> Result<ResponseJson<ApiResponse<()>>, ApiError> {
    state.messages().mark_seen(message_id).await?;
    Ok(ResponseJson(ApiResponse::success(())))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/teams/{team_id}/messages", post(send_message))
        .route("/agents/{agent_id}/inbox", get(get_inbox))
        .route("/messages/{message_id}/processed", post(mark_processed))
        .route("/messages/{message_id}/seen", post(mark_seen))
}
