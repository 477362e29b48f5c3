use axum::{
    Json, Router,
    extract::{Path, State},
    response::Json as ResponseJson,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use openclaw_db::models::Agent;
use openclaw_executors::list_adapters;
use openclaw_services::{RunOutcome, RunRequest};
use openclaw_utils::response::ApiResponse;

use crate::{AppState, error::ApiError};

pub async fn get_agent(
    State(state): State<AppState>,
    Path(agent_id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<Agent>>, ApiError> {
    Ok(ResponseJson(ApiResponse::success(
        state.teams().get_agent(agent_id).await?,
    )))
}

#[derive(Debug, Default, Deserialize)]
pub struct RunAgentBody {
    pub task_id: Option<i64>,
    pub prompt: Option<String>,
    pub adapter: Option<String>,
}

/// Synchronous agent run: blocks until the adapter subprocess exits. The
/// dispatcher path is the normal one; this endpoint exists for operator
/// tooling and tests.
pub async fn run_agent(
    State(state): State<AppState>,
    Path(agent_id): Path<Uuid>,
    Json(body): Json<RunAgentBody>,
) -> Result<ResponseJson<ApiResponse<RunOutcome>>, ApiError> {
    let mut request = RunRequest::new(agent_id);
    request.task_id = body.task_id;
    request.prompt_override = body.prompt;
    request.adapter_override = body.adapter;

    let outcome = state.runner().run_agent(request).await?;
    Ok(ResponseJson(ApiResponse::success(outcome)))
}

#[derive(Debug, Serialize)]
pub struct AdapterInfo {
    pub name: &'static str,
    pub available: bool,
    pub message: String,
}

pub async fn adapters() -> ResponseJson<ApiResponse<Vec<AdapterInfo>>> {
    let infos = list_adapters()
        .into_iter()
        .filter_map(|name| openclaw_executors::get_adapter(name).ok())
        .map(|adapter| {
            let (available, message) = adapter.validate_environment();
            AdapterInfo {
                name: adapter.name(),
                available,
                message,
            }
        })
        .collect();
    ResponseJson(ApiResponse::success(infos))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/agents/{agent_id}", get(get_agent))
        .route("/agents/{agent_id}/run", post(run_agent))
        .route("/adapters", get(adapters))
}
