use axum::{
    Json, Router,
    extract::{Path, State},
    response::Json as ResponseJson,
    routing::{get, post},
};
use serde::Deserialize;
use uuid::Uuid;

use openclaw_db::models::{Agent, AgentConfig, AgentRole, Organization, Repository, Team};
use openclaw_utils::response::ApiResponse;

use crate::{AppState, error::ApiError};

#[derive(Debug, Deserialize)]
pub struct CreateOrgRequest {
    pub name: String,
    pub slug: String,
}

pub async fn create_org(
    State(state): State<AppState>,
    Json(payload): Json<CreateOrgRequest>,
) -> Result<ResponseJson<ApiResponse<Organization>>, ApiError> {
    let org = state.teams().create_org(&payload.name, &payload.slug).await?;
    Ok(ResponseJson(ApiResponse::success(org)))
}

#[derive(Debug, Deserialize)]
pub struct CreateTeamRequest {
    pub name: String,
    pub slug: String,
}

pub async fn create_team(
    State(state): State<AppState>,
    Path(org_id): Path<Uuid>,
    Json(payload): Json<CreateTeamRequest>,
) -> Result<ResponseJson<ApiResponse<Team>>, ApiError> {
    let team = state
        .teams()
        .create_team(org_id, &payload.name, &payload.slug)
        .await?;
    Ok(ResponseJson(ApiResponse::success(team)))
}

pub async fn list_teams(
    State(state): State<AppState>,
    Path(org_id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<Vec<Team>>>, ApiError> {
    Ok(ResponseJson(ApiResponse::success(
        state.teams().list_teams(org_id).await?,
    )))
}

#[derive(Debug, Deserialize)]
pub struct CreateAgentRequest {
    pub name: String,
    pub role: AgentRole,
    pub model: Option<String>,
    #[serde(default)]
    pub config: AgentConfig,
}

pub async fn create_agent(
    State(state): State<AppState>,
    Path(team_id): Path<Uuid>,
    Json(payload): Json<CreateAgentRequest>,
) -> Result<ResponseJson<ApiResponse<Agent>>, ApiError> {
    let model = payload
        .model
        .unwrap_or_else(|| state.settings.default_agent_model.clone());
    let agent = state
        .teams()
        .create_agent(team_id, &payload.name, payload.role, &model, &payload.config)
        .await?;
    Ok(ResponseJson(ApiResponse::success(agent)))
}

pub async fn list_agents(
    State(state): State<AppState>,
    Path(team_id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<Vec<Agent>>>, ApiError> {
    Ok(ResponseJson(ApiResponse::success(
        state.teams().list_agents(team_id).await?,
    )))
}

#[derive(Debug, Deserialize)]
pub struct RegisterRepoRequest {
    pub name: String,
    pub local_path: String,
    #[serde(default = "default_branch")]
    pub default_branch: String,
}

fn default_branch() -> String {
    "main".to_string()
}

pub async fn register_repo(
    State(state): State<AppState>,
    Path(team_id): Path<Uuid>,
    Json(payload): Json<RegisterRepoRequest>,
) -> Result<ResponseJson<ApiResponse<Repository>>, ApiError> {
    let repo = state
        .teams()
        .register_repo(team_id, &payload.name, &payload.local_path, &payload.default_branch)
        .await?;
    Ok(ResponseJson(ApiResponse::success(repo)))
}

pub async fn list_repos(
    State(state): State<AppState>,
    Path(team_id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<Vec<Repository>>>, ApiError> {
    Ok(ResponseJson(ApiResponse::success(
        state.teams().list_repos(team_id).await?,
    )))
}

#[derive(Debug, Deserialize)]
pub struct AddConventionRequest {
    pub key: String,
    pub content: String,
}

pub async fn add_convention(
    State(state): State<AppState>,
    Path(team_id): Path<Uuid>,
    Json(payload): Json<AddConventionRequest>,
) -> Result<ResponseJson<ApiResponse<Team>>, ApiError> {
    let team = state
        .teams()
        .add_convention(team_id, &payload.key, &payload.content)
        .await?;
    Ok(ResponseJson(ApiResponse::success(team)))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/orgs", post(create_org))
        .route("/orgs/{org_id}/teams", get(list_teams).post(create_team))
        .route("/teams/{team_id}/agents", get(list_agents).post(create_agent))
        .route("/teams/{team_id}/repos", get(list_repos).post(register_repo))
        .route("/teams/{team_id}/conventions", post(add_convention))
}
