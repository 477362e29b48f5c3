use sqlx::SqlitePool;
use thiserror::Error;
use uuid::Uuid;

use openclaw_db::models::{
    Agent, AgentConfig, AgentRole, Convention, Organization, Repository, Team,
    event::types as event_types,
};

use super::events::EventStore;

#[derive(Debug, Error)]
pub enum TeamServiceError {
    #[error("organization not found")]
    OrgNotFound,
    #[error("team not found")]
    TeamNotFound,
    #[error("agent not found")]
    AgentNotFound,
    #[error("duplicate key: {0}")]
    DuplicateKey(String),
    #[error(transparent)]
    Database(sqlx::Error),
}

impl From<sqlx::Error> for TeamServiceError {
    fn from(e: sqlx::Error) -> Self {
        if e.as_database_error()
            .is_some_and(|db| db.is_unique_violation())
        {
            TeamServiceError::DuplicateKey(e.to_string())
        } else {
            TeamServiceError::Database(e)
        }
    }
}

/// Tenancy CRUD: organizations, teams, agents, repositories, and team
/// conventions.
#[derive(Clone)]
pub struct TeamService {
    pool: SqlitePool,
}

impl TeamService {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create_org(
        &self,
        name: &str,
        slug: &str,
    ) -> Result<Organization, TeamServiceError> {
        Ok(Organization::create(&self.pool, name, slug).await?)
    }

    pub async fn get_org(&self, org_id: Uuid) -> Result<Organization, TeamServiceError> {
        Organization::find_by_id(&self.pool, org_id)
            .await?
            .ok_or(TeamServiceError::OrgNotFound)
    }

    pub async fn create_team(
        &self,
        org_id: Uuid,
        name: &str,
        slug: &str,
    ) -> Result<Team, TeamServiceError> {
        self.get_org(org_id).await?;
        let team = Team::create(&self.pool, org_id, name, slug).await?;
        EventStore::append(
            &self.pool,
            &format!("team:{}", team.id),
            event_types::TEAM_CREATED,
            serde_json::json!({ "org_id": org_id, "name": name, "slug": slug }),
        )
        .await?;
        Ok(team)
    }

    pub async fn get_team(&self, team_id: Uuid) -> Result<Team, TeamServiceError> {
        Team::find_by_id(&self.pool, team_id)
            .await?
            .ok_or(TeamServiceError::TeamNotFound)
    }

    pub async fn list_teams(&self, org_id: Uuid) -> Result<Vec<Team>, TeamServiceError> {
        Ok(Team::list_for_org(&self.pool, org_id).await?)
    }

    pub async fn create_agent(
        &self,
        team_id: Uuid,
        name: &str,
        role: AgentRole,
        model: &str,
        config: &AgentConfig,
    ) -> Result<Agent, TeamServiceError> {
        self.get_team(team_id).await?;
        let agent = Agent::create(&self.pool, team_id, name, role, model, config).await?;
        EventStore::append(
            &self.pool,
            &format!("agent:{}", agent.id),
            event_types::AGENT_CREATED,
            serde_json::json!({ "team_id": team_id, "name": name, "role": role, "model": model }),
        )
        .await?;
        Ok(agent)
    }

    pub async fn get_agent(&self, agent_id: Uuid) -> Result<Agent, TeamServiceError> {
        Agent::find_by_id(&self.pool, agent_id)
            .await?
            .ok_or(TeamServiceError::AgentNotFound)
    }

    pub async fn list_agents(&self, team_id: Uuid) -> Result<Vec<Agent>, TeamServiceError> {
        Ok(Agent::list_for_team(&self.pool, team_id).await?)
    }

    pub async fn register_repo(
        &self,
        team_id: Uuid,
        name: &str,
        local_path: &str,
        default_branch: &str,
    ) -> Result<Repository, TeamServiceError> {
        self.get_team(team_id).await?;
        let repo = Repository::create(&self.pool, team_id, name, local_path, default_branch).await?;
        EventStore::append(
            &self.pool,
            &format!("team:{team_id}"),
            event_types::REPO_REGISTERED,
            serde_json::json!({ "repo_id": repo.id, "name": name, "local_path": local_path }),
        )
        .await?;
        Ok(repo)
    }

    pub async fn list_repos(&self, team_id: Uuid) -> Result<Vec<Repository>, TeamServiceError> {
        Ok(Repository::list_for_team(&self.pool, team_id).await?)
    }

    /// Add a convention to the team config. Keys are unique; re-adding an
    /// existing key is a conflict, not an overwrite.
    pub async fn add_convention(
        &self,
        team_id: Uuid,
        key: &str,
        content: &str,
    ) -> Result<Team, TeamServiceError> {
        let mut team = self.get_team(team_id).await?;
        if team.config.conventions.iter().any(|c| c.key == key) {
            return Err(TeamServiceError::DuplicateKey(format!(
                "convention '{key}' already exists"
            )));
        }
        team.config.conventions.push(Convention {
            key: key.to_string(),
            content: content.to_string(),
            active: true,
        });
        Ok(Team::update_config(&self.pool, team_id, &team.config).await?)
    }

    /// Active conventions, in insertion order, for prompt building.
    pub async fn active_conventions(
        &self,
        team_id: Uuid,
    ) -> Result<Vec<Convention>, TeamServiceError> {
        Ok(self.get_team(team_id).await?.config.active_conventions())
    }
}
