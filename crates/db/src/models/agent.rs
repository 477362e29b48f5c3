use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool, types::Json};
use strum_macros::{Display, EnumString};
use uuid::Uuid;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AgentRole {
    Manager,
    Engineer,
    Reviewer,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AgentStatus {
    Idle,
    Working,
    Paused,
}

/// Per-agent configuration. The enumerated keys are the ones the core
/// consults; unknown keys survive round-trips through `extra`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub adapter: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_output_per_turn: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub daily_cost_limit_usd: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_cost_limit_usd: Option<f64>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Agent {
    pub id: Uuid,
    pub team_id: Uuid,
    pub name: String,
    pub role: AgentRole,
    pub model: String,
    pub status: AgentStatus,
    #[sqlx(json)]
    pub config: AgentConfig,
    pub created_at: DateTime<Utc>,
}

impl Agent {
    pub async fn create(
        pool: &SqlitePool,
        team_id: Uuid,
        name: &str,
        role: AgentRole,
        model: &str,
        config: &AgentConfig,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            r#"INSERT INTO agents (id, team_id, name, role, model, status, config, created_at)
               VALUES ($1, $2, $3, $4, $5, 'idle', $6, $7)
               RETURNING *"#,
        )
        .bind(Uuid::new_v4())
        .bind(team_id)
        .bind(name)
        .bind(role)
        .bind(model)
        .bind(Json(config))
        .bind(Utc::now())
        .fetch_one(pool)
        .await
    }

    pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>("SELECT * FROM agents WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn list_for_team(pool: &SqlitePool, team_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>("SELECT * FROM agents WHERE team_id = $1 ORDER BY created_at")
            .bind(team_id)
            .fetch_all(pool)
            .await
    }

    /// Unconditionally set the status. Only the dispatcher and the agent
    /// runner may call this.
    pub async fn set_status<'e, E>(ex: E, id: Uuid, status: AgentStatus) -> Result<(), sqlx::Error>
    where
        E: sqlx::SqliteExecutor<'e>,
    {
        sqlx::query("UPDATE agents SET status = $1 WHERE id = $2")
            .bind(status)
            .bind(id)
            .execute(ex)
            .await?;
        Ok(())
    }

    /// Atomically flip an idle agent to `working`. Returns false when the
    /// agent was not idle (someone else claimed it first).
    pub async fn try_claim(pool: &SqlitePool, id: Uuid) -> Result<bool, sqlx::Error> {
        let result =
            sqlx::query("UPDATE agents SET status = 'working' WHERE id = $1 AND status = 'idle'")
                .bind(id)
                .execute(pool)
                .await?;
        Ok(result.rows_affected() == 1)
    }

    /// First idle reviewer-role agent on the team, if any.
    pub async fn find_idle_reviewer(
        pool: &SqlitePool,
        team_id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            r#"SELECT * FROM agents
               WHERE team_id = $1 AND role = 'reviewer' AND status = 'idle'
               ORDER BY created_at
               LIMIT 1"#,
        )
        .bind(team_id)
        .fetch_optional(pool)
        .await
    }

    /// Reset agents stuck in `working` with no open session started within
    /// the cutoff window. Returns the number of rows reset.
    pub async fn reset_stuck_working(
        pool: &SqlitePool,
        session_cutoff: DateTime<Utc>,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"UPDATE agents SET status = 'idle'
               WHERE status = 'working'
                 AND id NOT IN (
                    SELECT agent_id FROM sessions
                    WHERE ended_at IS NULL AND started_at > $1
                 )"#,
        )
        .bind(session_cutoff)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }
}
