use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use uuid::Uuid;

/// One bounded agent turn with accounted token usage and cost.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Session {
    pub id: i64,
    pub agent_id: Uuid,
    pub task_id: Option<i64>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub tokens_in: i64,
    pub tokens_out: i64,
    pub cache_read: i64,
    pub cache_write: i64,
    pub cost_usd: f64,
    pub model: Option<String>,
    pub error: Option<String>,
}

/// Cost aggregated per agent over a summary window.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct AgentCostRow {
    pub agent_id: Uuid,
    pub agent_name: String,
    pub cost_usd: f64,
    pub sessions: i64,
}

/// Cost aggregated per model over a summary window.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ModelCostRow {
    pub model: Option<String>,
    pub cost_usd: f64,
    pub sessions: i64,
}

impl Session {
    pub async fn create<'e, E>(
        ex: E,
        agent_id: Uuid,
        task_id: Option<i64>,
        model: Option<&str>,
    ) -> Result<Self, sqlx::Error>
    where
        E: sqlx::SqliteExecutor<'e>,
    {
        sqlx::query_as::<_, Self>(
            r#"INSERT INTO sessions (agent_id, task_id, started_at, model)
               VALUES ($1, $2, $3, $4)
               RETURNING *"#,
        )
        .bind(agent_id)
        .bind(task_id)
        .bind(Utc::now())
        .bind(model)
        .fetch_one(ex)
        .await
    }

    pub async fn find_by_id(pool: &SqlitePool, id: i64) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>("SELECT * FROM sessions WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn list(
        pool: &SqlitePool,
        agent_id: Option<Uuid>,
        task_id: Option<i64>,
        limit: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            r#"SELECT * FROM sessions
               WHERE ($1 IS NULL OR agent_id = $1)
                 AND ($2 IS NULL OR task_id = $2)
               ORDER BY id DESC
               LIMIT $3"#,
        )
        .bind(agent_id)
        .bind(task_id)
        .bind(limit)
        .fetch_all(pool)
        .await
    }

    pub async fn add_usage<'e, E>(
        ex: E,
        id: i64,
        tokens_in: i64,
        tokens_out: i64,
        cache_read: i64,
        cache_write: i64,
        cost_usd: f64,
    ) -> Result<Self, sqlx::Error>
    where
        E: sqlx::SqliteExecutor<'e>,
    {
        sqlx::query_as::<_, Self>(
            r#"UPDATE sessions
               SET tokens_in   = tokens_in + $1,
                   tokens_out  = tokens_out + $2,
                   cache_read  = cache_read + $3,
                   cache_write = cache_write + $4,
                   cost_usd    = $5
               WHERE id = $6
               RETURNING *"#,
        )
        .bind(tokens_in)
        .bind(tokens_out)
        .bind(cache_read)
        .bind(cache_write)
        .bind(cost_usd)
        .bind(id)
        .fetch_one(ex)
        .await
    }

    pub async fn end<'e, E>(ex: E, id: i64, error: Option<&str>) -> Result<Self, sqlx::Error>
    where
        E: sqlx::SqliteExecutor<'e>,
    {
        sqlx::query_as::<_, Self>(
            r#"UPDATE sessions
               SET ended_at = $1, error = COALESCE($2, error)
               WHERE id = $3
               RETURNING *"#,
        )
        .bind(Utc::now())
        .bind(error)
        .bind(id)
        .fetch_one(ex)
        .await
    }

    /// Total cost of the agent's sessions started at or after `since`.
    pub async fn cost_for_agent_since(
        pool: &SqlitePool,
        agent_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<f64, sqlx::Error> {
        sqlx::query_scalar::<_, f64>(
            r#"SELECT COALESCE(SUM(cost_usd), 0.0)
               FROM sessions
               WHERE agent_id = $1 AND started_at >= $2"#,
        )
        .bind(agent_id)
        .bind(since)
        .fetch_one(pool)
        .await
    }

    /// Total cost ever recorded against a task.
    pub async fn cost_for_task(pool: &SqlitePool, task_id: i64) -> Result<f64, sqlx::Error> {
        sqlx::query_scalar::<_, f64>(
            "SELECT COALESCE(SUM(cost_usd), 0.0) FROM sessions WHERE task_id = $1",
        )
        .bind(task_id)
        .fetch_one(pool)
        .await
    }

    pub async fn team_totals_since(
        pool: &SqlitePool,
        team_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<(f64, i64, i64, i64), sqlx::Error> {
        sqlx::query_as::<_, (f64, i64, i64, i64)>(
            r#"SELECT COALESCE(SUM(s.cost_usd), 0.0),
                      COALESCE(SUM(s.tokens_in), 0),
                      COALESCE(SUM(s.tokens_out), 0),
                      COUNT(s.id)
               FROM sessions s
               JOIN agents a ON a.id = s.agent_id
               WHERE a.team_id = $1 AND s.started_at >= $2"#,
        )
        .bind(team_id)
        .bind(since)
        .fetch_one(pool)
        .await
    }

    pub async fn team_cost_per_agent(
        pool: &SqlitePool,
        team_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<Vec<AgentCostRow>, sqlx::Error> {
        sqlx::query_as::<_, AgentCostRow>(
            r#"SELECT a.id AS agent_id,
                      a.name AS agent_name,
                      COALESCE(SUM(s.cost_usd), 0.0) AS cost_usd,
                      COUNT(s.id) AS sessions
               FROM sessions s
               JOIN agents a ON a.id = s.agent_id
               WHERE a.team_id = $1 AND s.started_at >= $2
               GROUP BY a.id, a.name
               ORDER BY cost_usd DESC"#,
        )
        .bind(team_id)
        .bind(since)
        .fetch_all(pool)
        .await
    }

    pub async fn team_cost_per_model(
        pool: &SqlitePool,
        team_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<Vec<ModelCostRow>, sqlx::Error> {
        sqlx::query_as::<_, ModelCostRow>(
            r#"SELECT s.model AS model,
                      COALESCE(SUM(s.cost_usd), 0.0) AS cost_usd,
                      COUNT(s.id) AS sessions
               FROM sessions s
               JOIN agents a ON a.id = s.agent_id
               WHERE a.team_id = $1 AND s.started_at >= $2
               GROUP BY s.model
               ORDER BY cost_usd DESC"#,
        )
        .bind(team_id)
        .bind(since)
        .fetch_all(pool)
        .await
    }
}
