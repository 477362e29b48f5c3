use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use strum_macros::{Display, EnumString};
use uuid::Uuid;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RequestKind {
    Question,
    Approval,
    Review,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    Resolved,
    Expired,
}

/// Agent -> human rendezvous. Survives restarts; timeouts are applied by an
/// explicit sweep rather than in-process timers.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct HumanRequest {
    pub id: i64,
    pub team_id: Uuid,
    pub agent_id: Uuid,
    pub task_id: Option<i64>,
    pub kind: RequestKind,
    pub question: String,
    #[sqlx(json)]
    pub options: Vec<String>,
    pub status: RequestStatus,
    pub response: Option<String>,
    pub responded_by: Option<Uuid>,
    pub timeout_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl HumanRequest {
    #[allow(clippy::too_many_arguments)]
    pub async fn create<'e, E>(
        ex: E,
        team_id: Uuid,
        agent_id: Uuid,
        task_id: Option<i64>,
        kind: RequestKind,
        question: &str,
        options: &[String],
        timeout_at: Option<DateTime<Utc>>,
    ) -> Result<Self, sqlx::Error>
    where
        E: sqlx::SqliteExecutor<'e>,
    {
        sqlx::query_as::<_, Self>(
            r#"INSERT INTO human_requests
                 (team_id, agent_id, task_id, kind, question, options, status,
                  timeout_at, created_at)
               VALUES ($1, $2, $3, $4, $5, $6, 'pending', $7, $8)
               RETURNING *"#,
        )
        .bind(team_id)
        .bind(agent_id)
        .bind(task_id)
        .bind(kind)
        .bind(question)
        .bind(sqlx::types::Json(options))
        .bind(timeout_at)
        .bind(Utc::now())
        .fetch_one(ex)
        .await
    }

    pub async fn find_by_id(pool: &SqlitePool, id: i64) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>("SELECT * FROM human_requests WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn resolve<'e, E>(
        ex: E,
        id: i64,
        response: &str,
        responded_by: Option<Uuid>,
    ) -> Result<Self, sqlx::Error>
    where
        E: sqlx::SqliteExecutor<'e>,
    {
        sqlx::query_as::<_, Self>(
            r#"UPDATE human_requests
               SET status = 'resolved', response = $1, responded_by = $2, resolved_at = $3
               WHERE id = $4
               RETURNING *"#,
        )
        .bind(response)
        .bind(responded_by)
        .bind(Utc::now())
        .bind(id)
        .fetch_one(ex)
        .await
    }

    pub async fn list(
        pool: &SqlitePool,
        team_id: Uuid,
        status: Option<RequestStatus>,
        limit: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            r#"SELECT * FROM human_requests
               WHERE team_id = $1
                 AND ($2 IS NULL OR status = $2)
               ORDER BY created_at DESC
               LIMIT $3"#,
        )
        .bind(team_id)
        .bind(status)
        .bind(limit)
        .fetch_all(pool)
        .await
    }

    /// Flip every pending request past its deadline to `expired`, returning
    /// the rows that changed so callers can append events and notify.
    pub async fn expire_stale<'e, E>(ex: E, now: DateTime<Utc>) -> Result<Vec<Self>, sqlx::Error>
    where
        E: sqlx::SqliteExecutor<'e>,
    {
        sqlx::query_as::<_, Self>(
            r#"UPDATE human_requests
               SET status = 'expired', resolved_at = $1
               WHERE status = 'pending'
                 AND timeout_at IS NOT NULL
                 AND timeout_at < $1
               RETURNING *"#,
        )
        .bind(now)
        .fetch_all(ex)
        .await
    }
}
