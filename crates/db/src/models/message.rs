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
pub enum ActorType {
    Agent,
    User,
}

/// Envelope from one actor to another. Agents never call each other
/// directly; the dispatcher watches unprocessed agent-addressed messages.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Message {
    pub id: i64,
    pub team_id: Uuid,
    pub sender_id: Uuid,
    pub sender_type: ActorType,
    pub recipient_id: Uuid,
    pub recipient_type: ActorType,
    pub task_id: Option<i64>,
    pub content: String,
    pub delivered_at: Option<DateTime<Utc>>,
    pub seen_at: Option<DateTime<Utc>>,
    pub processed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// An agent with unprocessed inbox entries, surfaced by the fallback poller.
#[derive(Debug, Clone, FromRow)]
pub struct PendingRecipient {
    pub agent_id: Uuid,
    pub team_id: Uuid,
}

impl Message {
    #[allow(clippy::too_many_arguments)]
    pub async fn create<'e, E>(
        ex: E,
        team_id: Uuid,
        sender_id: Uuid,
        sender_type: ActorType,
        recipient_id: Uuid,
        recipient_type: ActorType,
        task_id: Option<i64>,
        content: &str,
    ) -> Result<Self, sqlx::Error>
    where
        E: sqlx::SqliteExecutor<'e>,
    {
        sqlx::query_as::<_, Self>(
            r#"INSERT INTO messages
                 (team_id, sender_id, sender_type, recipient_id, recipient_type,
                  task_id, content, created_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
               RETURNING *"#,
        )
        .bind(team_id)
        .bind(sender_id)
        .bind(sender_type)
        .bind(recipient_id)
        .bind(recipient_type)
        .bind(task_id)
        .bind(content)
        .bind(Utc::now())
        .fetch_one(ex)
        .await
    }

    pub async fn find_by_id(pool: &SqlitePool, id: i64) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>("SELECT * FROM messages WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Newest-first inbox for a recipient.
    pub async fn inbox(
        pool: &SqlitePool,
        recipient_id: Uuid,
        unprocessed_only: bool,
        limit: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            r#"SELECT * FROM messages
               WHERE recipient_id = $1
                 AND ($2 = 0 OR processed_at IS NULL)
               ORDER BY id DESC
               LIMIT $3"#,
        )
        .bind(recipient_id)
        .bind(unprocessed_only)
        .bind(limit)
        .fetch_all(pool)
        .await
    }

    pub async fn mark_processed(pool: &SqlitePool, id: i64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE messages SET processed_at = $1 WHERE id = $2")
            .bind(Utc::now())
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn mark_seen(pool: &SqlitePool, id: i64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE messages SET seen_at = $1 WHERE id = $2")
            .bind(Utc::now())
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Idle agents that still have unprocessed messages. Feeds the
    /// dispatcher's fallback poll when a notification was missed.
    pub async fn pending_agent_recipients(
        pool: &SqlitePool,
        limit: i64,
    ) -> Result<Vec<PendingRecipient>, sqlx::Error> {
        sqlx::query_as::<_, PendingRecipient>(
            r#"SELECT DISTINCT m.recipient_id AS agent_id, m.team_id
               FROM messages m
               JOIN agents a ON a.id = m.recipient_id
               WHERE m.processed_at IS NULL
                 AND m.recipient_type = 'agent'
                 AND a.status = 'idle'
               LIMIT $1"#,
        )
        .bind(limit)
        .fetch_all(pool)
        .await
    }
}
