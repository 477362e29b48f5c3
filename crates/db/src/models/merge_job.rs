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
pub enum MergeJobStatus {
    Queued,
    Running,
    Success,
    Failed,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MergeStrategy {
    Rebase,
    Merge,
    Squash,
}

/// Background merge unit: queued -> running -> success | failed.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct MergeJob {
    pub id: i64,
    pub task_id: i64,
    pub repo_id: Uuid,
    pub status: MergeJobStatus,
    pub strategy: MergeStrategy,
    pub merge_commit: Option<String>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl MergeJob {
    pub async fn create<'e, E>(
        ex: E,
        task_id: i64,
        repo_id: Uuid,
        strategy: MergeStrategy,
    ) -> Result<Self, sqlx::Error>
    where
        E: sqlx::SqliteExecutor<'e>,
    {
        sqlx::query_as::<_, Self>(
            r#"INSERT INTO merge_jobs (task_id, repo_id, status, strategy, created_at)
               VALUES ($1, $2, 'queued', $3, $4)
               RETURNING *"#,
        )
        .bind(task_id)
        .bind(repo_id)
        .bind(strategy)
        .bind(Utc::now())
        .fetch_one(ex)
        .await
    }

    pub async fn find_by_id(pool: &SqlitePool, id: i64) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>("SELECT * FROM merge_jobs WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn list_for_task(pool: &SqlitePool, task_id: i64) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            "SELECT * FROM merge_jobs WHERE task_id = $1 ORDER BY created_at DESC",
        )
        .bind(task_id)
        .fetch_all(pool)
        .await
    }

    /// Atomically claim the oldest queued job. The single UPDATE statement
    /// means two workers can never take the same row; whichever runs second
    /// sees no queued job with that id left. Equivalent to a
    /// SKIP LOCKED claim on databases that have one.
    pub async fn claim_next(pool: &SqlitePool) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            r#"UPDATE merge_jobs
               SET status = 'running', started_at = $1
               WHERE id = (
                   SELECT id FROM merge_jobs
                   WHERE status = 'queued'
                   ORDER BY created_at, id
                   LIMIT 1
               )
               RETURNING *"#,
        )
        .bind(Utc::now())
        .fetch_optional(pool)
        .await
    }

    pub async fn mark_success<'e, E>(ex: E, id: i64, merge_commit: &str) -> Result<Self, sqlx::Error>
    where
        E: sqlx::SqliteExecutor<'e>,
    {
        sqlx::query_as::<_, Self>(
            r#"UPDATE merge_jobs
               SET status = 'success', merge_commit = $1, completed_at = $2
               WHERE id = $3
               RETURNING *"#,
        )
        .bind(merge_commit)
        .bind(Utc::now())
        .bind(id)
        .fetch_one(ex)
        .await
    }

    pub async fn mark_failed<'e, E>(ex: E, id: i64, error: &str) -> Result<Self, sqlx::Error>
    where
        E: sqlx::SqliteExecutor<'e>,
    {
        sqlx::query_as::<_, Self>(
            r#"UPDATE merge_jobs
               SET status = 'failed', error = $1, completed_at = $2
               WHERE id = $3
               RETURNING *"#,
        )
        .bind(error)
        .bind(Utc::now())
        .bind(id)
        .fetch_one(ex)
        .await
    }
}
