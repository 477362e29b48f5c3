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
pub enum ReviewVerdict {
    Approve,
    RequestChanges,
    Reject,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ReviewerType {
    User,
    Agent,
}

/// One review cycle for a task. `attempt` is monotonic per task and unique.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Review {
    pub id: i64,
    pub task_id: i64,
    pub attempt: i64,
    pub reviewer_id: Option<Uuid>,
    pub reviewer_type: ReviewerType,
    pub verdict: Option<ReviewVerdict>,
    pub summary: Option<String>,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ReviewComment {
    pub id: i64,
    pub review_id: i64,
    pub author_id: Uuid,
    pub author_type: ReviewerType,
    pub file_path: Option<String>,
    pub line_number: Option<i64>,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl Review {
    pub async fn max_attempt<'e, E>(ex: E, task_id: i64) -> Result<i64, sqlx::Error>
    where
        E: sqlx::SqliteExecutor<'e>,
    {
        sqlx::query_scalar::<_, i64>(
            "SELECT COALESCE(MAX(attempt), 0) FROM reviews WHERE task_id = $1",
        )
        .bind(task_id)
        .fetch_one(ex)
        .await
    }

    pub async fn create<'e, E>(
        ex: E,
        task_id: i64,
        attempt: i64,
        reviewer_id: Option<Uuid>,
        reviewer_type: ReviewerType,
    ) -> Result<Self, sqlx::Error>
    where
        E: sqlx::SqliteExecutor<'e>,
    {
        sqlx::query_as::<_, Self>(
            r#"INSERT INTO reviews (task_id, attempt, reviewer_id, reviewer_type, created_at)
               VALUES ($1, $2, $3, $4, $5)
               RETURNING *"#,
        )
        .bind(task_id)
        .bind(attempt)
        .bind(reviewer_id)
        .bind(reviewer_type)
        .bind(Utc::now())
        .fetch_one(ex)
        .await
    }

    pub async fn find_by_id(pool: &SqlitePool, id: i64) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>("SELECT * FROM reviews WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn latest_for_task(
        pool: &SqlitePool,
        task_id: i64,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            "SELECT * FROM reviews WHERE task_id = $1 ORDER BY attempt DESC LIMIT 1",
        )
        .bind(task_id)
        .fetch_optional(pool)
        .await
    }

    pub async fn list_for_task(pool: &SqlitePool, task_id: i64) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            "SELECT * FROM reviews WHERE task_id = $1 ORDER BY attempt DESC",
        )
        .bind(task_id)
        .fetch_all(pool)
        .await
    }

    pub async fn set_verdict<'e, E>(
        ex: E,
        id: i64,
        verdict: ReviewVerdict,
        summary: Option<&str>,
        reviewer_id: Option<Uuid>,
        reviewer_type: Option<ReviewerType>,
    ) -> Result<Self, sqlx::Error>
    where
        E: sqlx::SqliteExecutor<'e>,
    {
        sqlx::query_as::<_, Self>(
            r#"UPDATE reviews
               SET verdict = $1,
                   summary = $2,
                   reviewer_id = COALESCE($3, reviewer_id),
                   reviewer_type = COALESCE($4, reviewer_type),
                   resolved_at = $5
               WHERE id = $6
               RETURNING *"#,
        )
        .bind(verdict)
        .bind(summary)
        .bind(reviewer_id)
        .bind(reviewer_type)
        .bind(Utc::now())
        .bind(id)
        .fetch_one(ex)
        .await
    }
}

impl ReviewComment {
    pub async fn create<'e, E>(
        ex: E,
        review_id: i64,
        author_id: Uuid,
        author_type: ReviewerType,
        file_path: Option<&str>,
        line_number: Option<i64>,
        content: &str,
    ) -> Result<Self, sqlx::Error>
    where
        E: sqlx::SqliteExecutor<'e>,
    {
        sqlx::query_as::<_, Self>(
            r#"INSERT INTO review_comments
                 (review_id, author_id, author_type, file_path, line_number, content, created_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7)
               RETURNING *"#,
        )
        .bind(review_id)
        .bind(author_id)
        .bind(author_type)
        .bind(file_path)
        .bind(line_number)
        .bind(content)
        .bind(Utc::now())
        .fetch_one(ex)
        .await
    }

    pub async fn list_for_review(
        pool: &SqlitePool,
        review_id: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            "SELECT * FROM review_comments WHERE review_id = $1 ORDER BY id",
        )
        .bind(review_id)
        .fetch_all(pool)
        .await
    }
}
