use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool, types::Json};
use strum_macros::{Display, EnumString};
use uuid::Uuid;

use openclaw_utils::text::task_branch_name;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TaskStatus {
    Todo,
    InProgress,
    InReview,
    InApproval,
    Merging,
    Done,
    Cancelled,
}

impl TaskStatus {
    /// The complete transition graph. `done` and `cancelled` are sinks;
    /// `merging -> in_progress` exists for merge failure.
    pub fn allowed_transitions(self) -> &'static [TaskStatus] {
        use TaskStatus::*;
        match self {
            Todo => &[InProgress, Cancelled],
            InProgress => &[InReview, Todo, Cancelled],
            InReview => &[InApproval, InProgress, Cancelled],
            InApproval => &[Merging, InProgress, Cancelled],
            Merging => &[Done, InProgress],
            Done => &[],
            Cancelled => &[],
        }
    }

    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        self.allowed_transitions().contains(&next)
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TaskPriority {
    Low,
    Medium,
    High,
    Critical,
}

/// Open metadata bag on a task. `context` is the key/value carryover
/// re-injected into future prompts for the same task; `pr_url`/`pr_number`
/// are written when a pull request is created.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskMetadata {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub context: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pr_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pr_number: Option<i64>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Task {
    pub id: i64,
    pub team_id: Uuid,
    pub title: String,
    pub description: String,
    pub status: TaskStatus,
    pub priority: TaskPriority,
    pub dri_id: Option<Uuid>,
    pub assignee_id: Option<Uuid>,
    #[sqlx(json)]
    pub depends_on: Vec<i64>,
    #[sqlx(json)]
    pub repo_ids: Vec<Uuid>,
    #[sqlx(json)]
    pub tags: Vec<String>,
    pub branch: String,
    #[sqlx(json)]
    pub metadata: TaskMetadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Draft for task creation. Used both standalone and inside a batch, where
/// `depends_on` is rewritten after the earlier drafts get concrete ids.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateTask {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub priority: Option<TaskPriority>,
    #[serde(default)]
    pub assignee_id: Option<Uuid>,
    #[serde(default)]
    pub dri_id: Option<Uuid>,
    #[serde(default)]
    pub depends_on: Vec<i64>,
    #[serde(default)]
    pub repo_ids: Vec<Uuid>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl Task {
    /// Insert a task in `todo` status and derive its branch name from the
    /// autoincrement id. Runs two statements, so callers that need atomicity
    /// hand in a transaction connection.
    pub async fn create(
        conn: &mut sqlx::SqliteConnection,
        team_id: Uuid,
        data: &CreateTask,
    ) -> Result<Self, sqlx::Error> {
        let now = Utc::now();
        let inserted = sqlx::query_as::<_, Self>(
            r#"INSERT INTO tasks
                 (team_id, title, description, status, priority, dri_id, assignee_id,
                  depends_on, repo_ids, tags, branch, metadata, created_at, updated_at)
               VALUES ($1, $2, $3, 'todo', $4, $5, $6, $7, $8, $9, '', '{}', $10, $10)
               RETURNING *"#,
        )
        .bind(team_id)
        .bind(&data.title)
        .bind(&data.description)
        .bind(data.priority.unwrap_or(TaskPriority::Medium))
        .bind(data.dri_id)
        .bind(data.assignee_id)
        .bind(Json(&data.depends_on))
        .bind(Json(&data.repo_ids))
        .bind(Json(&data.tags))
        .bind(now)
        .fetch_one(&mut *conn)
        .await?;

        let branch = task_branch_name(inserted.id, &inserted.title);
        sqlx::query_as::<_, Self>("UPDATE tasks SET branch = $1 WHERE id = $2 RETURNING *")
            .bind(&branch)
            .bind(inserted.id)
            .fetch_one(&mut *conn)
            .await
    }

    pub async fn find_by_id<'e, E>(ex: E, id: i64) -> Result<Option<Self>, sqlx::Error>
    where
        E: sqlx::SqliteExecutor<'e>,
    {
        sqlx::query_as::<_, Self>("SELECT * FROM tasks WHERE id = $1")
            .bind(id)
            .fetch_optional(ex)
            .await
    }

    pub async fn list(
        pool: &SqlitePool,
        team_id: Uuid,
        status: Option<TaskStatus>,
        assignee_id: Option<Uuid>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            r#"SELECT * FROM tasks
               WHERE team_id = $1
                 AND ($2 IS NULL OR status = $2)
                 AND ($3 IS NULL OR assignee_id = $3)
               ORDER BY id DESC
               LIMIT $4 OFFSET $5"#,
        )
        .bind(team_id)
        .bind(status)
        .bind(assignee_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await
    }

    /// `(id, status)` pairs for the given ids; missing ids are simply absent
    /// from the result.
    pub async fn statuses_of<'e, E>(
        ex: E,
        ids: &[i64],
    ) -> Result<Vec<(i64, TaskStatus)>, sqlx::Error>
    where
        E: sqlx::SqliteExecutor<'e>,
    {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = (1..=ids.len())
            .map(|i| format!("${i}"))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!("SELECT id, status FROM tasks WHERE id IN ({placeholders})");
        let mut query = sqlx::query_as::<_, (i64, TaskStatus)>(&sql);
        for id in ids {
            query = query.bind(id);
        }
        query.fetch_all(ex).await
    }

    pub async fn set_status<'e, E>(
        ex: E,
        id: i64,
        status: TaskStatus,
        completed_at: Option<DateTime<Utc>>,
    ) -> Result<Self, sqlx::Error>
    where
        E: sqlx::SqliteExecutor<'e>,
    {
        sqlx::query_as::<_, Self>(
            r#"UPDATE tasks
               SET status = $1, completed_at = COALESCE($2, completed_at), updated_at = $3
               WHERE id = $4
               RETURNING *"#,
        )
        .bind(status)
        .bind(completed_at)
        .bind(Utc::now())
        .bind(id)
        .fetch_one(ex)
        .await
    }

    pub async fn update_fields<'e, E>(
        ex: E,
        id: i64,
        title: Option<&str>,
        description: Option<&str>,
        priority: Option<TaskPriority>,
        tags: Option<&[String]>,
    ) -> Result<Self, sqlx::Error>
    where
        E: sqlx::SqliteExecutor<'e>,
    {
        sqlx::query_as::<_, Self>(
            r#"UPDATE tasks
               SET title       = COALESCE($1, title),
                   description = COALESCE($2, description),
                   priority    = COALESCE($3, priority),
                   tags        = COALESCE($4, tags),
                   updated_at  = $5
               WHERE id = $6
               RETURNING *"#,
        )
        .bind(title)
        .bind(description)
        .bind(priority)
        .bind(tags.map(Json))
        .bind(Utc::now())
        .bind(id)
        .fetch_one(ex)
        .await
    }

    pub async fn assign<'e, E>(ex: E, id: i64, assignee_id: Uuid) -> Result<Self, sqlx::Error>
    where
        E: sqlx::SqliteExecutor<'e>,
    {
        sqlx::query_as::<_, Self>(
            "UPDATE tasks SET assignee_id = $1, updated_at = $2 WHERE id = $3 RETURNING *",
        )
        .bind(assignee_id)
        .bind(Utc::now())
        .bind(id)
        .fetch_one(ex)
        .await
    }

    pub async fn set_depends_on<'e, E>(
        ex: E,
        id: i64,
        depends_on: &[i64],
    ) -> Result<Self, sqlx::Error>
    where
        E: sqlx::SqliteExecutor<'e>,
    {
        sqlx::query_as::<_, Self>(
            "UPDATE tasks SET depends_on = $1, updated_at = $2 WHERE id = $3 RETURNING *",
        )
        .bind(Json(depends_on))
        .bind(Utc::now())
        .bind(id)
        .fetch_one(ex)
        .await
    }

    pub async fn update_metadata<'e, E>(
        ex: E,
        id: i64,
        metadata: &TaskMetadata,
    ) -> Result<Self, sqlx::Error>
    where
        E: sqlx::SqliteExecutor<'e>,
    {
        sqlx::query_as::<_, Self>(
            "UPDATE tasks SET metadata = $1, updated_at = $2 WHERE id = $3 RETURNING *",
        )
        .bind(Json(metadata))
        .bind(Utc::now())
        .bind(id)
        .fetch_one(ex)
        .await
    }

    /// The agent's most recently touched `in_progress` task, used by the
    /// dispatcher to decide what a freshly woken agent should work on.
    pub async fn current_for_agent(
        pool: &SqlitePool,
        agent_id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            r#"SELECT * FROM tasks
               WHERE assignee_id = $1 AND status = 'in_progress'
               ORDER BY updated_at DESC
               LIMIT 1"#,
        )
        .bind(agent_id)
        .fetch_optional(pool)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states_have_no_exits() {
        assert!(TaskStatus::Done.allowed_transitions().is_empty());
        assert!(TaskStatus::Cancelled.allowed_transitions().is_empty());
    }

    #[test]
    fn merging_can_regress_on_failure() {
        assert!(TaskStatus::Merging.can_transition_to(TaskStatus::InProgress));
        assert!(!TaskStatus::Merging.can_transition_to(TaskStatus::InReview));
    }

    #[test]
    fn status_round_trips_through_strings() {
        let s: TaskStatus = "in_progress".parse().expect("parse");
        assert_eq!(s, TaskStatus::InProgress);
        assert_eq!(TaskStatus::InApproval.to_string(), "in_approval");
    }

    #[test]
    fn metadata_extra_keys_survive_round_trip() {
        let raw = serde_json::json!({
            "context": {"api": "REST"},
            "pr_url": "https://example.com/pull/7",
            "pr_number": 7,
            "custom": {"nested": true}
        });
        let meta: TaskMetadata = serde_json::from_value(raw.clone()).expect("decode");
        assert_eq!(meta.context.get("api").map(String::as_str), Some("REST"));
        assert_eq!(meta.pr_number, Some(7));
        let back = serde_json::to_value(&meta).expect("encode");
        assert_eq!(back, raw);
    }
}
