use std::collections::BTreeMap;

use serde::Deserialize;
use sqlx::SqlitePool;
use thiserror::Error;
use uuid::Uuid;

use openclaw_db::models::{
    Event, Task, TaskPriority, TaskStatus,
    event::types as event_types,
    task::CreateTask,
};

use super::{events::EventStore, notify::{ChangeBus, Notification}};

#[derive(Debug, Error)]
pub enum TaskServiceError {
    #[error("task not found")]
    NotFound,
    #[error("cannot transition from '{from}' to '{to}'")]
    InvalidTransition { from: TaskStatus, to: TaskStatus },
    #[error("dependency blocked: {0}")]
    DependencyBlocked(String),
    #[error("validation error: {0}")]
    Validation(String),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

/// Partial update for PATCH; `None` fields are left untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateTask {
    pub title: Option<String>,
    pub description: Option<String>,
    pub priority: Option<TaskPriority>,
    pub tags: Option<Vec<String>>,
}

/// One entry of an atomic batch. `depends_on_indices` reference earlier
/// positions in the same batch and are resolved to concrete ids after the
/// rows exist.
#[derive(Debug, Clone, Deserialize)]
pub struct BatchTaskDraft {
    #[serde(flatten)]
    pub task: CreateTask,
    #[serde(default)]
    pub depends_on_indices: Vec<usize>,
}

/// Task CRUD plus the DAG-enforced state machine. Every mutation appends at
/// least one event on `task:<id>` inside the mutating transaction.
#[derive(Clone)]
pub struct TaskService {
    pool: SqlitePool,
    bus: ChangeBus,
}

impl TaskService {
    pub fn new(pool: SqlitePool, bus: ChangeBus) -> Self {
        Self { pool, bus }
    }

    pub async fn create_task(
        &self,
        team_id: Uuid,
        data: &CreateTask,
    ) -> Result<Task, TaskServiceError> {
        if data.title.trim().is_empty() {
            return Err(TaskServiceError::Validation("title must not be empty".into()));
        }

        let mut tx = self.pool.begin().await?;
        let task = Task::create(&mut *tx, team_id, data).await?;
        EventStore::append(
            &mut *tx,
            &format!("task:{}", task.id),
            event_types::TASK_CREATED,
            serde_json::json!({
                "title": task.title,
                "priority": task.priority,
                "team_id": team_id,
                "assignee_id": task.assignee_id,
                "depends_on": task.depends_on,
            }),
        )
        .await?;
        tx.commit().await?;
        Ok(task)
    }

    /// Create a whole batch atomically. Drafts may declare
    /// `depends_on_indices` pointing at earlier positions; an index that is
    /// out of range (or not strictly earlier) fails the whole batch.
    pub async fn batch_create_tasks(
        &self,
        team_id: Uuid,
        drafts: &[BatchTaskDraft],
    ) -> Result<Vec<Task>, TaskServiceError> {
        for (position, draft) in drafts.iter().enumerate() {
            if draft.task.title.trim().is_empty() {
                return Err(TaskServiceError::Validation(format!(
                    "draft {position}: title must not be empty"
                )));
            }
            for &index in &draft.depends_on_indices {
                if index >= position {
                    return Err(TaskServiceError::Validation(format!(
                        "draft {position}: depends_on_indices entry {index} must reference an earlier position"
                    )));
                }
            }
        }

        let mut tx = self.pool.begin().await?;
        let mut created: Vec<Task> = Vec::with_capacity(drafts.len());

        for draft in drafts {
            let task = Task::create(&mut *tx, team_id, &draft.task).await?;
            created.push(task);
        }

        // Second pass: indices now have concrete ids.
        for (position, draft) in drafts.iter().enumerate() {
            let mut depends_on = draft.task.depends_on.clone();
            depends_on.extend(draft.depends_on_indices.iter().map(|&i| created[i].id));
            if depends_on != created[position].depends_on {
                created[position] =
                    Task::set_depends_on(&mut *tx, created[position].id, &depends_on).await?;
            }
            EventStore::append(
                &mut *tx,
                &format!("task:{}", created[position].id),
                event_types::TASK_CREATED,
                serde_json::json!({
                    "title": created[position].title,
                    "priority": created[position].priority,
                    "team_id": team_id,
                    "assignee_id": created[position].assignee_id,
                    "depends_on": created[position].depends_on,
                    "batch_position": position,
                }),
            )
            .await?;
        }

        tx.commit().await?;
        Ok(created)
    }

    pub async fn get_task(&self, task_id: i64) -> Result<Task, TaskServiceError> {
        Task::find_by_id(&self.pool, task_id)
            .await?
            .ok_or(TaskServiceError::NotFound)
    }

    pub async fn list_tasks(
        &self,
        team_id: Uuid,
        status: Option<TaskStatus>,
        assignee_id: Option<Uuid>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Task>, TaskServiceError> {
        Ok(Task::list(&self.pool, team_id, status, assignee_id, limit, offset).await?)
    }

    pub async fn update_task(
        &self,
        task_id: i64,
        update: &UpdateTask,
    ) -> Result<Task, TaskServiceError> {
        let existing = self.get_task(task_id).await?;

        let mut changes = serde_json::Map::new();
        if let Some(title) = &update.title {
            changes.insert("title".into(), serde_json::json!(title));
        }
        if let Some(description) = &update.description {
            changes.insert("description".into(), serde_json::json!(description));
        }
        if let Some(priority) = update.priority {
            changes.insert("priority".into(), serde_json::json!(priority));
        }
        if let Some(tags) = &update.tags {
            changes.insert("tags".into(), serde_json::json!(tags));
        }
        if changes.is_empty() {
            return Ok(existing);
        }

        let mut tx = self.pool.begin().await?;
        let task = Task::update_fields(
            &mut *tx,
            task_id,
            update.title.as_deref(),
            update.description.as_deref(),
            update.priority,
            update.tags.as_deref(),
        )
        .await?;
        EventStore::append(
            &mut *tx,
            &format!("task:{task_id}"),
            event_types::TASK_UPDATED,
            serde_json::Value::Object(changes),
        )
        .await?;
        tx.commit().await?;
        Ok(task)
    }

    /// The state machine. Validates the transition, enforces the DAG when
    /// entering `in_progress`, stamps `completed_at` on `done`, and records
    /// the change as an event in the same transaction.
    pub async fn change_status(
        &self,
        task_id: i64,
        new_status: TaskStatus,
        actor_id: Option<Uuid>,
    ) -> Result<Task, TaskServiceError> {
        let mut tx = self.pool.begin().await?;

        let task = Task::find_by_id(&mut *tx, task_id)
            .await?
            .ok_or(TaskServiceError::NotFound)?;
        let old_status = task.status;

        if !old_status.can_transition_to(new_status) {
            return Err(TaskServiceError::InvalidTransition {
                from: old_status,
                to: new_status,
            });
        }

        if new_status == TaskStatus::InProgress && !task.depends_on.is_empty() {
            self.check_dependencies(&mut tx, &task.depends_on).await?;
        }

        let completed_at = (new_status == TaskStatus::Done).then(chrono::Utc::now);
        let task = Task::set_status(&mut *tx, task_id, new_status, completed_at).await?;

        EventStore::append(
            &mut *tx,
            &format!("task:{task_id}"),
            event_types::TASK_STATUS_CHANGED,
            serde_json::json!({
                "from": old_status,
                "to": new_status,
                "actor_id": actor_id,
            }),
        )
        .await?;
        tx.commit().await?;

        self.bus.publish(Notification::TaskStatusChanged {
            task_id,
            team_id: task.team_id,
            old_status,
            new_status,
        });

        Ok(task)
    }

    async fn check_dependencies(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        dep_ids: &[i64],
    ) -> Result<(), TaskServiceError> {
        let statuses = Task::statuses_of(&mut **tx, dep_ids).await?;

        let found: Vec<i64> = statuses.iter().map(|(id, _)| *id).collect();
        let missing: Vec<i64> = dep_ids
            .iter()
            .copied()
            .filter(|id| !found.contains(id))
            .collect();
        if !missing.is_empty() {
            return Err(TaskServiceError::DependencyBlocked(format!(
                "dependency tasks not found: {missing:?}"
            )));
        }

        let blocked: Vec<String> = statuses
            .iter()
            .filter(|(_, status)| *status != TaskStatus::Done)
            .map(|(id, status)| format!("task {id} ({status})"))
            .collect();
        if !blocked.is_empty() {
            return Err(TaskServiceError::DependencyBlocked(format!(
                "blocked by unresolved dependencies: {}",
                blocked.join(", ")
            )));
        }

        Ok(())
    }

    pub async fn assign_task(
        &self,
        task_id: i64,
        assignee_id: Uuid,
    ) -> Result<Task, TaskServiceError> {
        let existing = self.get_task(task_id).await?;

        let mut tx = self.pool.begin().await?;
        let task = Task::assign(&mut *tx, task_id, assignee_id).await?;
        EventStore::append(
            &mut *tx,
            &format!("task:{task_id}"),
            event_types::TASK_ASSIGNED,
            serde_json::json!({
                "from": existing.assignee_id,
                "to": assignee_id,
            }),
        )
        .await?;
        tx.commit().await?;
        Ok(task)
    }

    /// Append-or-overwrite one key of the task's context carryover. The map
    /// is never cleared implicitly.
    pub async fn save_context(
        &self,
        task_id: i64,
        key: &str,
        value: &str,
    ) -> Result<Task, TaskServiceError> {
        if key.trim().is_empty() {
            return Err(TaskServiceError::Validation("context key must not be empty".into()));
        }

        let mut tx = self.pool.begin().await?;
        let mut task = Task::find_by_id(&mut *tx, task_id)
            .await?
            .ok_or(TaskServiceError::NotFound)?;
        task.metadata
            .context
            .insert(key.to_string(), value.to_string());
        let task = Task::update_metadata(&mut *tx, task_id, &task.metadata).await?;
        EventStore::append(
            &mut *tx,
            &format!("task:{task_id}"),
            event_types::TASK_CONTEXT_SAVED,
            serde_json::json!({ "key": key }),
        )
        .await?;
        tx.commit().await?;
        Ok(task)
    }

    pub async fn read_context(
        &self,
        task_id: i64,
    ) -> Result<BTreeMap<String, String>, TaskServiceError> {
        Ok(self.get_task(task_id).await?.metadata.context)
    }

    /// The immutable audit trail for one task.
    pub async fn task_events(&self, task_id: i64) -> Result<Vec<Event>, TaskServiceError> {
        Ok(EventStore::read_stream(&self.pool, &format!("task:{task_id}"), 0, 500).await?)
    }
}
