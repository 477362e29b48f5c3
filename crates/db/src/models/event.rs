use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Immutable audit record. Events on one `stream_id` are totally ordered by
/// `id`; nothing in the core ever updates or deletes a row.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Event {
    pub id: i64,
    pub stream_id: String,
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub event_type: String,
    #[sqlx(json)]
    pub data: serde_json::Value,
    #[sqlx(json)]
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Dotted event type names, one constant per append site.
pub mod types {
    pub const TEAM_CREATED: &str = "team.created";
    pub const AGENT_CREATED: &str = "agent.created";
    pub const REPO_REGISTERED: &str = "repo.registered";

    pub const TASK_CREATED: &str = "task.created";
    pub const TASK_UPDATED: &str = "task.updated";
    pub const TASK_STATUS_CHANGED: &str = "task.status_changed";
    pub const TASK_ASSIGNED: &str = "task.assigned";
    pub const TASK_CONTEXT_SAVED: &str = "task.context_saved";
    pub const MESSAGE_SENT: &str = "message.sent";

    pub const SESSION_STARTED: &str = "session.started";
    pub const SESSION_USAGE_RECORDED: &str = "session.usage_recorded";
    pub const SESSION_ENDED: &str = "session.ended";
    pub const AGENT_BUDGET_EXCEEDED: &str = "agent.budget_exceeded";

    pub const AGENT_RUN_STARTED: &str = "agent.run.started";
    pub const AGENT_RUN_COMPLETED: &str = "agent.run.completed";
    pub const AGENT_RUN_FAILED: &str = "agent.run.failed";
    pub const AGENT_RUN_TIMEOUT: &str = "agent.run.timeout";

    pub const HUMAN_REQUEST_CREATED: &str = "human_request.created";
    pub const HUMAN_REQUEST_RESOLVED: &str = "human_request.resolved";
    pub const HUMAN_REQUEST_EXPIRED: &str = "human_request.expired";

    pub const REVIEW_CREATED: &str = "review.created";
    pub const REVIEW_COMMENT_ADDED: &str = "review.comment_added";
    pub const REVIEW_VERDICT: &str = "review.verdict";
    pub const REVIEW_FEEDBACK_SENT: &str = "review.feedback_sent";
    pub const PR_CREATED: &str = "pr.created";

    pub const MERGE_QUEUED: &str = "merge.queued";
    pub const MERGE_STARTED: &str = "merge.started";
    pub const MERGE_COMPLETED: &str = "merge.completed";
    pub const MERGE_FAILED: &str = "merge.failed";
}
