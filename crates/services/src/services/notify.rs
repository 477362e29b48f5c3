use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

use openclaw_db::models::{ActorType, RequestStatus, TaskStatus};

/// Change notifications fanned out after commits. Delivery is best-effort:
/// receivers must be idempotent, and the dispatcher's fallback poller covers
/// anything missed (including other processes, which cannot see this bus).
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "channel", rename_all = "snake_case")]
pub enum Notification {
    NewMessage {
        message_id: i64,
        recipient_id: Uuid,
        recipient_type: ActorType,
        team_id: Uuid,
        task_id: Option<i64>,
    },
    HumanRequestResolved {
        request_id: i64,
        agent_id: Uuid,
        team_id: Uuid,
        status: RequestStatus,
    },
    TaskStatusChanged {
        task_id: i64,
        team_id: Uuid,
        old_status: TaskStatus,
        new_status: TaskStatus,
    },
    /// Team-scoped live feed of domain events for UIs.
    TeamEvent {
        team_id: Uuid,
        payload: serde_json::Value,
    },
}

#[derive(Clone)]
pub struct ChangeBus {
    tx: broadcast::Sender<Notification>,
}

impl ChangeBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(2048);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.tx.subscribe()
    }

    /// Fire-and-forget; a bus with no subscribers is not an error.
    pub fn publish(&self, notification: Notification) {
        let _ = self.tx.send(notification);
    }

    pub fn publish_team_event(&self, team_id: Uuid, payload: serde_json::Value) {
        self.publish(Notification::TeamEvent { team_id, payload });
    }
}

impl Default for ChangeBus {
    fn default() -> Self {
        Self::new()
    }
}
