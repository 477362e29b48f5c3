use sqlx::SqlitePool;
use thiserror::Error;
use uuid::Uuid;

use openclaw_db::models::{ActorType, Message, event::types as event_types};

use super::{events::EventStore, notify::{ChangeBus, Notification}};

#[derive(Debug, Error)]
pub enum MessageServiceError {
    #[error("message not found")]
    NotFound,
    #[error("validation error: {0}")]
    Validation(String),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

/// Inter-actor messaging. Inserting a message emits a `new_message` change
/// notification, which is what wakes the dispatcher.
#[derive(Clone)]
pub struct MessageService {
    pool: SqlitePool,
    bus: ChangeBus,
}

impl MessageService {
    pub fn new(pool: SqlitePool, bus: ChangeBus) -> Self {
        Self { pool, bus }
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn send_message(
        &self,
        team_id: Uuid,
        sender_id: Uuid,
        sender_type: ActorType,
        recipient_id: Uuid,
        recipient_type: ActorType,
        task_id: Option<i64>,
        content: &str,
    ) -> Result<Message, MessageServiceError> {
        if content.is_empty() {
            return Err(MessageServiceError::Validation(
                "content must not be empty".into(),
            ));
        }

        let mut tx = self.pool.begin().await?;
        let message = Message::create(
            &mut *tx,
            team_id,
            sender_id,
            sender_type,
            recipient_id,
            recipient_type,
            task_id,
            content,
        )
        .await?;
        EventStore::append(
            &mut *tx,
            &format!("message:{}", message.id),
            event_types::MESSAGE_SENT,
            serde_json::json!({
                "sender_id": sender_id,
                "sender_type": sender_type,
                "recipient_id": recipient_id,
                "recipient_type": recipient_type,
                "task_id": task_id,
            }),
        )
        .await?;
        tx.commit().await?;

        self.bus.publish(Notification::NewMessage {
            message_id: message.id,
            recipient_id,
            recipient_type,
            team_id,
            task_id,
        });

        Ok(message)
    }

    pub async fn get_inbox(
        &self,
        recipient_id: Uuid,
        unprocessed_only: bool,
        limit: i64,
    ) -> Result<Vec<Message>, MessageServiceError> {
        Ok(Message::inbox(&self.pool, recipient_id, unprocessed_only, limit).await?)
    }

    pub async fn mark_processed(&self, message_id: i64) -> Result<(), MessageServiceError> {
        if Message::mark_processed(&self.pool, message_id).await? {
            Ok(())
        } else {
            Err(MessageServiceError::NotFound)
        }
    }

    pub async fn mark_seen(&self, message_id: i64) -> Result<(), MessageServiceError> {
        if Message::mark_seen(&self.pool, message_id).await? {
            Ok(())
        } else {
            Err(MessageServiceError::NotFound)
        }
    }
}
