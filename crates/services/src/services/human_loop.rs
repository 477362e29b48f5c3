use chrono::{Duration, Utc};
use sqlx::SqlitePool;
use thiserror::Error;
use uuid::Uuid;

use openclaw_db::models::{
    Agent, HumanRequest, RequestKind, RequestStatus, event::types as event_types,
};

use super::{events::EventStore, notify::{ChangeBus, Notification}};

#[derive(Debug, Error)]
pub enum HumanLoopError {
    #[error("human request not found")]
    NotFound,
    #[error("agent not found")]
    AgentNotFound,
    #[error("human request is already {0}")]
    AlreadyResolved(RequestStatus),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

/// Agent -> human request/response rendezvous. Responses (and expiries) emit
/// a `human_request_resolved` notification so the dispatcher can resume the
/// originating agent.
#[derive(Clone)]
pub struct HumanLoopService {
    pool: SqlitePool,
    bus: ChangeBus,
}

impl HumanLoopService {
    pub fn new(pool: SqlitePool, bus: ChangeBus) -> Self {
        Self { pool, bus }
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn create_request(
        &self,
        team_id: Uuid,
        agent_id: Uuid,
        kind: RequestKind,
        question: &str,
        task_id: Option<i64>,
        options: &[String],
        timeout_minutes: Option<i64>,
    ) -> Result<HumanRequest, HumanLoopError> {
        Agent::find_by_id(&self.pool, agent_id)
            .await?
            .ok_or(HumanLoopError::AgentNotFound)?;

        let timeout_at = timeout_minutes.map(|m| Utc::now() + Duration::minutes(m));

        let mut tx = self.pool.begin().await?;
        let request = HumanRequest::create(
            &mut *tx,
            team_id,
            agent_id,
            task_id,
            kind,
            question,
            options,
            timeout_at,
        )
        .await?;
        EventStore::append(
            &mut *tx,
            &format!("human_request:{}", request.id),
            event_types::HUMAN_REQUEST_CREATED,
            serde_json::json!({
                "request_id": request.id,
                "team_id": team_id,
                "agent_id": agent_id,
                "task_id": task_id,
                "kind": kind,
                "question": question,
                "options": options,
            }),
        )
        .await?;
        tx.commit().await?;

        self.bus.publish_team_event(
            team_id,
            serde_json::json!({
                "type": event_types::HUMAN_REQUEST_CREATED,
                "request_id": request.id,
                "agent_id": agent_id,
                "kind": kind,
            }),
        );

        Ok(request)
    }

    pub async fn respond(
        &self,
        request_id: i64,
        response: &str,
        responded_by: Option<Uuid>,
    ) -> Result<HumanRequest, HumanLoopError> {
        let existing = HumanRequest::find_by_id(&self.pool, request_id)
            .await?
            .ok_or(HumanLoopError::NotFound)?;
        if existing.status != RequestStatus::Pending {
            return Err(HumanLoopError::AlreadyResolved(existing.status));
        }

        let mut tx = self.pool.begin().await?;
        let request = HumanRequest::resolve(&mut *tx, request_id, response, responded_by).await?;
        EventStore::append(
            &mut *tx,
            &format!("human_request:{request_id}"),
            event_types::HUMAN_REQUEST_RESOLVED,
            serde_json::json!({
                "request_id": request_id,
                "response": response,
                "responded_by": responded_by,
            }),
        )
        .await?;
        tx.commit().await?;

        self.bus.publish(Notification::HumanRequestResolved {
            request_id,
            agent_id: request.agent_id,
            team_id: request.team_id,
            status: RequestStatus::Resolved,
        });

        Ok(request)
    }

    pub async fn get_request(&self, request_id: i64) -> Result<HumanRequest, HumanLoopError> {
        HumanRequest::find_by_id(&self.pool, request_id)
            .await?
            .ok_or(HumanLoopError::NotFound)
    }

    pub async fn list_requests(
        &self,
        team_id: Uuid,
        status: Option<RequestStatus>,
        limit: i64,
    ) -> Result<Vec<HumanRequest>, HumanLoopError> {
        Ok(HumanRequest::list(&self.pool, team_id, status, limit).await?)
    }

    /// Sweep pending requests past their deadline. Each expiry is recorded
    /// and notified the same way a resolution is, so waiting agents get
    /// woken and learn the request expired.
    pub async fn expire_stale_requests(&self) -> Result<usize, HumanLoopError> {
        let now = Utc::now();

        let mut tx = self.pool.begin().await?;
        let expired = HumanRequest::expire_stale(&mut *tx, now).await?;
        for request in &expired {
            EventStore::append(
                &mut *tx,
                &format!("human_request:{}", request.id),
                event_types::HUMAN_REQUEST_EXPIRED,
                serde_json::json!({ "request_id": request.id, "reason": "timeout" }),
            )
            .await?;
        }
        tx.commit().await?;

        for request in &expired {
            self.bus.publish(Notification::HumanRequestResolved {
                request_id: request.id,
                agent_id: request.agent_id,
                team_id: request.team_id,
                status: RequestStatus::Expired,
            });
        }

        Ok(expired.len())
    }
}
