use std::{
    collections::HashSet,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqlitePool;
use tokio::sync::{Mutex, Semaphore, broadcast::error::RecvError};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use openclaw_db::models::{ActorType, Agent, AgentStatus, Message, Task};

use super::{
    human_loop::HumanLoopService,
    notify::{ChangeBus, Notification},
    runner::{AgentRunner, RunRequest},
};

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Global cap on concurrently dispatched agent runs.
    pub max_concurrent: usize,
    /// Fallback poll for unprocessed messages; catches missed notifications.
    pub poll_interval: Duration,
    /// Reconciliation sweep: expired human requests, stuck agents.
    pub reconcile_interval: Duration,
    /// An agent `working` longer than this with no open session gets reset.
    pub stuck_agent_timeout: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 32,
            poll_interval: Duration::from_secs(5),
            reconcile_interval: Duration::from_secs(60),
            stuck_agent_timeout: Duration::from_secs(30 * 60),
        }
    }
}

#[derive(Default)]
struct Counters {
    dispatched: AtomicU64,
    skipped: AtomicU64,
    errors: AtomicU64,
}

/// Snapshot of dispatcher counters for monitoring.
#[derive(Debug, Clone, Serialize)]
pub struct DispatcherStats {
    pub dispatched: u64,
    pub skipped: u64,
    pub errors: u64,
    pub in_flight: usize,
    pub max_concurrent: usize,
    pub started_at: DateTime<Utc>,
}

/// Notification-driven scheduler. Listens on the change bus, polls as a
/// fallback, and reconciles stuck state. Per-agent serialisation comes from
/// the in-flight set plus the idle->working claim; global concurrency from a
/// semaphore whose permit is released once the runner task is spawned (the
/// runner owns its own lifetime).
#[derive(Clone)]
pub struct Dispatcher {
    pool: SqlitePool,
    bus: ChangeBus,
    runner: AgentRunner,
    config: Arc<DispatcherConfig>,
    semaphore: Arc<Semaphore>,
    in_flight: Arc<Mutex<HashSet<Uuid>>>,
    counters: Arc<Counters>,
    started_at: DateTime<Utc>,
}

impl Dispatcher {
    pub fn new(
        pool: SqlitePool,
        bus: ChangeBus,
        runner: AgentRunner,
        config: DispatcherConfig,
    ) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.max_concurrent));
        Self {
            pool,
            bus,
            runner,
            config: Arc::new(config),
            semaphore,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
            counters: Arc::new(Counters::default()),
            started_at: Utc::now(),
        }
    }

    /// Run until cancelled: notification listener, fallback poller and
    /// reconciliation loop side by side.
    pub async fn run(&self, cancel: CancellationToken) {
        tracing::info!(
            max_concurrent = self.config.max_concurrent,
            "dispatcher started"
        );
        tokio::join!(
            self.listen_loop(cancel.clone()),
            self.poll_loop(cancel.clone()),
            self.reconcile_loop(cancel.clone()),
        );
        tracing::info!(
            dispatched = self.counters.dispatched.load(Ordering::Relaxed),
            errors = self.counters.errors.load(Ordering::Relaxed),
            "dispatcher stopped"
        );
    }

    async fn listen_loop(&self, cancel: CancellationToken) {
        let mut rx = self.bus.subscribe();
        loop {
            let notification = tokio::select! {
                _ = cancel.cancelled() => return,
                received = rx.recv() => match received {
                    Ok(n) => n,
                    Err(RecvError::Lagged(missed)) => {
                        // Best-effort channel; the poller will pick up
                        // whatever we missed.
                        tracing::warn!(missed, "notification listener lagged");
                        continue;
                    }
                    Err(RecvError::Closed) => return,
                },
            };

            match notification {
                Notification::NewMessage {
                    recipient_id,
                    recipient_type: ActorType::Agent,
                    team_id,
                    ..
                } => {
                    self.spawn_dispatch(recipient_id, team_id, "new_message");
                }
                Notification::NewMessage { .. } => {}
                Notification::HumanRequestResolved {
                    agent_id, team_id, ..
                } => {
                    self.spawn_dispatch(agent_id, team_id, "human_request_resolved");
                }
                Notification::TaskStatusChanged {
                    task_id,
                    team_id,
                    old_status,
                    new_status,
                } => {
                    // Observability only; managers react via messages.
                    tracing::info!(task_id, %old_status, %new_status, "task status changed");
                    self.bus.publish_team_event(
                        team_id,
                        serde_json::json!({
                            "type": "task.status_changed",
                            "task_id": task_id,
                            "old_status": old_status,
                            "new_status": new_status,
                        }),
                    );
                }
                Notification::TeamEvent { .. } => {}
            }
        }
    }

    async fn poll_loop(&self, cancel: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }

            match Message::pending_agent_recipients(&self.pool, 10).await {
                Ok(pending) => {
                    for recipient in pending {
                        self.dispatch(recipient.agent_id, recipient.team_id, "fallback_poll")
                            .await;
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "fallback poll failed");
                    self.counters.errors.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
    }

    async fn reconcile_loop(&self, cancel: CancellationToken) {
        let human_loop = HumanLoopService::new(self.pool.clone(), self.bus.clone());
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(self.config.reconcile_interval) => {}
            }

            match human_loop.expire_stale_requests().await {
                Ok(0) => {}
                Ok(expired) => tracing::info!(expired, "expired stale human requests"),
                Err(e) => tracing::error!(error = %e, "expiry sweep failed"),
            }

            let cutoff = Utc::now()
                - chrono::Duration::from_std(self.config.stuck_agent_timeout)
                    .unwrap_or_else(|_| chrono::Duration::minutes(30));
            match Agent::reset_stuck_working(&self.pool, cutoff).await {
                Ok(0) => {}
                Ok(reset) => tracing::warn!(reset, "reset agents stuck in working"),
                Err(e) => tracing::error!(error = %e, "stuck agent sweep failed"),
            }
        }
    }

    /// Dispatch off the listener loop so a full semaphore cannot stall
    /// notification handling.
    fn spawn_dispatch(&self, agent_id: Uuid, team_id: Uuid, reason: &'static str) {
        let dispatcher = self.clone();
        tokio::spawn(async move {
            dispatcher.dispatch(agent_id, team_id, reason).await;
        });
    }

    /// Dispatch one agent turn: dedup, acquire a permit, claim the idle
    /// agent, then fire the runner in the background.
    pub async fn dispatch(&self, agent_id: Uuid, team_id: Uuid, reason: &str) {
        {
            let mut in_flight = self.in_flight.lock().await;
            if !in_flight.insert(agent_id) {
                tracing::debug!(%agent_id, "agent already in flight, skipping");
                self.counters.skipped.fetch_add(1, Ordering::Relaxed);
                return;
            }
        }

        let result = self.dispatch_inner(agent_id, team_id, reason).await;

        self.in_flight.lock().await.remove(&agent_id);

        if let Err(e) = result {
            tracing::error!(%agent_id, error = %e, "dispatch failed");
            self.counters.errors.fetch_add(1, Ordering::Relaxed);
            // Undo the claim so the agent is not wedged in `working`.
            if let Err(e) = Agent::set_status(&self.pool, agent_id, AgentStatus::Idle).await {
                tracing::error!(%agent_id, error = %e, "failed to reset agent to idle");
            }
        }
    }

    async fn dispatch_inner(
        &self,
        agent_id: Uuid,
        team_id: Uuid,
        reason: &str,
    ) -> Result<(), sqlx::Error> {
        let Ok(_permit) = self.semaphore.clone().acquire_owned().await else {
            return Ok(());
        };

        let Some(agent) = Agent::find_by_id(&self.pool, agent_id).await? else {
            tracing::warn!(%agent_id, "agent not found, skipping dispatch");
            self.counters.skipped.fetch_add(1, Ordering::Relaxed);
            return Ok(());
        };
        if agent.status != AgentStatus::Idle {
            tracing::debug!(%agent_id, status = %agent.status, "agent busy, skipping dispatch");
            self.counters.skipped.fetch_add(1, Ordering::Relaxed);
            return Ok(());
        }

        // Reload-and-check under a conditional write: only one dispatcher
        // wins the idle -> working flip.
        if !Agent::try_claim(&self.pool, agent_id).await? {
            self.counters.skipped.fetch_add(1, Ordering::Relaxed);
            return Ok(());
        }

        self.bus.publish_team_event(
            team_id,
            serde_json::json!({
                "type": "agent.status_changed",
                "agent_id": agent_id,
                "status": "working",
                "reason": reason,
            }),
        );

        let task = Task::current_for_agent(&self.pool, agent_id).await?;
        let task_id = task.as_ref().map(|t| t.id);

        self.counters.dispatched.fetch_add(1, Ordering::Relaxed);
        tracing::info!(%agent_id, reason, task_id, "dispatched agent");

        // Fire and forget; the runner closes its session and resets the
        // agent on every exit path. The permit is released when this scope
        // ends, i.e. once the run is scheduled, not when it completes.
        let runner = self.runner.clone();
        let pool = self.pool.clone();
        let mut request = RunRequest::new(agent_id);
        request.team_id = Some(team_id);
        request.task_id = task_id;
        tokio::spawn(async move {
            if let Err(e) = runner.run_agent(request).await {
                tracing::error!(%agent_id, error = %e, "agent run failed");
                if let Err(reset_err) =
                    Agent::set_status(&pool, agent_id, AgentStatus::Idle).await
                {
                    tracing::error!(%agent_id, error = %reset_err, "failed to reset agent");
                }
            }
        });

        Ok(())
    }

    pub async fn stats(&self) -> DispatcherStats {
        DispatcherStats {
            dispatched: self.counters.dispatched.load(Ordering::Relaxed),
            skipped: self.counters.skipped.load(Ordering::Relaxed),
            errors: self.counters.errors.load(Ordering::Relaxed),
            in_flight: self.in_flight.lock().await.len(),
            max_concurrent: self.config.max_concurrent,
            started_at: self.started_at,
        }
    }
}
