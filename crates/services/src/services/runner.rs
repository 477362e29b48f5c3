use std::{collections::HashMap, path::PathBuf, sync::Arc};

use serde::Serialize;
use sqlx::SqlitePool;
use strum_macros::Display;
use thiserror::Error;
use uuid::Uuid;

use openclaw_db::models::{
    Agent, AgentRole, Repository, Task, event::types as event_types,
};
use openclaw_executors::{
    AdapterConfig, AdapterError, PromptConvention, PromptInput, PromptRole, get_adapter,
};

use super::{
    events::EventStore,
    git::GitService,
    notify::ChangeBus,
    session::{SessionService, SessionServiceError},
    settings::Settings,
    team::TeamService,
};

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("agent not found")]
    AgentNotFound,
    #[error("task not found")]
    TaskNotFound,
    #[error("adapter '{name}' not available: {reason}")]
    AdapterUnavailable { name: String, reason: String },
    #[error(transparent)]
    Adapter(#[from] AdapterError),
    #[error(transparent)]
    Session(#[from] SessionServiceError),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RunStatus {
    Completed,
    Failed,
    Timeout,
}

#[derive(Debug, Clone)]
pub struct RunRequest {
    pub agent_id: Uuid,
    pub team_id: Option<Uuid>,
    pub task_id: Option<i64>,
    pub prompt_override: Option<String>,
    pub adapter_override: Option<String>,
}

impl RunRequest {
    pub fn new(agent_id: Uuid) -> Self {
        Self {
            agent_id,
            team_id: None,
            task_id: None,
            prompt_override: None,
            adapter_override: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    pub session_id: i64,
    pub status: RunStatus,
    pub exit_code: i32,
    pub duration_seconds: f64,
    pub error: Option<String>,
    pub adapter: String,
}

/// Orchestrates one agent turn end to end: adapter resolution, budget-gated
/// session, prompt build, subprocess run, outcome classification and event
/// fan-out. Stateless between calls, so it is safe to invoke from the
/// dispatcher or from a synchronous API endpoint.
#[derive(Clone)]
pub struct AgentRunner {
    pool: SqlitePool,
    bus: ChangeBus,
    settings: Arc<Settings>,
}

impl AgentRunner {
    pub fn new(pool: SqlitePool, bus: ChangeBus, settings: Arc<Settings>) -> Self {
        Self { pool, bus, settings }
    }

    pub async fn run_agent(&self, request: RunRequest) -> Result<RunOutcome, RunnerError> {
        let agent = Agent::find_by_id(&self.pool, request.agent_id)
            .await?
            .ok_or(RunnerError::AgentNotFound)?;

        let task = match request.task_id {
            Some(task_id) => Some(
                Task::find_by_id(&self.pool, task_id)
                    .await?
                    .ok_or(RunnerError::TaskNotFound)?,
            ),
            None => None,
        };

        let team_id = request.team_id.unwrap_or(agent.team_id);

        // Adapter precedence: explicit override, agent config, platform
        // default. Validation happens before any session exists so a broken
        // environment costs nothing.
        let adapter_name = request
            .adapter_override
            .clone()
            .or_else(|| agent.config.adapter.clone())
            .unwrap_or_else(|| self.settings.default_adapter.clone());
        let adapter = get_adapter(&adapter_name)?;
        let (valid, message) = adapter.validate_environment();
        if !valid {
            tracing::error!(adapter = %adapter_name, %message, "adapter validation failed");
            return Err(RunnerError::AdapterUnavailable {
                name: adapter_name,
                reason: message,
            });
        }

        let sessions = SessionService::new(self.pool.clone());
        let session = sessions
            .start_session(agent.id, request.task_id, Some(&agent.model))
            .await?;

        EventStore::append(
            &self.pool,
            &format!("agent:{}", agent.id),
            event_types::AGENT_RUN_STARTED,
            serde_json::json!({
                "agent_id": agent.id,
                "task_id": request.task_id,
                "adapter": adapter_name,
                "session_id": session.id,
            }),
        )
        .await?;

        let prompt = match &request.prompt_override {
            Some(prompt) => prompt.clone(),
            None => {
                let input = self.build_prompt_input(&agent, task.as_ref(), team_id).await?;
                adapter.build_prompt(&input)
            }
        };

        let working_directory = self.resolve_working_directory(task.as_ref()).await;
        let timeout_seconds = agent
            .config
            .timeout_seconds
            .unwrap_or(self.settings.agent_timeout_seconds);

        let mut env_overrides = HashMap::new();
        env_overrides.insert("OPENCLAW_API_URL".to_string(), self.settings.api_url());
        env_overrides.insert("OPENCLAW_AGENT_ID".to_string(), agent.id.to_string());
        env_overrides.insert("OPENCLAW_TEAM_ID".to_string(), team_id.to_string());
        if let Some(task_id) = request.task_id {
            env_overrides.insert("OPENCLAW_TASK_ID".to_string(), task_id.to_string());
        }

        let adapter_config = AdapterConfig {
            mcp_server_command: self.mcp_server_command(),
            api_url: self.settings.api_url(),
            working_directory,
            agent_id: agent.id,
            team_id,
            task_id: request.task_id,
            timeout_seconds,
            env_overrides,
        };

        tracing::info!(
            agent_id = %agent.id,
            adapter = %adapter_name,
            task_id = request.task_id,
            timeout_seconds,
            "running agent"
        );

        match adapter.run(&prompt, &adapter_config).await {
            Ok(result) => {
                let status = if result.timed_out() {
                    RunStatus::Timeout
                } else if result.ok() {
                    RunStatus::Completed
                } else {
                    RunStatus::Failed
                };

                sessions
                    .end_session(session.id, result.error.as_deref())
                    .await?;

                let event_type = match status {
                    RunStatus::Completed => event_types::AGENT_RUN_COMPLETED,
                    RunStatus::Failed => event_types::AGENT_RUN_FAILED,
                    RunStatus::Timeout => event_types::AGENT_RUN_TIMEOUT,
                };
                let payload = serde_json::json!({
                    "agent_id": agent.id,
                    "task_id": request.task_id,
                    "session_id": session.id,
                    "exit_code": result.exit_code,
                    "duration_seconds": (result.duration_seconds * 10.0).round() / 10.0,
                    "error": result.error,
                });
                EventStore::append(
                    &self.pool,
                    &format!("agent:{}", agent.id),
                    event_type,
                    payload.clone(),
                )
                .await?;

                let mut feed = payload;
                feed["type"] = serde_json::json!(event_type);
                self.bus.publish_team_event(team_id, feed);

                tracing::info!(
                    agent_id = %agent.id,
                    %status,
                    exit_code = result.exit_code,
                    duration_seconds = result.duration_seconds,
                    "agent run finished"
                );

                Ok(RunOutcome {
                    session_id: session.id,
                    status,
                    exit_code: result.exit_code,
                    duration_seconds: result.duration_seconds,
                    error: result.error,
                    adapter: adapter_name,
                })
            }
            Err(e) => {
                // Even on an unexpected adapter failure the session must be
                // closed and the agent returned to idle.
                tracing::error!(agent_id = %agent.id, error = %e, "agent run errored");
                let error_text = e.to_string();
                sessions.end_session(session.id, Some(&error_text)).await?;
                EventStore::append(
                    &self.pool,
                    &format!("agent:{}", agent.id),
                    event_types::AGENT_RUN_FAILED,
                    serde_json::json!({
                        "agent_id": agent.id,
                        "task_id": request.task_id,
                        "session_id": session.id,
                        "error": error_text,
                    }),
                )
                .await?;
                Err(e.into())
            }
        }
    }

    async fn build_prompt_input(
        &self,
        agent: &Agent,
        task: Option<&Task>,
        team_id: Uuid,
    ) -> Result<PromptInput, RunnerError> {
        let conventions = TeamService::new(self.pool.clone())
            .active_conventions(team_id)
            .await
            .map(|list| {
                list.into_iter()
                    .map(|c| PromptConvention {
                        key: c.key,
                        content: c.content,
                    })
                    .collect()
            })
            .unwrap_or_default();

        let context = task
            .map(|t| t.metadata.context.clone())
            .unwrap_or_default();

        Ok(PromptInput {
            task_title: task
                .map(|t| t.title.clone())
                .unwrap_or_else(|| "General work".to_string()),
            task_description: task.map(|t| t.description.clone()).unwrap_or_default(),
            agent_id: agent.id,
            team_id,
            task_id: task.map(|t| t.id).unwrap_or(0),
            role: match agent.role {
                AgentRole::Manager => PromptRole::Manager,
                AgentRole::Engineer => PromptRole::Engineer,
                AgentRole::Reviewer => PromptRole::Reviewer,
            },
            conventions,
            context,
        })
    }

    /// Prefer the task's worktree, fall back to the repository root, then to
    /// the process working directory.
    async fn resolve_working_directory(&self, task: Option<&Task>) -> PathBuf {
        if let Some(task) = task
            && let Some(&repo_id) = task.repo_ids.first()
            && let Ok(Some(repo)) = Repository::find_by_id(&self.pool, repo_id).await
        {
            let worktree = GitService::worktree_path(&repo, &task.branch);
            if worktree.exists() {
                return worktree;
            }
            return PathBuf::from(repo.local_path);
        }
        std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
    }

    /// Locate the tool-bridge entry point: explicit setting first, then the
    /// conventional monorepo locations next to the backend.
    fn mcp_server_command(&self) -> Vec<String> {
        if let Some(path) = &self.settings.mcp_server_path {
            return vec!["node".to_string(), path.clone()];
        }

        let candidates = [
            PathBuf::from("packages/mcp-server/dist/index.js"),
            PathBuf::from("../mcp-server/dist/index.js"),
        ];
        for candidate in &candidates {
            if candidate.exists() {
                return vec!["node".to_string(), candidate.display().to_string()];
            }
        }

        vec![
            "node".to_string(),
            "packages/mcp-server/dist/index.js".to_string(),
        ]
    }
}
