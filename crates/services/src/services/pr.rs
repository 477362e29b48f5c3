use std::time::Duration;

use serde::Serialize;
use sqlx::SqlitePool;
use thiserror::Error;
use uuid::Uuid;

use openclaw_db::models::{Repository, Task, event::types as event_types};
use openclaw_utils::process::{CommandSpec, run_command};

use super::events::EventStore;

#[derive(Debug, Error)]
pub enum PrError {
    #[error("task not found")]
    TaskNotFound,
    #[error("repository not found")]
    RepoNotFound,
    #[error("gh CLI not found; install from https://cli.github.com")]
    GhUnavailable,
    #[error("gh pr create failed: {0}")]
    CreateFailed(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone, Serialize)]
pub struct PrInfo {
    pub pr_url: String,
    pub pr_number: i64,
}

/// Pull-request creation through the `gh` CLI. Keeps the dependency tree
/// light and rides on whatever GitHub auth the operator already has. The
/// resulting URL and number are persisted in the task metadata.
#[derive(Clone)]
pub struct PrService {
    pool: SqlitePool,
}

impl PrService {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn gh_available() -> bool {
        which::which("gh").is_ok()
    }

    pub async fn create_pr(
        &self,
        task_id: i64,
        repo_id: Uuid,
        title: Option<&str>,
        body: Option<&str>,
        draft: bool,
        base_branch: Option<&str>,
    ) -> Result<PrInfo, PrError> {
        let task = Task::find_by_id(&self.pool, task_id)
            .await?
            .ok_or(PrError::TaskNotFound)?;
        let repo = Repository::find_by_id(&self.pool, repo_id)
            .await?
            .ok_or(PrError::RepoNotFound)?;
        if !Self::gh_available() {
            return Err(PrError::GhUnavailable);
        }

        let pr_title = title.unwrap_or(&task.title).to_string();
        let description: String = task.description.chars().take(1000).collect();
        let pr_body = body
            .map(str::to_string)
            .unwrap_or_else(|| format!("OpenClaw Task #{}\n\n{}", task.id, description));
        let base = base_branch.unwrap_or(&repo.default_branch).to_string();

        let mut args = vec![
            "pr".to_string(),
            "create".to_string(),
            "--title".to_string(),
            pr_title,
            "--body".to_string(),
            pr_body,
            "--base".to_string(),
            base,
            "--head".to_string(),
            task.branch.clone(),
        ];
        if draft {
            args.push("--draft".to_string());
        }

        let output = run_command(
            CommandSpec::new("gh")
                .args(args)
                .cwd(&repo.local_path)
                .timeout(Duration::from_secs(30)),
        )
        .await?;

        if output.timed_out {
            return Err(PrError::CreateFailed("gh pr create timed out after 30s".into()));
        }
        let stdout = output.stdout.trim().to_string();
        if output.exit_code != 0 || stdout.is_empty() {
            let stderr = output.stderr.trim();
            return Err(PrError::CreateFailed(if stderr.is_empty() {
                format!("exit code {}", output.exit_code)
            } else {
                stderr.to_string()
            }));
        }

        // gh prints the PR URL on stdout, e.g. https://github.com/org/repo/pull/42
        let pr_url = stdout;
        let pr_number = pr_url
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .and_then(|s| s.parse().ok())
            .unwrap_or(0);

        let mut metadata = task.metadata.clone();
        metadata.pr_url = Some(pr_url.clone());
        metadata.pr_number = Some(pr_number);

        let mut tx = self.pool.begin().await?;
        Task::update_metadata(&mut *tx, task_id, &metadata).await?;
        EventStore::append(
            &mut *tx,
            &format!("task:{task_id}"),
            event_types::PR_CREATED,
            serde_json::json!({
                "task_id": task_id,
                "pr_url": pr_url,
                "pr_number": pr_number,
                "repo_id": repo_id,
                "branch": task.branch,
            }),
        )
        .await?;
        tx.commit().await?;

        tracing::info!(task_id, %pr_url, pr_number, "pull request created");
        Ok(PrInfo { pr_url, pr_number })
    }

    /// PR info previously stored on the task, if any.
    pub async fn pr_info(&self, task_id: i64) -> Result<Option<PrInfo>, PrError> {
        let task = Task::find_by_id(&self.pool, task_id)
            .await?
            .ok_or(PrError::TaskNotFound)?;
        Ok(task.metadata.pr_url.map(|pr_url| PrInfo {
            pr_url,
            pr_number: task.metadata.pr_number.unwrap_or(0),
        }))
    }
}
