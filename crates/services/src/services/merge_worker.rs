use std::time::Duration;

use sqlx::SqlitePool;
use tokio_util::sync::CancellationToken;

use openclaw_db::models::{
    MergeJob, MergeStrategy, Repository, Task, TaskStatus, event::types as event_types,
};

use super::{
    events::EventStore,
    git::run_git,
    notify::{ChangeBus, Notification},
};

const GIT_TIMEOUT: Duration = Duration::from_secs(60);

/// Background loop that executes queued merge jobs:
/// queued -> running -> success (task done) | failed (task back to
/// in_progress). Claiming is a single atomic UPDATE, so any number of
/// workers can run against the same database.
pub struct MergeWorker {
    pool: SqlitePool,
    bus: ChangeBus,
    poll_interval: Duration,
}

impl MergeWorker {
    pub fn new(pool: SqlitePool, bus: ChangeBus) -> Self {
        Self {
            pool,
            bus,
            poll_interval: Duration::from_secs(5),
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub async fn run(&self, cancel: CancellationToken) {
        tracing::info!(
            poll_interval_secs = self.poll_interval.as_secs(),
            "merge worker started"
        );
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("merge worker stopping");
                    return;
                }
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
            if let Err(e) = self.process_one().await {
                tracing::error!(error = %e, "merge worker pass failed");
            }
        }
    }

    /// Claim and execute the next queued job, if any.
    pub async fn process_one(&self) -> Result<Option<MergeJob>, sqlx::Error> {
        let Some(job) = MergeJob::claim_next(&self.pool).await? else {
            return Ok(None);
        };
        let job = self.execute_job(job).await?;
        Ok(Some(job))
    }

    async fn execute_job(&self, job: MergeJob) -> Result<MergeJob, sqlx::Error> {
        EventStore::append(
            &self.pool,
            &format!("task:{}", job.task_id),
            event_types::MERGE_STARTED,
            serde_json::json!({
                "merge_job_id": job.id,
                "task_id": job.task_id,
                "strategy": job.strategy,
            }),
        )
        .await?;
        tracing::info!(merge_job_id = job.id, task_id = job.task_id, strategy = %job.strategy, "merge started");

        let task = Task::find_by_id(&self.pool, job.task_id).await?;
        let repo = Repository::find_by_id(&self.pool, job.repo_id).await?;
        let (Some(task), Some(repo)) = (task, repo) else {
            let failed = self
                .fail_job(&job, None, "task or repository not found")
                .await?;
            return Ok(failed);
        };

        let outcome = execute_strategy(
            job.strategy,
            &repo.local_path,
            &task.branch,
            &repo.default_branch,
        )
        .await;

        match outcome {
            Ok(()) => {
                let merge_commit = head_sha(&repo.local_path).await;
                let job = MergeJob::mark_success(&self.pool, job.id, &merge_commit).await?;

                let now = chrono::Utc::now();
                Task::set_status(&self.pool, task.id, TaskStatus::Done, Some(now)).await?;
                EventStore::append(
                    &self.pool,
                    &format!("task:{}", task.id),
                    event_types::MERGE_COMPLETED,
                    serde_json::json!({
                        "merge_job_id": job.id,
                        "task_id": task.id,
                        "merge_commit": merge_commit,
                        "strategy": job.strategy,
                    }),
                )
                .await?;
                self.bus.publish(Notification::TaskStatusChanged {
                    task_id: task.id,
                    team_id: task.team_id,
                    old_status: task.status,
                    new_status: TaskStatus::Done,
                });
                tracing::info!(merge_job_id = job.id, %merge_commit, "merge completed");
                Ok(job)
            }
            Err(error) => {
                let job = self.fail_job(&job, Some(&task), &error).await?;
                Ok(job)
            }
        }
    }

    async fn fail_job(
        &self,
        job: &MergeJob,
        task: Option<&Task>,
        error: &str,
    ) -> Result<MergeJob, sqlx::Error> {
        let failed = MergeJob::mark_failed(&self.pool, job.id, error).await?;

        // Regress the task so it can be fixed and re-queued.
        if let Some(task) = task {
            Task::set_status(&self.pool, task.id, TaskStatus::InProgress, None).await?;
            self.bus.publish(Notification::TaskStatusChanged {
                task_id: task.id,
                team_id: task.team_id,
                old_status: task.status,
                new_status: TaskStatus::InProgress,
            });
        }

        EventStore::append(
            &self.pool,
            &format!("task:{}", job.task_id),
            event_types::MERGE_FAILED,
            serde_json::json!({
                "merge_job_id": job.id,
                "task_id": job.task_id,
                "error": error,
                "strategy": job.strategy,
            }),
        )
        .await?;
        tracing::warn!(merge_job_id = job.id, error, "merge failed");
        Ok(failed)
    }
}

async fn head_sha(repo_path: &str) -> String {
    match run_git(repo_path, &["rev-parse", "HEAD"], GIT_TIMEOUT).await {
        Ok(result) if result.ok() => result.stdout.chars().take(40).collect(),
        _ => String::new(),
    }
}

async fn git_step(repo_path: &str, args: &[&str], context: &str) -> Result<(), String> {
    match run_git(repo_path, args, GIT_TIMEOUT).await {
        Ok(result) if result.ok() => Ok(()),
        Ok(result) => Err(format!("{context}: {}", result.stderr)),
        Err(e) => Err(format!("{context}: {e}")),
    }
}

/// Dispatch on the merge strategy. Conflicting merges and rebases are
/// aborted so the repository is left clean for the next attempt.
async fn execute_strategy(
    strategy: MergeStrategy,
    repo_path: &str,
    task_branch: &str,
    target_branch: &str,
) -> Result<(), String> {
    match strategy {
        MergeStrategy::Rebase => {
            git_step(
                repo_path,
                &["checkout", task_branch],
                &format!("checkout {task_branch}"),
            )
            .await?;
            if let Err(e) = git_step(
                repo_path,
                &["rebase", target_branch],
                &format!("rebase onto {target_branch}"),
            )
            .await
            {
                let _ = run_git(repo_path, &["rebase", "--abort"], GIT_TIMEOUT).await;
                return Err(e);
            }
            git_step(
                repo_path,
                &["checkout", target_branch],
                &format!("checkout {target_branch}"),
            )
            .await?;
            git_step(
                repo_path,
                &["merge", "--ff-only", task_branch],
                "fast-forward merge",
            )
            .await
        }
        MergeStrategy::Merge => {
            git_step(
                repo_path,
                &["checkout", target_branch],
                &format!("checkout {target_branch}"),
            )
            .await?;
            let message = format!("Merge '{task_branch}' into {target_branch}");
            if let Err(e) = git_step(
                repo_path,
                &["merge", "--no-ff", "-m", &message, task_branch],
                "merge",
            )
            .await
            {
                let _ = run_git(repo_path, &["merge", "--abort"], GIT_TIMEOUT).await;
                return Err(e);
            }
            Ok(())
        }
        MergeStrategy::Squash => {
            git_step(
                repo_path,
                &["checkout", target_branch],
                &format!("checkout {target_branch}"),
            )
            .await?;
            if let Err(e) = git_step(
                repo_path,
                &["merge", "--squash", task_branch],
                "squash merge",
            )
            .await
            {
                let _ = run_git(repo_path, &["merge", "--abort"], GIT_TIMEOUT).await;
                return Err(e);
            }
            let message = format!("Squash merge: {task_branch}");
            git_step(repo_path, &["commit", "-m", &message], "squash commit").await
        }
    }
}
