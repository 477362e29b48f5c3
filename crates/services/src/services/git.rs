use std::{collections::BTreeMap, path::PathBuf, time::Duration};

use serde::Serialize;
use sqlx::SqlitePool;
use thiserror::Error;
use uuid::Uuid;

use openclaw_db::models::{Repository, Task};
use openclaw_utils::process::{CommandOutput, CommandSpec, run_command};

#[derive(Debug, Error)]
pub enum GitServiceError {
    #[error("task not found")]
    TaskNotFound,
    #[error("repository not found")]
    RepoNotFound,
    #[error("task has no branch name")]
    NoBranch,
    #[error("file not found: {0}")]
    FileNotFound(String),
    #[error("git {context} failed: {stderr}")]
    CommandFailed { context: String, stderr: String },
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

/// Result of a raw git invocation.
#[derive(Debug, Clone)]
pub struct GitResult {
    pub returncode: i32,
    pub stdout: String,
    pub stderr: String,
}

impl GitResult {
    pub fn ok(&self) -> bool {
        self.returncode == 0
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DiffFile {
    pub path: String,
    /// A=added, M=modified, D=deleted, R=renamed.
    pub status: String,
    pub additions: i64,
    pub deletions: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct WorktreeInfo {
    pub path: String,
    pub branch: String,
    pub exists: bool,
    pub repo_path: String,
    pub repo_name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CommitInfo {
    pub hash: String,
    pub author_name: String,
    pub author_email: String,
    pub message: String,
    pub date: String,
}

/// Run git through the shared subprocess contract.
pub async fn run_git(
    cwd: &str,
    args: &[&str],
    timeout: Duration,
) -> Result<GitResult, std::io::Error> {
    let output: CommandOutput = run_command(
        CommandSpec::new("git")
            .args(args.iter().map(|s| s.to_string()))
            .cwd(cwd)
            .timeout(timeout),
    )
    .await?;

    Ok(GitResult {
        returncode: output.exit_code,
        stdout: output.stdout.trim().to_string(),
        stderr: if output.timed_out {
            "git command timed out".to_string()
        } else {
            output.stderr.trim().to_string()
        },
    })
}

const GIT_TIMEOUT: Duration = Duration::from_secs(60);

/// Per-task worktrees, diff read models for reviewers, and branch pushes.
/// Every task gets its own branch; worktrees live under
/// `<repo>/.worktrees/<branch>/`.
#[derive(Clone)]
pub struct GitService {
    pool: SqlitePool,
}

impl GitService {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn load(&self, task_id: i64, repo_id: Uuid) -> Result<(Task, Repository), GitServiceError> {
        let task = Task::find_by_id(&self.pool, task_id)
            .await?
            .ok_or(GitServiceError::TaskNotFound)?;
        let repo = Repository::find_by_id(&self.pool, repo_id)
            .await?
            .ok_or(GitServiceError::RepoNotFound)?;
        if task.branch.is_empty() {
            return Err(GitServiceError::NoBranch);
        }
        Ok((task, repo))
    }

    pub fn worktree_path(repo: &Repository, branch: &str) -> PathBuf {
        PathBuf::from(&repo.local_path).join(".worktrees").join(branch)
    }

    /// Create the task's branch (from the default branch) and a worktree
    /// checkout for it. Idempotent: an existing worktree is returned as-is.
    pub async fn create_worktree(
        &self,
        task_id: i64,
        repo_id: Uuid,
    ) -> Result<WorktreeInfo, GitServiceError> {
        let (task, repo) = self.load(task_id, repo_id).await?;
        let worktree = Self::worktree_path(&repo, &task.branch);

        if worktree.exists() {
            return Ok(WorktreeInfo {
                path: worktree.display().to_string(),
                branch: task.branch,
                exists: true,
                repo_path: repo.local_path,
                repo_name: repo.name,
            });
        }

        let result = run_git(
            &repo.local_path,
            &["branch", &task.branch, &repo.default_branch],
            GIT_TIMEOUT,
        )
        .await?;
        if !result.ok() && !result.stderr.contains("already exists") {
            return Err(GitServiceError::CommandFailed {
                context: format!("branch {}", task.branch),
                stderr: result.stderr,
            });
        }

        let worktree_str = worktree.display().to_string();
        let result = run_git(
            &repo.local_path,
            &["worktree", "add", &worktree_str, &task.branch],
            GIT_TIMEOUT,
        )
        .await?;
        if !result.ok() {
            return Err(GitServiceError::CommandFailed {
                context: "worktree add".to_string(),
                stderr: result.stderr,
            });
        }

        Ok(WorktreeInfo {
            path: worktree_str,
            branch: task.branch,
            exists: true,
            repo_path: repo.local_path,
            repo_name: repo.name,
        })
    }

    pub async fn remove_worktree(
        &self,
        task_id: i64,
        repo_id: Uuid,
    ) -> Result<bool, GitServiceError> {
        let (task, repo) = self.load(task_id, repo_id).await?;
        let worktree = Self::worktree_path(&repo, &task.branch);
        if !worktree.exists() {
            return Ok(false);
        }
        let worktree_str = worktree.display().to_string();
        let result = run_git(
            &repo.local_path,
            &["worktree", "remove", &worktree_str, "--force"],
            GIT_TIMEOUT,
        )
        .await?;
        Ok(result.ok())
    }

    pub async fn worktree_info(
        &self,
        task_id: i64,
        repo_id: Uuid,
    ) -> Result<WorktreeInfo, GitServiceError> {
        let (task, repo) = self.load(task_id, repo_id).await?;
        let worktree = Self::worktree_path(&repo, &task.branch);
        Ok(WorktreeInfo {
            path: worktree.display().to_string(),
            exists: worktree.exists(),
            branch: task.branch,
            repo_path: repo.local_path,
            repo_name: repo.name,
        })
    }

    /// Full diff of the task branch against the default branch.
    pub async fn diff(&self, task_id: i64, repo_id: Uuid) -> Result<String, GitServiceError> {
        let (task, repo) = self.load(task_id, repo_id).await?;
        let range = format!("{}...{}", repo.default_branch, task.branch);
        let result = run_git(&repo.local_path, &["diff", &range], GIT_TIMEOUT).await?;
        if !result.ok() {
            return Err(GitServiceError::CommandFailed {
                context: format!("diff {range}"),
                stderr: result.stderr,
            });
        }
        Ok(result.stdout)
    }

    /// Changed files with status and add/delete counts, merged from
    /// `--numstat` and `--name-status`.
    pub async fn changed_files(
        &self,
        task_id: i64,
        repo_id: Uuid,
    ) -> Result<Vec<DiffFile>, GitServiceError> {
        let (task, repo) = self.load(task_id, repo_id).await?;
        let range = format!("{}...{}", repo.default_branch, task.branch);

        let numstat = run_git(
            &repo.local_path,
            &["diff", "--numstat", &range],
            GIT_TIMEOUT,
        )
        .await?;
        let name_status = run_git(
            &repo.local_path,
            &["diff", "--name-status", &range],
            GIT_TIMEOUT,
        )
        .await?;

        let mut counts: BTreeMap<String, (i64, i64)> = BTreeMap::new();
        for line in numstat.stdout.lines() {
            let parts: Vec<&str> = line.split('\t').collect();
            if parts.len() >= 3 {
                let adds = parts[0].parse().unwrap_or(0);
                let dels = parts[1].parse().unwrap_or(0);
                counts.insert(parts[2].to_string(), (adds, dels));
            }
        }

        let mut files = Vec::new();
        for line in name_status.stdout.lines() {
            let parts: Vec<&str> = line.split('\t').collect();
            if parts.len() >= 2 {
                let status = parts[0].chars().take(1).collect::<String>();
                let path = (*parts.last().unwrap_or(&"")).to_string();
                let (additions, deletions) = counts.get(&path).copied().unwrap_or((0, 0));
                files.push(DiffFile {
                    path,
                    status,
                    additions,
                    deletions,
                });
            }
        }
        Ok(files)
    }

    /// Read a file from the task branch without touching the worktree.
    pub async fn file_content(
        &self,
        task_id: i64,
        repo_id: Uuid,
        file_path: &str,
    ) -> Result<String, GitServiceError> {
        let (task, repo) = self.load(task_id, repo_id).await?;
        let spec = format!("{}:{}", task.branch, file_path);
        let result = run_git(&repo.local_path, &["show", &spec], GIT_TIMEOUT).await?;
        if !result.ok() {
            return Err(GitServiceError::FileNotFound(format!(
                "{file_path} on branch {}",
                task.branch
            )));
        }
        Ok(result.stdout)
    }

    pub async fn commit_log(
        &self,
        task_id: i64,
        repo_id: Uuid,
        limit: usize,
    ) -> Result<Vec<CommitInfo>, GitServiceError> {
        let (task, repo) = self.load(task_id, repo_id).await?;
        let range = format!("{}..{}", repo.default_branch, task.branch);
        let max_count = format!("--max-count={limit}");
        let result = run_git(
            &repo.local_path,
            &["log", &range, &max_count, "--format=%H|%an|%ae|%s|%aI"],
            GIT_TIMEOUT,
        )
        .await?;

        let mut commits = Vec::new();
        for line in result.stdout.lines() {
            let parts: Vec<&str> = line.splitn(5, '|').collect();
            if parts.len() == 5 {
                commits.push(CommitInfo {
                    hash: parts[0].to_string(),
                    author_name: parts[1].to_string(),
                    author_email: parts[2].to_string(),
                    message: parts[3].to_string(),
                    date: parts[4].to_string(),
                });
            }
        }
        Ok(commits)
    }

    /// Push the task branch. `--force-with-lease` rather than plain force so
    /// a stale local branch cannot clobber someone else's push.
    pub async fn push_branch(
        &self,
        task_id: i64,
        repo_id: Uuid,
        force: bool,
    ) -> Result<GitResult, GitServiceError> {
        let (task, repo) = self.load(task_id, repo_id).await?;
        let mut args = vec!["push"];
        if force {
            args.push("--force-with-lease");
        }
        args.push("origin");
        args.push(&task.branch);
        Ok(run_git(&repo.local_path, &args, GIT_TIMEOUT).await?)
    }
}
