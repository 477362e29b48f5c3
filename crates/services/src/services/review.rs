use serde::Serialize;
use sqlx::SqlitePool;
use thiserror::Error;
use uuid::Uuid;

use openclaw_db::models::{
    ActorType, Agent, MergeJob, MergeStrategy, Review, ReviewComment, ReviewVerdict, ReviewerType,
    Task, TaskStatus, event::types as event_types,
};

use super::{
    events::EventStore,
    git::GitService,
    message::MessageService,
    notify::ChangeBus,
    pr::PrService,
    task::{TaskService, TaskServiceError},
};

#[derive(Debug, Error)]
pub enum ReviewServiceError {
    #[error("task not found")]
    TaskNotFound,
    #[error("review not found")]
    ReviewNotFound,
    #[error("review already has verdict: {0}")]
    AlreadyResolved(ReviewVerdict),
    #[error("cannot merge: task has no approved review")]
    MergeNotAllowed,
    #[error(transparent)]
    Task(#[from] TaskServiceError),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone, Serialize)]
pub struct ReviewWithComments {
    #[serde(flatten)]
    pub review: Review,
    pub comments: Vec<ReviewComment>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MergeStatus {
    pub task_id: i64,
    pub review_verdict: Option<ReviewVerdict>,
    pub review_attempt: i64,
    pub merge_jobs: Vec<MergeJob>,
    pub can_merge: bool,
}

/// The two-tier review pipeline. An agent reviewer gives the first pass;
/// `approve` from an agent leaves the task in `in_review` for the human
/// tier, while `request_changes` sends the comments straight back to the
/// assignee and re-opens the task.
#[derive(Clone)]
pub struct ReviewService {
    pool: SqlitePool,
    bus: ChangeBus,
}

impl ReviewService {
    pub fn new(pool: SqlitePool, bus: ChangeBus) -> Self {
        Self { pool, bus }
    }

    fn tasks(&self) -> TaskService {
        TaskService::new(self.pool.clone(), self.bus.clone())
    }

    fn messages(&self) -> MessageService {
        MessageService::new(self.pool.clone(), self.bus.clone())
    }

    /// Open review attempt N+1 for a task. With no reviewer given, an idle
    /// reviewer-role agent on the team is auto-assigned and messaged (which
    /// is what makes the dispatcher run it). Branch push and PR creation are
    /// best-effort and never fail the call.
    pub async fn request_review(
        &self,
        task_id: i64,
        reviewer_id: Option<Uuid>,
        reviewer_type: Option<ReviewerType>,
    ) -> Result<ReviewWithComments, ReviewServiceError> {
        let task = Task::find_by_id(&self.pool, task_id)
            .await?
            .ok_or(ReviewServiceError::TaskNotFound)?;

        let (reviewer_id, reviewer_type) = match reviewer_id {
            Some(id) => (Some(id), reviewer_type.unwrap_or(ReviewerType::User)),
            None => match Agent::find_idle_reviewer(&self.pool, task.team_id).await? {
                Some(agent) => (Some(agent.id), ReviewerType::Agent),
                None => (None, reviewer_type.unwrap_or(ReviewerType::User)),
            },
        };

        let mut tx = self.pool.begin().await?;
        let attempt = Review::max_attempt(&mut *tx, task_id).await? + 1;
        let review = Review::create(&mut *tx, task_id, attempt, reviewer_id, reviewer_type).await?;
        EventStore::append(
            &mut *tx,
            &format!("task:{task_id}"),
            event_types::REVIEW_CREATED,
            serde_json::json!({
                "review_id": review.id,
                "task_id": task_id,
                "attempt": attempt,
                "reviewer_id": reviewer_id,
                "reviewer_type": reviewer_type,
            }),
        )
        .await?;
        tx.commit().await?;

        self.auto_push_and_create_pr(&task).await;

        if reviewer_type == ReviewerType::Agent
            && let Some(reviewer) = reviewer_id
        {
            self.notify_reviewer_agent(&task, &review, reviewer).await;
        }

        self.get_review(review.id).await
    }

    /// Best-effort: push the task branch and open a PR. Failures are logged
    /// and swallowed; the review flow must not break on a missing remote or
    /// an unauthenticated gh.
    async fn auto_push_and_create_pr(&self, task: &Task) {
        let Some(&repo_id) = task.repo_ids.first() else {
            return;
        };

        let git = GitService::new(self.pool.clone());
        match git.push_branch(task.id, repo_id, false).await {
            Ok(result) if result.ok() => {}
            Ok(result) => {
                tracing::warn!(task_id = task.id, stderr = %result.stderr, "auto push failed");
                return;
            }
            Err(e) => {
                tracing::warn!(task_id = task.id, error = %e, "auto push errored");
                return;
            }
        }

        let pr = PrService::new(self.pool.clone());
        match pr.create_pr(task.id, repo_id, None, None, false, None).await {
            Ok(info) => {
                self.bus.publish_team_event(
                    task.team_id,
                    serde_json::json!({
                        "type": event_types::PR_CREATED,
                        "task_id": task.id,
                        "pr_url": info.pr_url,
                        "pr_number": info.pr_number,
                    }),
                );
            }
            Err(e) => {
                tracing::warn!(task_id = task.id, error = %e, "auto PR creation failed");
            }
        }
    }

    /// Message the reviewer agent so the dispatcher wakes it with the review
    /// context in its inbox.
    async fn notify_reviewer_agent(&self, task: &Task, review: &Review, reviewer_id: Uuid) {
        let content = format!(
            "## Code Review Request\n\n\
             Task #{}: {}\n\n\
             Review ID: {}\n\
             Attempt: {}\n\n\
             Please review the code changes and provide feedback.",
            task.id, task.title, review.id, review.attempt
        );
        let sender = task.assignee_id.unwrap_or(task.team_id);
        if let Err(e) = self
            .messages()
            .send_message(
                task.team_id,
                sender,
                ActorType::Agent,
                reviewer_id,
                ActorType::Agent,
                Some(task.id),
                &content,
            )
            .await
        {
            tracing::warn!(task_id = task.id, error = %e, "failed to message reviewer agent");
        }
    }

    pub async fn add_comment(
        &self,
        review_id: i64,
        author_id: Uuid,
        author_type: ReviewerType,
        content: &str,
        file_path: Option<&str>,
        line_number: Option<i64>,
    ) -> Result<ReviewComment, ReviewServiceError> {
        let review = Review::find_by_id(&self.pool, review_id)
            .await?
            .ok_or(ReviewServiceError::ReviewNotFound)?;

        let mut tx = self.pool.begin().await?;
        let comment = ReviewComment::create(
            &mut *tx,
            review_id,
            author_id,
            author_type,
            file_path,
            line_number,
            content,
        )
        .await?;
        EventStore::append(
            &mut *tx,
            &format!("task:{}", review.task_id),
            event_types::REVIEW_COMMENT_ADDED,
            serde_json::json!({
                "review_id": review_id,
                "comment_id": comment.id,
                "file_path": file_path,
                "line_number": line_number,
            }),
        )
        .await?;
        tx.commit().await?;
        Ok(comment)
    }

    /// Record a verdict. `request_changes` drives the feedback loop:
    /// the task goes back to `in_progress` and the assignee's inbox gets the
    /// rendered comments, which re-dispatches the engineer.
    pub async fn submit_verdict(
        &self,
        review_id: i64,
        verdict: ReviewVerdict,
        summary: Option<&str>,
        reviewer_id: Option<Uuid>,
        reviewer_type: Option<ReviewerType>,
    ) -> Result<ReviewWithComments, ReviewServiceError> {
        let existing = Review::find_by_id(&self.pool, review_id)
            .await?
            .ok_or(ReviewServiceError::ReviewNotFound)?;
        if let Some(current) = existing.verdict {
            return Err(ReviewServiceError::AlreadyResolved(current));
        }

        let mut tx = self.pool.begin().await?;
        let review =
            Review::set_verdict(&mut *tx, review_id, verdict, summary, reviewer_id, reviewer_type)
                .await?;
        EventStore::append(
            &mut *tx,
            &format!("task:{}", review.task_id),
            event_types::REVIEW_VERDICT,
            serde_json::json!({
                "review_id": review_id,
                "task_id": review.task_id,
                "verdict": verdict,
                "summary": summary,
                "reviewer_id": review.reviewer_id,
            }),
        )
        .await?;
        tx.commit().await?;

        match verdict {
            ReviewVerdict::RequestChanges => {
                self.handle_request_changes(&review, summary).await?;
            }
            ReviewVerdict::Approve if review.reviewer_type == ReviewerType::Agent => {
                // First tier passed; the task stays in in_review until a
                // human approves.
                tracing::info!(
                    task_id = review.task_id,
                    review_id,
                    "agent approved, awaiting human review"
                );
            }
            _ => {}
        }

        self.get_review(review_id).await
    }

    async fn handle_request_changes(
        &self,
        review: &Review,
        summary: Option<&str>,
    ) -> Result<(), ReviewServiceError> {
        let task = Task::find_by_id(&self.pool, review.task_id)
            .await?
            .ok_or(ReviewServiceError::TaskNotFound)?;
        let Some(assignee_id) = task.assignee_id else {
            tracing::warn!(task_id = task.id, "request_changes with no assignee to notify");
            return Ok(());
        };

        let comments = ReviewComment::list_for_review(&self.pool, review.id).await?;
        let feedback = render_feedback(review.attempt, summary, &comments);

        self.tasks()
            .change_status(review.task_id, TaskStatus::InProgress, review.reviewer_id)
            .await?;

        if let Err(e) = self
            .messages()
            .send_message(
                task.team_id,
                review.reviewer_id.unwrap_or(task.team_id),
                match review.reviewer_type {
                    ReviewerType::Agent => ActorType::Agent,
                    ReviewerType::User => ActorType::User,
                },
                assignee_id,
                ActorType::Agent,
                Some(review.task_id),
                &feedback,
            )
            .await
        {
            tracing::error!(task_id = task.id, error = %e, "failed to send review feedback");
        }

        EventStore::append(
            &self.pool,
            &format!("task:{}", review.task_id),
            event_types::REVIEW_FEEDBACK_SENT,
            serde_json::json!({
                "review_id": review.id,
                "task_id": review.task_id,
                "assignee_id": assignee_id,
                "comment_count": comments.len(),
            }),
        )
        .await?;

        Ok(())
    }

    pub async fn get_review(&self, review_id: i64) -> Result<ReviewWithComments, ReviewServiceError> {
        let review = Review::find_by_id(&self.pool, review_id)
            .await?
            .ok_or(ReviewServiceError::ReviewNotFound)?;
        let comments = ReviewComment::list_for_review(&self.pool, review_id).await?;
        Ok(ReviewWithComments { review, comments })
    }

    pub async fn list_reviews(
        &self,
        task_id: i64,
    ) -> Result<Vec<ReviewWithComments>, ReviewServiceError> {
        let reviews = Review::list_for_task(&self.pool, task_id).await?;
        let mut out = Vec::with_capacity(reviews.len());
        for review in reviews {
            let comments = ReviewComment::list_for_review(&self.pool, review.id).await?;
            out.push(ReviewWithComments { review, comments });
        }
        Ok(out)
    }

    pub async fn latest_review(&self, task_id: i64) -> Result<Option<Review>, ReviewServiceError> {
        Ok(Review::latest_for_task(&self.pool, task_id).await?)
    }

    /// Queue a merge job. Refused unless the latest review is an approval.
    pub async fn create_merge_job(
        &self,
        task_id: i64,
        repo_id: Uuid,
        strategy: MergeStrategy,
    ) -> Result<MergeJob, ReviewServiceError> {
        Task::find_by_id(&self.pool, task_id)
            .await?
            .ok_or(ReviewServiceError::TaskNotFound)?;

        let latest = Review::latest_for_task(&self.pool, task_id).await?;
        if latest.and_then(|r| r.verdict) != Some(ReviewVerdict::Approve) {
            return Err(ReviewServiceError::MergeNotAllowed);
        }

        let mut tx = self.pool.begin().await?;
        let job = MergeJob::create(&mut *tx, task_id, repo_id, strategy).await?;
        EventStore::append(
            &mut *tx,
            &format!("task:{task_id}"),
            event_types::MERGE_QUEUED,
            serde_json::json!({
                "merge_job_id": job.id,
                "task_id": task_id,
                "repo_id": repo_id,
                "strategy": strategy,
            }),
        )
        .await?;
        tx.commit().await?;
        Ok(job)
    }

    pub async fn merge_status(&self, task_id: i64) -> Result<MergeStatus, ReviewServiceError> {
        let latest = Review::latest_for_task(&self.pool, task_id).await?;
        let merge_jobs = MergeJob::list_for_task(&self.pool, task_id).await?;
        let verdict = latest.as_ref().and_then(|r| r.verdict);
        Ok(MergeStatus {
            task_id,
            review_verdict: verdict,
            review_attempt: latest.map(|r| r.attempt).unwrap_or(0),
            merge_jobs,
            can_merge: verdict == Some(ReviewVerdict::Approve),
        })
    }
}

/// Render the feedback message for the assignee. Each comment becomes one
/// `<file>:<line>: <content>` line (or `General: ...` for unanchored ones).
fn render_feedback(attempt: i64, summary: Option<&str>, comments: &[ReviewComment]) -> String {
    let mut lines = vec![format!("## Review Feedback (Attempt #{attempt})")];
    if let Some(summary) = summary {
        lines.push(format!("\n**Summary:** {summary}\n"));
    }
    if !comments.is_empty() {
        lines.push("**Comments to address:**".to_string());
        for comment in comments {
            let location = match (&comment.file_path, comment.line_number) {
                (Some(file), Some(line)) => format!("{file}:{line}"),
                (Some(file), None) => file.clone(),
                _ => "General".to_string(),
            };
            lines.push(format!("- {location}: {}", comment.content));
        }
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn comment(file: Option<&str>, line: Option<i64>, content: &str) -> ReviewComment {
        ReviewComment {
            id: 1,
            review_id: 1,
            author_id: Uuid::new_v4(),
            author_type: ReviewerType::Agent,
            file_path: file.map(str::to_string),
            line_number: line,
            content: content.to_string(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn feedback_header_names_the_attempt() {
        let text = render_feedback(3, Some("fix please"), &[]);
        assert!(text.starts_with("## Review Feedback (Attempt #3)"));
        assert!(text.contains("**Summary:** fix please"));
    }

    #[test]
    fn comments_render_with_file_and_line_anchors() {
        let comments = vec![
            comment(Some("a.py"), Some(3), "oops"),
            comment(None, None, "tests missing"),
        ];
        let text = render_feedback(1, None, &comments);
        assert!(text.contains("- a.py:3: oops"));
        assert!(text.contains("- General: tests missing"));
    }
}
