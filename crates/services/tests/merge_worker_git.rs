//! Merge worker tests against real git repositories in temp directories.

mod common;

use std::path::Path;

use common::{seed_team, setup_db, task_service};

use openclaw_db::models::{
    MergeJob, MergeJobStatus, MergeStrategy, Repository, Task, TaskStatus, task::CreateTask,
};
use openclaw_services::{ChangeBus, EventStore, MergeWorker, TaskService};

fn git(repo: &Path, args: &[&str]) {
    let output = std::process::Command::new("git")
        .args(args)
        .current_dir(repo)
        .output()
        .expect("run git");
    assert!(
        output.status.success(),
        "git {args:?} failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
}

fn write(repo: &Path, file: &str, content: &str) {
    std::fs::write(repo.join(file), content).expect("write file");
}

/// Init a repo on `main` with one commit.
fn init_repo(repo: &Path) {
    git(repo, &["init", "-b", "main"]);
    git(repo, &["config", "user.email", "worker@test.invalid"]);
    git(repo, &["config", "user.name", "Merge Worker Test"]);
    write(repo, "README.md", "hello\n");
    git(repo, &["add", "."]);
    git(repo, &["commit", "-m", "initial"]);
}

async fn seed_task_on_branch(
    db: &openclaw_db::DBService,
    tasks: &TaskService,
    team_id: uuid::Uuid,
    repo_path: &Path,
    repo_row: &Repository,
    title: &str,
) -> Task {
    let task = tasks
        .create_task(
            team_id,
            &CreateTask {
                title: title.to_string(),
                description: String::new(),
                priority: None,
                assignee_id: None,
                dri_id: None,
                depends_on: Vec::new(),
                repo_ids: vec![repo_row.id],
                tags: Vec::new(),
            },
        )
        .await
        .expect("create task");

    // Branch with one commit on top of main.
    git(repo_path, &["checkout", "-b", &task.branch]);
    write(repo_path, "feature.txt", &format!("work for {title}\n"));
    git(repo_path, &["add", "."]);
    git(repo_path, &["commit", "-m", "feature work"]);
    git(repo_path, &["checkout", "main"]);

    for status in [
        TaskStatus::InProgress,
        TaskStatus::InReview,
        TaskStatus::InApproval,
        TaskStatus::Merging,
    ] {
        tasks
            .change_status(task.id, status, None)
            .await
            .expect("advance task");
    }
    Task::find_by_id(&db.pool, task.id)
        .await
        .expect("query")
        .expect("exists")
}

#[tokio::test]
async fn rebase_merge_succeeds_and_completes_the_task() {
    let (db, _dir) = setup_db().await;
    let (_, team) = seed_team(&db).await;
    let repo_dir = tempfile::tempdir().expect("repo dir");
    init_repo(repo_dir.path());

    let repo = Repository::create(
        &db.pool,
        team.id,
        "api",
        &repo_dir.path().display().to_string(),
        "main",
    )
    .await
    .expect("register repo");

    let tasks = task_service(&db);
    let task = seed_task_on_branch(&db, &tasks, team.id, repo_dir.path(), &repo, "Add feature").await;

    MergeJob::create(&db.pool, task.id, repo.id, MergeStrategy::Rebase)
        .await
        .expect("queue job");

    let worker = MergeWorker::new(db.pool.clone(), ChangeBus::new());
    let job = worker
        .process_one()
        .await
        .expect("worker pass")
        .expect("claimed a job");

    assert_eq!(job.status, MergeJobStatus::Success);
    let sha = job.merge_commit.expect("merge commit recorded");
    assert_eq!(sha.len(), 40);
    assert!(sha.chars().all(|c| c.is_ascii_hexdigit()));

    let task = Task::find_by_id(&db.pool, task.id)
        .await
        .expect("query")
        .expect("exists");
    assert_eq!(task.status, TaskStatus::Done);
    assert!(task.completed_at.is_some());

    // main now contains the feature file.
    assert!(repo_dir.path().join("feature.txt").exists());

    let events = EventStore::read_stream(&db.pool, &format!("task:{}", task.id), 0, 100)
        .await
        .expect("events");
    let types: Vec<&str> = events.iter().map(|e| e.event_type.as_str()).collect();
    assert!(types.contains(&"merge.started"));
    assert!(types.contains(&"merge.completed"));
}

#[tokio::test]
async fn conflicting_rebase_fails_and_regresses_the_task() {
    let (db, _dir) = setup_db().await;
    let (_, team) = seed_team(&db).await;
    let repo_dir = tempfile::tempdir().expect("repo dir");
    init_repo(repo_dir.path());

    let repo = Repository::create(
        &db.pool,
        team.id,
        "api",
        &repo_dir.path().display().to_string(),
        "main",
    )
    .await
    .expect("register repo");

    let tasks = task_service(&db);
    let task = seed_task_on_branch(&db, &tasks, team.id, repo_dir.path(), &repo, "Conflict").await;

    // Conflicting change to the same file on main.
    write(repo_dir.path(), "feature.txt", "diverging content on main\n");
    git(repo_dir.path(), &["add", "."]);
    git(repo_dir.path(), &["commit", "-m", "conflicting main change"]);

    MergeJob::create(&db.pool, task.id, repo.id, MergeStrategy::Rebase)
        .await
        .expect("queue job");

    let worker = MergeWorker::new(db.pool.clone(), ChangeBus::new());
    let job = worker
        .process_one()
        .await
        .expect("worker pass")
        .expect("claimed a job");

    assert_eq!(job.status, MergeJobStatus::Failed);
    assert!(job.error.as_deref().is_some_and(|e| !e.is_empty()));
    assert!(job.merge_commit.is_none());

    let task = Task::find_by_id(&db.pool, task.id)
        .await
        .expect("query")
        .expect("exists");
    assert_eq!(task.status, TaskStatus::InProgress, "failed merge re-opens the task");

    let events = EventStore::read_stream(&db.pool, &format!("task:{}", task.id), 0, 100)
        .await
        .expect("events");
    assert!(events.iter().any(|e| e.event_type == "merge.failed"));

    // The repository is left clean for the next attempt.
    let status = std::process::Command::new("git")
        .args(["status", "--porcelain"])
        .current_dir(repo_dir.path())
        .output()
        .expect("git status");
    assert!(String::from_utf8_lossy(&status.stdout).trim().is_empty());
}

#[tokio::test]
async fn squash_strategy_produces_single_commit() {
    let (db, _dir) = setup_db().await;
    let (_, team) = seed_team(&db).await;
    let repo_dir = tempfile::tempdir().expect("repo dir");
    init_repo(repo_dir.path());

    let repo = Repository::create(
        &db.pool,
        team.id,
        "api",
        &repo_dir.path().display().to_string(),
        "main",
    )
    .await
    .expect("register repo");

    let tasks = task_service(&db);
    let task = seed_task_on_branch(&db, &tasks, team.id, repo_dir.path(), &repo, "Squashed").await;

    MergeJob::create(&db.pool, task.id, repo.id, MergeStrategy::Squash)
        .await
        .expect("queue job");

    let worker = MergeWorker::new(db.pool.clone(), ChangeBus::new());
    let job = worker
        .process_one()
        .await
        .expect("worker pass")
        .expect("claimed a job");
    assert_eq!(job.status, MergeJobStatus::Success);

    let log = std::process::Command::new("git")
        .args(["log", "-1", "--format=%s"])
        .current_dir(repo_dir.path())
        .output()
        .expect("git log");
    let subject = String::from_utf8_lossy(&log.stdout);
    assert_eq!(subject.trim(), format!("Squash merge: {}", task.branch));
}

#[tokio::test]
async fn empty_queue_claims_nothing() {
    let (db, _dir) = setup_db().await;
    let worker = MergeWorker::new(db.pool.clone(), ChangeBus::new());
    let claimed = worker.process_one().await.expect("worker pass");
    assert!(claimed.is_none());
}

#[tokio::test]
async fn each_job_is_claimed_exactly_once() {
    let (db, _dir) = setup_db().await;
    let (_, team) = seed_team(&db).await;
    let repo = Repository::create(&db.pool, team.id, "api", "/tmp/missing", "main")
        .await
        .expect("repo");
    let tasks = task_service(&db);
    let task = tasks
        .create_task(
            team.id,
            &CreateTask {
                title: "claim test".into(),
                description: String::new(),
                priority: None,
                assignee_id: None,
                dri_id: None,
                depends_on: Vec::new(),
                repo_ids: vec![repo.id],
                tags: Vec::new(),
            },
        )
        .await
        .expect("task");

    MergeJob::create(&db.pool, task.id, repo.id, MergeStrategy::Merge)
        .await
        .expect("queue");

    let first = MergeJob::claim_next(&db.pool).await.expect("claim");
    assert!(first.is_some());
    let second = MergeJob::claim_next(&db.pool).await.expect("second claim");
    assert!(second.is_none(), "a running job must not be claimable again");
}
