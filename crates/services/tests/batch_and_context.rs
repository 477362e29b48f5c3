//! Atomic batch creation with intra-batch dependencies, plus the context
//! carryover store.

mod common;

use common::{seed_team, setup_db, task_service};

use openclaw_db::models::{TaskStatus, task::CreateTask};
use openclaw_services::{BatchTaskDraft, TaskServiceError};

fn entry(title: &str, depends_on_indices: &[usize]) -> BatchTaskDraft {
    BatchTaskDraft {
        task: CreateTask {
            title: title.to_string(),
            description: String::new(),
            priority: None,
            assignee_id: None,
            dri_id: None,
            depends_on: Vec::new(),
            repo_ids: Vec::new(),
            tags: Vec::new(),
        },
        depends_on_indices: depends_on_indices.to_vec(),
    }
}

#[tokio::test]
async fn batch_resolves_indices_to_ids() {
    let (db, _dir) = setup_db().await;
    let (_, team) = seed_team(&db).await;
    let tasks = task_service(&db);

    let created = tasks
        .batch_create_tasks(
            team.id,
            &[
                entry("A", &[]),
                entry("B", &[0]),
                entry("C", &[0, 1]),
            ],
        )
        .await
        .expect("batch");

    assert_eq!(created.len(), 3);
    let (a, b, c) = (&created[0], &created[1], &created[2]);
    assert!(a.depends_on.is_empty());
    assert_eq!(b.depends_on, vec![a.id]);
    assert_eq!(c.depends_on, vec![a.id, b.id]);

    // DAG semantics over the resolved ids.
    tasks
        .change_status(a.id, TaskStatus::InProgress, None)
        .await
        .expect("a starts");
    let blocked = tasks.change_status(b.id, TaskStatus::InProgress, None).await;
    assert!(matches!(blocked, Err(TaskServiceError::DependencyBlocked(_))));

    for status in [
        TaskStatus::InReview,
        TaskStatus::InApproval,
        TaskStatus::Merging,
        TaskStatus::Done,
    ] {
        tasks.change_status(a.id, status, None).await.expect("a chain");
    }
    tasks
        .change_status(b.id, TaskStatus::InProgress, None)
        .await
        .expect("b starts");

    // C still blocked: B is not done.
    let blocked = tasks.change_status(c.id, TaskStatus::InProgress, None).await;
    assert!(matches!(blocked, Err(TaskServiceError::DependencyBlocked(_))));
}

#[tokio::test]
async fn forward_reference_fails_validation_and_creates_nothing() {
    let (db, _dir) = setup_db().await;
    let (_, team) = seed_team(&db).await;
    let tasks = task_service(&db);

    let result = tasks
        .batch_create_tasks(team.id, &[entry("A", &[1]), entry("B", &[])])
        .await;
    assert!(matches!(result, Err(TaskServiceError::Validation(_))));

    let listed = tasks
        .list_tasks(team.id, None, None, 100, 0)
        .await
        .expect("list");
    assert!(listed.is_empty(), "failed batch must not leave partial rows");
}

#[tokio::test]
async fn out_of_range_index_fails_validation() {
    let (db, _dir) = setup_db().await;
    let (_, team) = seed_team(&db).await;
    let tasks = task_service(&db);

    let result = tasks
        .batch_create_tasks(team.id, &[entry("A", &[]), entry("B", &[5])])
        .await;
    assert!(matches!(result, Err(TaskServiceError::Validation(_))));
}

#[tokio::test]
async fn context_is_append_or_overwrite_by_key() {
    let (db, _dir) = setup_db().await;
    let (_, team) = seed_team(&db).await;
    let tasks = task_service(&db);

    let task = tasks
        .create_task(
            team.id,
            &CreateTask {
                title: "Investigate payments".into(),
                description: String::new(),
                priority: None,
                assignee_id: None,
                dri_id: None,
                depends_on: Vec::new(),
                repo_ids: Vec::new(),
                tags: Vec::new(),
            },
        )
        .await
        .expect("create");

    tasks
        .save_context(task.id, "api", "uses REST")
        .await
        .expect("save first");
    tasks
        .save_context(task.id, "db", "postgres 15")
        .await
        .expect("save second");
    tasks
        .save_context(task.id, "api", "uses gRPC after all")
        .await
        .expect("overwrite");

    let context = tasks.read_context(task.id).await.expect("read");
    assert_eq!(context.len(), 2, "overwrite must not add a key");
    assert_eq!(context.get("api").map(String::as_str), Some("uses gRPC after all"));
    assert_eq!(context.get("db").map(String::as_str), Some("postgres 15"));

    // Unrelated mutations never clear the map.
    tasks
        .change_status(task.id, TaskStatus::InProgress, None)
        .await
        .expect("transition");
    let context = tasks.read_context(task.id).await.expect("re-read");
    assert_eq!(context.len(), 2);
}

#[tokio::test]
async fn empty_context_key_is_rejected() {
    let (db, _dir) = setup_db().await;
    let (_, team) = seed_team(&db).await;
    let tasks = task_service(&db);

    let task = tasks
        .create_task(
            team.id,
            &CreateTask {
                title: "t".into(),
                description: String::new(),
                priority: None,
                assignee_id: None,
                dri_id: None,
                depends_on: Vec::new(),
                repo_ids: Vec::new(),
                tags: Vec::new(),
            },
        )
        .await
        .expect("create");

    let result = tasks.save_context(task.id, "  ", "value").await;
    assert!(matches!(result, Err(TaskServiceError::Validation(_))));
}
