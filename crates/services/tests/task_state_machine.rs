//! State machine and DAG enforcement tests over a real database.

mod common;

use common::{drive_to_done, seed_agent, seed_team, setup_db, task_service};

use openclaw_db::models::{AgentRole, TaskStatus, task::CreateTask};
use openclaw_services::TaskServiceError;

fn draft(title: &str) -> CreateTask {
    CreateTask {
        title: title.to_string(),
        description: String::new(),
        priority: None,
        assignee_id: None,
        dri_id: None,
        depends_on: Vec::new(),
        repo_ids: Vec::new(),
        tags: Vec::new(),
    }
}

#[tokio::test]
async fn full_lifecycle_without_dependencies() {
    let (db, _dir) = setup_db().await;
    let (_, team) = seed_team(&db).await;
    let tasks = task_service(&db);

    let task = tasks
        .create_task(team.id, &draft("Fix login"))
        .await
        .expect("create");
    assert_eq!(task.status, TaskStatus::Todo);
    assert!(task.branch.starts_with(&format!("task-{}-fix-login", task.id)));
    assert!(task.completed_at.is_none());

    drive_to_done(&tasks, task.id).await;

    let done = tasks.get_task(task.id).await.expect("reload");
    assert_eq!(done.status, TaskStatus::Done);
    assert!(done.completed_at.is_some());

    // Event stream: task.created then five status changes, in order.
    let events = tasks.task_events(task.id).await.expect("events");
    let types: Vec<&str> = events.iter().map(|e| e.event_type.as_str()).collect();
    assert_eq!(types[0], "task.created");
    assert_eq!(
        types[1..],
        ["task.status_changed"; 5],
        "expected five transitions, got {types:?}"
    );
    let hops: Vec<(String, String)> = events[1..]
        .iter()
        .map(|e| {
            (
                e.data["from"].as_str().unwrap_or_default().to_string(),
                e.data["to"].as_str().unwrap_or_default().to_string(),
            )
        })
        .collect();
    assert_eq!(
        hops,
        [
            ("todo", "in_progress"),
            ("in_progress", "in_review"),
            ("in_review", "in_approval"),
            ("in_approval", "merging"),
            ("merging", "done"),
        ]
        .map(|(a, b)| (a.to_string(), b.to_string()))
    );
}

#[tokio::test]
async fn every_off_graph_transition_is_rejected() {
    let (db, _dir) = setup_db().await;
    let (_, team) = seed_team(&db).await;
    let tasks = task_service(&db);

    let all = [
        TaskStatus::Todo,
        TaskStatus::InProgress,
        TaskStatus::InReview,
        TaskStatus::InApproval,
        TaskStatus::Merging,
        TaskStatus::Done,
        TaskStatus::Cancelled,
    ];

    // One fresh task per attempted (from, to) pair; walking each task to the
    // `from` state first.
    for from in all {
        for to in all {
            if from == to || from.can_transition_to(to) {
                continue;
            }
            let task = tasks
                .create_task(team.id, &draft("probe"))
                .await
                .expect("create");
            walk_to(&tasks, task.id, from).await;
            let result = tasks.change_status(task.id, to, None).await;
            assert!(
                matches!(result, Err(TaskServiceError::InvalidTransition { .. })),
                "expected invalid_transition for {from} -> {to}"
            );
        }
    }
}

async fn walk_to(tasks: &openclaw_services::TaskService, task_id: i64, target: TaskStatus) {
    let path: &[TaskStatus] = match target {
        TaskStatus::Todo => &[],
        TaskStatus::InProgress => &[TaskStatus::InProgress],
        TaskStatus::InReview => &[TaskStatus::InProgress, TaskStatus::InReview],
        TaskStatus::InApproval => &[
            TaskStatus::InProgress,
            TaskStatus::InReview,
            TaskStatus::InApproval,
        ],
        TaskStatus::Merging => &[
            TaskStatus::InProgress,
            TaskStatus::InReview,
            TaskStatus::InApproval,
            TaskStatus::Merging,
        ],
        TaskStatus::Done => &[
            TaskStatus::InProgress,
            TaskStatus::InReview,
            TaskStatus::InApproval,
            TaskStatus::Merging,
            TaskStatus::Done,
        ],
        TaskStatus::Cancelled => &[TaskStatus::Cancelled],
    };
    for status in path {
        tasks
            .change_status(task_id, *status, None)
            .await
            .expect("walk step");
    }
}

#[tokio::test]
async fn dependencies_block_start_until_done() {
    let (db, _dir) = setup_db().await;
    let (_, team) = seed_team(&db).await;
    let tasks = task_service(&db);

    let a = tasks.create_task(team.id, &draft("A")).await.expect("a");
    let mut b_draft = draft("B");
    b_draft.depends_on = vec![a.id];
    let b = tasks.create_task(team.id, &b_draft).await.expect("b");

    // B cannot start while A is merely in progress.
    tasks
        .change_status(a.id, TaskStatus::InProgress, None)
        .await
        .expect("start a");
    let blocked = tasks.change_status(b.id, TaskStatus::InProgress, None).await;
    assert!(matches!(blocked, Err(TaskServiceError::DependencyBlocked(_))));

    // Finish A; B may now start.
    for status in [
        TaskStatus::InReview,
        TaskStatus::InApproval,
        TaskStatus::Merging,
        TaskStatus::Done,
    ] {
        tasks.change_status(a.id, status, None).await.expect("finish a");
    }
    tasks
        .change_status(b.id, TaskStatus::InProgress, None)
        .await
        .expect("b starts after a done");
}

#[tokio::test]
async fn cancelled_dependency_still_blocks() {
    let (db, _dir) = setup_db().await;
    let (_, team) = seed_team(&db).await;
    let tasks = task_service(&db);

    let dep = tasks.create_task(team.id, &draft("doomed")).await.expect("dep");
    tasks
        .change_status(dep.id, TaskStatus::Cancelled, None)
        .await
        .expect("cancel");

    let mut dependent = draft("dependent");
    dependent.depends_on = vec![dep.id];
    let task = tasks.create_task(team.id, &dependent).await.expect("create");

    let result = tasks.change_status(task.id, TaskStatus::InProgress, None).await;
    assert!(
        matches!(result, Err(TaskServiceError::DependencyBlocked(_))),
        "a cancelled dependency is not done"
    );
}

#[tokio::test]
async fn missing_dependency_blocks() {
    let (db, _dir) = setup_db().await;
    let (_, team) = seed_team(&db).await;
    let tasks = task_service(&db);

    let mut d = draft("orphan");
    d.depends_on = vec![999_999];
    let task = tasks.create_task(team.id, &d).await.expect("create");

    let result = tasks.change_status(task.id, TaskStatus::InProgress, None).await;
    assert!(matches!(result, Err(TaskServiceError::DependencyBlocked(_))));
}

#[tokio::test]
async fn assignment_is_recorded_with_an_event() {
    let (db, _dir) = setup_db().await;
    let (_, team) = seed_team(&db).await;
    let engineer = seed_agent(&db, team.id, "dev-1", AgentRole::Engineer).await;
    let tasks = task_service(&db);

    let task = tasks.create_task(team.id, &draft("wire up")).await.expect("create");
    let task = tasks.assign_task(task.id, engineer.id).await.expect("assign");
    assert_eq!(task.assignee_id, Some(engineer.id));

    let events = tasks.task_events(task.id).await.expect("events");
    assert!(events.iter().any(|e| e.event_type == "task.assigned"));
}

#[tokio::test]
async fn actor_id_is_optional_but_recorded() {
    let (db, _dir) = setup_db().await;
    let (_, team) = seed_team(&db).await;
    let engineer = seed_agent(&db, team.id, "dev-2", AgentRole::Engineer).await;
    let tasks = task_service(&db);

    let task = tasks.create_task(team.id, &draft("audited")).await.expect("create");
    tasks
        .change_status(task.id, TaskStatus::InProgress, Some(engineer.id))
        .await
        .expect("with actor");

    let events = tasks.task_events(task.id).await.expect("events");
    let change = events
        .iter()
        .find(|e| e.event_type == "task.status_changed")
        .expect("status event");
    assert_eq!(
        change.data["actor_id"].as_str(),
        Some(engineer.id.to_string().as_str())
    );
}

#[tokio::test]
async fn terminal_states_reject_everything() {
    let (db, _dir) = setup_db().await;
    let (_, team) = seed_team(&db).await;
    let tasks = task_service(&db);

    let task = tasks.create_task(team.id, &draft("finished")).await.expect("create");
    drive_to_done(&tasks, task.id).await;

    for target in [TaskStatus::Todo, TaskStatus::InProgress, TaskStatus::Cancelled] {
        let result = tasks.change_status(task.id, target, None).await;
        assert!(matches!(
            result,
            Err(TaskServiceError::InvalidTransition { .. })
        ));
    }
}
