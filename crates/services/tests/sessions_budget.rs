//! Session lifecycle, budget enforcement and cost summaries.

mod common;

use common::{seed_agent, seed_agent_with_config, seed_team, setup_db, task_service};

use openclaw_db::models::{AgentConfig, AgentRole, AgentStatus, task::CreateTask};
use openclaw_services::{EventStore, SessionService, SessionServiceError, compute_cost};

fn cheap_agent_config() -> AgentConfig {
    AgentConfig {
        daily_cost_limit_usd: Some(0.01),
        ..AgentConfig::default()
    }
}

#[tokio::test]
async fn session_lifecycle_flips_agent_status() {
    let (db, _dir) = setup_db().await;
    let (_, team) = seed_team(&db).await;
    let agent = seed_agent(&db, team.id, "worker", AgentRole::Engineer).await;
    let sessions = SessionService::new(db.pool.clone());

    let session = sessions
        .start_session(agent.id, None, None)
        .await
        .expect("start");
    assert!(session.ended_at.is_none());
    assert_eq!(session.model.as_deref(), Some("claude-sonnet-4-20250514"));

    let agent_row = openclaw_db::models::Agent::find_by_id(&db.pool, agent.id)
        .await
        .expect("query")
        .expect("exists");
    assert_eq!(agent_row.status, AgentStatus::Working);

    let ended = sessions
        .end_session(session.id, Some("subprocess died"))
        .await
        .expect("end");
    assert!(ended.ended_at.is_some());
    assert_eq!(ended.error.as_deref(), Some("subprocess died"));

    let agent_row = openclaw_db::models::Agent::find_by_id(&db.pool, agent.id)
        .await
        .expect("query")
        .expect("exists");
    assert_eq!(agent_row.status, AgentStatus::Idle);
}

#[tokio::test]
async fn usage_accumulates_and_cost_matches_pure_function() {
    let (db, _dir) = setup_db().await;
    let (_, team) = seed_team(&db).await;
    let agent = seed_agent(&db, team.id, "counter", AgentRole::Engineer).await;
    let sessions = SessionService::new(db.pool.clone());

    let session = sessions.start_session(agent.id, None, None).await.expect("start");

    let after_first = sessions
        .record_usage(session.id, 1000, 500, 200, 100)
        .await
        .expect("first usage");
    assert_eq!(after_first.tokens_in, 1000);
    assert_eq!(after_first.tokens_out, 500);
    let expected = compute_cost("claude-sonnet-4-20250514", 1000, 500, 200, 100);
    assert!((after_first.cost_usd - expected).abs() < 1e-9);

    // Recording the same usage again doubles the totals.
    let after_second = sessions
        .record_usage(session.id, 1000, 500, 200, 100)
        .await
        .expect("second usage");
    assert_eq!(after_second.tokens_in, 2000);
    let expected = compute_cost("claude-sonnet-4-20250514", 2000, 1000, 400, 200);
    assert!((after_second.cost_usd - expected).abs() < 1e-9);

    // Zero usage changes nothing.
    let after_zero = sessions
        .record_usage(session.id, 0, 0, 0, 0)
        .await
        .expect("zero usage");
    assert_eq!(after_zero.tokens_in, after_second.tokens_in);
    assert!((after_zero.cost_usd - after_second.cost_usd).abs() < 1e-12);
}

#[tokio::test]
async fn budget_gate_blocks_second_session() {
    let (db, _dir) = setup_db().await;
    let (_, team) = seed_team(&db).await;
    let agent =
        seed_agent_with_config(&db, team.id, "spender", AgentRole::Engineer, cheap_agent_config())
            .await;
    let sessions = SessionService::new(db.pool.clone());

    // Burn $3 of input tokens against a $0.01 daily cap.
    let session = sessions.start_session(agent.id, None, None).await.expect("start");
    sessions
        .record_usage(session.id, 1_000_000, 0, 0, 0)
        .await
        .expect("usage");
    sessions.end_session(session.id, None).await.expect("end");

    let refused = sessions.start_session(agent.id, None, None).await;
    let violations = match refused {
        Err(SessionServiceError::BudgetExceeded { violations }) => violations,
        other => panic!("expected budget_exceeded, got {other:?}"),
    };
    assert!(violations.iter().any(|v| v.contains("daily limit")));

    // The refusal is audited.
    let events = EventStore::read_stream(&db.pool, &format!("agent:{}", agent.id), 0, 100)
        .await
        .expect("events");
    assert!(events.iter().any(|e| e.event_type == "agent.budget_exceeded"));

    // And no session was opened for the refused turn.
    let open = sessions
        .list_sessions(Some(agent.id), None, 50)
        .await
        .expect("list");
    assert_eq!(open.len(), 1);
}

#[tokio::test]
async fn per_task_budget_is_enforced_separately() {
    let (db, _dir) = setup_db().await;
    let (_, team) = seed_team(&db).await;
    let config = AgentConfig {
        task_cost_limit_usd: Some(0.01),
        ..AgentConfig::default()
    };
    let agent =
        seed_agent_with_config(&db, team.id, "task-capped", AgentRole::Engineer, config).await;
    let tasks = task_service(&db);
    let task = tasks
        .create_task(
            team.id,
            &CreateTask {
                title: "expensive".into(),
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
        .expect("task");
    let sessions = SessionService::new(db.pool.clone());

    let session = sessions
        .start_session(agent.id, Some(task.id), None)
        .await
        .expect("start");
    sessions
        .record_usage(session.id, 1_000_000, 0, 0, 0)
        .await
        .expect("usage");
    sessions.end_session(session.id, None).await.expect("end");

    // Same task: blocked.
    let refused = sessions.start_session(agent.id, Some(task.id), None).await;
    assert!(matches!(
        refused,
        Err(SessionServiceError::BudgetExceeded { .. })
    ));

    // Unrelated work (no task): the daily default cap is far away.
    sessions
        .start_session(agent.id, None, None)
        .await
        .expect("taskless session is fine");
}

#[tokio::test]
async fn cost_summary_buckets_by_agent_and_model() {
    let (db, _dir) = setup_db().await;
    let (_, team) = seed_team(&db).await;
    let a = seed_agent(&db, team.id, "agent-a", AgentRole::Engineer).await;
    let b = seed_agent(&db, team.id, "agent-b", AgentRole::Engineer).await;
    let sessions = SessionService::new(db.pool.clone());

    for agent in [&a, &b] {
        let session = sessions
            .start_session(agent.id, None, None)
            .await
            .expect("start");
        sessions
            .record_usage(session.id, 100_000, 10_000, 0, 0)
            .await
            .expect("usage");
        sessions.end_session(session.id, None).await.expect("end");
    }

    let summary = sessions.cost_summary(team.id, 7).await.expect("summary");
    assert_eq!(summary.session_count, 2);
    assert_eq!(summary.total_tokens_in, 200_000);
    assert_eq!(summary.total_tokens_out, 20_000);
    assert!(summary.total_cost_usd > 0.0);

    assert_eq!(summary.per_agent.len(), 2);
    let names: Vec<&str> = summary
        .per_agent
        .iter()
        .map(|row| row.agent_name.as_str())
        .collect();
    assert!(names.contains(&"agent-a") && names.contains(&"agent-b"));

    assert_eq!(summary.per_model.len(), 1);
    assert_eq!(
        summary.per_model[0].model.as_deref(),
        Some("claude-sonnet-4-20250514")
    );
    assert_eq!(summary.per_model[0].sessions, 2);
}
