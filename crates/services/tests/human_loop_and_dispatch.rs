//! Human-in-the-loop rendezvous, expiry sweeps, change notifications and
//! dispatcher bookkeeping.

mod common;

use std::{sync::Arc, time::Duration};

use chrono::Utc;
use common::{seed_agent, seed_team, setup_db};

use openclaw_db::models::{
    ActorType, Agent, AgentStatus, HumanRequest, Message, RequestKind, RequestStatus,
};
use openclaw_services::{
    AgentRunner, ChangeBus, Dispatcher, DispatcherConfig, HumanLoopError, HumanLoopService,
    MessageService, Notification, Settings,
};

#[tokio::test]
async fn request_response_round_trip() {
    let (db, _dir) = setup_db().await;
    let (_, team) = seed_team(&db).await;
    let agent = seed_agent(&db, team.id, "asker", openclaw_db::models::AgentRole::Engineer).await;
    let human_loop = HumanLoopService::new(db.pool.clone(), ChangeBus::new());

    let request = human_loop
        .create_request(
            team.id,
            agent.id,
            RequestKind::Approval,
            "Ship to production?",
            None,
            &["approve".to_string(), "reject".to_string()],
            Some(60),
        )
        .await
        .expect("create");
    assert_eq!(request.status, RequestStatus::Pending);
    assert_eq!(request.options, vec!["approve", "reject"]);
    assert!(request.timeout_at.is_some());

    let resolved = human_loop
        .respond(request.id, "approve", None)
        .await
        .expect("respond");
    assert_eq!(resolved.status, RequestStatus::Resolved);
    assert_eq!(resolved.response.as_deref(), Some("approve"));
    assert!(resolved.resolved_at.is_some());

    // Double response is a conflict.
    let again = human_loop.respond(request.id, "reject", None).await;
    assert!(matches!(
        again,
        Err(HumanLoopError::AlreadyResolved(RequestStatus::Resolved))
    ));
}

#[tokio::test]
async fn response_emits_resolution_notification() {
    let (db, _dir) = setup_db().await;
    let (_, team) = seed_team(&db).await;
    let agent = seed_agent(&db, team.id, "asker", openclaw_db::models::AgentRole::Engineer).await;
    let bus = ChangeBus::new();
    let human_loop = HumanLoopService::new(db.pool.clone(), bus.clone());

    let request = human_loop
        .create_request(
            team.id,
            agent.id,
            RequestKind::Question,
            "Which database?",
            None,
            &[],
            None,
        )
        .await
        .expect("create");

    let mut rx = bus.subscribe();
    human_loop
        .respond(request.id, "postgres", None)
        .await
        .expect("respond");

    let notification = tokio::time::timeout(Duration::from_secs(1), async {
        loop {
            if let Ok(Notification::HumanRequestResolved {
                request_id,
                agent_id,
                status,
                ..
            }) = rx.recv().await
            {
                return (request_id, agent_id, status);
            }
        }
    })
    .await
    .expect("notification arrives");
    assert_eq!(notification, (request.id, agent.id, RequestStatus::Resolved));
}

#[tokio::test]
async fn stale_requests_expire_with_event_and_notification() {
    let (db, _dir) = setup_db().await;
    let (_, team) = seed_team(&db).await;
    let agent = seed_agent(&db, team.id, "waiter", openclaw_db::models::AgentRole::Engineer).await;
    let bus = ChangeBus::new();
    let human_loop = HumanLoopService::new(db.pool.clone(), bus.clone());

    // Already a minute past its deadline.
    let stale = HumanRequest::create(
        &db.pool,
        team.id,
        agent.id,
        None,
        RequestKind::Question,
        "anyone there?",
        &[],
        Some(Utc::now() - chrono::Duration::minutes(1)),
    )
    .await
    .expect("insert stale");

    // A pending request without deadline must survive the sweep.
    let durable = HumanRequest::create(
        &db.pool,
        team.id,
        agent.id,
        None,
        RequestKind::Question,
        "no deadline",
        &[],
        None,
    )
    .await
    .expect("insert durable");

    let mut rx = bus.subscribe();
    let expired = human_loop.expire_stale_requests().await.expect("sweep");
    assert_eq!(expired, 1);

    let reloaded = human_loop.get_request(stale.id).await.expect("reload");
    assert_eq!(reloaded.status, RequestStatus::Expired);
    let untouched = human_loop.get_request(durable.id).await.expect("reload");
    assert_eq!(untouched.status, RequestStatus::Pending);

    let events = openclaw_services::EventStore::read_stream(
        &db.pool,
        &format!("human_request:{}", stale.id),
        0,
        10,
    )
    .await
    .expect("events");
    assert!(events.iter().any(|e| e.event_type == "human_request.expired"));

    let got = tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("notification in time")
        .expect("recv");
    match got {
        Notification::HumanRequestResolved { request_id, status, .. } => {
            assert_eq!(request_id, stale.id);
            assert_eq!(status, RequestStatus::Expired);
        }
        other => panic!("unexpected notification: {other:?}"),
    }

    // Idempotent: a second sweep finds nothing.
    let expired = human_loop.expire_stale_requests().await.expect("second sweep");
    assert_eq!(expired, 0);
}

#[tokio::test]
async fn message_insert_notifies_and_inbox_is_newest_first() {
    let (db, _dir) = setup_db().await;
    let (_, team) = seed_team(&db).await;
    let sender = seed_agent(&db, team.id, "sender", openclaw_db::models::AgentRole::Manager).await;
    let recipient =
        seed_agent(&db, team.id, "recipient", openclaw_db::models::AgentRole::Engineer).await;
    let bus = ChangeBus::new();
    let messages = MessageService::new(db.pool.clone(), bus.clone());

    let mut rx = bus.subscribe();
    messages
        .send_message(
            team.id,
            sender.id,
            ActorType::Agent,
            recipient.id,
            ActorType::Agent,
            None,
            "first",
        )
        .await
        .expect("send first");
    let second = messages
        .send_message(
            team.id,
            sender.id,
            ActorType::Agent,
            recipient.id,
            ActorType::Agent,
            None,
            "second",
        )
        .await
        .expect("send second");

    let got = tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("notification in time")
        .expect("recv");
    match got {
        Notification::NewMessage {
            recipient_id,
            recipient_type,
            team_id,
            ..
        } => {
            assert_eq!(recipient_id, recipient.id);
            assert_eq!(recipient_type, ActorType::Agent);
            assert_eq!(team_id, team.id);
        }
        other => panic!("unexpected notification: {other:?}"),
    }

    let inbox = messages.get_inbox(recipient.id, true, 50).await.expect("inbox");
    assert_eq!(inbox.len(), 2);
    assert_eq!(inbox[0].id, second.id, "inbox is newest-first");

    // Processed messages drop out of the unprocessed view.
    messages.mark_processed(second.id).await.expect("mark");
    let inbox = messages.get_inbox(recipient.id, true, 50).await.expect("inbox again");
    assert_eq!(inbox.len(), 1);
    assert_eq!(inbox[0].content, "first");
    let full = messages.get_inbox(recipient.id, false, 50).await.expect("full inbox");
    assert_eq!(full.len(), 2);
}

#[tokio::test]
async fn poller_sees_idle_agents_with_unprocessed_messages() {
    let (db, _dir) = setup_db().await;
    let (_, team) = seed_team(&db).await;
    let sender = seed_agent(&db, team.id, "mgr", openclaw_db::models::AgentRole::Manager).await;
    let idle = seed_agent(&db, team.id, "idle-agent", openclaw_db::models::AgentRole::Engineer).await;
    let busy = seed_agent(&db, team.id, "busy-agent", openclaw_db::models::AgentRole::Engineer).await;
    Agent::set_status(&db.pool, busy.id, AgentStatus::Working)
        .await
        .expect("mark busy");

    let messages = MessageService::new(db.pool.clone(), ChangeBus::new());
    for recipient in [&idle, &busy] {
        messages
            .send_message(
                team.id,
                sender.id,
                ActorType::Agent,
                recipient.id,
                ActorType::Agent,
                None,
                "work to do",
            )
            .await
            .expect("send");
    }

    let pending = Message::pending_agent_recipients(&db.pool, 10)
        .await
        .expect("poll");
    let ids: Vec<_> = pending.iter().map(|p| p.agent_id).collect();
    assert!(ids.contains(&idle.id), "idle agent with mail is dispatchable");
    assert!(!ids.contains(&busy.id), "working agents are skipped");
}

#[tokio::test]
async fn dispatcher_skips_non_idle_agents_and_counts_it() {
    let (db, _dir) = setup_db().await;
    let (_, team) = seed_team(&db).await;
    let agent = seed_agent(&db, team.id, "busy", openclaw_db::models::AgentRole::Engineer).await;
    Agent::set_status(&db.pool, agent.id, AgentStatus::Working)
        .await
        .expect("mark busy");

    let bus = ChangeBus::new();
    let settings = Arc::new(Settings::default());
    let runner = AgentRunner::new(db.pool.clone(), bus.clone(), settings);
    let dispatcher = Dispatcher::new(
        db.pool.clone(),
        bus,
        runner,
        DispatcherConfig::default(),
    );

    dispatcher.dispatch(agent.id, team.id, "new_message").await;

    let stats = dispatcher.stats().await;
    assert_eq!(stats.dispatched, 0);
    assert_eq!(stats.skipped, 1);
    assert_eq!(stats.in_flight, 0);
    assert_eq!(stats.max_concurrent, 32);

    // The busy agent was not touched.
    let reloaded = Agent::find_by_id(&db.pool, agent.id)
        .await
        .expect("query")
        .expect("exists");
    assert_eq!(reloaded.status, AgentStatus::Working);
}

#[tokio::test]
async fn stuck_working_agents_are_reset_only_without_open_session() {
    let (db, _dir) = setup_db().await;
    let (_, team) = seed_team(&db).await;
    let stuck = seed_agent(&db, team.id, "stuck", openclaw_db::models::AgentRole::Engineer).await;
    let active = seed_agent(&db, team.id, "active", openclaw_db::models::AgentRole::Engineer).await;

    Agent::set_status(&db.pool, stuck.id, AgentStatus::Working)
        .await
        .expect("stuck working");

    // `active` has a genuinely open, recent session.
    let sessions = openclaw_services::SessionService::new(db.pool.clone());
    sessions
        .start_session(active.id, None, None)
        .await
        .expect("open session");

    let cutoff = Utc::now() - chrono::Duration::minutes(30);
    let reset = Agent::reset_stuck_working(&db.pool, cutoff).await.expect("sweep");
    assert_eq!(reset, 1);

    let stuck = Agent::find_by_id(&db.pool, stuck.id)
        .await
        .expect("query")
        .expect("exists");
    assert_eq!(stuck.status, AgentStatus::Idle);

    let active = Agent::find_by_id(&db.pool, active.id)
        .await
        .expect("query")
        .expect("exists");
    assert_eq!(active.status, AgentStatus::Working, "open session protects the agent");
}
