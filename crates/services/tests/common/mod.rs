//! Shared harness for service integration tests: a fresh SQLite database in
//! a temp directory plus seed helpers for the tenancy entities.
#![allow(dead_code)]

use tempfile::TempDir;
use uuid::Uuid;

use openclaw_db::{
    DBService,
    models::{Agent, AgentConfig, AgentRole, Organization, Team, TaskStatus},
};
use openclaw_services::{ChangeBus, TaskService, TeamService};

pub async fn setup_db() -> (DBService, TempDir) {
    let dir = TempDir::new().expect("create temp dir");
    let db = DBService::new_in_dir(dir.path())
        .await
        .expect("open test database");
    (db, dir)
}

pub async fn seed_team(db: &DBService) -> (Organization, Team) {
    let teams = TeamService::new(db.pool.clone());
    let suffix = Uuid::new_v4().simple().to_string();
    let org = teams
        .create_org("Acme", &format!("acme-{suffix}"))
        .await
        .expect("create org");
    let team = teams
        .create_team(org.id, "Core", &format!("core-{suffix}"))
        .await
        .expect("create team");
    (org, team)
}

pub async fn seed_agent(db: &DBService, team_id: Uuid, name: &str, role: AgentRole) -> Agent {
    seed_agent_with_config(db, team_id, name, role, AgentConfig::default()).await
}

pub async fn seed_agent_with_config(
    db: &DBService,
    team_id: Uuid,
    name: &str,
    role: AgentRole,
    config: AgentConfig,
) -> Agent {
    TeamService::new(db.pool.clone())
        .create_agent(team_id, name, role, "claude-sonnet-4-20250514", &config)
        .await
        .expect("create agent")
}

/// Walk a task through the full happy path to `done`.
pub async fn drive_to_done(tasks: &TaskService, task_id: i64) {
    for status in [
        TaskStatus::InProgress,
        TaskStatus::InReview,
        TaskStatus::InApproval,
        TaskStatus::Merging,
        TaskStatus::Done,
    ] {
        tasks
            .change_status(task_id, status, None)
            .await
            .expect("status chain step");
    }
}

/// A task service over a fresh bus (tests that do not care about
/// notifications).
pub fn task_service(db: &DBService) -> TaskService {
    TaskService::new(db.pool.clone(), ChangeBus::new())
}
