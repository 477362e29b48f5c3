use std::sync::Arc;

use openclaw_db::DBService;
use openclaw_services::{
    AgentRunner, ChangeBus, GitService, HumanLoopService, MessageService, PrService, ReviewService,
    SessionService, Settings, TaskService, TeamService,
};

/// Shared application state: database pool, change bus and settings, with
/// accessors constructing the (cheap, pool-cloning) services.
#[derive(Clone)]
pub struct AppState {
    pub db: DBService,
    pub bus: ChangeBus,
    pub settings: Arc<Settings>,
}

impl AppState {
    pub fn new(db: DBService, bus: ChangeBus, settings: Arc<Settings>) -> Self {
        Self { db, bus, settings }
    }

    pub fn teams(&self) -> TeamService {
        TeamService::new(self.db.pool.clone())
    }

    pub fn tasks(&self) -> TaskService {
        TaskService::new(self.db.pool.clone(), self.bus.clone())
    }

    pub fn messages(&self) -> MessageService {
        MessageService::new(self.db.pool.clone(), self.bus.clone())
    }

    pub fn sessions(&self) -> SessionService {
        SessionService::new(self.db.pool.clone())
    }

    pub fn human_loop(&self) -> HumanLoopService {
        HumanLoopService::new(self.db.pool.clone(), self.bus.clone())
    }

    pub fn reviews(&self) -> ReviewService {
        ReviewService::new(self.db.pool.clone(), self.bus.clone())
    }

    pub fn git(&self) -> GitService {
        GitService::new(self.db.pool.clone())
    }

    pub fn prs(&self) -> PrService {
        PrService::new(self.db.pool.clone())
    }

    pub fn runner(&self) -> AgentRunner {
        AgentRunner::new(
            self.db.pool.clone(),
            self.bus.clone(),
            self.settings.clone(),
        )
    }
}
