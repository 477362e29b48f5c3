use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sqlx::SqlitePool;
use thiserror::Error;
use uuid::Uuid;

use openclaw_db::models::{
    Agent, AgentConfig, AgentStatus, Session,
    event::types as event_types,
    session::{AgentCostRow, ModelCostRow},
};

use super::events::EventStore;

/// USD per 1M tokens, keyed by model name.
struct ModelPricing {
    input: f64,
    output: f64,
    cache_read: f64,
    cache_write: f64,
}

const DEFAULT_PRICING: ModelPricing = ModelPricing {
    input: 3.0,
    output: 15.0,
    cache_read: 0.3,
    cache_write: 3.75,
};

fn pricing_for(model: &str) -> ModelPricing {
    match model {
        "claude-sonnet-4-20250514" => ModelPricing {
            input: 3.0,
            output: 15.0,
            cache_read: 0.3,
            cache_write: 3.75,
        },
        "claude-opus-4-20250514" => ModelPricing {
            input: 15.0,
            output: 75.0,
            cache_read: 1.5,
            cache_write: 18.75,
        },
        "claude-haiku-3-20250414" => ModelPricing {
            input: 0.25,
            output: 1.25,
            cache_read: 0.03,
            cache_write: 0.30,
        },
        _ => DEFAULT_PRICING,
    }
}

/// Pure cost function: Σ tokens × rate / 1M. Unknown models use the default
/// rate table.
pub fn compute_cost(
    model: &str,
    tokens_in: i64,
    tokens_out: i64,
    cache_read: i64,
    cache_write: i64,
) -> f64 {
    let p = pricing_for(model);
    (tokens_in as f64 * p.input
        + tokens_out as f64 * p.output
        + cache_read as f64 * p.cache_read
        + cache_write as f64 * p.cache_write)
        / 1_000_000.0
}

#[derive(Debug, Clone, Copy)]
pub struct BudgetLimits {
    pub max_output_per_turn: u64,
    pub daily_cost_limit_usd: f64,
    pub task_cost_limit_usd: f64,
}

impl Default for BudgetLimits {
    fn default() -> Self {
        Self {
            max_output_per_turn: 32_000,
            daily_cost_limit_usd: 50.0,
            task_cost_limit_usd: 20.0,
        }
    }
}

impl BudgetLimits {
    pub fn from_config(config: &AgentConfig) -> Self {
        let defaults = Self::default();
        Self {
            max_output_per_turn: config
                .max_output_per_turn
                .unwrap_or(defaults.max_output_per_turn),
            daily_cost_limit_usd: config
                .daily_cost_limit_usd
                .unwrap_or(defaults.daily_cost_limit_usd),
            task_cost_limit_usd: config
                .task_cost_limit_usd
                .unwrap_or(defaults.task_cost_limit_usd),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BudgetStatus {
    pub within_budget: bool,
    pub daily_spent_usd: f64,
    pub daily_limit_usd: f64,
    pub task_spent_usd: f64,
    pub task_limit_usd: f64,
    pub violations: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CostSummary {
    pub team_id: Uuid,
    pub period_days: i64,
    pub total_cost_usd: f64,
    pub total_tokens_in: i64,
    pub total_tokens_out: i64,
    pub session_count: i64,
    pub per_agent: Vec<AgentCostRow>,
    pub per_model: Vec<ModelCostRow>,
}

#[derive(Debug, Error)]
pub enum SessionServiceError {
    #[error("agent not found")]
    AgentNotFound,
    #[error("session not found")]
    SessionNotFound,
    #[error("budget exceeded: {}", violations.join(", "))]
    BudgetExceeded { violations: Vec<String> },
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

/// Session lifecycle and cost controls. A session is one bounded agent turn;
/// the budget gate runs before any session row exists, so a refused turn
/// costs nothing.
#[derive(Clone)]
pub struct SessionService {
    pool: SqlitePool,
}

impl SessionService {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Daily spend window starts at UTC midnight.
    fn today_start() -> DateTime<Utc> {
        let now = Utc::now();
        now.date_naive()
            .and_hms_opt(0, 0, 0)
            .map(|naive| naive.and_utc())
            .unwrap_or(now)
    }

    pub async fn check_budget(
        &self,
        agent: &Agent,
        task_id: Option<i64>,
    ) -> Result<BudgetStatus, SessionServiceError> {
        let limits = BudgetLimits::from_config(&agent.config);
        let mut violations = Vec::new();

        let daily_spent =
            Session::cost_for_agent_since(&self.pool, agent.id, Self::today_start()).await?;
        if daily_spent >= limits.daily_cost_limit_usd {
            violations.push(format!(
                "daily limit exceeded: ${daily_spent:.4} / ${:.2}",
                limits.daily_cost_limit_usd
            ));
        }

        let mut task_spent = 0.0;
        if let Some(task_id) = task_id {
            task_spent = Session::cost_for_task(&self.pool, task_id).await?;
            if task_spent >= limits.task_cost_limit_usd {
                violations.push(format!(
                    "task limit exceeded: ${task_spent:.4} / ${:.2}",
                    limits.task_cost_limit_usd
                ));
            }
        }

        Ok(BudgetStatus {
            within_budget: violations.is_empty(),
            daily_spent_usd: daily_spent,
            daily_limit_usd: limits.daily_cost_limit_usd,
            task_spent_usd: task_spent,
            task_limit_usd: limits.task_cost_limit_usd,
            violations,
        })
    }

    /// Open a session for an agent turn. Refuses with `BudgetExceeded` (and
    /// an `agent.budget_exceeded` event) when a cap is already hit; otherwise
    /// inserts the session, flips the agent to `working`, and appends
    /// `session.started`.
    pub async fn start_session(
        &self,
        agent_id: Uuid,
        task_id: Option<i64>,
        model: Option<&str>,
    ) -> Result<Session, SessionServiceError> {
        let agent = Agent::find_by_id(&self.pool, agent_id)
            .await?
            .ok_or(SessionServiceError::AgentNotFound)?;
        let effective_model = model.unwrap_or(&agent.model).to_string();

        let budget = self.check_budget(&agent, task_id).await?;
        if !budget.within_budget {
            EventStore::append(
                &self.pool,
                &format!("agent:{agent_id}"),
                event_types::AGENT_BUDGET_EXCEEDED,
                serde_json::json!({
                    "agent_id": agent_id,
                    "task_id": task_id,
                    "violations": budget.violations,
                }),
            )
            .await?;
            return Err(SessionServiceError::BudgetExceeded {
                violations: budget.violations,
            });
        }

        let mut tx = self.pool.begin().await?;
        let session = Session::create(&mut *tx, agent_id, task_id, Some(&effective_model)).await?;
        Agent::set_status(&mut *tx, agent_id, AgentStatus::Working).await?;
        EventStore::append(
            &mut *tx,
            &format!("agent:{agent_id}"),
            event_types::SESSION_STARTED,
            serde_json::json!({
                "session_id": session.id,
                "agent_id": agent_id,
                "task_id": task_id,
                "model": effective_model,
            }),
        )
        .await?;
        tx.commit().await?;
        Ok(session)
    }

    /// Add token deltas and recompute the cumulative cost from the new
    /// totals. Recording zero usage changes nothing.
    pub async fn record_usage(
        &self,
        session_id: i64,
        tokens_in: i64,
        tokens_out: i64,
        cache_read: i64,
        cache_write: i64,
    ) -> Result<Session, SessionServiceError> {
        let session = Session::find_by_id(&self.pool, session_id)
            .await?
            .ok_or(SessionServiceError::SessionNotFound)?;

        let model = session.model.as_deref().unwrap_or("");
        let cost = compute_cost(
            model,
            session.tokens_in + tokens_in,
            session.tokens_out + tokens_out,
            session.cache_read + cache_read,
            session.cache_write + cache_write,
        );

        let mut tx = self.pool.begin().await?;
        let session = Session::add_usage(
            &mut *tx,
            session_id,
            tokens_in,
            tokens_out,
            cache_read,
            cache_write,
            cost,
        )
        .await?;
        EventStore::append(
            &mut *tx,
            &format!("agent:{}", session.agent_id),
            event_types::SESSION_USAGE_RECORDED,
            serde_json::json!({
                "session_id": session_id,
                "tokens_in": tokens_in,
                "tokens_out": tokens_out,
                "cache_read": cache_read,
                "cache_write": cache_write,
                "total_cost_usd": session.cost_usd,
            }),
        )
        .await?;
        tx.commit().await?;
        Ok(session)
    }

    /// Close a session and set the agent back to idle. Safe to call from
    /// error paths; the runner guarantees this runs on every exit route.
    pub async fn end_session(
        &self,
        session_id: i64,
        error: Option<&str>,
    ) -> Result<Session, SessionServiceError> {
        let existing = Session::find_by_id(&self.pool, session_id)
            .await?
            .ok_or(SessionServiceError::SessionNotFound)?;

        let mut tx = self.pool.begin().await?;
        let session = Session::end(&mut *tx, session_id, error).await?;
        Agent::set_status(&mut *tx, existing.agent_id, AgentStatus::Idle).await?;
        EventStore::append(
            &mut *tx,
            &format!("agent:{}", existing.agent_id),
            event_types::SESSION_ENDED,
            serde_json::json!({
                "session_id": session_id,
                "agent_id": existing.agent_id,
                "task_id": existing.task_id,
                "tokens_in": session.tokens_in,
                "tokens_out": session.tokens_out,
                "cost_usd": session.cost_usd,
                "error": error,
            }),
        )
        .await?;
        tx.commit().await?;
        Ok(session)
    }

    pub async fn get_session(&self, session_id: i64) -> Result<Session, SessionServiceError> {
        Session::find_by_id(&self.pool, session_id)
            .await?
            .ok_or(SessionServiceError::SessionNotFound)
    }

    pub async fn list_sessions(
        &self,
        agent_id: Option<Uuid>,
        task_id: Option<i64>,
        limit: i64,
    ) -> Result<Vec<Session>, SessionServiceError> {
        Ok(Session::list(&self.pool, agent_id, task_id, limit).await?)
    }

    /// Aggregate team spend over the last `days` days: totals plus per-agent
    /// and per-model buckets.
    pub async fn cost_summary(
        &self,
        team_id: Uuid,
        days: i64,
    ) -> Result<CostSummary, SessionServiceError> {
        let since = Utc::now() - Duration::days(days);
        let (total_cost, tokens_in, tokens_out, session_count) =
            Session::team_totals_since(&self.pool, team_id, since).await?;
        let per_agent = Session::team_cost_per_agent(&self.pool, team_id, since).await?;
        let per_model = Session::team_cost_per_model(&self.pool, team_id, since).await?;

        Ok(CostSummary {
            team_id,
            period_days: days,
            total_cost_usd: total_cost,
            total_tokens_in: tokens_in,
            total_tokens_out: tokens_out,
            session_count,
            per_agent,
            per_model,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cost_is_linear_in_tokens() {
        let one = compute_cost("claude-sonnet-4-20250514", 1_000_000, 0, 0, 0);
        assert!((one - 3.0).abs() < 1e-9);
        let double = compute_cost("claude-sonnet-4-20250514", 2_000_000, 0, 0, 0);
        assert!((double - 2.0 * one).abs() < 1e-9);
        assert_eq!(compute_cost("claude-sonnet-4-20250514", 0, 0, 0, 0), 0.0);
    }

    #[test]
    fn unknown_model_uses_default_rates() {
        let got = compute_cost("mystery-model", 1_000_000, 1_000_000, 0, 0);
        assert!((got - 18.0).abs() < 1e-9);
    }

    #[test]
    fn opus_output_is_priced_higher() {
        let sonnet = compute_cost("claude-sonnet-4-20250514", 0, 1_000_000, 0, 0);
        let opus = compute_cost("claude-opus-4-20250514", 0, 1_000_000, 0, 0);
        assert!(opus > sonnet);
        assert!((opus - 75.0).abs() < 1e-9);
    }

    #[test]
    fn limits_fall_back_to_defaults() {
        let limits = BudgetLimits::from_config(&AgentConfig::default());
        assert_eq!(limits.daily_cost_limit_usd, 50.0);
        assert_eq!(limits.task_cost_limit_usd, 20.0);

        let configured = AgentConfig {
            daily_cost_limit_usd: Some(0.01),
            ..AgentConfig::default()
        };
        assert_eq!(BudgetLimits::from_config(&configured).daily_cost_limit_usd, 0.01);
    }
}
