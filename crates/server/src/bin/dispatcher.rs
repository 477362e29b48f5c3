use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use openclaw_db::DBService;
use openclaw_services::{AgentRunner, ChangeBus, Dispatcher, DispatcherConfig, Settings};

/// Standalone dispatcher process. Shares only the database with the API
/// server, so it relies on the fallback poller rather than in-process
/// notifications; reconciliation and stuck-agent recovery run here too.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let settings = Arc::new(Settings::from_env());
    let db = DBService::new(&settings.database_url).await?;
    let bus = ChangeBus::new();

    let runner = AgentRunner::new(db.pool.clone(), bus.clone(), settings.clone());
    let dispatcher = Dispatcher::new(
        db.pool.clone(),
        bus,
        runner,
        DispatcherConfig {
            max_concurrent: settings.max_concurrent_agents,
            ..DispatcherConfig::default()
        },
    );

    let cancel = CancellationToken::new();
    let run = {
        let dispatcher = dispatcher.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { dispatcher.run(cancel).await })
    };

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down dispatcher");
    cancel.cancel();
    run.await?;

    Ok(())
}
