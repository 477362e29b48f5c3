use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use openclaw_db::DBService;
use openclaw_server::AppState;
use openclaw_services::{
    AgentRunner, ChangeBus, Dispatcher, DispatcherConfig, MergeWorker, Settings,
};

/// API server. Also hosts an embedded dispatcher and merge worker so a
/// single process is a complete deployment; both can instead run standalone
/// (`openclaw-dispatcher`, `openclaw-merge-worker`) for crash isolation, in
/// which case they coordinate through the database alone.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let settings = Arc::new(Settings::from_env());
    let db = DBService::new(&settings.database_url).await?;
    let bus = ChangeBus::new();

    let cancel = CancellationToken::new();

    let runner = AgentRunner::new(db.pool.clone(), bus.clone(), settings.clone());
    let dispatcher = Dispatcher::new(
        db.pool.clone(),
        bus.clone(),
        runner,
        DispatcherConfig {
            max_concurrent: settings.max_concurrent_agents,
            ..DispatcherConfig::default()
        },
    );
    tokio::spawn({
        let cancel = cancel.clone();
        async move { dispatcher.run(cancel).await }
    });

    let merge_worker = MergeWorker::new(db.pool.clone(), bus.clone());
    tokio::spawn({
        let cancel = cancel.clone();
        async move { merge_worker.run(cancel).await }
    });

    let state = AppState::new(db, bus, settings.clone());
    let app = openclaw_server::router(state);

    let addr = format!("{}:{}", settings.host, settings.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "openclaw server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cancel))
        .await?;

    Ok(())
}

async fn shutdown_signal(cancel: CancellationToken) {
    if tokio::signal::ctrl_c().await.is_ok() {
        tracing::info!("shutdown signal received");
    }
    cancel.cancel();
}
