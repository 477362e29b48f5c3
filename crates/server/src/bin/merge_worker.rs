use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use openclaw_db::DBService;
use openclaw_services::{ChangeBus, MergeWorker, Settings};

/// Standalone merge worker. Several of these can run against the same
/// database; the atomic job claim keeps them from fighting over rows.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let settings = Settings::from_env();
    let db = DBService::new(&settings.database_url).await?;
    let worker = MergeWorker::new(db.pool.clone(), ChangeBus::new());

    let cancel = CancellationToken::new();
    let run = {
        let cancel = cancel.clone();
        tokio::spawn(async move { worker.run(cancel).await })
    };

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down merge worker");
    cancel.cancel();
    run.await?;

    Ok(())
}
