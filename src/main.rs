//! # Regroup Service Entry Point
//!
//! Runs the HTTP API and the task worker in one process until Ctrl-C.

use std::sync::Arc;

use anyhow::Context;
use regroup::{
    config::ConfigLoader,
    db,
    server::{AppState, run_server},
    services::Services,
    telemetry,
};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ConfigLoader::new()
        .load()
        .context("loading configuration")?;
    telemetry::init_tracing(&config).context("initializing telemetry")?;
    config
        .require_operator_tokens()
        .context("validating operator tokens")?;

    tracing::info!(profile = %config.profile, "Loaded configuration");
    if let Ok(redacted) = config.redacted_json() {
        tracing::debug!(configuration = %redacted, "Effective configuration");
    }

    let db = db::init_pool(&config).await?;
    db::run_migrations(&db).await?;

    let services = Services::from_config(&config, db.clone());
    let worker = services.worker(&config, db.clone());

    let shutdown = CancellationToken::new();
    let worker_handle = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move { worker.run(shutdown).await })
    };

    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Shutdown requested");
            }
            shutdown.cancel();
        });
    }

    let state = AppState {
        config: Arc::new(config),
        db,
        queue: services.queue,
    };
    let served = run_server(state, shutdown.clone()).await;

    shutdown.cancel();
    if let Err(err) = worker_handle.await {
        tracing::error!(error = %err, "Worker task panicked");
    }

    served
}
