use std::sync::Arc;

use clap::Parser;
use expensedb::{
    config::{CliArgs, Config},
    http::{self, AppState},
    service::ExpenseService,
    storage, telemetry,
};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let cli = CliArgs::parse();
    let config = Config::load(&cli);
    telemetry::init_tracing(&config.logging)?;

    let metrics = telemetry::install_metrics_recorder()?;
    let addr = config.listen_addr()?;

    let storage_config = config.storage.clone();
    let storage = tokio::task::spawn_blocking(move || storage::open(&storage_config)).await??;

    let service = Arc::new(ExpenseService::new(storage.clone()));
    let app = http::router(AppState::new(service).with_metrics(metrics));

    tracing::info!(%addr, backend = ?config.storage.backend, "API listening");

    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // The postgres client owns a runtime of its own and must not be dropped
    // on an async worker.
    tokio::task::spawn_blocking(move || drop(storage)).await?;
    tracing::info!("Shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
