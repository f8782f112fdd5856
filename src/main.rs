use std::sync::Arc;

use anyhow::{Context, Result};
use esim_stock::{
    build_router,
    clock::SystemClock,
    config::AppConfig,
    state::{AppState, open_store},
    telemetry::{SERVER_LOG_FILTER, init_tracing, shutdown_signal},
};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing(SERVER_LOG_FILTER).context("failed to install log subscriber")?;

    let config = AppConfig::from_env().context("failed to load application configuration")?;

    let store = open_store(&config)
        .await
        .context("failed to open inventory database")?;

    let addr = config.address();
    info!(
        upload_root = %config.upload_root().display(),
        qr_api_route = config.qr_uses_api_route(),
        cron_enabled = config.cron_secret.is_some(),
        "configuration loaded"
    );

    let app = build_router(AppState::new(config, store, Arc::new(SystemClock)));

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind to {addr}"))?;

    info!(address = %addr, "esim stock service started");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            shutdown_signal().await;
        })
        .await
        .context("server error")?;

    info!("esim stock service stopped");
    Ok(())
}
