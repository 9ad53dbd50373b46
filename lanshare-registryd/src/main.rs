use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use lanshare_registryd::config::RegistryConfig;
use lanshare_registryd::server::RegistryState;
use lanshare_registryd::web;

#[tokio::main]
async fn main() -> Result<()> {
    let json_logs = std::env::var("LANSHARE_LOG_JSON").unwrap_or_default() == "1";
    let filter = EnvFilter::from_default_env().add_directive("lanshare_registryd=info".parse()?);
    if json_logs {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    let config = RegistryConfig::parse();
    tracing::info!(addr = %config.listen_addr, stale_after_secs = config.stale_after_secs, "starting rendezvous server");

    let state = Arc::new(RegistryState::new(&config));
    let app = web::router(state);

    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
