mod config;
mod workspace;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use config::{Args, FileConfig};
use lanshare_core::Engine;

#[tokio::main]
async fn main() -> Result<()> {
    let json_logs = std::env::var("LANSHARE_LOG_JSON").unwrap_or_default() == "1";
    let filter = EnvFilter::from_default_env().add_directive("lanshare_agentd=info".parse()?);
    if json_logs {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    let args = Args::parse();
    let file = match &args.config_file {
        Some(path) => FileConfig::load(path)?,
        None => FileConfig::default(),
    };

    let base_username = config::base_username(&args, &file)?;
    let username = config::disambiguate(&base_username);
    let core_config = config::build_core_config(&args, &file, username.clone());

    tracing::info!(%username, port = core_config.port, registry_url = ?core_config.registry_url, "starting lanshare-agentd");

    let workspace_root = core_config.workspace_root.clone();
    workspace::clear(&workspace_root)?;

    let mut engine = Engine::with_default_transfer(core_config)?;
    engine.start();

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown signal received");

    engine.shutdown().await;
    workspace::clear(&workspace_root)?;

    Ok(())
}
