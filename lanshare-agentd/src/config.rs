use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use rand::RngCore;
use serde::Deserialize;

use lanshare_core::Config as CoreConfig;

/// CLI flags for the daemon launcher. Every tunable is optional here so a
/// value can instead come from `--config-file`'s TOML, with the built-in
/// [`lanshare_core::Config::default`] as the final fallback — CLI wins over
/// file, file wins over default.
#[derive(Parser, Debug, Clone)]
#[command(name = "lanshare-agentd", about = "LAN peer-presence and resource-coordination daemon")]
pub struct Args {
    /// Base username; a 4-hex random suffix is appended to disambiguate
    /// this process from any other instance of the same name on the LAN.
    #[arg(long)]
    pub username: Option<String>,

    /// Primary UDP port shared by presence, resource, and message traffic.
    #[arg(long)]
    pub port: Option<u16>,

    /// Optional rendezvous server base URL for cross-subnet discovery.
    #[arg(long)]
    pub registry_url: Option<String>,

    /// Workspace root holding each user's share tree and catalog file.
    #[arg(long)]
    pub workspace: Option<PathBuf>,

    /// Optional TOML file for persistent per-host settings.
    #[arg(long)]
    pub config_file: Option<PathBuf>,

    #[arg(long)]
    pub broadcast_interval_ms: Option<u64>,
    #[arg(long)]
    pub peer_timeout_ms: Option<u64>,
    #[arg(long)]
    pub heartbeat_interval_secs: Option<u64>,
    #[arg(long)]
    pub refresh_interval_ms: Option<u64>,
    #[arg(long)]
    pub sync_interval_secs: Option<u64>,
    #[arg(long)]
    pub http_timeout_secs: Option<u64>,
}

/// Mirror of the overridable fields, read from an optional TOML file (e.g.
/// a per-host `lanshare.toml` the user keeps outside version control).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FileConfig {
    pub username: Option<String>,
    pub port: Option<u16>,
    pub registry_url: Option<String>,
    pub workspace: Option<PathBuf>,
    pub broadcast_interval_ms: Option<u64>,
    pub peer_timeout_ms: Option<u64>,
    pub heartbeat_interval_secs: Option<u64>,
    pub refresh_interval_ms: Option<u64>,
    pub sync_interval_secs: Option<u64>,
    pub http_timeout_secs: Option<u64>,
}

impl FileConfig {
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }
}

/// The base username the operator chose, before the disambiguation suffix
/// is appended. Required either on the command line or in the config file.
pub fn base_username(args: &Args, file: &FileConfig) -> anyhow::Result<String> {
    args.username
        .clone()
        .or_else(|| file.username.clone())
        .ok_or_else(|| anyhow::anyhow!("--username is required (command line or config file)"))
}

/// Append a 4-hex random suffix to `base`, matching §3's invariant that
/// usernames are globally unique "by construction".
pub fn disambiguate(base: &str) -> String {
    let mut bytes = [0u8; 2];
    rand::thread_rng().fill_bytes(&mut bytes);
    format!("{base}#{}", hex::encode(bytes))
}

/// Build the [`lanshare_core::Config`] the engine runs from, applying CLI
/// > file > built-in-default precedence field by field.
pub fn build_core_config(args: &Args, file: &FileConfig, username: String) -> CoreConfig {
    let default = CoreConfig::default();
    CoreConfig {
        username,
        port: args.port.or(file.port).unwrap_or(default.port),
        broadcast_interval: args
            .broadcast_interval_ms
            .or(file.broadcast_interval_ms)
            .map(Duration::from_millis)
            .unwrap_or(default.broadcast_interval),
        peer_timeout: args
            .peer_timeout_ms
            .or(file.peer_timeout_ms)
            .map(Duration::from_millis)
            .unwrap_or(default.peer_timeout),
        heartbeat_interval: args
            .heartbeat_interval_secs
            .or(file.heartbeat_interval_secs)
            .map(Duration::from_secs)
            .unwrap_or(default.heartbeat_interval),
        refresh_interval: args
            .refresh_interval_ms
            .or(file.refresh_interval_ms)
            .map(Duration::from_millis)
            .unwrap_or(default.refresh_interval),
        sync_interval: args
            .sync_interval_secs
            .or(file.sync_interval_secs)
            .map(Duration::from_secs)
            .unwrap_or(default.sync_interval),
        http_timeout: args
            .http_timeout_secs
            .or(file.http_timeout_secs)
            .map(Duration::from_secs)
            .unwrap_or(default.http_timeout),
        workspace_root: args
            .workspace
            .clone()
            .or_else(|| file.workspace.clone())
            .unwrap_or(default.workspace_root),
        registry_url: args.registry_url.clone().or_else(|| file.registry_url.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_args() -> Args {
        Args {
            username: None,
            port: None,
            registry_url: None,
            workspace: None,
            config_file: None,
            broadcast_interval_ms: None,
            peer_timeout_ms: None,
            heartbeat_interval_secs: None,
            refresh_interval_ms: None,
            sync_interval_secs: None,
            http_timeout_secs: None,
        }
    }

    #[test]
    fn disambiguate_appends_four_hex_chars() {
        let name = disambiguate("alice");
        let (base, suffix) = name.split_once('#').unwrap();
        assert_eq!(base, "alice");
        assert_eq!(suffix.len(), 4);
        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn cli_value_wins_over_file_value() {
        let mut args = empty_args();
        args.port = Some(1111);
        let file = FileConfig {
            port: Some(2222),
            ..Default::default()
        };
        let config = build_core_config(&args, &file, "alice#0000".to_string());
        assert_eq!(config.port, 1111);
    }

    #[test]
    fn file_value_wins_over_built_in_default() {
        let args = empty_args();
        let file = FileConfig {
            port: Some(2222),
            ..Default::default()
        };
        let config = build_core_config(&args, &file, "alice#0000".to_string());
        assert_eq!(config.port, 2222);
    }

    #[test]
    fn missing_username_everywhere_is_an_error() {
        let args = empty_args();
        let file = FileConfig::default();
        assert!(base_username(&args, &file).is_err());
    }
}
