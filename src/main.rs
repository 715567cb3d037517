//! # groupcast
//!
//! Server binary: loads settings, initializes logging, and serves the
//! WebSocket hub until Ctrl+C.

#![deny(unsafe_code)]

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use groupcast_server::GroupcastServer;
use groupcast_settings::GroupcastSettings;

/// WebSocket echo and group broadcast server.
#[derive(Parser, Debug)]
#[command(name = "groupcast", version, about = "WebSocket echo and group broadcast server")]
struct Cli {
    /// Settings file (defaults to `~/.groupcast/settings.json`).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,
}

impl Cli {
    /// Load settings and apply command-line overrides on top.
    fn settings(&self) -> Result<GroupcastSettings> {
        let path = self
            .config
            .clone()
            .unwrap_or_else(groupcast_settings::settings_path);
        let mut settings = groupcast_settings::load_settings_from_path(&path)
            .with_context(|| format!("Failed to load settings from {}", path.display()))?;
        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        Ok(settings)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    let settings = args.settings()?;

    groupcast_logging::init_logging(&settings.logging).context("Failed to initialize logging")?;

    let server = GroupcastServer::new(settings);
    let (addr, handle) = server.listen().await.context("Failed to bind server")?;
    tracing::info!(
        group = %server.settings().app.group,
        queue_capacity = server.settings().server.queue_capacity,
        "groupcast listening on http://{addr}"
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutting down...");
    if !server.shutdown_gracefully().await {
        tracing::warn!("some sessions did not finish before the shutdown timeout");
    }
    let _ = handle.await;

    tracing::info!("Shutdown complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_overrides() {
        let cli = Cli::parse_from(["groupcast", "--host", "0.0.0.0", "--port", "9000"]);
        assert_eq!(cli.host.as_deref(), Some("0.0.0.0"));
        assert_eq!(cli.port, Some(9000));
        assert!(cli.config.is_none());
    }

    #[test]
    fn cli_defaults_are_empty() {
        let cli = Cli::parse_from(["groupcast"]);
        assert!(cli.host.is_none());
        assert!(cli.port.is_none());
    }

    #[test]
    fn cli_rejects_bad_port() {
        assert!(Cli::try_parse_from(["groupcast", "--port", "70000"]).is_err());
    }

    #[test]
    fn cli_verifies() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
