//! `wds-server` entry point.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use wds_server::config::CONFIG_PATH_VAR;
use wds_server::{AppState, Backend, ServerConfig};

/// Waitlist and sponsor signup service.
#[derive(Debug, Parser)]
#[command(name = "wds-server", version)]
struct Cli {
    /// Address to listen on (overrides `bind` and $WDS_BIND).
    #[arg(long)]
    bind: Option<SocketAddr>,

    /// TOML configuration file (defaults to $WDS_CONFIG).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Record store backend.
    #[arg(long, value_enum)]
    backend: Option<Backend>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config_path = cli
        .config
        .or_else(|| std::env::var_os(CONFIG_PATH_VAR).map(PathBuf::from));

    let mut config =
        ServerConfig::load(config_path.as_deref()).context("failed to load configuration")?;
    if let Some(bind) = cli.bind {
        config.bind = bind;
    }
    if let Some(backend) = cli.backend {
        config.backend = backend;
    }
    if config.admin_key.is_none() {
        tracing::warn!("ADMIN_KEY is not set; /api/list will refuse every request");
    }
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        ?config,
        "wds-server starting"
    );

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.bind))?;
    let state = AppState::from_config(&config);

    wds_server::serve(listener, state, async {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("shutdown requested");
    })
    .await
    .context("server error")?;

    tracing::info!("wds-server exiting cleanly");
    Ok(())
}
