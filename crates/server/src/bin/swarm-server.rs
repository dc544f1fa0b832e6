//! Process entry point: loads configuration, starts the coordination
//! server, and shuts down cleanly on Ctrl-C.

use anyhow::Result;
use clap::Parser;
use swarm_common::CoreConfig;
use swarm_server::{build_router, AppState};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "swarm-server")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Coordination server for multi-agent projects")]
struct Cli {
    /// Path to a TOML configuration file. Missing fields fall back to
    /// defaults; environment variables override whatever is loaded.
    #[arg(short, long)]
    config: Option<String>,

    /// Override the bind address from the config file.
    #[arg(long)]
    bind_addr: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    let mut config = match cli.config {
        Some(path) => CoreConfig::from_file(&path)?,
        None => CoreConfig::default(),
    };
    config = config.apply_env_overrides();
    if let Some(bind_addr) = cli.bind_addr {
        config.bind_addr = bind_addr;
    }
    config.validate()?;

    tracing::info!(bind_addr = %config.bind_addr, data_dir = %config.data_dir, "starting coordination server");

    let state = AppState::new(config.clone());
    state.registry.clone().spawn_idle_sweep();

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    let router = build_router(state);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
