//! Rally match server.

use tracing::info;
use tracing_subscriber::EnvFilter;

mod balance;
mod config;
mod lobby;
mod registry;
mod session;
mod spawn;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Rally Match Server v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = config::Config::load()?;
    info!("Loaded configuration");
    info!("  Port: {}", config.server.port);
    info!("  Tick interval: {}ms", config.server.tick_interval_ms);
    info!(
        "  Capacity: {} players, {} spectators",
        config.session.max_players, config.session.max_spectators
    );

    // Start the session server
    session::run(config).await?;

    Ok(())
}
