mod bootstrap;
mod config;
mod discovery;
mod eligibility;
mod error;
mod gateway;
mod lists;
mod monitor;
mod reclaim;
mod report;
mod scheduler;
mod store;

#[cfg(test)]
mod testutil;

use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// Initialize logging and tracing
fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,rent_reaper=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    info!("🚀 Starting Sponsored-Account Rent Reclaim Service");

    dotenv::dotenv().ok();
    let config = config::Config::from_env();

    let app = bootstrap::initialize_app(&config).await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = app.scheduler.clone().start(shutdown_rx);

    tokio::signal::ctrl_c().await?;
    info!("🛑 Shutdown signal received, finishing in-flight cycle...");

    shutdown_tx.send(true)?;
    handle.await?;

    info!("👋 Shutdown complete");
    Ok(())
}
