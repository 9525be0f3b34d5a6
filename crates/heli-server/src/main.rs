//! Heli Live server - live rotorcraft traffic for map viewports

use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use heli_server::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("heli_server=debug".parse()?)
                .add_directive("heli_upstream=info".parse()?),
        )
        .init();

    tracing::info!("Starting Heli Live server...");

    let config = Config::from_env();
    heli_server::run(config).await
}
