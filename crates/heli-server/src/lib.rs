//! Heli Live server: regional caching HTTP front end over one upstream provider.

pub mod api;
pub mod cache;
pub mod config;
pub mod loops;
pub mod state;
pub mod upstream;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::Router;
use tokio::sync::broadcast;

use crate::config::Config;
use crate::loops::cache_sweep_loop::{run_cache_sweep_loop, SweepSettings};
use crate::state::AppState;

/// Build state and router from configuration. The sweep loop is spawned here
/// and stops when `shutdown` fires.
pub fn build_app(config: &Config, shutdown: &broadcast::Sender<()>) -> Result<(Router, Arc<AppState>)> {
    let adapter = upstream::build_adapter(config)?;
    let state = Arc::new(AppState::from_config(config, adapter));

    tokio::spawn(run_cache_sweep_loop(
        state.cache().clone(),
        SweepSettings::from_config(config),
        shutdown.subscribe(),
    ));

    let app = api::routes().with_state(state.clone());
    Ok((app, state))
}

/// Serve until Ctrl-C, then signal background loops to stop.
pub async fn run(config: Config) -> Result<()> {
    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let (app, _state) = build_app(&config, &shutdown_tx)?;

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    tracing::info!(
        "Listening on {} (provider={}, ttl={:?}, precision={})",
        addr,
        config.provider,
        config.cache_ttl,
        config.cache_precision
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let signal_tx = shutdown_tx.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for Ctrl-C: {}", err);
                std::future::pending::<()>().await;
            }
            tracing::info!("Shutdown signal received");
            let _ = signal_tx.send(());
        })
        .await?;

    Ok(())
}
