//! Slime Field Server - authoritative tile-world game server
//!
//! Entry point. It handles:
//! - loading the tile map into the collision index
//! - running the fixed-rate world simulation
//! - WebSocket connections for real-time play
//! - Supabase persistence of player progress

mod app;
mod config;
mod game;
mod http;
mod store;
mod util;
mod ws;

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::app::AppState;
use crate::config::Config;
use crate::game::{CollisionIndex, EnemySpawner, GameWorld};
use crate::http::build_router;
use crate::store::{PlayerStore, SupabaseClient};
use crate::util::time::init_server_time;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = Config::from_env()?;

    // Initialize tracing
    init_tracing(&config.log_level);

    // Initialize server time tracking
    init_server_time();

    info!("Starting Slime Field Server");
    info!("Server address: {}", config.server_addr);

    // The world cannot run without its map
    let collision = Arc::new(CollisionIndex::from_path(&config.map_path)?);

    let store = match (&config.supabase_url, &config.supabase_service_role_key) {
        (Some(url), Some(key)) => PlayerStore::supabase(SupabaseClient::new(url, key)),
        _ => {
            warn!("SUPABASE_URL not set, player progress is kept in memory only");
            PlayerStore::in_memory()
        }
    };

    // Spawning waits until the store has answered once
    let (ready_tx, ready_rx) = watch::channel(false);
    let probe_store = store.clone();
    tokio::spawn(async move {
        probe_store.wait_until_reachable(ready_tx).await;
    });

    let seed = config.seed.unwrap_or_else(rand::random);
    info!(seed, enemy_cap = config.enemy_cap, "Enemy spawner configured");
    let spawner = EnemySpawner::new(config.enemy_cap, seed);

    let (world, handle) = GameWorld::new(
        collision,
        spawner,
        config.spawn_interval,
        store.clone(),
        ready_rx,
    );
    tokio::spawn(world.run());

    // Build router
    let addr: SocketAddr = config.server_addr;
    let state = AppState::new(config, store, handle);
    let router = build_router(state);

    // Start server
    let listener = TcpListener::bind(addr).await?;

    info!("Server listening on {}", addr);
    info!("Health check: http://{}/health", addr);
    info!("WebSocket endpoint: ws://{}/ws", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(log_level: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install terminate handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        }
        _ = terminate => {
            info!("Received terminate signal, starting graceful shutdown");
        }
    }
}
