use std::sync::Arc;
use std::time::Duration;

use conduit_core::{spawn_sweeper, DrbgConfig, StoreConfig, DEFAULT_STATE_TTL};
use conduit_server::{router, PeerState};
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const DEFAULT_ADDR: &str = "0.0.0.0:5000";
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Get bind address from env or use default
    let addr = std::env::var("CONDUIT_SERVER_ADDR").unwrap_or_else(|_| DEFAULT_ADDR.to_string());

    let ttl = match std::env::var("CONDUIT_STATE_TTL_MINUTES") {
        Ok(raw) => match raw.trim().parse::<u64>() {
            Ok(minutes) if minutes > 0 => Duration::from_secs(minutes.saturating_mul(60)),
            _ => {
                error!("Invalid CONDUIT_STATE_TTL_MINUTES: {}", raw);
                std::process::exit(1);
            }
        },
        Err(_) => DEFAULT_STATE_TTL,
    };

    let state = Arc::new(PeerState::new(
        StoreConfig {
            ttl,
            max_entries: None,
        },
        DrbgConfig::default(),
    ));
    let _sweeper = spawn_sweeper(state.store().clone(), SWEEP_INTERVAL);

    // Bind TCP listener
    let listener = match TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            error!("Failed to bind to {}: {}", addr, e);
            std::process::exit(1);
        }
    };

    info!("Conduit peer listening on {}", addr);

    if let Err(e) = axum::serve(listener, router(state)).await {
        error!("Server error: {}", e);
        std::process::exit(1);
    }
}
