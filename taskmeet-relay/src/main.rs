//! taskmeet relay server -- signaling relay for call rooms.
//!
//! An axum WebSocket server that tracks room membership and host identity
//! and forwards handshake payloads between participants. It never sees
//! media; it only routes opaque bytes by connection id.
//!
//! # Usage
//!
//! ```bash
//! # Run on default address 0.0.0.0:9000
//! cargo run --bin taskmeet-relay
//!
//! # Run on custom address
//! cargo run --bin taskmeet-relay -- --bind 127.0.0.1:8080
//!
//! # Or via environment variable
//! RELAY_ADDR=127.0.0.1:8080 cargo run --bin taskmeet-relay
//! ```

use std::sync::Arc;

use clap::Parser;
use taskmeet_relay::config::{RelayCliArgs, RelayConfig};
use taskmeet_relay::relay::{self, RelayState};
use taskmeet_relay::rooms::RoomRegistry;

#[tokio::main]
async fn main() {
    let cli = RelayCliArgs::parse();

    // Load config from CLI args + config file + env vars + defaults.
    let config = match RelayConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            std::process::exit(1);
        }
    };

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    tracing::info!(addr = %config.bind_addr, "starting taskmeet relay server");

    let rooms = RoomRegistry::with_limits(config.max_rooms, config.max_participants);
    let state = Arc::new(RelayState::with_config(config.max_payload_size, rooms));

    match relay::start_server_with_state(&config.bind_addr, state).await {
        Ok((bound_addr, handle)) => {
            tracing::info!(addr = %bound_addr, "relay server listening");
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "relay server task failed");
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to start relay server");
            std::process::exit(1);
        }
    }
}
