//! # Tello Link
//!
//! Connects to a Tello drone, keeps the link alive and logs telemetry.
//!
//! # Control Flow
//!
//! 1. **Initialization**
//!    - Load configuration (defaults if no path is given)
//!    - Set up logging with tracing subscriber
//!    - Bind the UDP socket and start the session
//!
//! 2. **Main Loop**
//!    - Log a JSON snapshot of the flight data every second
//!    - Handle Ctrl+C for graceful shutdown
//!
//! 3. **Graceful Shutdown**
//!    - Send land
//!    - Stop the receive loop and heartbeat
//!
//! # Examples
//!
//! ```bash
//! cargo run --release -- config.toml
//! ```

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::time::{interval, Duration};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use tello_link::config::Config;
use tello_link::session::TelloSession;
use tello_link::transport::UdpTransport;

/// Period between telemetry snapshots
const SNAPSHOT_INTERVAL_MS: u64 = 1000;

#[tokio::main]
async fn main() -> Result<()> {
    let config = match std::env::args().nth(1) {
        Some(path) => Config::load(&path)
            .with_context(|| format!("Failed to load configuration from {}", path))?,
        None => Config::default(),
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
        )
        .init();

    info!("Tello Link v{} starting...", env!("CARGO_PKG_VERSION"));

    let transport = UdpTransport::open(&config.network)
        .await
        .context("Failed to open UDP transport")?;
    info!("Connecting to drone at {}", transport.drone_addr());

    let mut session = TelloSession::new(Arc::new(transport), &config);
    session.on_log_version(|version| {
        info!("Drone log version: {}", String::from_utf8_lossy(version));
    });

    session
        .connect()
        .await
        .context("Failed to send connection request")?;

    if !session.wait_for_connection_default().await {
        session.shutdown().await;
        anyhow::bail!(
            "Drone at {} did not answer within {}s",
            config.network.drone_ip,
            config.session.connection_timeout_s
        );
    }

    info!("Press Ctrl+C to land and exit");
    let mut snapshot_interval = interval(Duration::from_millis(SNAPSHOT_INTERVAL_MS));

    loop {
        tokio::select! {
            _ = snapshot_interval.tick() => {
                match serde_json::to_string(&session.flight_data()) {
                    Ok(json) => info!(state = ?session.session_state(), "{}", json),
                    Err(e) => debug!("Failed to serialize flight data: {}", e),
                }
            }

            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, landing...");
                break;
            }
        }
    }

    if let Err(e) = session.land().await {
        warn!("Failed to send land: {}", e);
    }
    session.shutdown().await;

    let connection = session.connection_state();
    info!("Total datagrams received: {}", connection.datagrams_received);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_interval_constant() {
        assert_eq!(SNAPSHOT_INTERVAL_MS, 1000);
    }

    #[test]
    fn test_default_flight_data_serializes() {
        let record = tello_link::protocol::flight_data::FlightDataRecord::default();
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"battery_percentage\":0"));
        assert!(json.contains("\"alt_limit\":null"));
    }
}
