//! Periodic stick-command sender
//!
//! The drone holds position when stick frames stop arriving, so this loop
//! keeps sending the current sticks for as long as the session runs.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

use crate::controller::Commander;
use crate::telemetry::DataAggregator;

/// Send one stick frame per `period` while the link is acknowledged
///
/// Returns when `shutdown` changes or its sender is dropped.
pub async fn run(
    commander: Arc<Commander>,
    aggregator: Arc<DataAggregator>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!("Heartbeat started ({}ms)", period.as_millis());
    let mut sent: u64 = 0;

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = ticker.tick() => {
                if !aggregator.is_acknowledged() {
                    continue;
                }

                if let Err(e) = commander.send_stick_commands().await {
                    debug!("Failed to send stick frame: {}", e);
                    continue;
                }
                sent += 1;
            }
        }
    }

    info!(sent, "Heartbeat stopped");
}
