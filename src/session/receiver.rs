//! # Receive Loop
//!
//! Polls the transport, classifies each datagram and publishes the decoded
//! result into the [`DataAggregator`].
//!
//! A bad datagram is logged and dropped. Nothing short of shutdown ends the
//! loop.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{sleep, Instant};
use tracing::{debug, error, info, trace, warn};

use crate::config::SessionConfig;
use crate::controller::Commander;
use crate::error::Result;
use crate::protocol::decoder::{classify, Inbound};
use crate::protocol::log_data::LogStreamDecoder;
use crate::telemetry::DataAggregator;
use crate::transport::{DroneTransport, MAX_DATAGRAM_SIZE};

/// State owned by the receive task
pub struct Receiver {
    transport: Arc<dyn DroneTransport>,
    commander: Arc<Commander>,
    aggregator: Arc<DataAggregator>,
    log_decoder: LogStreamDecoder,
    frame_counter: u32,
    receive_poll: Duration,
    disconnect_timeout: Duration,
    disconnect_backoff: Duration,
}

impl Receiver {
    pub fn new(
        transport: Arc<dyn DroneTransport>,
        commander: Arc<Commander>,
        aggregator: Arc<DataAggregator>,
        config: &SessionConfig,
    ) -> Self {
        Self {
            transport,
            commander,
            aggregator,
            log_decoder: LogStreamDecoder::new(),
            frame_counter: 0,
            receive_poll: config.receive_poll(),
            disconnect_timeout: config.disconnect_timeout(),
            disconnect_backoff: config.disconnect_backoff(),
        }
    }

    /// Run until `shutdown` changes or its sender is dropped
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
        info!("Receive loop started");

        loop {
            let pause = tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                pause = self.poll_once(&mut buf) => pause,
            };

            if pause.is_zero() {
                continue;
            }

            tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                _ = sleep(pause) => {}
            }
        }

        info!(
            datagrams = self.aggregator.connection().datagrams_received,
            "Receive loop stopped"
        );
    }

    /// Handle at most one datagram and return how long to wait before the next poll
    async fn poll_once(&mut self, buf: &mut [u8]) -> Duration {
        let len = match self.transport.recv(buf).await {
            Ok(len) => len,
            Err(e) => {
                warn!("Receive failed: {}", e);
                return self.receive_poll;
            }
        };

        if len == 0 {
            if self
                .aggregator
                .check_link_timeout(Instant::now(), self.disconnect_timeout)
            {
                warn!(
                    "No data from drone for over {}ms, disconnected",
                    self.disconnect_timeout.as_millis()
                );
                return self.disconnect_backoff;
            }
            return self.receive_poll;
        }

        let datagram = &buf[..len];
        trace!(len, "Received {:02X?}", datagram);
        if let Err(e) = self.handle_datagram(datagram).await {
            error!(len, "Dropping datagram: {}", e);
        }
        Duration::ZERO
    }

    /// Classify and dispatch one datagram
    ///
    /// # Errors
    ///
    /// Returns decode errors for malformed datagrams and I/O errors from
    /// replies sent in response.
    pub async fn handle_datagram(&mut self, datagram: &[u8]) -> Result<()> {
        self.aggregator.record_datagram(Instant::now());

        match classify(datagram)? {
            Inbound::ConnAck => {
                debug!("Connection acknowledgment received");
                self.on_acknowledged().await;
            }
            Inbound::FlightStatus(payload) => self.aggregator.update_flight_status(payload)?,
            Inbound::Wifi { strength } => self.aggregator.set_wifi_strength(strength),
            Inbound::AltLimit(limit) => self.aggregator.set_alt_limit(limit),
            Inbound::AttitudeLimit(limit) => self.aggregator.set_attitude_limit(limit),
            Inbound::LowBatteryThreshold(threshold) => {
                self.aggregator.set_low_battery_threshold(threshold)
            }
            Inbound::PowerOnTimer(timer) => self.aggregator.set_power_on_timer(timer),
            Inbound::LogHeader(header) => {
                let log_id = header.log_id;
                self.aggregator.set_log_header(header);
                self.commander.send_log_header_ack(log_id).await?;
            }
            Inbound::LogData(data) => {
                // The drone may resume an earlier session without a fresh ack
                self.on_acknowledged().await;

                self.frame_counter = self.frame_counter.wrapping_add(1);
                let decoded = self.log_decoder.decode(data, self.frame_counter);
                self.aggregator.apply_log_data(&mut self.log_decoder);
                decoded?;
            }
            Inbound::Unhandled { cmd_id } => {
                trace!("Unhandled message 0x{:04X}", cmd_id);
            }
        }

        Ok(())
    }

    /// Record the acknowledgment; the first one triggers the initial sync
    async fn on_acknowledged(&self) {
        if !self.aggregator.mark_acknowledged() {
            return;
        }

        info!("Connected to drone");
        if let Err(e) = self.send_initial_requests().await {
            error!("Initial parameter sync failed: {}", e);
        }
    }

    async fn send_initial_requests(&self) -> Result<()> {
        self.commander.send_time_command().await?;
        self.commander.get_low_battery_threshold().await?;
        self.commander.get_alt_limit().await?;
        self.commander.get_att_limit().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FlightConfig;
    use crate::error::TelloError;
    use crate::protocol::commands::*;
    use crate::protocol::decoder::command_id;
    use crate::protocol::log_data::test_support::{build_record, mvo_payload};
    use crate::protocol::log_data::LOG_ID_MVO;
    use crate::protocol::packet::Packet;
    use crate::transport::port_trait::mocks::MockTransport;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn receiver() -> (Receiver, Arc<DataAggregator>, MockTransport) {
        let transport = MockTransport::new();
        let shared: Arc<dyn DroneTransport> = Arc::new(transport.clone());
        let commander = Arc::new(Commander::new(shared.clone(), &FlightConfig::default()));
        let aggregator = Arc::new(DataAggregator::new());
        let receiver = Receiver::new(
            shared,
            commander,
            aggregator.clone(),
            &SessionConfig::default(),
        );
        (receiver, aggregator, transport)
    }

    fn frame(cmd_id: u16, payload: &[u8]) -> Vec<u8> {
        let mut packet = Packet::with_payload(cmd_id, payload, PKT_TYPE_DEFAULT);
        packet.fixup(0);
        packet.buffer().to_vec()
    }

    fn sent_ids(transport: &MockTransport) -> Vec<Option<u16>> {
        transport.get_sent_data().iter().map(|d| command_id(d)).collect()
    }

    fn log_data_frame(vel: [i16; 3]) -> Vec<u8> {
        let mut payload = vec![0x00];
        payload.extend(build_record(LOG_ID_MVO, 0x5A, &mvo_payload(vel, [1.0, 2.0, 3.0])));
        frame(LOG_DATA_MSG, &payload)
    }

    #[tokio::test]
    async fn test_first_ack_sends_initial_requests_once() {
        let (mut receiver, aggregator, transport) = receiver();

        receiver.handle_datagram(CONN_ACK).await.unwrap();
        receiver.handle_datagram(CONN_ACK).await.unwrap();

        assert!(aggregator.is_acknowledged());
        assert_eq!(
            sent_ids(&transport),
            vec![
                Some(TIME_CMD),
                Some(LOW_BAT_THRESHOLD_MSG),
                Some(ALT_LIMIT_MSG),
                Some(ATT_LIMIT_MSG),
            ]
        );
    }

    #[tokio::test]
    async fn test_log_data_implies_ack_and_publishes_pose() {
        let (mut receiver, aggregator, transport) = receiver();
        let notified = Arc::new(AtomicUsize::new(0));
        let counter = notified.clone();
        aggregator.on_pose_velocity(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        receiver.handle_datagram(&log_data_frame([10, -20, 30])).await.unwrap();

        assert!(aggregator.is_acknowledged());
        assert_eq!(transport.get_sent_data().len(), 4);
        assert_eq!(notified.load(Ordering::SeqCst), 1);

        let pose = aggregator.pose_velocity();
        assert_eq!(pose.frame, 1);
        assert_eq!(pose.pose.z, 3.0);
    }

    #[tokio::test]
    async fn test_log_header_is_acknowledged() {
        let (mut receiver, aggregator, transport) = receiver();
        let mut payload = vec![0u8; 40];
        payload[0..2].copy_from_slice(&0x0133u16.to_le_bytes());
        payload[24..27].copy_from_slice(b"DJI");

        receiver
            .handle_datagram(&frame(LOG_HEADER_MSG, &payload))
            .await
            .unwrap();

        assert_eq!(aggregator.log_header().log_id, 0x0133);
        let sent = transport.get_sent_data();
        assert_eq!(sent.len(), 1);
        assert_eq!(command_id(&sent[0]), Some(LOG_HEADER_MSG));
        assert_eq!(&sent[0][9..12], &[0x00, 0x33, 0x01]);
    }

    #[tokio::test]
    async fn test_single_field_messages_merge_into_flight_data() {
        let (mut receiver, aggregator, _) = receiver();

        receiver.handle_datagram(&frame(WIFI_MSG, &[72, 0])).await.unwrap();
        receiver
            .handle_datagram(&frame(ALT_LIMIT_MSG, &[0x00, 30, 0]))
            .await
            .unwrap();
        receiver
            .handle_datagram(&frame(LOW_BAT_THRESHOLD_MSG, &[0x00, 15]))
            .await
            .unwrap();

        let flight = aggregator.flight_data();
        assert_eq!(flight.wifi_strength, Some(72));
        assert_eq!(flight.alt_limit, Some(30));
        assert_eq!(flight.low_battery_threshold, Some(15));
    }

    #[tokio::test]
    async fn test_malformed_datagrams_are_errors_not_panics() {
        let (mut receiver, aggregator, _) = receiver();

        assert!(matches!(
            receiver.handle_datagram(b"hello").await,
            Err(TelloError::NotATelloPacket)
        ));
        assert!(matches!(
            receiver.handle_datagram(&frame(FLIGHT_MSG, &[1, 2, 3])).await,
            Err(TelloError::LengthMismatch { .. })
        ));
        assert_eq!(aggregator.flight_data().height, 0);
        assert_eq!(aggregator.connection().datagrams_received, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_survives_bad_datagram_and_stops_on_shutdown() {
        let (receiver, aggregator, transport) = receiver();
        transport.push_inbound(b"garbage");
        transport.push_inbound(CONN_ACK);

        let (tx, rx) = watch::channel(false);
        let task = tokio::spawn(receiver.run(rx));

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(aggregator.is_acknowledged());
        assert_eq!(aggregator.connection().datagrams_received, 2);

        tx.send(true).unwrap();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_survives_panicking_listener() {
        let (receiver, aggregator, transport) = receiver();
        aggregator.on_flight_data(|_| panic!("listener bug"));
        transport.push_inbound(&frame(FLIGHT_MSG, &[0u8; 24]));
        transport.push_inbound(CONN_ACK);

        let (tx, rx) = watch::channel(false);
        let task = tokio::spawn(receiver.run(rx));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!task.is_finished());
        assert!(aggregator.is_acknowledged());
        assert_eq!(aggregator.connection().datagrams_received, 2);

        tx.send(true).unwrap();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_silence_marks_link_disconnected() {
        let (receiver, aggregator, transport) = receiver();
        transport.push_inbound(CONN_ACK);

        let (tx, rx) = watch::channel(false);
        let task = tokio::spawn(receiver.run(rx));

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(aggregator.connection().connected);

        tokio::time::sleep(Duration::from_millis(1000)).await;
        let connection = aggregator.connection();
        assert!(connection.ack_received);
        assert!(!connection.connected);

        tx.send(true).unwrap();
        task.await.unwrap();
    }
}
