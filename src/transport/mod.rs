//! # UDP Transport Module
//!
//! Datagram link between this host and the drone.
//!
//! This module handles:
//! - Binding the local listen port (9000 by default)
//! - Sending command frames to the drone endpoint (192.168.10.1:8889)
//! - Non-blocking polling for inbound datagrams

pub mod port_trait;

use std::io;
use std::net::{Ipv4Addr, SocketAddr};

use async_trait::async_trait;
use tokio::net::UdpSocket;
use tracing::{debug, info};

use crate::config::NetworkConfig;
use crate::error::Result;
pub use port_trait::DroneTransport;

/// Largest datagram the drone sends
pub const MAX_DATAGRAM_SIZE: usize = 2048;

/// UDP socket bound locally and aimed at the drone
pub struct UdpTransport {
    socket: UdpSocket,
    drone_addr: SocketAddr,
}

impl std::fmt::Debug for UdpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UdpTransport")
            .field("local_addr", &self.socket.local_addr().ok())
            .field("drone_addr", &self.drone_addr)
            .finish_non_exhaustive()
    }
}

impl UdpTransport {
    /// Bind using the network section of the configuration
    ///
    /// # Errors
    ///
    /// Returns error if the drone address is invalid or the port is taken
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use tello_link::config::Config;
    /// use tello_link::transport::UdpTransport;
    ///
    /// # async fn run() -> tello_link::error::Result<()> {
    /// let config = Config::default();
    /// let transport = UdpTransport::open(&config.network).await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn open(config: &NetworkConfig) -> Result<Self> {
        let drone_addr = config.drone_addr()?;
        Self::bind(config.local_port, drone_addr).await
    }

    /// Bind `0.0.0.0:local_port` and target `drone_addr`
    ///
    /// # Errors
    ///
    /// Returns error if the socket cannot be bound
    pub async fn bind(local_port: u16, drone_addr: SocketAddr) -> Result<Self> {
        let local = SocketAddr::from((Ipv4Addr::UNSPECIFIED, local_port));
        debug!("Binding UDP socket on {}", local);

        let socket = UdpSocket::bind(local).await?;
        info!(
            "UDP transport ready on {} -> {}",
            socket.local_addr()?,
            drone_addr
        );

        Ok(Self { socket, drone_addr })
    }

    pub fn drone_addr(&self) -> SocketAddr {
        self.drone_addr
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }
}

#[async_trait]
impl DroneTransport for UdpTransport {
    async fn send(&self, data: &[u8]) -> io::Result<()> {
        self.socket.send_to(data, self.drone_addr).await?;
        Ok(())
    }

    async fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
        match self.socket.try_recv_from(buf) {
            Ok((n, _from)) => Ok(n),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(0),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_send_and_recv_over_loopback() {
        let drone = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let drone_addr = drone.local_addr().unwrap();

        let transport = UdpTransport::bind(0, drone_addr).await.unwrap();
        assert_eq!(transport.drone_addr(), drone_addr);
        transport.send(b"conn_req:\x96\x17").await.unwrap();

        let mut buf = [0u8; 64];
        let (n, from) = drone.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"conn_req:\x96\x17");

        let local_port = transport.local_addr().unwrap().port();
        assert_eq!(from.port(), local_port);

        let reply_to = SocketAddr::from((Ipv4Addr::LOCALHOST, local_port));
        drone.send_to(b"conn_ack:\x96\x17", reply_to).await.unwrap();

        let mut received = 0;
        for _ in 0..100 {
            received = transport.recv(&mut buf).await.unwrap();
            if received > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(&buf[..received], b"conn_ack:\x96\x17");
    }

    #[tokio::test]
    async fn test_recv_returns_zero_when_idle() {
        let drone_addr = SocketAddr::from((Ipv4Addr::LOCALHOST, 8889));
        let transport = UdpTransport::bind(0, drone_addr).await.unwrap();

        let mut buf = [0u8; 16];
        assert_eq!(transport.recv(&mut buf).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_debug_hides_socket() {
        let drone_addr = SocketAddr::from((Ipv4Addr::LOCALHOST, 8889));
        let transport = UdpTransport::bind(0, drone_addr).await.unwrap();
        let debug = format!("{:?}", transport);
        assert!(debug.contains("UdpTransport"));
        assert!(debug.contains("8889"));
    }
}
