//! Trait abstraction for datagram I/O to enable testing

use async_trait::async_trait;
use std::io;

/// Datagram link to the drone
///
/// Every `recv` returns one complete datagram. Sends are fire-and-forget.
#[async_trait]
pub trait DroneTransport: Send + Sync {
    /// Send one datagram to the drone
    async fn send(&self, data: &[u8]) -> io::Result<()>;

    /// Copy the next pending datagram into `buf` without waiting
    ///
    /// Returns `Ok(0)` when nothing is pending.
    async fn recv(&self, buf: &mut [u8]) -> io::Result<usize>;
}

#[cfg(test)]
pub mod mocks {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    /// Mock transport for testing
    ///
    /// Records every sent datagram and replays queued inbound ones.
    #[derive(Clone, Default)]
    pub struct MockTransport {
        pub sent_data: Arc<Mutex<Vec<Vec<u8>>>>,
        pub inbound: Arc<Mutex<VecDeque<Vec<u8>>>>,
        pub send_error: Arc<Mutex<Option<io::ErrorKind>>>,
    }

    impl MockTransport {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn get_sent_data(&self) -> Vec<Vec<u8>> {
            self.sent_data.lock().unwrap().clone()
        }

        pub fn clear_sent_data(&self) {
            self.sent_data.lock().unwrap().clear();
        }

        /// Number of sent datagrams accepted by `predicate`
        pub fn count_sent(&self, predicate: impl Fn(&[u8]) -> bool) -> usize {
            self.sent_data
                .lock()
                .unwrap()
                .iter()
                .filter(|d| predicate(d.as_slice()))
                .count()
        }

        pub fn push_inbound(&self, datagram: &[u8]) {
            self.inbound.lock().unwrap().push_back(datagram.to_vec());
        }

        pub fn set_send_error(&self, error: io::ErrorKind) {
            *self.send_error.lock().unwrap() = Some(error);
        }
    }

    #[async_trait]
    impl DroneTransport for MockTransport {
        async fn send(&self, data: &[u8]) -> io::Result<()> {
            if let Some(error) = *self.send_error.lock().unwrap() {
                return Err(io::Error::new(error, "Mock send error"));
            }
            self.sent_data.lock().unwrap().push(data.to_vec());
            Ok(())
        }

        async fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
            match self.inbound.lock().unwrap().pop_front() {
                Some(datagram) => {
                    let n = datagram.len().min(buf.len());
                    buf[..n].copy_from_slice(&datagram[..n]);
                    Ok(n)
                }
                None => Ok(0),
            }
        }
    }
}
