//! In-process transport over tokio channels.
//!
//! Used to run a client against a scripted service without a socket.

use std::sync::Arc;

use chainwire::Multipart;
use tokio::sync::Mutex;
use tokio::sync::mpsc;

use crate::transport;
use crate::transport::Transport;
use crate::transport::TransportError;

/// A duplex channel transport using tokio mpsc channels.
///
/// Messages sent via `send()` appear on the peer's `recv()` and vice versa.
/// Dropping one end makes the other end's `recv()` return `Ok(None)`.
pub struct ChannelTransport {
    tx: mpsc::UnboundedSender<Multipart>,
    rx: Arc<Mutex<mpsc::UnboundedReceiver<Multipart>>>,
}

impl ChannelTransport {
    /// Creates a transport from separate tx and rx channels.
    pub fn new(
        tx: mpsc::UnboundedSender<Multipart>,
        rx: mpsc::UnboundedReceiver<Multipart>,
    ) -> Self {
        Self {
            tx,
            rx: Arc::new(Mutex::new(rx)),
        }
    }

    /// Creates a pair of transports connected to each other.
    ///
    /// Messages sent on `a` are received by `b` and vice versa.
    pub fn pair() -> (Self, Self) {
        let (tx_a, rx_a) = mpsc::unbounded_channel();
        let (tx_b, rx_b) = mpsc::unbounded_channel();
        (Self::new(tx_a, rx_b), Self::new(tx_b, rx_a))
    }
}

#[async_trait::async_trait]
impl Transport for ChannelTransport {
    async fn send(&self, frame: Multipart) -> transport::Result<()> {
        self.tx
            .send(frame)
            .map_err(|_| TransportError::ConnectionLost("channel closed".into()))
    }

    async fn recv(&self) -> transport::Result<Option<Multipart>> {
        let mut rx = self.rx.lock().await;
        Ok(rx.recv().await)
    }
}
