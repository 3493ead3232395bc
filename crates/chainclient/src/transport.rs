//! # Transport Abstraction
//!
//! A minimal, async interface for moving multipart messages between the client
//! and the service.
//!
//! ## Philosophy
//!
//! - **Message-Oriented**: The transport moves whole [`Multipart`] messages. It
//!   knows nothing about commands, ids or error codes.
//! - **Duplex**: Sending and receiving are independent. The receive loop owns
//!   `recv`, any number of callers share `send`.

use chainwire::Multipart;
use thiserror::Error;

/// Errors that occur at the network/transport layer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The peer is unreachable or the connection was dropped.
    #[error("connection lost: {0}")]
    ConnectionLost(String),
    /// The channel was closed in an orderly way.
    #[error("transport closed")]
    Closed,
    /// Generic I/O error or malformed stream.
    #[error("i/o error: {0}")]
    Io(String),
}

pub type Result<T> = std::result::Result<T, TransportError>;

/// An ordered, message-oriented duplex channel.
///
/// This trait is designed to be object-safe (`Arc<dyn Transport>`).
#[async_trait::async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Queues one message for transmission.
    ///
    /// # invariants
    /// - May be called concurrently. Implementations serialize their own
    ///   writes so that the parts of two messages never interleave.
    /// - Returns once the message is accepted, not once it is answered.
    async fn send(&self, frame: Multipart) -> Result<()>;

    /// Suspends until a complete message is available.
    ///
    /// Returns `Ok(None)` when the peer closed the channel.
    async fn recv(&self) -> Result<Option<Multipart>>;
}
