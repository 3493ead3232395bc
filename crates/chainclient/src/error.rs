//! # Client Errors
//!
//! Hard failures of the correlation machinery. Ordinary service-level failures
//! are not errors here: they come back as an [`ErrorCode`](chainwire::ErrorCode)
//! inside a successful [`Reply`](crate::Reply).

use thiserror::Error;

use crate::transport::TransportError;

#[derive(Debug, Clone, Error)]
pub enum Error {
    /// The transport failed while sending, or the receive loop died.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
    /// A response was routed to a request it does not belong to.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),
    /// Every drawn id collided with a request still in flight.
    #[error("no free request id after {0} attempts")]
    IdSpaceExhausted(usize),
    /// The client was stopped before or while the request was pending.
    #[error("client stopped")]
    Stopped,
    /// The pending entry went away without an answer.
    #[error("response channel closed")]
    ChannelClosed,
    /// A response body did not have the shape the query expects.
    #[error("cannot decode response: {0}")]
    Decode(String),
}

pub type Result<T> = std::result::Result<T, Error>;
