//! # Chainclient
//!
//! Client side of the chain query protocol: many logical requests multiplexed
//! over one duplex message channel.
//!
//! A [`Client`] owns a background receive loop that decodes every inbound
//! frame and routes it, by correlation id, to the task that issued the
//! matching request. One-shot requests resolve once; subscriptions resolve on
//! their acknowledgment and then keep receiving pushed notifications on a
//! [`Subscription`] queue.

pub mod client;
pub mod error;
pub mod id;
pub mod memory;
pub mod pending;
pub mod query;
pub mod settings;
pub mod stream;
pub mod transport;

pub use chainwire::ErrorCode;
pub use client::Client;
pub use client::Reply;
pub use client::Subscription;
pub use error::Error;
pub use error::Result;
pub use id::IdGenerator;
pub use id::RandomIds;
pub use id::SequenceIds;
pub use memory::ChannelTransport;
pub use query::BlockIndex;
pub use query::Point;
pub use settings::ClientSettings;
pub use stream::StreamTransport;
pub use transport::Transport;
pub use transport::TransportError;

#[cfg(test)]
mod tests;
