//! # Chainwire
//!
//! Wire format for the chain query protocol.
//!
//! Every message on the wire is a multipart frame of exactly three parts:
//!
//! | part | request            | response                               |
//! |------|--------------------|----------------------------------------|
//! | 1    | command name       | command name                           |
//! | 2    | id, `u32` LE       | id, `u32` LE                           |
//! | 3    | command payload    | error code, `u32` LE, then the body    |
//!
//! The crate knows nothing about sockets or tasks. It turns requests into parts
//! and parts back into [`ParsedResponse`] values, and maps the numeric error
//! space onto [`ErrorCode`].

pub mod code;
pub mod error;
pub mod frame;

pub use code::ErrorCode;
pub use error::FrameError;
pub use error::Result;
pub use frame::Multipart;
pub use frame::ParsedResponse;
pub use frame::RequestFrame;
pub use frame::decode_response;
pub use frame::encode_request;
pub use frame::encode_response;
pub use frame::is_push_payload;
