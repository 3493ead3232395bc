//! # Error Definitions
//!
//! Failures raised while taking an inbound frame apart.

use thiserror::Error;

/// A frame that cannot be interpreted as a response.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    /// The frame did not carry exactly three parts.
    #[error("expected 3 frame parts, got {0}")]
    WrongPartCount(usize),
    /// The identifier part was not 4 bytes long.
    #[error("identifier part must be 4 bytes, got {0}")]
    BadIdentifier(usize),
    /// The payload part is too short to hold the error code.
    #[error("payload part must hold a 4 byte error code, got {0} bytes")]
    TruncatedPayload(usize),
}

/// A specialized Result type for frame decoding.
pub type Result<T> = std::result::Result<T, FrameError>;
