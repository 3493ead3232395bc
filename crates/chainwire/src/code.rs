//! # Error Codes
//!
//! The service reports the outcome of every request as a `u32` in front of the
//! response body. Zero means success and is represented as `None` on the Rust
//! side; everything else maps onto [`ErrorCode`].

use std::fmt;
use std::hash::Hash;
use std::hash::Hasher;

/// A non-success condition reported by the service.
///
/// Unknown values are kept in [`ErrorCode::Unknown`] so that a newer server
/// never makes a response undecodable.
///
/// Codes compare and hash by their wire value, so `Unknown(1)` built by hand
/// equals `ServiceStopped`. [`ErrorCode::from_raw`] never produces such an
/// alias.
#[derive(Debug, Clone, Copy)]
pub enum ErrorCode {
    ServiceStopped,
    OperationFailed,
    NotFound,
    Duplicate,
    UnspentOutput,
    UnsupportedScriptPattern,
    ResolveFailed,
    NetworkUnreachable,
    AddressInUse,
    ListenFailed,
    AcceptFailed,
    BadStream,
    /// Also produced locally when a request outlives its timeout.
    ChannelTimeout,
    AddressBlocked,
    ChannelStopped,
    PeerThrottling,
    StoreBlockDuplicate,
    StoreBlockInvalidHeight,
    StoreBlockMissingParent,
    /// A value with no named variant. Only meaningful when it came from
    /// [`ErrorCode::from_raw`].
    Unknown(u32),
}

impl ErrorCode {
    /// Maps a raw wire value. `0` is success and yields `None`.
    pub fn from_raw(raw: u32) -> Option<Self> {
        let code = match raw {
            0 => return None,
            1 => Self::ServiceStopped,
            2 => Self::OperationFailed,
            3 => Self::NotFound,
            4 => Self::Duplicate,
            5 => Self::UnspentOutput,
            6 => Self::UnsupportedScriptPattern,
            7 => Self::ResolveFailed,
            8 => Self::NetworkUnreachable,
            9 => Self::AddressInUse,
            10 => Self::ListenFailed,
            11 => Self::AcceptFailed,
            12 => Self::BadStream,
            13 => Self::ChannelTimeout,
            14 => Self::AddressBlocked,
            15 => Self::ChannelStopped,
            16 => Self::PeerThrottling,
            66 => Self::StoreBlockDuplicate,
            67 => Self::StoreBlockInvalidHeight,
            68 => Self::StoreBlockMissingParent,
            other => Self::Unknown(other),
        };
        Some(code)
    }

    /// The raw wire value of this code.
    pub fn to_raw(self) -> u32 {
        match self {
            Self::ServiceStopped => 1,
            Self::OperationFailed => 2,
            Self::NotFound => 3,
            Self::Duplicate => 4,
            Self::UnspentOutput => 5,
            Self::UnsupportedScriptPattern => 6,
            Self::ResolveFailed => 7,
            Self::NetworkUnreachable => 8,
            Self::AddressInUse => 9,
            Self::ListenFailed => 10,
            Self::AcceptFailed => 11,
            Self::BadStream => 12,
            Self::ChannelTimeout => 13,
            Self::AddressBlocked => 14,
            Self::ChannelStopped => 15,
            Self::PeerThrottling => 16,
            Self::StoreBlockDuplicate => 66,
            Self::StoreBlockInvalidHeight => 67,
            Self::StoreBlockMissingParent => 68,
            Self::Unknown(raw) => raw,
        }
    }

    /// Raw wire value for an optional code, `0` for success.
    pub fn raw_or_success(code: Option<Self>) -> u32 {
        code.map_or(0, Self::to_raw)
    }

    fn name(self) -> &'static str {
        match self {
            Self::ServiceStopped => "service_stopped",
            Self::OperationFailed => "operation_failed",
            Self::NotFound => "not_found",
            Self::Duplicate => "duplicate",
            Self::UnspentOutput => "unspent_output",
            Self::UnsupportedScriptPattern => "unsupported_script_pattern",
            Self::ResolveFailed => "resolve_failed",
            Self::NetworkUnreachable => "network_unreachable",
            Self::AddressInUse => "address_in_use",
            Self::ListenFailed => "listen_failed",
            Self::AcceptFailed => "accept_failed",
            Self::BadStream => "bad_stream",
            Self::ChannelTimeout => "channel_timeout",
            Self::AddressBlocked => "address_blocked",
            Self::ChannelStopped => "channel_stopped",
            Self::PeerThrottling => "peer_throttling",
            Self::StoreBlockDuplicate => "store_block_duplicate",
            Self::StoreBlockInvalidHeight => "store_block_invalid_height",
            Self::StoreBlockMissingParent => "store_block_missing_parent",
            Self::Unknown(_) => "unknown",
        }
    }
}

impl PartialEq for ErrorCode {
    fn eq(&self, other: &Self) -> bool {
        self.to_raw() == other.to_raw()
    }
}

impl Eq for ErrorCode {}

impl Hash for ErrorCode {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.to_raw().hash(state);
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown(raw) => write!(f, "unknown error ({})", raw),
            other => f.write_str(other.name()),
        }
    }
}
