//! # Protocol Frames
//!
//! Encoding of outbound requests and decoding of inbound responses.
//!
//! ## Invariants
//! - **Panic Safety**: Decoding returns `Result` for every input shape, never panicking.
//! - **Opaque Payloads**: Command names and bodies are carried verbatim.

use crate::code::ErrorCode;
use crate::error::FrameError;
use crate::error::Result;

/// One transport message: an ordered list of byte parts.
pub type Multipart = Vec<Vec<u8>>;

/// Size of the identifier part and of the error-code prefix.
const WORD: usize = 4;

/// Encodes an outbound request.
#[derive(Debug, Clone, Copy)]
pub struct RequestFrame<'a> {
    pub command: &'a [u8],
    pub id: u32,
    pub payload: &'a [u8],
}

impl<'a> RequestFrame<'a> {
    pub fn new(command: &'a [u8], id: u32, payload: &'a [u8]) -> Self {
        Self { command, id, payload }
    }

    /// Lay the request out as its three wire parts.
    pub fn encode(&self) -> Multipart {
        vec![
            self.command.to_vec(),
            self.id.to_le_bytes().to_vec(),
            self.payload.to_vec(),
        ]
    }
}

/// Builds the three parts of a request frame.
pub fn encode_request(command: &[u8], id: u32, payload: &[u8]) -> Multipart {
    RequestFrame::new(command, id, payload).encode()
}

/// A decoded inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedResponse {
    pub command: Vec<u8>,
    pub id: u32,
    /// `None` when the service reported success.
    pub error: Option<ErrorCode>,
    /// Response body after the error code, possibly empty.
    pub data: Vec<u8>,
}

impl ParsedResponse {
    /// A subscription push carries a body; its acknowledgment does not.
    pub fn is_push_payload(&self) -> bool {
        !self.data.is_empty()
    }

    /// The command name as text, for diagnostics.
    pub fn command_lossy(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.command)
    }
}

/// See [`ParsedResponse::is_push_payload`].
pub fn is_push_payload(parsed: &ParsedResponse) -> bool {
    parsed.is_push_payload()
}

/// Takes an inbound frame apart.
///
/// Fails with [`FrameError::WrongPartCount`] unless the frame has exactly three
/// parts, and with a length error when the identifier or the error code does
/// not fit its 4 bytes.
pub fn decode_response(frame: Multipart) -> Result<ParsedResponse> {
    let parts = frame.len();
    let Ok([command, id_part, payload]) = <[Vec<u8>; 3]>::try_from(frame) else {
        return Err(FrameError::WrongPartCount(parts));
    };

    let id = read_word(&id_part).ok_or(FrameError::BadIdentifier(id_part.len()))?;

    let Some((code, data)) = payload.split_first_chunk::<WORD>() else {
        return Err(FrameError::TruncatedPayload(payload.len()));
    };

    Ok(ParsedResponse {
        command,
        id,
        error: ErrorCode::from_raw(u32::from_le_bytes(*code)),
        data: data.to_vec(),
    })
}

/// Builds the three parts of a response frame, as the service would.
pub fn encode_response(
    command: &[u8],
    id: u32,
    error: Option<ErrorCode>,
    data: &[u8],
) -> Multipart {
    let mut payload = Vec::with_capacity(WORD + data.len());
    payload.extend_from_slice(&ErrorCode::raw_or_success(error).to_le_bytes());
    payload.extend_from_slice(data);
    vec![command.to_vec(), id.to_le_bytes().to_vec(), payload]
}

fn read_word(bytes: &[u8]) -> Option<u32> {
    let word: [u8; WORD] = bytes.try_into().ok()?;
    Some(u32::from_le_bytes(word))
}
