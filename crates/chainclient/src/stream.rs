//! # Stream Transport
//!
//! Carries multipart messages over any byte stream (TCP, Unix socket, an
//! in-memory duplex pipe).
//!
//! ## Framing
//!
//! ```text
//! u32 LE part count
//! repeated: u32 LE part length, part bytes
//! ```
//!
//! Writes are serialized through an async mutex, so concurrent callers never
//! interleave the parts of two messages.

use std::sync::Arc;

use chainwire::Multipart;
use tokio::io::AsyncRead;
use tokio::io::AsyncReadExt;
use tokio::io::AsyncWrite;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex as AsyncMutex;

use crate::transport;
use crate::transport::Transport;
use crate::transport::TransportError;

/// Upper bound on the number of parts in one message.
pub const MAX_PARTS: u32 = 64;

/// Upper bound on the size of a single part.
pub const MAX_PART_LEN: u32 = 32 * 1024 * 1024;

type Reader = Box<dyn AsyncRead + Unpin + Send + Sync>;
type Writer = Box<dyn AsyncWrite + Unpin + Send + Sync>;

#[derive(Clone)]
pub struct StreamTransport {
    inner: Arc<StreamInner>,
}

struct StreamInner {
    reader: AsyncMutex<Reader>,
    writer: AsyncMutex<Writer>,
}

impl std::fmt::Debug for StreamTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamTransport").finish_non_exhaustive()
    }
}

impl StreamTransport {
    pub fn new<S>(stream: S) -> Self
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + Sync + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);
        Self {
            inner: Arc::new(StreamInner {
                reader: AsyncMutex::new(Box::new(reader)),
                writer: AsyncMutex::new(Box::new(writer)),
            }),
        }
    }

    /// Two transports joined by an in-memory pipe.
    pub fn pair() -> (Self, Self) {
        let (a, b) = tokio::io::duplex(64 * 1024);
        (Self::new(a), Self::new(b))
    }

    /// Connects to `addr` over TCP.
    pub async fn connect(addr: impl tokio::net::ToSocketAddrs) -> transport::Result<Self> {
        let stream = tokio::net::TcpStream::connect(addr)
            .await
            .map_err(|e| TransportError::ConnectionLost(e.to_string()))?;
        stream.set_nodelay(true).map_err(io_error)?;
        Ok(Self::new(stream))
    }
}

fn io_error(e: std::io::Error) -> TransportError {
    TransportError::Io(e.to_string())
}

fn length_of(len: usize) -> transport::Result<u32> {
    match u32::try_from(len) {
        Ok(len) if len <= MAX_PART_LEN => Ok(len),
        _ => Err(TransportError::Io(format!("part of {} bytes exceeds limit", len))),
    }
}

/// Lays a message out as one contiguous buffer.
fn encode(frame: &Multipart) -> transport::Result<Vec<u8>> {
    let count = u32::try_from(frame.len())
        .ok()
        .filter(|count| *count <= MAX_PARTS)
        .ok_or_else(|| TransportError::Io(format!("{} parts exceeds limit", frame.len())))?;

    let body: usize = frame.iter().map(|part| 4 + part.len()).sum();
    let mut buf = Vec::with_capacity(4 + body);
    buf.extend_from_slice(&count.to_le_bytes());
    for part in frame {
        buf.extend_from_slice(&length_of(part.len())?.to_le_bytes());
        buf.extend_from_slice(part);
    }
    Ok(buf)
}

async fn read_u32(reader: &mut Reader) -> std::io::Result<u32> {
    let mut word = [0u8; 4];
    reader.read_exact(&mut word).await?;
    Ok(u32::from_le_bytes(word))
}

#[async_trait::async_trait]
impl Transport for StreamTransport {
    async fn send(&self, frame: Multipart) -> transport::Result<()> {
        let buf = encode(&frame)?;
        let mut writer = self.inner.writer.lock().await;
        writer.write_all(&buf).await.map_err(io_error)?;
        writer.flush().await.map_err(io_error)?;
        Ok(())
    }

    async fn recv(&self) -> transport::Result<Option<Multipart>> {
        let mut reader = self.inner.reader.lock().await;

        let count = match read_u32(&mut *reader).await {
            Ok(count) => count,
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(io_error(e)),
        };
        if count > MAX_PARTS {
            return Err(TransportError::Io(format!("{} parts exceeds limit", count)));
        }

        let mut frame = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let len = read_u32(&mut *reader).await.map_err(io_error)?;
            if len > MAX_PART_LEN {
                return Err(TransportError::Io(format!("part of {} bytes exceeds limit", len)));
            }
            let mut part = vec![0u8; len as usize];
            reader.read_exact(&mut part).await.map_err(io_error)?;
            frame.push(part);
        }
        Ok(Some(frame))
    }
}
