//! Message boundary codecs
//!
//! A codec is chosen once per connection at handshake time:
//! - [`FramedCodec`]: 8-byte big-endian length prefix + payload, with
//!   zero-length heartbeat frames skipped on read
//! - [`LegacyCodec`]: raw payloads; a reply is complete once the buffered
//!   bytes parse as JSON, equal the liveness token, or the peer closes

use crate::protocol::{PING_TOKEN, preview};
use async_trait::async_trait;
use serde::de::IgnoredAny;
use std::fmt;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::{Instant, timeout};
use tracing::debug;
use unity_link_core::{LinkError, Result};

/// Hard ceiling for a single message (64 MiB)
pub const MAX_FRAME_BYTES: u64 = 64 * 1024 * 1024;

/// Read size for legacy replies
const LEGACY_CHUNK: usize = 64 * 1024;

/// Byte stream a codec can drive
pub trait Stream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T> Stream for T where T: AsyncRead + AsyncWrite + Unpin + Send {}

/// Negotiated message boundary format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramingMode {
    Framed,
    Legacy,
}

impl fmt::Display for FramingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FramingMode::Framed => f.write_str("framed"),
            FramingMode::Legacy => f.write_str("legacy"),
        }
    }
}

/// Bounds applied while waiting for a reply
#[derive(Debug, Clone)]
pub struct ReadLimits {
    /// Bound on every individual socket read
    pub receive_timeout: Duration,
    /// Time after which a heartbeat ends the wait with an empty reply
    pub heartbeat_window: Duration,
    /// Consecutive heartbeats after which the wait ends with an empty reply
    pub max_heartbeats: u32,
    /// Largest accepted message
    pub max_frame_bytes: u64,
}

impl Default for ReadLimits {
    fn default() -> Self {
        Self {
            receive_timeout: Duration::from_secs(60),
            heartbeat_window: Duration::from_secs(2),
            max_heartbeats: 16,
            max_frame_bytes: MAX_FRAME_BYTES,
        }
    }
}

/// Strategy for writing and reading one message
#[async_trait]
pub trait FrameCodec: Send + Sync + fmt::Debug {
    /// Mode this codec implements
    fn mode(&self) -> FramingMode;

    /// Write a complete message
    async fn write_message(&self, io: &mut dyn Stream, payload: &[u8]) -> Result<()>;

    /// Read a complete message.
    /// An empty vector means the peer only sent heartbeats.
    async fn read_message(&self, io: &mut dyn Stream, limits: &ReadLimits) -> Result<Vec<u8>>;
}

/// Codec for a negotiated mode
pub fn codec_for(mode: FramingMode) -> Box<dyn FrameCodec> {
    match mode {
        FramingMode::Framed => Box::new(FramedCodec),
        FramingMode::Legacy => Box::new(LegacyCodec),
    }
}

/// Length-prefixed framing
#[derive(Debug, Clone, Copy, Default)]
pub struct FramedCodec;

#[async_trait]
impl FrameCodec for FramedCodec {
    fn mode(&self) -> FramingMode {
        FramingMode::Framed
    }

    async fn write_message(&self, io: &mut dyn Stream, payload: &[u8]) -> Result<()> {
        // Write 8-byte length prefix (big-endian)
        let len = (payload.len() as u64).to_be_bytes();
        io.write_all(&len)
            .await
            .map_err(|e| LinkError::io("Write frame length failed", e))?;

        io.write_all(payload)
            .await
            .map_err(|e| LinkError::io("Write frame payload failed", e))?;

        io.flush()
            .await
            .map_err(|e| LinkError::io("Flush failed", e))?;

        Ok(())
    }

    async fn read_message(&self, io: &mut dyn Stream, limits: &ReadLimits) -> Result<Vec<u8>> {
        let deadline = Instant::now() + limits.heartbeat_window;
        let mut heartbeats = 0u32;

        loop {
            let mut header = [0u8; 8];
            read_exact_within(io, &mut header, limits.receive_timeout, "frame header").await?;
            let len = u64::from_be_bytes(header);

            if len == 0 {
                heartbeats += 1;
                debug!("Received heartbeat frame (length=0)");
                if heartbeats >= limits.max_heartbeats || Instant::now() >= deadline {
                    debug!(
                        "Heartbeat threshold reached after {} frames; returning empty response",
                        heartbeats
                    );
                    return Ok(Vec::new());
                }
                continue;
            }

            if len > limits.max_frame_bytes {
                return Err(LinkError::Framing(format!(
                    "Invalid framed length: {} bytes (max {})",
                    len, limits.max_frame_bytes
                )));
            }

            let mut payload = vec![0u8; len as usize];
            read_exact_within(io, &mut payload, limits.receive_timeout, "frame payload").await?;
            debug!("Received framed response ({} bytes)", payload.len());
            return Ok(payload);
        }
    }
}

/// Unframed messages delimited by JSON completeness
#[derive(Debug, Clone, Copy, Default)]
pub struct LegacyCodec;

#[async_trait]
impl FrameCodec for LegacyCodec {
    fn mode(&self) -> FramingMode {
        FramingMode::Legacy
    }

    async fn write_message(&self, io: &mut dyn Stream, payload: &[u8]) -> Result<()> {
        io.write_all(payload)
            .await
            .map_err(|e| LinkError::io("Write failed", e))?;
        io.flush()
            .await
            .map_err(|e| LinkError::io("Flush failed", e))?;
        Ok(())
    }

    async fn read_message(&self, io: &mut dyn Stream, limits: &ReadLimits) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        let mut chunk = vec![0u8; LEGACY_CHUNK];

        loop {
            let n = timeout(limits.receive_timeout, io.read(&mut chunk))
                .await
                .map_err(|_| LinkError::timed_out("Timeout receiving Unity response"))?
                .map_err(|e| LinkError::io("Receive failed", e))?;

            if n == 0 {
                if buf.is_empty() {
                    return Err(LinkError::closed("Connection closed before receiving data"));
                }
                debug!("Peer closed stream after {} bytes", buf.len());
                return Ok(buf);
            }

            buf.extend_from_slice(&chunk[..n]);
            if buf.len() as u64 > limits.max_frame_bytes {
                return Err(LinkError::Framing(format!(
                    "Unframed response exceeds {} bytes",
                    limits.max_frame_bytes
                )));
            }

            if is_complete_message(&buf) {
                debug!("Received complete response ({} bytes)", buf.len());
                return Ok(buf);
            }
            debug!("Partial response so far: {}", preview(&buf));
        }
    }
}

/// Whether a legacy buffer holds one whole message.
///
/// A bare JSON scalar that happens to be a prefix of a longer one (for
/// example `12` arriving before `3`) is reported complete early. Editors only
/// ever send objects, so this is left as is.
pub fn is_complete_message(buf: &[u8]) -> bool {
    buf == PING_TOKEN || serde_json::from_slice::<IgnoredAny>(buf).is_ok()
}

async fn read_exact_within(
    io: &mut dyn Stream,
    buf: &mut [u8],
    within: Duration,
    what: &str,
) -> Result<()> {
    timeout(within, io.read_exact(buf))
        .await
        .map_err(|_| LinkError::timed_out(format!("Timeout reading {}", what)))?
        .map_err(|e| LinkError::io(&format!("Read {} failed", what), e))?;
    Ok(())
}
