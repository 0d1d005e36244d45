//! Greeting line negotiation
//!
//! Right after accepting, the editor writes one ASCII line such as
//! `MCP/0.1 FRAMING=1\n`. The client writes nothing until the line has been
//! read and a framing mode decided.

use crate::codec::{FramingMode, Stream};
use crate::protocol::FRAMING_MARKER;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::time::{Instant, timeout_at};
use tracing::{debug, warn};
use unity_link_core::{LinkError, Result};

/// Upper bound on greeting length
pub const GREETING_LIMIT: usize = 512;

/// Read the greeting line.
///
/// Stops at a newline, at [`GREETING_LIMIT`] bytes, at end of stream, or when
/// `within` elapses; whatever arrived by then is the greeting. A peer that
/// closes without sending anything is an error. Bytes are read one at a time
/// so nothing past the newline is consumed.
pub async fn read_greeting(io: &mut dyn Stream, within: Duration) -> Result<String> {
    let deadline = Instant::now() + within;
    let mut line = Vec::with_capacity(64);
    let mut byte = [0u8; 1];

    while line.len() < GREETING_LIMIT {
        match timeout_at(deadline, io.read(&mut byte)).await {
            Err(_) => break,
            Ok(Ok(0)) if line.is_empty() => {
                return Err(LinkError::closed("Connection closed before handshake"));
            }
            Ok(Ok(0)) => break,
            Ok(Ok(_)) => {
                if byte[0] == b'\n' {
                    break;
                }
                line.push(byte[0]);
            }
            Ok(Err(e)) => return Err(LinkError::io("Handshake read failed", e)),
        }
    }

    Ok(String::from_utf8_lossy(&line).trim().to_string())
}

/// Decide the framing mode for a greeting
pub fn negotiate(greeting: &str, require_framing: bool) -> Result<FramingMode> {
    if greeting.contains(FRAMING_MARKER) {
        debug!("Unity handshake received: {} (strict)", FRAMING_MARKER);
        return Ok(FramingMode::Framed);
    }
    if require_framing {
        return Err(LinkError::Handshake(format!(
            "Unity MCP requires {}, got: {:?}",
            FRAMING_MARKER, greeting
        )));
    }
    warn!(
        "Unity handshake missing {}; proceeding in legacy mode by configuration",
        FRAMING_MARKER
    );
    Ok(FramingMode::Legacy)
}

/// Read the greeting and negotiate
pub async fn perform_handshake(
    io: &mut dyn Stream,
    within: Duration,
    require_framing: bool,
) -> Result<FramingMode> {
    let greeting = read_greeting(io, within).await?;
    negotiate(&greeting, require_framing)
}
