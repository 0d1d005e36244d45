//! Liveness probing of candidate ports

use crate::config::LinkConfig;
use async_trait::async_trait;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::{Instant, timeout_at};
use tracing::debug;
use unity_link_wire::{PING_TOKEN, contains_pong, tcp};

/// Most bytes read while waiting for the acknowledgment
const PROBE_READ_LIMIT: usize = 512;

/// Checks whether an editor answers on a port
#[async_trait]
pub trait PortProbe: Send + Sync {
    async fn probe(&self, port: u16) -> bool;
}

/// Probe over a fresh TCP connection: send the raw `ping` token and wait for
/// a pong. Any failure counts as "not alive".
#[derive(Debug, Clone)]
pub struct TcpProbe {
    host: String,
    timeout: Duration,
}

impl TcpProbe {
    pub fn new(host: impl Into<String>, timeout: Duration) -> Self {
        Self {
            host: host.into(),
            timeout,
        }
    }

    pub fn from_config(config: &LinkConfig) -> Self {
        Self::new(config.host.clone(), config.probe_timeout)
    }
}

#[async_trait]
impl PortProbe for TcpProbe {
    async fn probe(&self, port: u16) -> bool {
        let deadline = Instant::now() + self.timeout;

        let mut stream = match tcp::connect(&self.host, port, self.timeout).await {
            Ok(stream) => stream,
            Err(e) => {
                debug!("Probe of port {} failed to connect: {}", port, e);
                return false;
            }
        };

        let sent = timeout_at(deadline, stream.write_all(PING_TOKEN)).await;
        if !matches!(sent, Ok(Ok(()))) {
            debug!("Probe of port {} failed to send", port);
            return false;
        }

        // The reply may arrive behind a greeting line, so keep reading until
        // the acknowledgment shows up or the budget runs out
        let mut seen = Vec::with_capacity(PROBE_READ_LIMIT);
        let mut chunk = [0u8; PROBE_READ_LIMIT];
        while seen.len() < PROBE_READ_LIMIT {
            let room = PROBE_READ_LIMIT - seen.len();
            match timeout_at(deadline, stream.read(&mut chunk[..room])).await {
                Ok(Ok(0)) | Ok(Err(_)) | Err(_) => break,
                Ok(Ok(n)) => {
                    seen.extend_from_slice(&chunk[..n]);
                    if contains_pong(&seen) {
                        return true;
                    }
                }
            }
        }

        debug!("Probe of port {} got no pong", port);
        false
    }
}
