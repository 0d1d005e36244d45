//! One TCP connection to the editor
//!
//! A session owns at most one live link. The link is created by [`Session::connect`]
//! (TCP connect + greeting handshake) and torn down after any failure that
//! leaves the stream in an unknown state. Requests are serialized by the
//! link mutex, so a reply is always read by the caller that sent the request.

use crate::config::LinkConfig;
use std::sync::Arc;
use std::sync::atomic::{AtomicU16, Ordering};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::{debug, error, info};
use unity_link_core::{Command, LinkError, Response, Result};
use unity_link_wire::protocol::preview;
use unity_link_wire::{
    FrameCodec, FramingMode, codec_for, encode_command, interpret_reply, perform_handshake, tcp,
};

/// Handshaken stream plus the codec negotiated for it
#[derive(Debug)]
struct Link {
    stream: TcpStream,
    codec: Box<dyn FrameCodec>,
}

/// Connection to one editor instance
#[derive(Debug)]
pub struct Session {
    config: Arc<LinkConfig>,
    port: AtomicU16,
    link: Mutex<Option<Link>>,
}

impl Session {
    pub fn new(config: Arc<LinkConfig>, port: u16) -> Self {
        Self {
            config,
            port: AtomicU16::new(port),
            link: Mutex::new(None),
        }
    }

    pub fn host(&self) -> &str {
        &self.config.host
    }

    pub fn port(&self) -> u16 {
        self.port.load(Ordering::SeqCst)
    }

    /// Point the session at another port. Takes effect on the next connect.
    pub fn set_port(&self, port: u16) {
        let previous = self.port.swap(port, Ordering::SeqCst);
        if previous != port {
            info!("Unity port changed {} -> {}", previous, port);
        }
    }

    pub async fn is_connected(&self) -> bool {
        self.link.lock().await.is_some()
    }

    /// Framing negotiated for the live link
    pub async fn framing_mode(&self) -> Option<FramingMode> {
        self.link.lock().await.as_ref().map(|link| link.codec.mode())
    }

    /// Connect and handshake unless already connected
    pub async fn connect(&self) -> Result<()> {
        let mut slot = self.link.lock().await;
        self.ensure_link(&mut slot).await.map(|_| ())
    }

    /// Drop the link. Shutdown errors are ignored.
    pub async fn disconnect(&self) {
        let mut slot = self.link.lock().await;
        teardown(&mut slot).await;
    }

    /// Send one command and interpret the reply. No retries.
    pub async fn send_command(&self, command: &Command) -> Result<Response> {
        self.send_attempt(command, false).await
    }

    /// Send serialized bytes and return the raw reply
    pub async fn round_trip(&self, payload: &[u8]) -> Result<Vec<u8>> {
        let mut slot = self.link.lock().await;
        let result = self.exchange(&mut slot, payload, false).await;
        if let Err(e) = &result {
            if e.is_retryable() {
                teardown(&mut slot).await;
            }
        }
        result
    }

    /// One request/reply exchange. Retry attempts use the shorter read bound.
    pub(crate) async fn send_attempt(&self, command: &Command, retrying: bool) -> Result<Response> {
        let payload = encode_command(command)?;

        let mut slot = self.link.lock().await;
        let result = match self.exchange(&mut slot, &payload, retrying).await {
            Ok(reply) => interpret_reply(command, &reply, self.config.reload_retry_ms),
            Err(e) => Err(e),
        };

        if let Err(e) = &result {
            // A bad ping reply means the peer is not who we think it is
            if e.is_retryable() || matches!(e, LinkError::Protocol(_)) {
                teardown(&mut slot).await;
            }
        }
        result
    }

    async fn exchange(
        &self,
        slot: &mut Option<Link>,
        payload: &[u8],
        retrying: bool,
    ) -> Result<Vec<u8>> {
        let link = self.ensure_link(slot).await?;

        debug!(
            "[Rust→Unity] len={} json={}",
            payload.len(),
            preview(payload)
        );
        link.codec.write_message(&mut link.stream, payload).await?;

        let limits = self.config.read_limits(retrying);
        let reply = link.codec.read_message(&mut link.stream, &limits).await?;
        debug!("[Unity→Rust] len={} json={}", reply.len(), preview(&reply));

        Ok(reply)
    }

    async fn ensure_link<'a>(&self, slot: &'a mut Option<Link>) -> Result<&'a mut Link> {
        if slot.is_none() {
            *slot = Some(self.open_link().await?);
        }
        slot.as_mut()
            .ok_or_else(|| LinkError::closed("Link missing after connect"))
    }

    async fn open_link(&self) -> Result<Link> {
        let host = self.host();
        let port = self.port();

        let result = async {
            let mut stream = tcp::connect(host, port, self.config.connect_timeout).await?;
            let mode = perform_handshake(
                &mut stream,
                self.config.handshake_timeout,
                self.config.require_framing,
            )
            .await?;
            Ok::<_, LinkError>(Link {
                stream,
                codec: codec_for(mode),
            })
        }
        .await;

        match result {
            Ok(link) => {
                info!(
                    "Connected to Unity at {}:{} ({} framing)",
                    host,
                    port,
                    link.codec.mode()
                );
                Ok(link)
            }
            Err(e) => {
                error!("Failed to connect to Unity at {}:{}: {}", host, port, e);
                Err(e)
            }
        }
    }
}

async fn teardown(slot: &mut Option<Link>) {
    if let Some(mut link) = slot.take() {
        debug!("Closing Unity connection");
        let _ = link.stream.shutdown().await;
    }
}
