//! Shared fixtures for the link tests: fake editors, fake probes and
//! registry files with controlled timestamps.

use crate::config::LinkConfig;
use crate::probe::PortProbe;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use unity_link_wire::PING_TOKEN;

pub(crate) const FRAMED_GREETING: &[u8] = b"WELCOME UNITY-MCP 1 FRAMING=1\n";
pub(crate) const LEGACY_GREETING: &[u8] = b"WELCOME UNITY-MCP 1\n";
pub(crate) const PONG_REPLY: &[u8] = br#"{"status":"success","result":{"message":"pong"}}"#;

/// Write `value` to `dir/name` with an mtime `age_secs` in the past
pub(crate) fn write_json_aged(dir: &Path, name: &str, value: &Value, age_secs: u64) {
    let path = dir.join(name);
    std::fs::write(&path, serde_json::to_vec(value).unwrap()).unwrap();
    let file = std::fs::File::options().write(true).open(&path).unwrap();
    file.set_modified(SystemTime::now() - Duration::from_secs(age_secs))
        .unwrap();
}

/// Config with short timeouts pointing at `registry_dir`
pub(crate) fn test_config(registry_dir: &Path) -> LinkConfig {
    LinkConfig {
        registry_dir: registry_dir.to_path_buf(),
        connect_timeout: Duration::from_millis(500),
        handshake_timeout: Duration::from_millis(500),
        receive_timeout: Duration::from_secs(2),
        retry_receive_timeout: Duration::from_secs(1),
        probe_timeout: Duration::from_millis(200),
        retry_delay: Duration::from_millis(10),
        reload_retry_ms: 10,
        ..LinkConfig::default()
    }
}

/// Length-prefix a payload
pub(crate) fn frame(payload: &[u8]) -> Vec<u8> {
    let mut out = (payload.len() as u64).to_be_bytes().to_vec();
    out.extend_from_slice(payload);
    out
}

/// A port nobody listens on
pub(crate) async fn dead_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

/// Probe answering from a fixed set of live ports
#[derive(Debug, Default)]
pub(crate) struct FakeProbe {
    alive: HashSet<u16>,
    calls: Mutex<Vec<u16>>,
}

impl FakeProbe {
    pub(crate) fn alive(ports: &[u16]) -> Arc<Self> {
        Arc::new(Self {
            alive: ports.iter().copied().collect(),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn calls(&self) -> Vec<u16> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl PortProbe for FakeProbe {
    async fn probe(&self, port: u16) -> bool {
        self.calls.lock().unwrap().push(port);
        self.alive.contains(&port)
    }
}

/// How the fake editor answers one message
pub(crate) enum PeerReply {
    /// Send a message using the connection's boundary format
    Message(Vec<u8>),
    /// Write bytes exactly as given
    Raw(Vec<u8>),
    /// Drop the connection
    Close,
}

type Handler = Arc<dyn Fn(&[u8]) -> PeerReply + Send + Sync>;

/// In-process editor stand-in listening on a loopback port.
///
/// Raw `ping` probes are answered with an unframed pong in either mode.
pub(crate) struct FakePeer {
    pub(crate) port: u16,
    accepts: Arc<AtomicUsize>,
    received: Arc<Mutex<Vec<Vec<u8>>>>,
    task: JoinHandle<()>,
}

impl FakePeer {
    /// Framed editor that answers pings and hands everything else to `handler`
    pub(crate) async fn framed(
        handler: impl Fn(&[u8]) -> PeerReply + Send + Sync + 'static,
    ) -> Self {
        Self::spawn(FRAMED_GREETING, true, Arc::new(handler)).await
    }

    /// Legacy editor without the framing marker
    pub(crate) async fn legacy(
        handler: impl Fn(&[u8]) -> PeerReply + Send + Sync + 'static,
    ) -> Self {
        Self::spawn(LEGACY_GREETING, false, Arc::new(handler)).await
    }

    /// Framed editor that answers every command with `reply`
    pub(crate) async fn replying(reply: &'static [u8]) -> Self {
        Self::framed(move |payload| {
            if payload == PING_TOKEN {
                PeerReply::Message(PONG_REPLY.to_vec())
            } else {
                PeerReply::Message(reply.to_vec())
            }
        })
        .await
    }

    async fn spawn(greeting: &'static [u8], framed: bool, handler: Handler) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let accepts = Arc::new(AtomicUsize::new(0));
        let received = Arc::new(Mutex::new(Vec::new()));

        let task = {
            let accepts = accepts.clone();
            let received = received.clone();
            tokio::spawn(async move {
                while let Ok((stream, _)) = listener.accept().await {
                    accepts.fetch_add(1, Ordering::SeqCst);
                    tokio::spawn(serve(
                        stream,
                        greeting,
                        framed,
                        handler.clone(),
                        received.clone(),
                    ));
                }
            })
        };

        Self {
            port,
            accepts,
            received,
            task,
        }
    }

    /// Connections accepted so far (probes included)
    pub(crate) fn accepts(&self) -> usize {
        self.accepts.load(Ordering::SeqCst)
    }

    /// Non-probe messages received so far
    pub(crate) fn received(&self) -> Vec<Vec<u8>> {
        self.received.lock().unwrap().clone()
    }
}

impl Drop for FakePeer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve(
    mut stream: TcpStream,
    greeting: &'static [u8],
    framed: bool,
    handler: Handler,
    received: Arc<Mutex<Vec<Vec<u8>>>>,
) {
    if stream.write_all(greeting).await.is_err() {
        return;
    }

    loop {
        let mut head = [0u8; 4];
        if stream.read_exact(&mut head).await.is_err() {
            return;
        }
        if &head == PING_TOKEN {
            // Liveness probe: raw token in, raw pong out
            if stream.write_all(PONG_REPLY).await.is_err() {
                return;
            }
            continue;
        }

        let payload = if framed {
            let mut rest = [0u8; 4];
            if stream.read_exact(&mut rest).await.is_err() {
                return;
            }
            let mut header = [0u8; 8];
            header[..4].copy_from_slice(&head);
            header[4..].copy_from_slice(&rest);
            let mut payload = vec![0u8; u64::from_be_bytes(header) as usize];
            if stream.read_exact(&mut payload).await.is_err() {
                return;
            }
            payload
        } else {
            let mut payload = head.to_vec();
            let mut chunk = [0u8; 4096];
            while serde_json::from_slice::<Value>(&payload).is_err() {
                match stream.read(&mut chunk).await {
                    Ok(0) | Err(_) => return,
                    Ok(n) => payload.extend_from_slice(&chunk[..n]),
                }
            }
            payload
        };

        received.lock().unwrap().push(payload.clone());
        let outcome = match handler(&payload) {
            PeerReply::Message(reply) if framed => stream.write_all(&frame(&reply)).await,
            PeerReply::Message(reply) => stream.write_all(&reply).await,
            PeerReply::Raw(bytes) => stream.write_all(&bytes).await,
            PeerReply::Close => return,
        };
        if outcome.is_err() {
            return;
        }
    }
}
