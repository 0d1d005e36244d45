//! TCP transport for the editor link

use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use unity_link_core::{LinkError, Result};

/// Connect to `host:port` within `connect_timeout`, with Nagle disabled
pub async fn connect(host: &str, port: u16, connect_timeout: Duration) -> Result<TcpStream> {
    let addr = format!("{}:{}", host, port);

    let stream = timeout(connect_timeout, TcpStream::connect(&addr))
        .await
        .map_err(|_| LinkError::timed_out(format!("Connection timeout to {}", addr)))?
        .map_err(|e| LinkError::io(&format!("Failed to connect to {}", addr), e))?;

    // Disable Nagle's algorithm for low latency
    stream
        .set_nodelay(true)
        .map_err(|e| LinkError::io("Failed to set TCP_NODELAY", e))?;

    Ok(stream)
}
