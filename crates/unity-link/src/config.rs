//! Connection settings for the editor link

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;
use unity_link_wire::ReadLimits;
use unity_link_wire::codec::MAX_FRAME_BYTES;

/// Port the editor listens on when no registry file says otherwise
pub const DEFAULT_PORT: u16 = 6400;

/// Directory (under the home directory) where the editor publishes its port
pub const REGISTRY_DIR_NAME: &str = ".unity-mcp";

/// Configuration for the editor link
#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// Host to connect to (default: 127.0.0.1)
    pub host: String,
    /// Port used when discovery finds nothing (default: 6400)
    pub default_port: u16,
    /// Directory holding registry and status files
    pub registry_dir: PathBuf,
    /// TCP connect timeout
    pub connect_timeout: Duration,
    /// Time allowed for the greeting line
    pub handshake_timeout: Duration,
    /// Steady-state bound on each socket read
    pub receive_timeout: Duration,
    /// Shorter read bound used while retrying
    pub retry_receive_timeout: Duration,
    /// Heartbeat-only waits end after this long
    pub framed_receive_timeout: Duration,
    /// Heartbeat-only waits end after this many frames
    pub max_heartbeat_frames: u32,
    /// Largest accepted reply
    pub max_frame_bytes: u64,
    /// Connect and reply bound for liveness probes
    pub probe_timeout: Duration,
    /// Transport retries (never fewer than 5)
    pub max_retries: u32,
    /// Unit of the exponential backoff
    pub retry_delay: Duration,
    /// Default wait between reload retries, in milliseconds
    pub reload_retry_ms: u64,
    /// Reload retries before giving up
    pub reload_max_retries: u32,
    /// Reject peers that do not advertise framing
    pub require_framing: bool,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            default_port: DEFAULT_PORT,
            registry_dir: default_registry_dir(),
            connect_timeout: Duration::from_secs(1),
            handshake_timeout: Duration::from_secs(1),
            receive_timeout: Duration::from_secs(60),
            retry_receive_timeout: Duration::from_secs(1),
            framed_receive_timeout: Duration::from_secs(2),
            max_heartbeat_frames: 16,
            max_frame_bytes: MAX_FRAME_BYTES,
            probe_timeout: Duration::from_millis(300),
            max_retries: 10,
            retry_delay: Duration::from_secs(1),
            reload_retry_ms: 250,
            // 40 x 250ms is roughly a 10s reload window
            reload_max_retries: 40,
            require_framing: true,
        }
    }
}

impl LinkConfig {
    /// Defaults overlaid with `UNITY_MCP_*` environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overlaid with values from `lookup`.
    /// Values that fail to parse are ignored with a warning.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(host) = lookup("UNITY_MCP_HOST").filter(|h| !h.trim().is_empty()) {
            config.host = host.trim().to_string();
        }
        if let Some(dir) = lookup("UNITY_MCP_REGISTRY_DIR").filter(|d| !d.trim().is_empty()) {
            config.registry_dir = PathBuf::from(dir.trim());
        }
        if let Some(port) = parse_var(&lookup, "UNITY_MCP_PORT") {
            config.default_port = port;
        }
        if let Some(ms) = parse_var(&lookup, "UNITY_MCP_CONNECT_TIMEOUT_MS") {
            config.connect_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_var(&lookup, "UNITY_MCP_HANDSHAKE_TIMEOUT_MS") {
            config.handshake_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_var(&lookup, "UNITY_MCP_RECEIVE_TIMEOUT_MS") {
            config.receive_timeout = Duration::from_millis(ms);
        }
        if let Some(n) = parse_var(&lookup, "UNITY_MCP_MAX_RETRIES") {
            config.max_retries = n;
        }
        if let Some(ms) = parse_var(&lookup, "UNITY_MCP_RETRY_DELAY_MS") {
            config.retry_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_var(&lookup, "UNITY_MCP_RELOAD_RETRY_MS") {
            config.reload_retry_ms = ms;
        }
        if let Some(n) = parse_var(&lookup, "UNITY_MCP_RELOAD_MAX_RETRIES") {
            config.reload_max_retries = n;
        }
        if let Some(flag) = lookup("UNITY_MCP_REQUIRE_FRAMING") {
            match parse_flag(&flag) {
                Some(value) => config.require_framing = value,
                None => warn!("Ignoring UNITY_MCP_REQUIRE_FRAMING={:?}: not a boolean", flag),
            }
        }

        config
    }

    /// Create config reading registry files from a custom directory
    pub fn with_registry_dir(path: impl Into<PathBuf>) -> Self {
        Self {
            registry_dir: path.into(),
            ..Default::default()
        }
    }

    /// Number of transport retries after the first attempt
    pub fn transport_retries(&self) -> u32 {
        self.max_retries.max(5)
    }

    /// Read bounds for one exchange
    pub fn read_limits(&self, retrying: bool) -> ReadLimits {
        ReadLimits {
            receive_timeout: if retrying {
                self.retry_receive_timeout
            } else {
                self.receive_timeout
            },
            heartbeat_window: self.framed_receive_timeout,
            max_heartbeats: self.max_heartbeat_frames.max(1),
            max_frame_bytes: self.max_frame_bytes,
        }
    }
}

fn default_registry_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(REGISTRY_DIR_NAME)
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("Ignoring {}={:?}: not a valid number", key, raw);
            None
        }
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = LinkConfig::default();
        assert_eq!(config.default_port, 6400);
        assert_eq!(config.reload_retry_ms, 250);
        assert_eq!(config.reload_max_retries, 40);
        assert!(config.require_framing);
        assert!(config.registry_dir.ends_with(".unity-mcp"));
    }

    #[test]
    fn test_env_overrides() {
        let config = LinkConfig::from_lookup(lookup_from(&[
            ("UNITY_MCP_HOST", "10.0.0.5"),
            ("UNITY_MCP_PORT", "6401"),
            ("UNITY_MCP_RELOAD_RETRY_MS", "100"),
            ("UNITY_MCP_REQUIRE_FRAMING", "false"),
            ("UNITY_MCP_CONNECT_TIMEOUT_MS", "250"),
        ]));
        assert_eq!(config.host, "10.0.0.5");
        assert_eq!(config.default_port, 6401);
        assert_eq!(config.reload_retry_ms, 100);
        assert!(!config.require_framing);
        assert_eq!(config.connect_timeout, Duration::from_millis(250));
    }

    #[test]
    fn test_invalid_values_ignored() {
        let config = LinkConfig::from_lookup(lookup_from(&[
            ("UNITY_MCP_PORT", "not-a-port"),
            ("UNITY_MCP_REQUIRE_FRAMING", "maybe"),
            ("UNITY_MCP_MAX_RETRIES", "-3"),
        ]));
        assert_eq!(config.default_port, 6400);
        assert!(config.require_framing);
        assert_eq!(config.max_retries, 10);
    }

    #[test]
    fn test_transport_retries_floor() {
        let config = LinkConfig {
            max_retries: 2,
            ..Default::default()
        };
        assert_eq!(config.transport_retries(), 5);
    }

    #[test]
    fn test_read_limits_shorten_on_retry() {
        let config = LinkConfig::default();
        assert_eq!(config.read_limits(false).receive_timeout, Duration::from_secs(60));
        assert_eq!(config.read_limits(true).receive_timeout, Duration::from_secs(1));
    }
}
