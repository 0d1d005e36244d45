//! Registry and status files published by the editor
//!
//! The editor writes small JSON files into the registry directory:
//! - `unity-mcp-port-<hash>.json`: one per project, `{"unity_port": N}`
//! - `unity-mcp-port.json`: legacy single-project file, same shape
//! - `unity-mcp-status-<hash>.json`: heartbeat with `unity_port`,
//!   `reloading` and an optional `reason`
//!
//! Files may be half-written when read, so every I/O or parse failure here
//! means "no information" rather than an error.

use serde::Deserialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tokio::fs;
use tracing::debug;

/// Legacy single-project registry file
pub const REGISTRY_FILE: &str = "unity-mcp-port.json";

const REGISTRY_PREFIX: &str = "unity-mcp-port-";
const STATUS_PREFIX: &str = "unity-mcp-status-";
const JSON_SUFFIX: &str = ".json";

/// Latest heartbeat published by an editor instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointStatus {
    pub port: Option<u16>,
    pub reloading: bool,
    pub reason: Option<String>,
    pub mtime: SystemTime,
}

impl EndpointStatus {
    /// Whether the editor declared itself busy reloading
    pub fn is_reloading(&self) -> bool {
        self.reloading || self.reason.as_deref() == Some("reloading")
    }
}

/// A registry file that may name the editor's port
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryEntry {
    pub path: PathBuf,
    pub mtime: SystemTime,
    /// The legacy single-project file
    pub legacy: bool,
}

#[derive(Debug, Deserialize)]
struct StatusFile {
    #[serde(default)]
    unity_port: Option<Value>,
    #[serde(default)]
    reloading: Option<Value>,
    #[serde(default)]
    reason: Option<Value>,
}

/// Reads registry and status files from one directory
#[derive(Debug, Clone)]
pub struct RegistryReader {
    dir: PathBuf,
}

impl RegistryReader {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the legacy registry file
    pub fn legacy_path(&self) -> PathBuf {
        self.dir.join(REGISTRY_FILE)
    }

    /// Registry files, newest first; the legacy file always comes last
    pub async fn list_candidate_registry_files(&self) -> Vec<RegistryEntry> {
        let mut entries: Vec<RegistryEntry> = self
            .scan(REGISTRY_PREFIX)
            .await
            .into_iter()
            .map(|(path, mtime)| RegistryEntry {
                path,
                mtime,
                legacy: false,
            })
            .collect();

        let legacy = self.legacy_path();
        if let Ok(meta) = fs::metadata(&legacy).await {
            if meta.is_file() {
                entries.push(RegistryEntry {
                    path: legacy,
                    mtime: meta.modified().unwrap_or(SystemTime::UNIX_EPOCH),
                    legacy: true,
                });
            }
        }

        entries
    }

    /// Most recently modified status file, if one exists and parses
    pub async fn read_latest_status(&self) -> Option<EndpointStatus> {
        let (path, mtime) = self.scan(STATUS_PREFIX).await.into_iter().next()?;
        let content = fs::read(&path).await.ok()?;
        let status: StatusFile = match serde_json::from_slice(&content) {
            Ok(status) => status,
            Err(e) => {
                debug!("Ignoring unreadable status file {:?}: {}", path, e);
                return None;
            }
        };

        Some(EndpointStatus {
            port: status.unity_port.as_ref().and_then(port_from_value),
            reloading: status
                .reloading
                .as_ref()
                .and_then(Value::as_bool)
                .unwrap_or(false),
            reason: status
                .reason
                .as_ref()
                .and_then(Value::as_str)
                .map(str::to_string),
            mtime,
        })
    }

    /// Parsed JSON object of one registry file
    pub async fn read_registry_config(&self, entry: &RegistryEntry) -> Option<Value> {
        let content = match fs::read(&entry.path).await {
            Ok(content) => content,
            Err(e) => {
                debug!("Could not read port registry {:?}: {}", entry.path, e);
                return None;
            }
        };
        match serde_json::from_slice::<Value>(&content) {
            Ok(value) if value.is_object() => Some(value),
            Ok(_) => {
                debug!("Port registry {:?} is not a JSON object", entry.path);
                None
            }
            Err(e) => {
                debug!("Could not parse port registry {:?}: {}", entry.path, e);
                None
            }
        }
    }

    /// Port named by one registry file
    pub async fn read_port(&self, entry: &RegistryEntry) -> Option<u16> {
        let config = self.read_registry_config(entry).await?;
        config.get("unity_port").and_then(port_from_value)
    }

    /// Configuration of the most relevant registry file: the newest one that
    /// parses, with the legacy file as the last resort
    pub async fn read_port_config(&self) -> Option<Value> {
        for entry in self.list_candidate_registry_files().await {
            if let Some(config) = self.read_registry_config(&entry).await {
                return Some(config);
            }
        }
        None
    }

    /// Files named `<prefix>*.json`, newest first
    async fn scan(&self, prefix: &str) -> Vec<(PathBuf, SystemTime)> {
        let mut found = Vec::new();
        let mut dir = match fs::read_dir(&self.dir).await {
            Ok(dir) => dir,
            Err(e) => {
                debug!("Registry directory {:?} unavailable: {}", self.dir, e);
                return found;
            }
        };

        loop {
            let entry = match dir.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    debug!("Stopped scanning {:?}: {}", self.dir, e);
                    break;
                }
            };
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if !name.starts_with(prefix) || !name.ends_with(JSON_SUFFIX) {
                continue;
            }
            // The file may vanish between listing and stat
            let Ok(meta) = entry.metadata().await else {
                continue;
            };
            if !meta.is_file() {
                continue;
            }
            let mtime = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
            found.push((entry.path(), mtime));
        }

        // Newest first; ties broken by name so repeated scans agree
        found.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        found
    }
}

/// Accept integer ports in range
pub fn port_from_value(value: &Value) -> Option<u16> {
    value
        .as_u64()
        .and_then(|port| u16::try_from(port).ok())
        .filter(|port| *port != 0)
}
