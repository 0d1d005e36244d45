//! Port discovery
//!
//! Order of preference:
//! 1. The port in the newest status file, if it answers a probe
//! 2. The newest registry file whose port answers a probe
//! 3. The first port any registry file named, alive or not
//! 4. The configured default port

use crate::config::LinkConfig;
use crate::probe::{PortProbe, TcpProbe};
use crate::registry::RegistryReader;
use std::sync::Arc;
use tracing::{debug, info};

/// Picks the port an editor is most likely listening on
#[derive(Clone)]
pub struct PortResolver {
    registry: RegistryReader,
    probe: Arc<dyn PortProbe>,
    default_port: u16,
}

impl PortResolver {
    pub fn new(registry: RegistryReader, probe: Arc<dyn PortProbe>, default_port: u16) -> Self {
        Self {
            registry,
            probe,
            default_port,
        }
    }

    /// Resolver using TCP probes and the configured registry directory
    pub fn from_config(config: &LinkConfig) -> Self {
        Self::new(
            RegistryReader::new(config.registry_dir.clone()),
            Arc::new(TcpProbe::from_config(config)),
            config.default_port,
        )
    }

    pub fn registry(&self) -> &RegistryReader {
        &self.registry
    }

    pub fn default_port(&self) -> u16 {
        self.default_port
    }

    /// Discover the port to connect to. Never fails.
    pub async fn resolve_port(&self) -> u16 {
        if let Some(status) = self.registry.read_latest_status().await {
            if let Some(port) = status.port {
                if self.probe.probe(port).await {
                    debug!("Using Unity port from status file: {}", port);
                    return port;
                }
                debug!("Status file port {} did not answer", port);
            }
        }

        let mut first_seen = None;
        for entry in self.registry.list_candidate_registry_files().await {
            let Some(port) = self.registry.read_port(&entry).await else {
                continue;
            };
            first_seen.get_or_insert(port);
            if self.probe.probe(port).await {
                debug!("Using Unity port from {:?}: {}", entry.path, port);
                return port;
            }
        }

        match first_seen {
            Some(port) => {
                info!("No Unity instance answered; using registered port {}", port);
                port
            }
            None => {
                info!(
                    "No Unity port registry found; using default port {}",
                    self.default_port
                );
                self.default_port
            }
        }
    }
}
