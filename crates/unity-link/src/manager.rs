//! Shared session management
//!
//! A [`ConnectionManager`] lazily creates one [`Session`] and hands the same
//! one to every caller until it fails. Creation is double-checked: a read
//! lock for the fast path, a creation mutex, then a second look before
//! connecting.

use crate::config::LinkConfig;
use crate::resolver::PortResolver;
use crate::retry::RetryPolicy;
use crate::session::Session;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};
use unity_link_core::{Command, LinkError, Response, Result};

/// Owner of the shared editor session
pub struct ConnectionManager {
    config: Arc<LinkConfig>,
    resolver: PortResolver,
    policy: RetryPolicy,
    current: RwLock<Option<Arc<Session>>>,
    create_lock: Mutex<()>,
}

impl ConnectionManager {
    /// Manager using TCP probes against the configured registry directory
    pub fn new(config: LinkConfig) -> Self {
        let resolver = PortResolver::from_config(&config);
        Self::with_resolver(config, resolver)
    }

    /// Manager with a custom port resolver
    pub fn with_resolver(config: LinkConfig, resolver: PortResolver) -> Self {
        let config = Arc::new(config);
        let policy = RetryPolicy::new(config.clone(), resolver.clone());
        Self {
            config,
            resolver,
            policy,
            current: RwLock::new(None),
            create_lock: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Whether a session is currently stored
    pub async fn has_connection(&self) -> bool {
        self.current.read().await.is_some()
    }

    /// The shared session, creating and connecting it on first use.
    /// An existing session is returned as is, without a liveness check.
    pub async fn get_connection(&self) -> Result<Arc<Session>> {
        if let Some(session) = self.current.read().await.as_ref() {
            return Ok(session.clone());
        }

        let _guard = self.create_lock.lock().await;
        if let Some(session) = self.current.read().await.as_ref() {
            return Ok(session.clone());
        }

        let port = self.resolver.resolve_port().await;
        let session = Arc::new(Session::new(self.config.clone(), port));
        match session.connect().await {
            Ok(()) => {
                info!("Unity session established on port {}", port);
                *self.current.write().await = Some(session.clone());
                Ok(session)
            }
            Err(e) => {
                *self.current.write().await = None;
                Err(LinkError::ConnectionUnavailable(format!(
                    "Could not connect to Unity at {}:{}: {}",
                    self.config.host, port, e
                )))
            }
        }
    }

    /// Send a command through the shared session with reconnects and reload
    /// waits.
    pub async fn send_command_with_retry(&self, command: &Command) -> Result<Response> {
        if let Some(response) = self.policy.screen(command)? {
            return Ok(response);
        }
        if let Some(response) = self.policy.preflight().await {
            return Ok(response);
        }

        let session = self.get_connection().await?;
        let result = self.policy.patient_send(&session, command).await;
        if let Err(e) = &result {
            if e.is_retryable() {
                warn!("Dropping Unity session after failure: {}", e);
                self.discard(&session).await;
            }
        }
        result
    }

    /// Drop the stored session so the next call builds a fresh one
    pub async fn invalidate(&self) {
        let previous = self.current.write().await.take();
        if let Some(session) = previous {
            session.disconnect().await;
        }
    }

    /// Drop `session` if it is still the stored one
    async fn discard(&self, session: &Arc<Session>) {
        let removed = {
            let mut current = self.current.write().await;
            match current.as_ref() {
                Some(stored) if Arc::ptr_eq(stored, session) => current.take(),
                _ => None,
            }
        };
        if let Some(session) = removed {
            session.disconnect().await;
        }
    }
}
