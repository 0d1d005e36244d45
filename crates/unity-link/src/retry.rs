//! Retry and backoff around a session
//!
//! Two loops cooperate:
//! - the transport loop reconnects after socket, handshake and framing
//!   failures, re-resolving the port and sleeping with capped exponential
//!   backoff between attempts
//! - the reload loop waits out an editor that answered "reloading", at a
//!   fixed interval and for a bounded number of tries

use crate::config::LinkConfig;
use crate::resolver::PortResolver;
use crate::session::Session;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};
use unity_link_core::{Command, FailureNotice, LinkError, ReloadNotice, Response, Result};

/// Backoff ceiling while the status file says the editor is reloading
pub const RELOAD_BACKOFF_CAP: Duration = Duration::from_millis(800);

/// Backoff ceiling after refused, reset or timed-out sockets
pub const FAST_BACKOFF_CAP: Duration = Duration::from_millis(250);

/// Backoff ceiling for everything else
pub const SLOW_BACKOFF_CAP: Duration = Duration::from_secs(3);

/// Which backoff ceiling applies to a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    Reloading,
    Fast,
    Slow,
}

impl FailureClass {
    pub fn classify(error: &LinkError, status_reloading: bool) -> Self {
        if status_reloading {
            FailureClass::Reloading
        } else if error.is_fast_transient() {
            FailureClass::Fast
        } else {
            FailureClass::Slow
        }
    }

    pub fn cap(self) -> Duration {
        match self {
            FailureClass::Reloading => RELOAD_BACKOFF_CAP,
            FailureClass::Fast => FAST_BACKOFF_CAP,
            FailureClass::Slow => SLOW_BACKOFF_CAP,
        }
    }
}

/// Random factor in [0.1, 0.3)
pub fn decorrelated_jitter() -> f64 {
    rand::rng().random_range(0.1..0.3)
}

/// `min(cap, jitter * 2^attempt * unit)`
pub fn backoff_delay(attempt: u32, class: FailureClass, unit: Duration, jitter: f64) -> Duration {
    let factor = jitter * 2f64.powi(attempt.min(30) as i32);
    let secs = (unit.as_secs_f64() * factor).min(class.cap().as_secs_f64());
    Duration::from_secs_f64(secs.max(0.0))
}

/// Reconnect and reload handling for commands sent through a [`Session`]
#[derive(Clone)]
pub struct RetryPolicy {
    config: Arc<LinkConfig>,
    resolver: PortResolver,
}

impl RetryPolicy {
    pub fn new(config: Arc<LinkConfig>, resolver: PortResolver) -> Self {
        Self { config, resolver }
    }

    /// Catch commands that must not be sent.
    ///
    /// An empty command type is an error. A command without a parameter map
    /// gets a structured failure response instead of a round trip.
    pub fn screen(&self, command: &Command) -> Result<Option<Response>> {
        command.validate()?;
        if command.params.is_none() {
            warn!(
                "Unity command '{}' has no parameters; not sending",
                command.command_type
            );
            return Ok(Some(Response::Failure(FailureNotice::missing_params())));
        }
        Ok(None)
    }

    /// A reloading response if the editor has announced a reload, without
    /// touching the network
    pub async fn preflight(&self) -> Option<Response> {
        if self.status_reloading().await {
            info!("Unity is reloading; deferring command");
            return Some(Response::Reloading(ReloadNotice::domain_reload(
                self.config.reload_retry_ms,
            )));
        }
        None
    }

    /// Send with transport retries, then wait out reload notices.
    ///
    /// Gives up after `reload_max_retries` reload waits and returns the last
    /// reloading response.
    pub async fn patient_send(&self, session: &Session, command: &Command) -> Result<Response> {
        let mut response = self.send_with_backoff(session, command).await?;
        let mut retries = 0u32;

        while let Some(hint) = response.retry_after_ms() {
            if retries >= self.config.reload_max_retries {
                warn!(
                    "Unity still reloading after {} retries; giving up on '{}'",
                    retries, command.command_type
                );
                break;
            }
            retries += 1;

            let wait = if hint > 0 {
                hint
            } else {
                self.config.reload_retry_ms
            };
            debug!(
                "Unity reloading; retry {}/{} in {}ms",
                retries, self.config.reload_max_retries, wait
            );
            sleep(Duration::from_millis(wait)).await;

            // Still announced as reloading: spend the retry without sending
            if self.status_reloading().await {
                continue;
            }
            response = self.send_with_backoff(session, command).await?;
        }

        Ok(response)
    }

    /// Send with reconnects on retryable failures.
    ///
    /// Makes `max(max_retries, 5) + 1` attempts. Non-retryable errors and the
    /// error from the final attempt are returned unchanged.
    pub async fn send_with_backoff(
        &self,
        session: &Session,
        command: &Command,
    ) -> Result<Response> {
        let attempts = self.config.transport_retries() + 1;
        let mut attempt = 0u32;

        loop {
            let err = match session.send_attempt(command, attempt > 0).await {
                Ok(response) => return Ok(response),
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) => e,
            };

            if attempt + 1 >= attempts {
                warn!(
                    "Unity command '{}' failed after {} attempts: {}",
                    command.command_type, attempts, err
                );
                return Err(err);
            }
            warn!(
                "Unity command '{}' failed (attempt {}/{}): {}",
                command.command_type,
                attempt + 1,
                attempts,
                err
            );

            // The failed link is already gone; another caller may have
            // reconnected since, so the session is left as is
            let port = self.resolver.resolve_port().await;
            session.set_port(port);

            let class = FailureClass::classify(&err, self.status_reloading().await);
            let delay = backoff_delay(
                attempt,
                class,
                self.config.retry_delay,
                decorrelated_jitter(),
            );
            debug!("Retrying in {:?} ({:?} backoff)", delay, class);
            sleep(delay).await;

            attempt += 1;
        }
    }

    async fn status_reloading(&self) -> bool {
        self.resolver
            .registry()
            .read_latest_status()
            .await
            .is_some_and(|status| status.is_reloading())
    }
}
