//! Client side of the Unity editor link
//!
//! This crate provides:
//! - Port discovery from the editor's registry and status files
//! - Liveness probing of candidate ports
//! - A handshaken, serialized [`Session`] per editor connection
//! - Reconnect backoff and reload waits ([`RetryPolicy`])
//! - A shared, lazily connected session ([`ConnectionManager`])
//!
//! ```no_run
//! use unity_link::{Command, ConnectionManager, LinkConfig};
//!
//! # async fn run() -> unity_link::Result<()> {
//! let manager = ConnectionManager::new(LinkConfig::from_env());
//! let response = manager.send_command_with_retry(&Command::ping()).await?;
//! println!("{}", response.to_json());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod manager;
pub mod probe;
pub mod registry;
pub mod resolver;
pub mod retry;
pub mod session;

#[cfg(test)]
pub(crate) mod testing;

pub use config::{DEFAULT_PORT, LinkConfig};
pub use manager::ConnectionManager;
pub use probe::{PortProbe, TcpProbe};
pub use registry::{EndpointStatus, RegistryEntry, RegistryReader};
pub use resolver::PortResolver;
pub use retry::{FailureClass, RetryPolicy};
pub use session::Session;

pub use unity_link_core::{Command, LinkError, Params, Response, Result};
