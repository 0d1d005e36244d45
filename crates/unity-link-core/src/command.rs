//! Commands sent to the Unity editor

use crate::error::{LinkError, Result};
use serde_json::{Map, Value};

/// Command type answered with the liveness acknowledgment
pub const PING_COMMAND: &str = "ping";

/// Command-specific parameters
pub type Params = Map<String, Value>;

/// A single command for the editor
///
/// `params` is optional on purpose: a command built without parameters is a
/// caller placeholder and is answered with a structured failure, while an
/// empty map is a legitimate command with no arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub command_type: String,
    pub params: Option<Params>,
}

impl Command {
    /// Create a command with parameters
    pub fn new(command_type: impl Into<String>, params: Params) -> Self {
        Self {
            command_type: command_type.into(),
            params: Some(params),
        }
    }

    /// Create a command that carries no parameter map at all
    pub fn without_params(command_type: impl Into<String>) -> Self {
        Self {
            command_type: command_type.into(),
            params: None,
        }
    }

    /// Liveness check
    pub fn ping() -> Self {
        Self::new(PING_COMMAND, Params::new())
    }

    /// Build a command from a JSON value (object or null)
    pub fn from_value(command_type: impl Into<String>, params: Value) -> Result<Self> {
        let command_type = command_type.into();
        match params {
            Value::Object(map) => Ok(Self::new(command_type, map)),
            Value::Null => Ok(Self::without_params(command_type)),
            other => Err(LinkError::InvalidCommand(format!(
                "params for '{}' must be a JSON object, got {}",
                command_type, other
            ))),
        }
    }

    /// Whether this is the liveness command
    pub fn is_ping(&self) -> bool {
        self.command_type == PING_COMMAND
    }

    /// Reject commands that must never reach the wire
    pub fn validate(&self) -> Result<()> {
        if self.command_type.trim().is_empty() {
            return Err(LinkError::InvalidCommand(
                "MCP call missing command_type".into(),
            ));
        }
        Ok(())
    }
}
