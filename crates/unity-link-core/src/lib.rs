//! # unity-link-core
//!
//! Core types shared by the Unity editor link crates:
//! - Commands and their parameter maps
//! - Responses, including reload notices
//! - The error taxonomy used to drive retries

pub mod command;
pub mod error;
pub mod response;

pub use command::{Command, PING_COMMAND, Params};
pub use error::{LinkError, Result, TransportKind};
pub use response::{
    FailureNotice, RELOADING_STATE, ReloadNotice, Response, mentions_reload, retry_hint_ms,
};
