//! Unity link diagnostic client
//!
//! Sends one command to the running editor and prints the response:
//!
//! ```text
//! unity-link                                   # ping
//! unity-link manage_scene '{"action":"get_hierarchy"}'
//! ```
//!
//! Settings come from `UNITY_MCP_*` environment variables; logs go to stderr
//! and honour `RUST_LOG`.

use anyhow::{Context, Result, bail};
use serde_json::Value;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use unity_link::{ConnectionManager, LinkConfig};
use unity_link_core::{Command, PING_COMMAND};

fn parse_args() -> Result<Command> {
    let mut args = std::env::args().skip(1);
    let command_type = args.next().unwrap_or_else(|| PING_COMMAND.to_string());
    let params = match args.next() {
        Some(raw) => serde_json::from_str(&raw)
            .with_context(|| format!("PARAMS_JSON is not valid JSON: {}", raw))?,
        None => Value::Object(Default::default()),
    };
    if args.next().is_some() {
        bail!("usage: unity-link [TYPE] [PARAMS_JSON]");
    }
    Ok(Command::from_value(command_type, params)?)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let command = parse_args()?;
    let config = LinkConfig::from_env();
    info!(
        "Sending '{}' to Unity (registry: {:?})",
        command.command_type, config.registry_dir
    );

    let manager = ConnectionManager::new(config);
    let response = manager
        .send_command_with_retry(&command)
        .await
        .with_context(|| format!("Unity command '{}' failed", command.command_type))?;

    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}
