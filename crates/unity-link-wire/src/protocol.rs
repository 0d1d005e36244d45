//! Wire protocol for Rust <-> Unity communication
//!
//! Commands travel as `{"type": ..., "params": {...}}` JSON, except the
//! liveness command which is the bare 4-byte token `ping`. Replies are
//! `{"status": "success"|"error", "result": {...}}` with optional
//! `error`/`message` text.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use unity_link_core::{
    Command, LinkError, Params, RELOADING_STATE, ReloadNotice, Response, Result, mentions_reload,
    retry_hint_ms,
};

/// Liveness token sent in place of a JSON envelope
pub const PING_TOKEN: &[u8; 4] = b"ping";

/// Substring that identifies a liveness acknowledgment
pub const PONG_MARKER: &[u8] = br#""message":"pong""#;

/// Acknowledgment text inside a successful ping reply
pub const PONG_MESSAGE: &str = "pong";

/// Token a peer advertises in its greeting when it speaks framed messages
pub const FRAMING_MARKER: &str = "FRAMING=1";

#[derive(Serialize)]
struct CommandEnvelope<'a> {
    #[serde(rename = "type")]
    command_type: &'a str,
    params: &'a Params,
}

/// Top-level reply status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplyStatus {
    Success,
    Error,
    #[serde(other)]
    Unknown,
}

/// Reply envelope as sent by the editor
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReplyEnvelope {
    #[serde(default)]
    pub status: Option<ReplyStatus>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<Value>,
    #[serde(default)]
    pub message: Option<Value>,
    #[serde(default)]
    pub state: Option<String>,
    /// Integer, float or numeric string
    #[serde(default)]
    pub retry_after_ms: Option<Value>,
}

impl ReplyEnvelope {
    /// Human-readable failure text
    pub fn error_text(&self) -> String {
        [&self.error, &self.message]
            .into_iter()
            .flatten()
            .find_map(|v| match v {
                Value::String(s) if !s.is_empty() => Some(s.clone()),
                Value::Null => None,
                Value::String(_) => None,
                other => Some(other.to_string()),
            })
            .unwrap_or_else(|| "Unknown Unity error".to_string())
    }

    /// Retry hint in milliseconds, or `default_ms` when absent or unreadable
    pub fn retry_after_ms_or(&self, default_ms: u64) -> u64 {
        self.retry_after_ms
            .as_ref()
            .and_then(retry_hint_ms)
            .unwrap_or(default_ms)
    }

    /// Whether this is the exact liveness acknowledgment
    pub fn is_pong(&self) -> bool {
        self.status == Some(ReplyStatus::Success)
            && self
                .result
                .as_ref()
                .and_then(|r| r.get("message"))
                .and_then(Value::as_str)
                == Some(PONG_MESSAGE)
    }
}

/// Serialize a command to the bytes written on the wire
pub fn encode_command(command: &Command) -> Result<Vec<u8>> {
    if command.is_ping() {
        return Ok(PING_TOKEN.to_vec());
    }
    let empty = Params::new();
    let envelope = CommandEnvelope {
        command_type: &command.command_type,
        params: command.params.as_ref().unwrap_or(&empty),
    };
    Ok(serde_json::to_vec(&envelope)?)
}

/// Deserialize a reply envelope
pub fn decode_reply(bytes: &[u8]) -> Result<ReplyEnvelope> {
    Ok(serde_json::from_slice(bytes)?)
}

/// Whether raw probe bytes contain a liveness acknowledgment
pub fn contains_pong(bytes: &[u8]) -> bool {
    bytes
        .windows(PONG_MARKER.len())
        .any(|window| window == PONG_MARKER)
}

/// Turn the raw reply to `command` into a caller-facing response.
///
/// Reload notices become [`Response::Reloading`]; peer error statuses become
/// [`LinkError::Peer`]; a ping must be answered by the exact acknowledgment.
pub fn interpret_reply(command: &Command, bytes: &[u8], default_retry_ms: u64) -> Result<Response> {
    if command.is_ping() {
        let pong = decode_reply(bytes).map(|r| r.is_pong()).unwrap_or(false);
        if pong {
            return Ok(Response::Success(json!({ "message": PONG_MESSAGE })));
        }
        return Err(LinkError::Protocol(format!(
            "Ping unsuccessful: {}",
            preview(bytes)
        )));
    }

    // Heartbeat-only wait: the peer is alive but had nothing to say
    if bytes.is_empty() {
        return Ok(Response::empty());
    }

    let reply = decode_reply(bytes)
        .map_err(|e| LinkError::Framing(format!("Reply is not valid JSON: {}", e)))?;

    if reply.state.as_deref() == Some(RELOADING_STATE) {
        let retry_after_ms = reply.retry_after_ms_or(default_retry_ms);
        return Ok(Response::Reloading(ReloadNotice::from_error_text(
            &reply.error_text(),
            retry_after_ms,
        )));
    }

    if reply.status == Some(ReplyStatus::Error) {
        let text = reply.error_text();
        if mentions_reload(&text) {
            let retry_after_ms = reply.retry_after_ms_or(default_retry_ms);
            return Ok(Response::Reloading(ReloadNotice::from_error_text(
                &text,
                retry_after_ms,
            )));
        }
        return Err(LinkError::Peer(text));
    }

    let result = reply.result.unwrap_or_else(|| json!({}));
    Ok(Response::from_result(result, default_retry_ms))
}

/// Short printable prefix of a payload for logs and errors
pub fn preview(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).chars().take(200).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_command_envelope() {
        let mut params = Params::new();
        params.insert("action".into(), json!("get_hierarchy"));
        let bytes = encode_command(&Command::new("manage_scene", params)).unwrap();
        let json: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["type"], "manage_scene");
        assert_eq!(json["params"]["action"], "get_hierarchy");
    }

    #[test]
    fn test_encode_ping_is_token() {
        assert_eq!(encode_command(&Command::ping()).unwrap(), b"ping");
    }

    #[test]
    fn test_ping_reply_validation() {
        let ok = br#"{"status":"success","result":{"message":"pong"}}"#;
        let response = interpret_reply(&Command::ping(), ok, 250).unwrap();
        assert_eq!(response, Response::Success(json!({"message": "pong"})));

        let wrong = br#"{"status":"success","result":{"message":"hello"}}"#;
        assert!(matches!(
            interpret_reply(&Command::ping(), wrong, 250),
            Err(LinkError::Protocol(_))
        ));
        assert!(interpret_reply(&Command::ping(), b"", 250).is_err());
    }

    #[test]
    fn test_error_status_is_peer_error() {
        let cmd = Command::new("manage_asset", Params::new());
        let reply = br#"{"status":"error","error":"Asset not found"}"#;
        match interpret_reply(&cmd, reply, 250) {
            Err(LinkError::Peer(msg)) => assert_eq!(msg, "Asset not found"),
            other => panic!("expected peer error, got {:?}", other),
        }

        let reply = br#"{"status":"error"}"#;
        match interpret_reply(&cmd, reply, 250) {
            Err(LinkError::Peer(msg)) => assert_eq!(msg, "Unknown Unity error"),
            other => panic!("expected peer error, got {:?}", other),
        }
    }

    #[test]
    fn test_error_mentioning_reload_is_reloading() {
        let cmd = Command::new("manage_script", Params::new());
        let reply = br#"{"status":"error","message":"Unity is reloading; try again"}"#;
        let response = interpret_reply(&cmd, reply, 300).unwrap();
        assert_eq!(response.retry_after_ms(), Some(300));
    }

    #[test]
    fn test_top_level_reloading_state() {
        let cmd = Command::new("manage_editor", Params::new());
        let reply = br#"{"status":"error","state":"reloading","retry_after_ms":120}"#;
        let response = interpret_reply(&cmd, reply, 250).unwrap();
        assert_eq!(response.retry_after_ms(), Some(120));
    }

    #[test]
    fn test_reload_hint_as_float_or_string() {
        let cmd = Command::new("manage_editor", Params::new());

        let reply = br#"{"status":"error","state":"reloading","retry_after_ms":250.0}"#;
        let response = interpret_reply(&cmd, reply, 100).unwrap();
        assert_eq!(response.retry_after_ms(), Some(250));

        let reply = br#"{"status":"error","state":"reloading","retry_after_ms":"250"}"#;
        let response = interpret_reply(&cmd, reply, 100).unwrap();
        assert_eq!(response.retry_after_ms(), Some(250));

        let reply = br#"{"status":"error","state":"reloading","retry_after_ms":"later"}"#;
        let response = interpret_reply(&cmd, reply, 100).unwrap();
        assert_eq!(response.retry_after_ms(), Some(100));

        let reply = br#"{"status":"success","result":{"state":"reloading","retry_after_ms":"75"}}"#;
        let response = interpret_reply(&cmd, reply, 100).unwrap();
        assert_eq!(response.retry_after_ms(), Some(75));
    }

    #[test]
    fn test_success_returns_nested_result() {
        let cmd = Command::new("read_console", Params::new());
        let reply = br#"{"status":"success","result":{"lines":["a","b"]}}"#;
        let response = interpret_reply(&cmd, reply, 250).unwrap();
        assert_eq!(response, Response::Success(json!({"lines": ["a", "b"]})));

        // Empty payload after a heartbeat-only wait
        assert_eq!(interpret_reply(&cmd, b"", 250).unwrap(), Response::empty());
    }

    #[test]
    fn test_garbage_reply_is_framing_error() {
        let cmd = Command::new("read_console", Params::new());
        assert!(matches!(
            interpret_reply(&cmd, b"{\"status\":", 250),
            Err(LinkError::Framing(_))
        ));
    }

    #[test]
    fn test_contains_pong() {
        assert!(contains_pong(br#"{"status":"success","result":{"message":"pong"}}"#));
        assert!(!contains_pong(b"MCP/0.1 FRAMING=1\n"));
    }
}
