//! Responses returned to callers
//!
//! Every outcome that is not a terminal error is one of three variants, all of
//! which render to the same JSON shape: `success`, an optional machine-readable
//! `state`, and human-readable `error`/`message` fields.

use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value, json};

/// State tag carried by reload notices
pub const RELOADING_STATE: &str = "reloading";

/// Outcome of a command
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    /// The peer's result payload
    Success(Value),
    /// Peer is reloading and asked to be retried later
    Reloading(ReloadNotice),
    /// Structured failure that is not worth retrying
    Failure(FailureNotice),
}

/// Hint that the editor is temporarily unable to process commands
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReloadNotice {
    pub retry_after_ms: u64,
    pub error: String,
    pub message: String,
}

/// Structured failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureNotice {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ReloadNotice {
    /// Notice synthesized when the status file reports a reload
    pub fn domain_reload(retry_after_ms: u64) -> Self {
        Self {
            retry_after_ms,
            error: "Unity domain reload in progress".into(),
            message: "Unity is reloading scripts; please retry shortly".into(),
        }
    }

    /// Notice for an error reply whose text mentions a reload
    pub fn from_error_text(text: &str, retry_after_ms: u64) -> Self {
        Self {
            retry_after_ms,
            error: text.to_string(),
            message: text.to_string(),
        }
    }

    /// Extract a reload notice from a result payload, if it is one.
    ///
    /// `state: "reloading"` is authoritative. Older editors only say so in
    /// their message text, which is honoured for payloads that explicitly
    /// report `success: false`.
    pub fn from_payload(payload: &Value, default_retry_ms: u64) -> Option<Self> {
        let obj = payload.as_object()?;
        let text = text_field(obj, "message").or_else(|| text_field(obj, "error"));

        let tagged = obj.get("state").and_then(Value::as_str) == Some(RELOADING_STATE);
        let legacy = obj.get("success") == Some(&Value::Bool(false))
            && text.is_some_and(mentions_reload);
        if !tagged && !legacy {
            return None;
        }

        let retry_after_ms = obj
            .get("retry_after_ms")
            .and_then(retry_hint_ms)
            .unwrap_or(default_retry_ms);
        let fallback = ReloadNotice::domain_reload(retry_after_ms);
        Some(Self {
            retry_after_ms,
            error: text_field(obj, "error")
                .map(str::to_string)
                .unwrap_or(fallback.error),
            message: text_field(obj, "message")
                .map(str::to_string)
                .unwrap_or(fallback.message),
        })
    }
}

impl FailureNotice {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: None,
        }
    }

    /// Answer for a command that arrived without any parameter map
    pub fn missing_params() -> Self {
        Self::new("MCP call received with no parameters (client placeholder?)")
    }
}

impl Response {
    /// Classify a successful reply payload
    pub fn from_result(result: Value, default_retry_ms: u64) -> Self {
        match ReloadNotice::from_payload(&result, default_retry_ms) {
            Some(notice) => Response::Reloading(notice),
            None => Response::Success(result),
        }
    }

    /// Empty successful response
    pub fn empty() -> Self {
        Response::Success(Value::Object(Map::new()))
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Response::Success(_))
    }

    pub fn is_reloading(&self) -> bool {
        matches!(self, Response::Reloading(_))
    }

    /// Delay requested by a reload notice
    pub fn retry_after_ms(&self) -> Option<u64> {
        match self {
            Response::Reloading(notice) => Some(notice.retry_after_ms),
            _ => None,
        }
    }

    /// Render to the caller-facing JSON shape
    pub fn to_json(&self) -> Value {
        match self {
            Response::Success(data) => json!({
                "success": true,
                "data": data,
            }),
            Response::Reloading(notice) => json!({
                "success": false,
                "state": RELOADING_STATE,
                "retry_after_ms": notice.retry_after_ms,
                "error": notice.error,
                "message": notice.message,
            }),
            Response::Failure(notice) => {
                let mut out = json!({
                    "success": false,
                    "error": notice.error,
                });
                if let Some(message) = &notice.message {
                    out["message"] = json!(message);
                }
                out
            }
        }
    }
}

impl Serialize for Response {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

/// Read a `retry_after_ms` hint sent as an integer, a float or a numeric
/// string. Negative or non-numeric values yield `None`.
pub fn retry_hint_ms(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64().or_else(|| n.as_f64().and_then(whole_ms)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<u64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().and_then(whole_ms))
        }
        _ => None,
    }
}

fn whole_ms(ms: f64) -> Option<u64> {
    (ms.is_finite() && ms >= 0.0).then(|| ms.round() as u64)
}

/// Case-insensitive check for the word "reload"
pub fn mentions_reload(text: &str) -> bool {
    text.to_ascii_lowercase().contains("reload")
}

fn text_field<'a>(obj: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    obj.get(key).and_then(Value::as_str).filter(|s| !s.is_empty())
}
