use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Domain-level failure reported by the annotation service inside an
/// otherwise successful response: `{"error": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{error}")]
pub struct ApiError {
    pub error: String,
}

impl ApiError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }

    /// Extracts the `error` field of a response payload. Non-string values
    /// are rendered as JSON; `null` counts as absent.
    pub fn from_payload(payload: &Value) -> Option<Self> {
        match payload.get("error")? {
            Value::Null => None,
            Value::String(message) => Some(Self::new(message.clone())),
            other => Some(Self::new(other.to_string())),
        }
    }
}
