//! API request and response types.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Response for the visit counter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisitsResponse {
    /// Visits recorded in this session, including the current one.
    pub visits: u64,
    /// Whether the session was created during this request.
    pub new_session: bool,
}

/// Request to queue a flash message.
#[derive(Debug, Clone, Deserialize)]
pub struct FlashRequest {
    /// The message to show once.
    pub message: Value,
    /// Flash key; the default key is used when omitted.
    #[serde(default)]
    pub key: Option<String>,
}

/// Flash messages consumed by a read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlashesResponse {
    pub count: usize,
    pub messages: Vec<Value>,
}

impl FlashesResponse {
    pub fn new(messages: Vec<Value>) -> Self {
        Self {
            count: messages.len(),
            messages,
        }
    }
}

/// Generic API error response.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    /// Error code (e.g., "SESSION_SAVE_FAILED").
    pub code: String,
    /// Human-readable error message.
    pub message: String,
    /// Additional details (optional).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorResponse {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}
