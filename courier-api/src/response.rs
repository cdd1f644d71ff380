//! Backend response envelope.
//!
//! Endpoints either return their payload bare or wrapped like this:
//! ```json
//! { "status": 200, "message": "ok", "data": [ ... ], "metadata": { "cursor": "..." } }
//! ```
//! An envelope can report failure in its body even on an HTTP 200.

use serde::{Deserialize, Serialize};

use courier_core::error::CourierError;

/// Standard response envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerResponse<T = serde_json::Value> {
    /// HTTP-like status code, when the backend includes one.
    #[serde(default)]
    pub status: Option<u16>,
    #[serde(default)]
    pub message: String,
    pub data: Option<T>,
    /// Error details (present only on error responses).
    pub error: Option<ServerError>,
    /// Metadata (cursor, totals, etc).
    pub metadata: Option<serde_json::Value>,
}

/// Server error detail. Some backends send a plain string instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ServerError {
    Detail {
        #[serde(rename = "type")]
        error_type: Option<String>,
        message: Option<String>,
    },
    Text(String),
}

impl ServerError {
    pub fn message(&self) -> Option<&str> {
        match self {
            ServerError::Detail { message, .. } => message.as_deref(),
            ServerError::Text(text) => Some(text.as_str()),
        }
    }
}

impl<T> ServerResponse<T> {
    /// Success unless the body says otherwise.
    pub fn is_success(&self) -> bool {
        self.error.is_none() && self.status.map_or(true, |s| (200..300).contains(&s))
    }

    pub fn is_error(&self) -> bool {
        !self.is_success()
    }

    /// Get the error message if this is an error response.
    pub fn error_message(&self) -> Option<String> {
        if self.is_error() {
            self.error
                .as_ref()
                .and_then(|e| e.message().map(String::from))
                .or_else(|| Some(self.message.clone()))
        } else {
            None
        }
    }
}

/// The failure an enveloped body reports, if any. Bare payloads (arrays,
/// objects without envelope fields) never fail here.
pub fn envelope_error(body: &serde_json::Value) -> Option<CourierError> {
    if !body.is_object() || (body.get("status").is_none() && body.get("error").is_none()) {
        return None;
    }
    let envelope: ServerResponse = serde_json::from_value(body.clone()).ok()?;
    if envelope.is_success() {
        return None;
    }
    let message = envelope.error_message().unwrap_or_default();
    Some(match envelope.status {
        Some(401) | Some(403) => CourierError::AuthFailed(message),
        status => CourierError::ServerError {
            status: status.unwrap_or(500),
            message,
        },
    })
}
