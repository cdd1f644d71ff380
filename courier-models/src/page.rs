//! Paged read results and the cursor that bounds them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use courier_core::error::{CourierError, CourierResult};

use crate::message::Message;

/// Opaque position in the backend's message stream.
///
/// The backend defines the format; when it does not supply one, the cursor
/// is the newest `sent_at` of the page in epoch milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cursor(String);

impl Cursor {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn from_timestamp(ts: DateTime<Utc>) -> Self {
        Self(ts.timestamp_millis().to_string())
    }
}

impl std::fmt::Display for Cursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One page from the message endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct FetchPage {
    pub messages: Vec<Message>,
    /// Where the next fetch should resume. `None` keeps the previous cursor.
    pub cursor: Option<Cursor>,
}

impl FetchPage {
    /// Decode a response body.
    ///
    /// The body is either a bare array of rows or an envelope object whose
    /// `data` (or `messages`) field holds the rows. A cursor is read from
    /// `cursor`, `nextCursor`, or `metadata.cursor`. Any row that fails to
    /// decode fails the whole page.
    pub fn from_server_value(body: &serde_json::Value, received_at: DateTime<Utc>) -> CourierResult<Self> {
        let rows = match body {
            serde_json::Value::Array(rows) => rows.as_slice(),
            serde_json::Value::Object(_) => body
                .get("data")
                .or_else(|| body.get("messages"))
                .and_then(|v| v.as_array())
                .map(|v| v.as_slice())
                .ok_or_else(|| CourierError::Decode("response has no message array".into()))?,
            other => {
                return Err(CourierError::Decode(format!(
                    "unexpected response body: {other}"
                )))
            }
        };

        let messages = rows
            .iter()
            .map(|row| Message::from_server_map(row, received_at))
            .collect::<CourierResult<Vec<_>>>()?;

        let server_cursor = body
            .get("cursor")
            .or_else(|| body.get("nextCursor"))
            .or_else(|| body.get("metadata").and_then(|m| m.get("cursor")))
            .and_then(cursor_value);

        let cursor = server_cursor.or_else(|| {
            messages
                .iter()
                .map(|m| m.sent_at)
                .max()
                .map(Cursor::from_timestamp)
        });

        Ok(Self { messages, cursor })
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

fn cursor_value(v: &serde_json::Value) -> Option<Cursor> {
    match v {
        serde_json::Value::String(s) if !s.is_empty() => Some(Cursor::new(s.clone())),
        serde_json::Value::Number(n) => Some(Cursor::new(n.to_string())),
        _ => None,
    }
}
