//! Message entity model.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use courier_core::error::{CourierError, CourierResult};

/// Epoch values at or above this are treated as milliseconds.
const EPOCH_MILLIS_THRESHOLD: i64 = 100_000_000_000;

/// A single chat message mirrored from the source group.
///
/// Two messages with the same `id` are the same logical message; a later
/// copy replaces the earlier one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Stable unique key (the source id, stringified).
    pub id: String,
    /// Topic/thread grouping key, if the source chat uses topics.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
    pub author_id: String,
    pub author_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    /// When the source says the message was sent. Authoritative ordering key.
    pub sent_at: DateTime<Utc>,
    /// When this process first ingested the message.
    pub received_at: DateTime<Utc>,
}

impl Message {
    /// Build a text message; mostly useful for tests and fixtures.
    pub fn new(id: impl Into<String>, sent_at: DateTime<Utc>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            thread_id: None,
            author_id: String::new(),
            author_name: String::new(),
            text: Some(text.into()),
            media_url: None,
            media_type: None,
            sent_at,
            received_at: sent_at,
        }
    }

    /// Create a Message from a backend JSON row.
    ///
    /// Accepts camelCase and snake_case keys as well as the raw bot-API
    /// names (`message_id`, `message_thread_id`, `date`). `received_at` is
    /// the local ingestion time to record on the message.
    pub fn from_server_map(map: &serde_json::Value, received_at: DateTime<Utc>) -> CourierResult<Self> {
        if !map.is_object() {
            return Err(CourierError::Decode(format!("message row is not an object: {map}")));
        }

        let id = first_key(map, &["id", "messageId", "message_id"])
            .and_then(id_string)
            .ok_or_else(|| CourierError::Decode(format!("message row has no id: {map}")))?;

        let sent_at = first_key(map, &["sentAt", "sent_at", "date", "createdAt", "created_at"])
            .ok_or_else(|| CourierError::Decode(format!("message {id} has no timestamp")))
            .and_then(|v| {
                parse_timestamp(v)
                    .ok_or_else(|| CourierError::Decode(format!("message {id} has bad timestamp {v}")))
            })?;

        let author_id = first_key(map, &["authorId", "author_id", "userId", "user_id", "fromId", "from_id"])
            .and_then(id_string)
            .unwrap_or_default();

        let author_name = first_key(
            map,
            &["authorName", "author_name", "username", "userName", "firstName", "first_name"],
        )
        .and_then(|v| v.as_str())
        .map(String::from)
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| author_id.clone());

        Ok(Self {
            id,
            thread_id: first_key(map, &["threadId", "thread_id", "topicId", "topic_id", "message_thread_id"])
                .and_then(id_string),
            author_id,
            author_name,
            text: string_field(map, &["text", "content", "caption"]),
            media_url: string_field(map, &["mediaUrl", "media_url"]),
            media_type: string_field(map, &["mediaType", "media_type"]),
            sent_at,
            received_at,
        })
    }

    /// Equal in everything the source controls, ignoring local ingestion time.
    pub fn same_content(&self, other: &Message) -> bool {
        self.id == other.id
            && self.thread_id == other.thread_id
            && self.author_id == other.author_id
            && self.author_name == other.author_name
            && self.text == other.text
            && self.media_url == other.media_url
            && self.media_type == other.media_type
            && self.sent_at == other.sent_at
    }

    pub fn has_media(&self) -> bool {
        self.media_url.is_some()
    }
}

fn first_key<'a>(map: &'a serde_json::Value, keys: &[&str]) -> Option<&'a serde_json::Value> {
    keys.iter()
        .filter_map(|k| map.get(*k))
        .find(|v| !v.is_null())
}

fn string_field(map: &serde_json::Value, keys: &[&str]) -> Option<String> {
    first_key(map, keys)
        .and_then(|v| v.as_str())
        .map(String::from)
}

/// Ids arrive as numbers from the bot API and as strings from the table.
fn id_string(v: &serde_json::Value) -> Option<String> {
    match v {
        serde_json::Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Parse RFC 3339, naive ISO (taken as UTC), or epoch seconds/millis.
pub fn parse_timestamp(v: &serde_json::Value) -> Option<DateTime<Utc>> {
    match v {
        serde_json::Value::Number(n) => n.as_i64().and_then(from_epoch),
        serde_json::Value::String(s) => {
            let s = s.trim();
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                return Some(dt.with_timezone(&Utc));
            }
            if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f") {
                return Some(Utc.from_utc_datetime(&naive));
            }
            if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
                return Some(Utc.from_utc_datetime(&naive));
            }
            s.parse::<i64>().ok().and_then(from_epoch)
        }
        _ => None,
    }
}

fn from_epoch(value: i64) -> Option<DateTime<Utc>> {
    if value.abs() >= EPOCH_MILLIS_THRESHOLD {
        Utc.timestamp_millis_opt(value).single()
    } else {
        Utc.timestamp_opt(value, 0).single()
    }
}
