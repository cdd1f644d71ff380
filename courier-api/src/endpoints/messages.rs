//! Message endpoints: the paged read and the upstream sync trigger.

use chrono::Utc;
use serde::Serialize;

use courier_core::error::{CourierError, CourierResult};
use courier_models::{Cursor, FetchPage};

use crate::client::ApiClient;
use crate::response::envelope_error;

/// Body of the trigger request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerSyncParams {
    pub chat_id: String,
}

impl ApiClient {
    /// Fetch messages in `chat_id` newer than `after`, at most `limit`.
    /// Without a cursor the backend returns its latest page.
    pub async fn fetch_messages(
        &self,
        chat_id: &str,
        after: Option<&Cursor>,
        limit: u32,
    ) -> CourierResult<FetchPage> {
        let mut query = vec![("chatId", chat_id.to_string()), ("limit", limit.to_string())];
        if let Some(cursor) = after {
            query.push(("after", cursor.to_string()));
        }
        let body = self.get_json(&self.paths().messages, &query).await?;
        decode_page(&body)
    }

    /// Ask the backend to pull new messages from its upstream source.
    /// Returns whether it reports having started a sync.
    pub async fn trigger_sync(&self, chat_id: &str) -> CourierResult<bool> {
        let params = TriggerSyncParams {
            chat_id: chat_id.to_string(),
        };
        let body = self
            .post_json(&self.paths().trigger, &serde_json::to_value(&params)?)
            .await?;
        parse_triggered(&body)
    }
}

/// Decode a message page body, bare or enveloped.
pub fn decode_page(body: &serde_json::Value) -> CourierResult<FetchPage> {
    if let Some(err) = envelope_error(body) {
        return Err(err);
    }
    FetchPage::from_server_value(body, Utc::now())
}

/// Read `triggered` from the top level or from `data`. An empty reply
/// counts as not triggered.
pub fn parse_triggered(body: &serde_json::Value) -> CourierResult<bool> {
    if let Some(err) = envelope_error(body) {
        return Err(err);
    }
    if body.is_null() {
        return Ok(false);
    }
    body.get("triggered")
        .or_else(|| body.get("data").and_then(|d| d.get("triggered")))
        .map(|v| v.as_bool().unwrap_or(false))
        .ok_or_else(|| CourierError::Decode(format!("trigger response has no 'triggered' field: {body}")))
}
