//! Discovery of topic threads seen in synced messages.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use courier_core::error::SyncFailure;
use courier_models::Message;
use serde::Serialize;
use tracing::debug;

use crate::fetcher::PostSyncHook;
use crate::lock;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadInfo {
    pub thread_id: String,
    pub message_count: usize,
    pub last_activity: DateTime<Utc>,
}

/// Ids remembered per thread for deduplicating counts. Older ids are
/// forgotten, so a very old message seen again is counted twice.
const RECENT_IDS_PER_THREAD: usize = 4096;

#[derive(Default)]
struct ThreadEntry {
    message_count: usize,
    recent_ids: HashSet<String>,
    recent_order: VecDeque<String>,
    last_activity: Option<DateTime<Utc>>,
}

impl ThreadEntry {
    fn observe(&mut self, message: &Message) {
        if self.recent_ids.insert(message.id.clone()) {
            self.message_count += 1;
            self.recent_order.push_back(message.id.clone());
            if self.recent_order.len() > RECENT_IDS_PER_THREAD {
                if let Some(oldest) = self.recent_order.pop_front() {
                    self.recent_ids.remove(&oldest);
                }
            }
        }
        if self.last_activity.map_or(true, |t| message.sent_at > t) {
            self.last_activity = Some(message.sent_at);
        }
    }
}

/// Every thread id seen so far, with its distinct message count and the
/// newest `sent_at`. Memory per thread is bounded by
/// `RECENT_IDS_PER_THREAD`. Clones share the same directory.
#[derive(Clone, Default)]
pub struct ThreadDirectory {
    entries: Arc<Mutex<HashMap<String, ThreadEntry>>>,
}

impl ThreadDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold a batch into the directory. Returns the thread ids seen for the
    /// first time.
    pub fn record(&self, messages: &[Message]) -> Vec<String> {
        let mut entries = lock(&self.entries);
        let mut discovered = Vec::new();
        for message in messages {
            let Some(thread_id) = message.thread_id.as_deref() else {
                continue;
            };
            let entry = entries.entry(thread_id.to_string()).or_insert_with(|| {
                discovered.push(thread_id.to_string());
                ThreadEntry::default()
            });
            entry.observe(message);
        }
        discovered
    }

    /// Known threads, most recently active first.
    pub fn threads(&self) -> Vec<ThreadInfo> {
        let entries = lock(&self.entries);
        let mut threads: Vec<ThreadInfo> = entries
            .iter()
            .filter_map(|(id, entry)| {
                entry.last_activity.map(|last_activity| ThreadInfo {
                    thread_id: id.clone(),
                    message_count: entry.message_count,
                    last_activity,
                })
            })
            .collect();
        threads.sort_by(|a, b| {
            b.last_activity
                .cmp(&a.last_activity)
                .then_with(|| a.thread_id.cmp(&b.thread_id))
        });
        threads
    }

    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.entries).is_empty()
    }
}

#[async_trait]
impl PostSyncHook for ThreadDirectory {
    async fn after_sync(&self, messages: &[Message]) -> Result<(), SyncFailure> {
        for thread_id in self.record(messages) {
            debug!("discovered thread {thread_id}");
        }
        Ok(())
    }
}
