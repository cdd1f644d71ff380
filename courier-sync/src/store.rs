//! Ordered, deduplicated in-memory message collection.
//!
//! Messages are kept sorted by `sent_at` ascending with `id` as the
//! tie-break. A message whose `id` is already stored replaces the stored
//! copy instead of being appended.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use courier_models::Message;

/// Position of a message in the ordered view.
#[derive(Debug, Clone, PartialEq, Eq)]
struct SortKey {
    sent_at: DateTime<Utc>,
    id: String,
}

impl SortKey {
    fn of(message: &Message) -> Self {
        Self {
            sent_at: message.sent_at,
            id: message.id.clone(),
        }
    }
}

impl Ord for SortKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sent_at
            .cmp(&other.sent_at)
            .then_with(|| compare_ids(&self.id, &other.id))
    }
}

impl PartialOrd for SortKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Numeric ids compare as numbers so "9" sorts before "10"; anything else
/// compares as text.
fn compare_ids(a: &str, b: &str) -> Ordering {
    match (a.parse::<u128>(), b.parse::<u128>()) {
        (Ok(x), Ok(y)) => x.cmp(&y).then_with(|| a.cmp(b)),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}

#[derive(Debug, Default, Clone)]
pub struct MessageStore {
    ordered: BTreeMap<SortKey, Message>,
    keys: HashMap<String, SortKey>,
}

impl MessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge a batch into the store. Returns whether the visible sequence
    /// changed.
    ///
    /// Within one batch the last copy of an id wins. A replacement keeps the
    /// `received_at` of the stored copy. A copy that differs only in
    /// `received_at` is not a change.
    pub fn merge(&mut self, incoming: &[Message]) -> bool {
        let mut latest: HashMap<&str, &Message> = HashMap::with_capacity(incoming.len());
        for message in incoming {
            latest.insert(message.id.as_str(), message);
        }
        let mut changed = false;
        for message in latest.into_values() {
            changed |= self.merge_one(message);
        }
        changed
    }

    fn merge_one(&mut self, message: &Message) -> bool {
        let Some(old_key) = self.keys.get(&message.id).cloned() else {
            let key = SortKey::of(message);
            self.keys.insert(message.id.clone(), key.clone());
            self.ordered.insert(key, message.clone());
            return true;
        };

        let Some(existing) = self.ordered.get(&old_key) else {
            // Index out of step with the ordered map; rebuild the entry.
            self.keys.remove(&message.id);
            return self.merge_one(message);
        };

        if existing.same_content(message) {
            return false;
        }

        let mut replacement = message.clone();
        replacement.received_at = existing.received_at;

        if old_key.sent_at == replacement.sent_at {
            self.ordered.insert(old_key, replacement);
        } else {
            self.ordered.remove(&old_key);
            let key = SortKey::of(&replacement);
            self.keys.insert(replacement.id.clone(), key.clone());
            self.ordered.insert(key, replacement);
        }
        true
    }

    /// The newest `limit` messages (all of them for `None`), oldest first.
    pub fn snapshot(&self, limit: Option<usize>) -> Vec<Message> {
        let skip = limit.map_or(0, |n| self.ordered.len().saturating_sub(n));
        self.ordered.values().skip(skip).cloned().collect()
    }

    /// Display order: newest first.
    pub fn latest_first(&self, limit: Option<usize>) -> Vec<Message> {
        let take = limit.unwrap_or(usize::MAX);
        self.ordered.values().rev().take(take).cloned().collect()
    }

    /// The newest `limit` messages of one thread, oldest first.
    pub fn snapshot_thread(&self, thread_id: &str, limit: Option<usize>) -> Vec<Message> {
        let take = limit.unwrap_or(usize::MAX);
        let mut messages: Vec<Message> = self
            .ordered
            .values()
            .rev()
            .filter(|m| m.thread_id.as_deref() == Some(thread_id))
            .take(take)
            .cloned()
            .collect();
        messages.reverse();
        messages
    }

    pub fn get(&self, id: &str) -> Option<&Message> {
        self.keys.get(id).and_then(|key| self.ordered.get(key))
    }

    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }

    pub fn newest_sent_at(&self) -> Option<DateTime<Utc>> {
        self.ordered.keys().next_back().map(|k| k.sent_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn msg(id: &str, secs: i64, text: &str) -> Message {
        Message::new(id, at(secs), text)
    }

    fn ids(messages: &[Message]) -> Vec<&str> {
        messages.iter().map(|m| m.id.as_str()).collect()
    }

    #[test]
    fn test_merge_sorts_out_of_order_input() {
        let mut store = MessageStore::new();
        assert!(store.merge(&[msg("3", 30, "c"), msg("1", 10, "a"), msg("2", 20, "b")]));
        assert_eq!(ids(&store.snapshot(None)), vec!["1", "2", "3"]);
    }

    #[test]
    fn test_repeated_id_in_one_batch_keeps_last_copy() {
        let mut store = MessageStore::new();
        let batch = [msg("1", 1, "a"), msg("2", 2, "b"), msg("1", 1, "a-edited")];
        assert!(store.merge(&batch));
        assert_eq!(store.len(), 2);
        assert_eq!(store.get("1").unwrap().text.as_deref(), Some("a-edited"));

        let before = store.snapshot(None);
        assert!(!store.merge(&batch));
        assert_eq!(store.snapshot(None), before);
    }

    #[test]
    fn test_repeated_id_at_different_times_is_stable() {
        let mut store = MessageStore::new();
        let batch = [msg("1", 1, "a"), msg("1", 9, "a")];
        assert!(store.merge(&batch));
        assert_eq!(store.newest_sent_at(), Some(at(9)));
        assert!(!store.merge(&batch));
        assert_eq!(ids(&store.snapshot(None)), vec!["1"]);
    }

    #[test]
    fn test_equal_timestamps_break_on_numeric_id() {
        let mut store = MessageStore::new();
        store.merge(&[msg("10", 5, "x"), msg("9", 5, "y"), msg("abc", 5, "z")]);
        assert_eq!(ids(&store.snapshot(None)), vec!["9", "10", "abc"]);
    }

    #[test]
    fn test_same_batch_twice_is_unchanged() {
        let mut store = MessageStore::new();
        let batch = vec![msg("1", 1, "a"), msg("2", 2, "b")];
        assert!(store.merge(&batch));
        let before = store.snapshot(None);
        assert!(!store.merge(&batch));
        assert_eq!(store.snapshot(None), before);
    }

    #[test]
    fn test_overlapping_batches_match_union() {
        let mut incremental = MessageStore::new();
        incremental.merge(&[msg("1", 1, "a"), msg("2", 2, "b")]);
        incremental.merge(&[msg("2", 2, "b"), msg("3", 3, "c")]);

        let mut once = MessageStore::new();
        once.merge(&[msg("1", 1, "a"), msg("2", 2, "b"), msg("3", 3, "c")]);

        assert_eq!(incremental.snapshot(None), once.snapshot(None));
    }

    #[test]
    fn test_replace_keeps_received_at() {
        let mut store = MessageStore::new();
        store.merge(&[msg("1", 1, "a")]);

        let mut edited = msg("1", 1, "a-edited");
        edited.received_at = at(500);
        assert!(store.merge(&[edited]));

        let stored = store.get("1").unwrap();
        assert_eq!(stored.text.as_deref(), Some("a-edited"));
        assert_eq!(stored.received_at, at(1));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_received_at_only_is_not_a_change() {
        let mut store = MessageStore::new();
        store.merge(&[msg("1", 1, "a")]);
        let mut again = msg("1", 1, "a");
        again.received_at = at(99);
        assert!(!store.merge(&[again]));
    }

    #[test]
    fn test_replace_with_new_sent_at_resorts() {
        let mut store = MessageStore::new();
        store.merge(&[msg("1", 10, "a"), msg("2", 20, "b")]);
        assert!(store.merge(&[msg("1", 30, "a")]));
        assert_eq!(ids(&store.snapshot(None)), vec!["2", "1"]);
        assert_eq!(store.len(), 2);
        assert_eq!(store.newest_sent_at(), Some(at(30)));
    }

    #[test]
    fn test_snapshot_limit_keeps_newest_window() {
        let mut store = MessageStore::new();
        store.merge(&(1..=5).map(|i| msg(&i.to_string(), i, "x")).collect::<Vec<_>>());
        assert_eq!(ids(&store.snapshot(Some(2))), vec!["4", "5"]);
        assert_eq!(ids(&store.latest_first(Some(2))), vec!["5", "4"]);
        assert_eq!(store.snapshot(Some(50)).len(), 5);
    }

    #[test]
    fn test_snapshot_thread() {
        let mut store = MessageStore::new();
        let mut a = msg("1", 1, "a");
        a.thread_id = Some("t1".into());
        let mut b = msg("2", 2, "b");
        b.thread_id = Some("t2".into());
        let mut c = msg("3", 3, "c");
        c.thread_id = Some("t1".into());
        store.merge(&[a, b, c]);
        assert_eq!(ids(&store.snapshot_thread("t1", None)), vec!["1", "3"]);
        assert_eq!(ids(&store.snapshot_thread("t1", Some(1))), vec!["3"]);
        assert!(store.snapshot_thread("missing", None).is_empty());
    }

    #[test]
    fn test_empty_batch_is_noop() {
        let mut store = MessageStore::new();
        assert!(!store.merge(&[]));
        assert!(store.is_empty());
        assert!(store.newest_sent_at().is_none());
    }
}
