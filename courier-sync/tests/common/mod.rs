//! Shared fixtures for the sync integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use courier_core::config::SyncConfig;
use courier_core::error::SyncFailure;
use courier_models::{Cursor, FetchPage, Message};
use courier_sync::{ConnectionState, ConnectionStatus, RemoteFetcher, SyncService};
use tokio::sync::Notify;

#[derive(Clone)]
enum Mode {
    Immediate,
    Gated(Arc<Notify>),
    Never,
}

struct MockState {
    responses: Mutex<VecDeque<Result<FetchPage, SyncFailure>>>,
    mode: Mutex<Mode>,
    post_sync_error: Mutex<Option<SyncFailure>>,
    fetch_calls: AtomicUsize,
    trigger_calls: AtomicUsize,
    post_sync_calls: AtomicUsize,
    cursors: Mutex<Vec<Option<Cursor>>>,
}

/// Scriptable fetcher. Clones share state, so a test keeps one clone and
/// hands another to the service.
///
/// Queued responses are served in order; with the queue empty every fetch
/// returns an empty page.
#[derive(Clone)]
pub struct MockFetcher {
    state: Arc<MockState>,
}

impl Default for MockFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl MockFetcher {
    pub fn new() -> Self {
        Self {
            state: Arc::new(MockState {
                responses: Mutex::new(VecDeque::new()),
                mode: Mutex::new(Mode::Immediate),
                post_sync_error: Mutex::new(None),
                fetch_calls: AtomicUsize::new(0),
                trigger_calls: AtomicUsize::new(0),
                post_sync_calls: AtomicUsize::new(0),
                cursors: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn push_page(&self, messages: Vec<Message>) -> &Self {
        self.push(Ok(FetchPage {
            messages,
            cursor: None,
        }))
    }

    pub fn push_page_with_cursor(&self, messages: Vec<Message>, cursor: &str) -> &Self {
        self.push(Ok(FetchPage {
            messages,
            cursor: Some(Cursor::new(cursor)),
        }))
    }

    pub fn push_failure(&self, failure: SyncFailure) -> &Self {
        self.push(Err(failure))
    }

    fn push(&self, response: Result<FetchPage, SyncFailure>) -> &Self {
        self.state.responses.lock().unwrap().push_back(response);
        self
    }

    /// Hold every fetch until the returned gate is notified, once per fetch.
    pub fn gate(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.state.mode.lock().unwrap() = Mode::Gated(Arc::clone(&gate));
        gate
    }

    /// Every fetch from now on never completes.
    pub fn never_resolve(&self) {
        *self.state.mode.lock().unwrap() = Mode::Never;
    }

    pub fn fail_post_sync(&self, failure: SyncFailure) {
        *self.state.post_sync_error.lock().unwrap() = Some(failure);
    }

    pub fn fetch_calls(&self) -> usize {
        self.state.fetch_calls.load(Ordering::SeqCst)
    }

    pub fn trigger_calls(&self) -> usize {
        self.state.trigger_calls.load(Ordering::SeqCst)
    }

    pub fn post_sync_calls(&self) -> usize {
        self.state.post_sync_calls.load(Ordering::SeqCst)
    }

    pub fn cursors_seen(&self) -> Vec<Option<Cursor>> {
        self.state.cursors.lock().unwrap().clone()
    }
}

#[async_trait]
impl RemoteFetcher for MockFetcher {
    async fn fetch_latest(&self, cursor: Option<&Cursor>) -> Result<FetchPage, SyncFailure> {
        self.state.fetch_calls.fetch_add(1, Ordering::SeqCst);
        self.state.cursors.lock().unwrap().push(cursor.cloned());

        let mode = self.state.mode.lock().unwrap().clone();
        match mode {
            Mode::Immediate => {}
            Mode::Gated(gate) => gate.notified().await,
            Mode::Never => std::future::pending::<()>().await,
        }

        self.state
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(FetchPage::default()))
    }

    async fn trigger_sync(&self) -> Result<bool, SyncFailure> {
        self.state.trigger_calls.fetch_add(1, Ordering::SeqCst);
        Ok(true)
    }

    async fn post_sync(&self, _messages: &[Message]) -> Result<(), SyncFailure> {
        self.state.post_sync_calls.fetch_add(1, Ordering::SeqCst);
        match self.state.post_sync_error.lock().unwrap().clone() {
            Some(failure) => Err(failure),
            None => Ok(()),
        }
    }
}

/// Deterministic timing: no jitter, 30s poll, 2s base backoff, 2s grace.
pub fn test_config() -> SyncConfig {
    SyncConfig {
        jitter_ratio: 0.0,
        ..SyncConfig::default()
    }
}

pub fn service(fetcher: &MockFetcher) -> SyncService {
    SyncService::new(fetcher.clone(), &test_config())
}

pub fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
}

pub fn msg(id: &str, secs: i64, text: &str) -> Message {
    Message::new(id, at(secs), text)
}

pub fn texts(messages: &[Message]) -> Vec<(String, String)> {
    messages
        .iter()
        .map(|m| (m.id.clone(), m.text.clone().unwrap_or_default()))
        .collect()
}

/// Let spawned tasks run without moving the clock.
pub async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}

pub async fn advance(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
    settle().await;
}

/// Collects everything a callback receives.
pub struct Recorder<T> {
    seen: Arc<Mutex<Vec<T>>>,
}

impl<T: Clone + Send + 'static> Recorder<T> {
    pub fn new() -> Self {
        Self {
            seen: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn all(&self) -> Vec<T> {
        self.seen.lock().unwrap().clone()
    }

    pub fn last(&self) -> Option<T> {
        self.seen.lock().unwrap().last().cloned()
    }

    pub fn count(&self) -> usize {
        self.seen.lock().unwrap().len()
    }

    fn sink(&self) -> Arc<Mutex<Vec<T>>> {
        Arc::clone(&self.seen)
    }
}

impl Recorder<ConnectionState> {
    pub fn callback(&self) -> impl FnMut(&ConnectionState) + Send + 'static {
        let sink = self.sink();
        move |state: &ConnectionState| sink.lock().unwrap().push(state.clone())
    }

    pub fn statuses(&self) -> Vec<ConnectionStatus> {
        self.all().into_iter().map(|s| s.status).collect()
    }
}

impl Recorder<Vec<Message>> {
    pub fn callback(&self) -> impl FnMut(&[Message]) + Send + 'static {
        let sink = self.sink();
        move |messages: &[Message]| sink.lock().unwrap().push(messages.to_vec())
    }
}
