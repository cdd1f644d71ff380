//! The composition root consumers talk to.
//!
//! A [`SyncService`] owns one message store, one connection state machine,
//! one scheduler and the two subscription registries. Syncing starts with
//! the first subscriber and stops a grace period after the last one leaves.

use std::fmt;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use courier_core::config::SyncConfig;
use courier_core::error::SyncFailure;
use courier_models::{Cursor, FetchPage, Message};
use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::backoff::BackoffPolicy;
use crate::connection::{ConnectionEvent, ConnectionState, ConnectionStateMachine, ConnectionStatus};
use crate::fetcher::RemoteFetcher;
use crate::lock;
use crate::registry::{Staged, Subscription, SubscriptionRegistry};
use crate::scheduler::{SchedulerStats, SyncScheduler, SyncTarget, TickOutcome};
use crate::store::MessageStore;

/// What message subscribers receive: the bounded, ordered view.
pub type MessageSnapshot = Arc<Vec<Message>>;

#[derive(Debug, Clone)]
struct ServiceSettings {
    fetch_timeout: Duration,
    stop_grace: Duration,
    snapshot_limit: usize,
    trigger_upstream: bool,
}

impl ServiceSettings {
    fn from_config(config: &SyncConfig) -> Self {
        Self {
            fetch_timeout: config.fetch_timeout(),
            stop_grace: config.stop_grace(),
            snapshot_limit: config.snapshot_limit,
            trigger_upstream: config.trigger_upstream,
        }
    }
}

struct Core {
    store: MessageStore,
    machine: ConnectionStateMachine,
    cursor: Option<Cursor>,
}

#[derive(Default)]
struct Lifecycle {
    subscribers: usize,
    /// Bumped whenever the subscriber count moves; a pending grace stop
    /// only fires if the epoch it captured is still current.
    idle_epoch: u64,
}

struct ServiceInner {
    id: Uuid,
    self_ref: Weak<ServiceInner>,
    fetcher: Arc<dyn RemoteFetcher>,
    settings: ServiceSettings,
    core: Mutex<Core>,
    lifecycle: Mutex<Lifecycle>,
    messages: SubscriptionRegistry<MessageSnapshot>,
    connection: SubscriptionRegistry<ConnectionState>,
    watch_tx: watch::Sender<ConnectionState>,
    scheduler: SyncScheduler,
}

/// Handle to the sync core. Clones share the same instance.
#[derive(Clone)]
pub struct SyncService {
    inner: Arc<ServiceInner>,
}

pub struct SyncServiceBuilder {
    fetcher: Arc<dyn RemoteFetcher>,
    config: SyncConfig,
    policy: Option<BackoffPolicy>,
}

impl SyncServiceBuilder {
    /// Timing and limits; also the source of the backoff policy unless
    /// [`policy`](Self::policy) overrides it.
    pub fn config(mut self, config: SyncConfig) -> Self {
        self.config = config;
        self
    }

    pub fn policy(mut self, policy: BackoffPolicy) -> Self {
        self.policy = Some(policy);
        self
    }

    pub fn build(self) -> SyncService {
        let policy = self
            .policy
            .unwrap_or_else(|| BackoffPolicy::from_config(&self.config));
        let settings = ServiceSettings::from_config(&self.config);
        let fetcher = self.fetcher;
        let initial = ConnectionState::default();
        let (watch_tx, _) = watch::channel(initial.clone());

        let inner = Arc::new_cyclic(|weak: &Weak<ServiceInner>| {
            let target: Weak<dyn SyncTarget> = weak.clone();
            ServiceInner {
                id: Uuid::new_v4(),
                self_ref: weak.clone(),
                fetcher,
                settings,
                core: Mutex::new(Core {
                    store: MessageStore::new(),
                    machine: ConnectionStateMachine::new(),
                    cursor: None,
                }),
                lifecycle: Mutex::new(Lifecycle::default()),
                messages: SubscriptionRegistry::with_initial(Arc::new(Vec::new())),
                connection: SubscriptionRegistry::with_initial(initial),
                watch_tx,
                scheduler: SyncScheduler::new(policy, target),
            }
        });
        debug!("sync service {} created", inner.id);
        SyncService { inner }
    }
}

impl SyncService {
    pub fn builder<F: RemoteFetcher + 'static>(fetcher: F) -> SyncServiceBuilder {
        SyncServiceBuilder {
            fetcher: Arc::new(fetcher),
            config: SyncConfig::default(),
            policy: None,
        }
    }

    pub fn new<F: RemoteFetcher + 'static>(fetcher: F, config: &SyncConfig) -> Self {
        Self::builder(fetcher).config(config.clone()).build()
    }

    pub fn instance_id(&self) -> Uuid {
        self.inner.id
    }

    /// Receive the ordered message view now and after every change.
    ///
    /// The first subscriber of either kind starts syncing.
    pub fn subscribe_to_messages<F>(&self, mut on_messages: F) -> Subscription
    where
        F: FnMut(&[Message]) + Send + 'static,
    {
        self.inner.acquire_subscriber();
        let subscription = self
            .inner
            .messages
            .subscribe(move |snapshot: &MessageSnapshot| on_messages(snapshot.as_slice()));
        self.inner.attach_release(subscription)
    }

    /// Receive the connection state now and after every transition.
    pub fn subscribe_to_connection<F>(&self, on_state: F) -> Subscription
    where
        F: FnMut(&ConnectionState) + Send + 'static,
    {
        self.inner.acquire_subscriber();
        let subscription = self.inner.connection.subscribe(on_state);
        self.inner.attach_release(subscription)
    }

    /// A watch receiver fed by the same transitions. It does not count as a
    /// subscriber and does not start syncing by itself.
    pub fn watch_connection(&self) -> watch::Receiver<ConnectionState> {
        self.inner.watch_tx.subscribe()
    }

    pub fn force_refresh(&self) {
        self.inner.scheduler.force_refresh();
    }

    pub fn reconnect(&self) {
        self.inner.scheduler.reconnect();
    }

    /// Stop syncing now, regardless of subscribers. A later subscribe
    /// starts it again.
    pub fn stop(&self) {
        self.inner.halt(None);
    }

    pub fn connection_state(&self) -> ConnectionState {
        lock(&self.inner.core).machine.state().clone()
    }

    /// The newest `limit` messages, oldest first.
    pub fn messages(&self, limit: Option<usize>) -> Vec<Message> {
        lock(&self.inner.core).store.snapshot(limit)
    }

    pub fn thread_messages(&self, thread_id: &str, limit: Option<usize>) -> Vec<Message> {
        lock(&self.inner.core).store.snapshot_thread(thread_id, limit)
    }

    pub fn cursor(&self) -> Option<Cursor> {
        lock(&self.inner.core).cursor.clone()
    }

    pub fn is_running(&self) -> bool {
        self.inner.scheduler.is_running()
    }

    pub fn subscriber_count(&self) -> usize {
        lock(&self.inner.lifecycle).subscribers
    }

    pub fn diagnostics(&self) -> Diagnostics {
        let (state, message_count, newest, cursor) = {
            let core = lock(&self.inner.core);
            (
                core.machine.state().clone(),
                core.store.len(),
                core.store.newest_sent_at(),
                core.cursor.clone(),
            )
        };
        Diagnostics {
            instance_id: self.inner.id,
            state,
            message_count,
            newest_message_at: newest,
            cursor,
            subscribers: self.subscriber_count(),
            scheduler: self.inner.scheduler.stats(),
        }
    }
}

impl ServiceInner {
    fn acquire_subscriber(&self) {
        let mut lifecycle = lock(&self.lifecycle);
        lifecycle.subscribers += 1;
        lifecycle.idle_epoch += 1;
        // Under the lifecycle lock so a grace stop cannot interleave.
        self.scheduler.start();
    }

    fn attach_release(&self, subscription: Subscription) -> Subscription {
        let service = self.self_ref.clone();
        subscription.on_release(move || {
            if let Some(service) = service.upgrade() {
                service.release_subscriber();
            }
        })
    }

    fn release_subscriber(self: Arc<Self>) {
        let epoch = {
            let mut lifecycle = lock(&self.lifecycle);
            lifecycle.subscribers = lifecycle.subscribers.saturating_sub(1);
            if lifecycle.subscribers > 0 {
                return;
            }
            lifecycle.idle_epoch += 1;
            lifecycle.idle_epoch
        };

        let grace = self.settings.stop_grace;
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) if !grace.is_zero() => {
                debug!("last subscriber left; stopping in {}ms", grace.as_millis());
                let service = Arc::downgrade(&self);
                runtime.spawn(async move {
                    tokio::time::sleep(grace).await;
                    if let Some(service) = service.upgrade() {
                        service.halt(Some(epoch));
                    }
                });
            }
            _ => self.halt(Some(epoch)),
        }
    }

    /// Stop the scheduler and move the connection to `disconnected`.
    /// With `Some(epoch)`, only if nobody subscribed since that epoch.
    fn halt(&self, epoch: Option<u64>) {
        let staged = {
            let mut lifecycle = lock(&self.lifecycle);
            match epoch {
                Some(epoch) if lifecycle.subscribers > 0 || lifecycle.idle_epoch != epoch => {
                    debug!("grace stop cancelled: subscribers returned");
                    return;
                }
                Some(_) => {}
                None => lifecycle.idle_epoch += 1,
            }
            self.scheduler.stop();
            let mut core = lock(&self.core);
            self.transition(&mut core, ConnectionEvent::Stop)
        };
        if let Some(staged) = staged {
            self.connection.deliver(staged);
        }
    }

    /// Apply `event` and stage the new state for delivery. Must be called
    /// with the core lock held; deliver after releasing it.
    fn transition(&self, core: &mut Core, event: ConnectionEvent) -> Option<Staged<ConnectionState>> {
        let before = core.machine.status();
        match core.machine.apply(event, Utc::now()) {
            Ok(state) => {
                let state = state.clone();
                if state.status != before {
                    match state.status {
                        ConnectionStatus::Connected if before == ConnectionStatus::Connecting => {
                            info!("connected")
                        }
                        ConnectionStatus::Error => warn!(
                            "sync failed (attempt {}): {}",
                            state.reconnect_attempts,
                            state.error.as_deref().unwrap_or_default()
                        ),
                        status => debug!("connection {before} -> {status}"),
                    }
                }
                self.watch_tx.send_replace(state.clone());
                Some(self.connection.stage(state))
            }
            Err(e) => {
                debug!("skipped transition: {e}");
                None
            }
        }
    }

    fn is_current(&self, generation: u64) -> bool {
        self.scheduler.generation() == generation && self.scheduler.is_running()
    }

    /// Move into the state for a new attempt and return the cursor to use.
    fn begin_attempt(&self, generation: u64) -> Option<Option<Cursor>> {
        let (staged, cursor) = {
            let mut core = lock(&self.core);
            if !self.is_current(generation) {
                return None;
            }
            let event = match core.machine.status() {
                ConnectionStatus::Disconnected => Some(ConnectionEvent::Start),
                ConnectionStatus::Error => Some(ConnectionEvent::Retry),
                ConnectionStatus::Connected => Some(ConnectionEvent::SyncStart),
                ConnectionStatus::Connecting | ConnectionStatus::Syncing => None,
            };
            let staged = event.and_then(|event| self.transition(&mut core, event));
            (staged, core.cursor.clone())
        };
        if let Some(staged) = staged {
            self.connection.deliver(staged);
        }
        Some(cursor)
    }

    async fn fetch(&self, cursor: Option<&Cursor>) -> Result<FetchPage, SyncFailure> {
        let attempt = async {
            if self.settings.trigger_upstream {
                match self.fetcher.trigger_sync().await {
                    Ok(triggered) => debug!("upstream sync triggered: {triggered}"),
                    Err(e) => warn!("upstream sync trigger failed: {e}"),
                }
            }
            self.fetcher.fetch_latest(cursor).await
        };
        match tokio::time::timeout(self.settings.fetch_timeout, attempt).await {
            Ok(result) => result,
            Err(_) => Err(SyncFailure::network(format!(
                "fetch timed out after {}ms",
                self.settings.fetch_timeout.as_millis()
            ))),
        }
    }

    /// Fold a fetch result into the store and state machine, unless the
    /// attempt was superseded while it ran.
    fn apply_result(&self, generation: u64, result: &Result<FetchPage, SyncFailure>) -> TickOutcome {
        let (connection, messages, outcome) = {
            let mut core = lock(&self.core);
            if !self.is_current(generation) {
                debug!("discarding result of stale sync generation {generation}");
                return TickOutcome::Cancelled;
            }
            let status = core.machine.status();
            match result {
                Ok(page) => {
                    let changed = core.store.merge(&page.messages);
                    if let Some(cursor) = &page.cursor {
                        core.cursor = Some(cursor.clone());
                    }
                    let messages = changed.then(|| {
                        let snapshot = core.store.snapshot(Some(self.settings.snapshot_limit));
                        self.messages.stage(Arc::new(snapshot))
                    });
                    let event = if status == ConnectionStatus::Syncing {
                        ConnectionEvent::SyncOk
                    } else {
                        ConnectionEvent::FetchOk
                    };
                    debug!(
                        "fetched {} messages (changed: {changed}, stored: {})",
                        page.messages.len(),
                        core.store.len()
                    );
                    (self.transition(&mut core, event), messages, TickOutcome::Synced)
                }
                Err(failure) => {
                    let message = failure.to_string();
                    let event = if status == ConnectionStatus::Syncing {
                        ConnectionEvent::SyncFail(message)
                    } else {
                        ConnectionEvent::FetchFail(message)
                    };
                    (self.transition(&mut core, event), None, TickOutcome::Failed)
                }
            }
        };
        if let Some(staged) = messages {
            self.messages.deliver(staged);
        }
        if let Some(staged) = connection {
            self.connection.deliver(staged);
        }
        outcome
    }
}

#[async_trait]
impl SyncTarget for ServiceInner {
    async fn sync_once(&self, generation: u64) -> TickOutcome {
        let Some(cursor) = self.begin_attempt(generation) else {
            return TickOutcome::Cancelled;
        };

        let result = self.fetch(cursor.as_ref()).await;
        let outcome = self.apply_result(generation, &result);

        if let (TickOutcome::Synced, Ok(page)) = (outcome, &result) {
            let hook = self.fetcher.post_sync(&page.messages);
            match tokio::time::timeout(self.settings.fetch_timeout, hook).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("post-sync step failed: {e}"),
                Err(_) => warn!("post-sync step timed out"),
            }
        }
        outcome
    }

    fn reconnect_attempts(&self) -> u32 {
        lock(&self.core).machine.state().reconnect_attempts
    }

    fn manual_reconnect(&self) {
        let staged = {
            let mut core = lock(&self.core);
            self.transition(&mut core, ConnectionEvent::ManualReconnect)
        };
        if let Some(staged) = staged {
            self.connection.deliver(staged);
        }
    }
}

/// Point-in-time summary for logs and the CLI.
#[derive(Debug, Clone)]
pub struct Diagnostics {
    pub instance_id: Uuid,
    pub state: ConnectionState,
    pub message_count: usize,
    pub newest_message_at: Option<DateTime<Utc>>,
    pub cursor: Option<Cursor>,
    pub subscribers: usize,
    pub scheduler: SchedulerStats,
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "instance:     {}", self.instance_id)?;
        writeln!(f, "status:       {}", self.state.status)?;
        if let Some(error) = &self.state.error {
            writeln!(f, "error:        {error}")?;
        }
        writeln!(f, "attempts:     {}", self.state.reconnect_attempts)?;
        writeln!(f, "last sync:    {}", fmt_time(self.state.last_sync_at))?;
        writeln!(f, "messages:     {}", self.message_count)?;
        writeln!(f, "newest:       {}", fmt_time(self.newest_message_at))?;
        writeln!(
            f,
            "cursor:       {}",
            self.cursor.as_ref().map_or("-", |c| c.as_str())
        )?;
        writeln!(f, "subscribers:  {}", self.subscribers)?;
        write!(
            f,
            "scheduler:    running={} generation={} in_flight={} ticks={} coalesced={}",
            self.scheduler.running,
            self.scheduler.generation,
            self.scheduler.in_flight,
            self.scheduler.ticks,
            self.scheduler.coalesced_refreshes
        )
    }
}

fn fmt_time(t: Option<DateTime<Utc>>) -> String {
    t.map_or_else(|| "-".to_string(), |t| t.to_rfc3339())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Serves one fixed page, or fails every call.
    struct StaticFetcher {
        page: Option<Vec<Message>>,
        calls: AtomicU32,
    }

    #[async_trait]
    impl RemoteFetcher for StaticFetcher {
        async fn fetch_latest(&self, _cursor: Option<&Cursor>) -> Result<FetchPage, SyncFailure> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.page {
                Some(messages) => Ok(FetchPage {
                    messages: messages.clone(),
                    cursor: Some(Cursor::new("c1")),
                }),
                None => Err(SyncFailure::backend("HTTP 500")),
            }
        }

        async fn trigger_sync(&self) -> Result<bool, SyncFailure> {
            Ok(true)
        }
    }

    fn service(page: Option<Vec<Message>>) -> SyncService {
        SyncService::builder(StaticFetcher {
            page,
            calls: AtomicU32::new(0),
        })
        .build()
    }

    fn msg(id: &str, secs: i64) -> Message {
        Message::new(id, Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap(), id)
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_subscriber_starts_sync() {
        let svc = service(Some(vec![msg("1", 1)]));
        assert!(!svc.is_running());

        let _sub = svc.subscribe_to_connection(|_| {});
        assert!(svc.is_running());
        settle().await;

        assert_eq!(svc.connection_state().status, ConnectionStatus::Connected);
        assert_eq!(svc.messages(None).len(), 1);
        assert_eq!(svc.cursor(), Some(Cursor::new("c1")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_surfaces_on_state() {
        let svc = service(None);
        let _sub = svc.subscribe_to_messages(|_| {});
        settle().await;

        let state = svc.connection_state();
        assert_eq!(state.status, ConnectionStatus::Error);
        assert_eq!(state.reconnect_attempts, 1);
        assert!(state.error.unwrap().contains("HTTP 500"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_watch_receiver_follows_transitions() {
        let svc = service(Some(vec![]));
        let mut rx = svc.watch_connection();
        assert_eq!(rx.borrow().status, ConnectionStatus::Disconnected);

        let _sub = svc.subscribe_to_connection(|_| {});
        settle().await;
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow_and_update().status, ConnectionStatus::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_explicit_stop_disconnects() {
        let svc = service(Some(vec![msg("1", 1)]));
        let _sub = svc.subscribe_to_connection(|_| {});
        settle().await;

        svc.stop();
        assert!(!svc.is_running());
        let state = svc.connection_state();
        assert_eq!(state.status, ConnectionStatus::Disconnected);
        assert!(state.last_connected_at.is_some());
        assert_eq!(svc.messages(None).len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_diagnostics_display() {
        let svc = service(Some(vec![msg("1", 1), msg("2", 2)]));
        let _sub = svc.subscribe_to_messages(|_| {});
        settle().await;

        let diag = svc.diagnostics();
        assert_eq!(diag.message_count, 2);
        assert_eq!(diag.subscribers, 1);
        assert!(diag.scheduler.running);
        let text = diag.to_string();
        assert!(text.contains("status:       connected"));
        assert!(text.contains("cursor:       c1"));
    }

    #[test]
    fn test_instances_are_independent() {
        let a = service(None);
        let b = service(None);
        assert_ne!(a.instance_id(), b.instance_id());
        assert_eq!(a.clone().instance_id(), a.instance_id());
    }
}
