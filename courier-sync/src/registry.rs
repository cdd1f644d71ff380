//! Typed fan-out of published values to subscriber callbacks.
//!
//! The registry keeps the latest published value and replays it to every
//! new subscriber. Each subscriber sees values in publication order: a
//! value older than one it has already seen is never delivered to it.
//!
//! Publication is split into [`SubscriptionRegistry::stage`], which fixes
//! the value's position in the order and is meant to run while the caller
//! still holds the lock protecting the source state, and
//! [`SubscriptionRegistry::deliver`], which runs the callbacks and must run
//! without that lock held.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, TryLockError, Weak};

use crate::lock;

type Callback<T> = Box<dyn FnMut(&T) + Send>;

struct SubscriberState<T> {
    last_version: u64,
    pending: BTreeMap<u64, T>,
}

struct Subscriber<T> {
    active: AtomicBool,
    state: Mutex<SubscriberState<T>>,
    callback: Mutex<Callback<T>>,
}

impl<T: Clone> Subscriber<T> {
    fn offer(&self, version: u64, value: &T) {
        {
            let mut state = lock(&self.state);
            if version <= state.last_version {
                return;
            }
            state.pending.entry(version).or_insert_with(|| value.clone());
        }
        self.drain();
    }

    /// Run queued values through the callback.
    ///
    /// Whoever holds the callback lock delivers everything queued. A
    /// reentrant or concurrent offer only queues and leaves the delivery to
    /// the current holder.
    fn drain(&self) {
        loop {
            let mut callback = match self.callback.try_lock() {
                Ok(guard) => guard,
                Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
                Err(TryLockError::WouldBlock) => return,
            };

            while let Some(value) = self.next_pending() {
                if !self.active.load(Ordering::Acquire) {
                    break;
                }
                (callback)(&value);
            }
            drop(callback);

            if lock(&self.state).pending.is_empty() || !self.active.load(Ordering::Acquire) {
                return;
            }
        }
    }

    fn next_pending(&self) -> Option<T> {
        let mut state = lock(&self.state);
        while let Some((version, value)) = state.pending.pop_first() {
            if version > state.last_version {
                state.last_version = version;
                return Some(value);
            }
        }
        None
    }
}

struct Inner<T> {
    latest: Option<(u64, T)>,
    subscribers: BTreeMap<u64, Arc<Subscriber<T>>>,
    next_id: u64,
    version: u64,
}

/// A value fixed in publication order but not yet handed to subscribers.
#[must_use = "staged values reach nobody until delivered"]
pub struct Staged<T> {
    version: u64,
    value: T,
    targets: Vec<Arc<Subscriber<T>>>,
}

impl<T> Staged<T> {
    pub fn value(&self) -> &T {
        &self.value
    }
}

pub struct SubscriptionRegistry<T> {
    inner: Arc<Mutex<Inner<T>>>,
}

impl<T> Clone for SubscriptionRegistry<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Clone + Send + 'static> Default for SubscriptionRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Send + 'static> SubscriptionRegistry<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                latest: None,
                subscribers: BTreeMap::new(),
                next_id: 1,
                version: 0,
            })),
        }
    }

    /// A registry whose replay value starts as `initial`.
    pub fn with_initial(initial: T) -> Self {
        let registry = Self::new();
        {
            let mut inner = lock(&registry.inner);
            inner.version = 1;
            inner.latest = Some((1, initial));
        }
        registry
    }

    /// Register `callback`. It is called right away with the latest value,
    /// if there is one, and then with every later publication until the
    /// returned handle is dropped.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: FnMut(&T) + Send + 'static,
    {
        let subscriber = Arc::new(Subscriber {
            active: AtomicBool::new(true),
            state: Mutex::new(SubscriberState {
                last_version: 0,
                pending: BTreeMap::new(),
            }),
            callback: Mutex::new(Box::new(callback) as Callback<T>),
        });

        let (id, replay) = {
            let mut inner = lock(&self.inner);
            let id = inner.next_id;
            inner.next_id += 1;
            inner.subscribers.insert(id, Arc::clone(&subscriber));
            (id, inner.latest.clone())
        };

        if let Some((version, value)) = replay {
            subscriber.offer(version, &value);
        }

        let registry: Weak<Mutex<Inner<T>>> = Arc::downgrade(&self.inner);
        Subscription::new(move || {
            subscriber.active.store(false, Ordering::Release);
            if let Some(inner) = registry.upgrade() {
                lock(&inner).subscribers.remove(&id);
            }
        })
    }

    /// Record `value` as the latest and fix its place in the delivery order.
    pub fn stage(&self, value: T) -> Staged<T> {
        let mut inner = lock(&self.inner);
        inner.version += 1;
        let version = inner.version;
        inner.latest = Some((version, value.clone()));
        Staged {
            version,
            value,
            targets: inner.subscribers.values().cloned().collect(),
        }
    }

    /// Hand a staged value to the subscribers that were registered when it
    /// was staged, in registration order.
    pub fn deliver(&self, staged: Staged<T>) {
        for subscriber in &staged.targets {
            subscriber.offer(staged.version, &staged.value);
        }
    }

    pub fn publish(&self, value: T) {
        let staged = self.stage(value);
        self.deliver(staged);
    }

    pub fn latest(&self) -> Option<T> {
        lock(&self.inner).latest.as_ref().map(|(_, v)| v.clone())
    }

    pub fn subscriber_count(&self) -> usize {
        lock(&self.inner).subscribers.len()
    }
}

/// Handle for a registered callback. Dropping it (or calling
/// [`unsubscribe`](Self::unsubscribe)) removes the callback.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    release: Vec<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    fn new(detach: impl FnOnce() + Send + 'static) -> Self {
        Self {
            release: vec![Box::new(detach)],
        }
    }

    /// Run `hook` after the callback has been detached.
    pub(crate) fn on_release(mut self, hook: impl FnOnce() + Send + 'static) -> Self {
        self.release.push(Box::new(hook));
        self
    }

    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        for release in self.release.drain(..) {
            release();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").finish_non_exhaustive()
    }
}
