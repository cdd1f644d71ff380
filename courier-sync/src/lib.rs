//! Courier Sync - the message synchronization core.
//!
//! This crate keeps a local, ordered, deduplicated view of a remote chat and
//! tells interested consumers when it changes:
//! - `MessageStore`: merge-by-id ordered message collection
//! - `ConnectionStateMachine`: connection status, failures and timestamps
//! - `SyncScheduler`: single-flight periodic sync with backoff and jitter
//! - `SubscriptionRegistry`: typed fan-out with replay of the latest value
//! - `SyncService`: composes the above behind subscribe/refresh/reconnect
//! - `RemoteFetcher`: the seam to the backend

pub mod backoff;
pub mod connection;
pub mod fetcher;
pub mod global;
pub mod registry;
pub mod scheduler;
pub mod service;
pub mod store;
pub mod threads;

pub use backoff::BackoffPolicy;
pub use connection::{
    ConnectionEvent, ConnectionState, ConnectionStateMachine, ConnectionStatus, TransitionError,
};
pub use fetcher::{PostSyncHook, RemoteFetcher};
pub use registry::{Subscription, SubscriptionRegistry};
pub use scheduler::{SchedulerStats, SyncScheduler, SyncTarget, TickOutcome};
pub use service::{Diagnostics, MessageSnapshot, SyncService, SyncServiceBuilder};
pub use store::MessageStore;
pub use threads::{ThreadDirectory, ThreadInfo};

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Lock a mutex, recovering the data if a previous holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
