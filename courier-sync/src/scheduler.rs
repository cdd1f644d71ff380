//! Decides when a sync attempt runs.
//!
//! One driver task per start. Each start bumps a generation; a driver whose
//! generation is no longer current exits at its next check, and a result
//! it produces after a stop is thrown away by the target. At most one
//! attempt is in flight at any time, across stop/start cycles included: a
//! new driver waits for a stale attempt to finish before starting its own.

use std::sync::{Arc, Mutex, Weak};

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::backoff::BackoffPolicy;
use crate::lock;

/// How a single sync attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Synced,
    Failed,
    /// The attempt belonged to a superseded generation; nothing was applied.
    Cancelled,
}

/// The thing being synced.
#[async_trait]
pub trait SyncTarget: Send + Sync + 'static {
    /// Run one attempt on behalf of `generation`.
    async fn sync_once(&self, generation: u64) -> TickOutcome;

    /// Consecutive failures so far; drives the retry delay.
    fn reconnect_attempts(&self) -> u32;

    /// Put the connection back into `connecting` with a clean failure count.
    fn manual_reconnect(&self);
}

struct SchedulerState {
    running: bool,
    generation: u64,
    /// Generation of the attempt currently in flight.
    in_flight: Option<u64>,
    /// Wakes the sleeping driver early. Replaced at the start of every
    /// attempt so a wake-up sent before the attempt is not reused after it.
    wake: Arc<Notify>,
    task: Option<JoinHandle<()>>,
    ticks: u64,
    coalesced_refreshes: u64,
}

struct Shared {
    state: Mutex<SchedulerState>,
    flight_done: Notify,
}

/// Point-in-time scheduler counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerStats {
    pub running: bool,
    pub generation: u64,
    pub in_flight: bool,
    pub ticks: u64,
    pub coalesced_refreshes: u64,
}

pub struct SyncScheduler {
    policy: BackoffPolicy,
    target: Weak<dyn SyncTarget>,
    shared: Arc<Shared>,
}

impl SyncScheduler {
    pub fn new(policy: BackoffPolicy, target: Weak<dyn SyncTarget>) -> Self {
        Self {
            policy,
            target,
            shared: Arc::new(Shared {
                state: Mutex::new(SchedulerState {
                    running: false,
                    generation: 0,
                    in_flight: None,
                    wake: Arc::new(Notify::new()),
                    task: None,
                    ticks: 0,
                    coalesced_refreshes: 0,
                }),
                flight_done: Notify::new(),
            }),
        }
    }

    pub fn policy(&self) -> &BackoffPolicy {
        &self.policy
    }

    /// Start the driver; the first attempt runs right away. Returns `false`
    /// if it was already running or there is no tokio runtime to run on.
    pub fn start(&self) -> bool {
        let mut state = lock(&self.shared.state);
        if state.running {
            return false;
        }
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                warn!("sync scheduler not started: no tokio runtime");
                return false;
            }
        };

        state.running = true;
        state.generation += 1;
        state.wake = Arc::new(Notify::new());
        let generation = state.generation;

        let task = runtime.spawn(drive(
            Arc::clone(&self.shared),
            self.target.clone(),
            self.policy.clone(),
            generation,
        ));
        state.task = Some(task);
        info!("sync scheduler started (generation {generation})");
        true
    }

    /// Stop scheduling. An attempt already in flight runs to completion but
    /// its result is discarded.
    pub fn stop(&self) {
        let mut state = lock(&self.shared.state);
        if !state.running {
            return;
        }
        state.running = false;
        state.generation += 1;
        state.wake.notify_one();
        // Detached rather than aborted: the in-flight attempt must finish
        // and clear the flight before a later generation can begin.
        state.task.take();
        info!("sync scheduler stopped");
    }

    /// Sync now and restart the periodic timer from the result. Coalesces
    /// into the attempt already in flight, if any. Ignored while stopped.
    pub fn force_refresh(&self) {
        let mut state = lock(&self.shared.state);
        if !state.running {
            debug!("refresh ignored: scheduler stopped");
            return;
        }
        if state.in_flight == Some(state.generation) {
            state.coalesced_refreshes += 1;
            debug!("refresh coalesced into in-flight sync");
            return;
        }
        state.wake.notify_one();
    }

    /// Reset the failure count, move the connection to `connecting` and
    /// refresh. Ignored while stopped.
    pub fn reconnect(&self) {
        if !self.is_running() {
            debug!("reconnect ignored: scheduler stopped");
            return;
        }
        if let Some(target) = self.target.upgrade() {
            target.manual_reconnect();
        }
        self.force_refresh();
    }

    pub fn is_running(&self) -> bool {
        lock(&self.shared.state).running
    }

    pub fn is_in_flight(&self) -> bool {
        lock(&self.shared.state).in_flight.is_some()
    }

    pub fn generation(&self) -> u64 {
        lock(&self.shared.state).generation
    }

    pub fn stats(&self) -> SchedulerStats {
        let state = lock(&self.shared.state);
        SchedulerStats {
            running: state.running,
            generation: state.generation,
            in_flight: state.in_flight.is_some(),
            ticks: state.ticks,
            coalesced_refreshes: state.coalesced_refreshes,
        }
    }
}

impl Drop for SyncScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Claim the flight for `generation`, waiting out any attempt from an
/// earlier generation. Returns the wake handle for this attempt, or `None`
/// if the generation was superseded meanwhile.
async fn acquire_flight(shared: &Shared, generation: u64) -> Option<Arc<Notify>> {
    loop {
        let done = shared.flight_done.notified();
        tokio::pin!(done);
        done.as_mut().enable();
        {
            let mut state = lock(&shared.state);
            if !state.running || state.generation != generation {
                return None;
            }
            if state.in_flight.is_none() {
                state.in_flight = Some(generation);
                state.ticks += 1;
                state.wake = Arc::new(Notify::new());
                return Some(Arc::clone(&state.wake));
            }
        }
        debug!("waiting for a stale sync to finish");
        done.await;
    }
}

/// Release the flight. Returns whether `generation` is still current.
fn end_flight(shared: &Shared, generation: u64) -> bool {
    let current = {
        let mut state = lock(&shared.state);
        state.in_flight = None;
        state.running && state.generation == generation
    };
    shared.flight_done.notify_waiters();
    current
}

async fn drive(shared: Arc<Shared>, target: Weak<dyn SyncTarget>, policy: BackoffPolicy, generation: u64) {
    loop {
        let Some(wake) = acquire_flight(&shared, generation).await else {
            break;
        };
        let Some(target) = target.upgrade() else {
            end_flight(&shared, generation);
            break;
        };

        let outcome = target.sync_once(generation).await;
        if !end_flight(&shared, generation) {
            debug!("sync generation {generation} superseded");
            break;
        }

        let delay = match outcome {
            TickOutcome::Synced => policy.interval,
            TickOutcome::Failed => policy.delay_for(target.reconnect_attempts()),
            TickOutcome::Cancelled => break,
        };
        drop(target);
        debug!("next sync in {:.1}s", delay.as_secs_f64());

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = wake.notified() => {}
        }
    }
    debug!("sync driver for generation {generation} exited");
}
