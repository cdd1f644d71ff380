//! Connection/sync status and its transition rules.
//!
//! The machine is pure: callers pass the current time in and publish the
//! resulting state themselves.

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    /// Idle; nobody is asking for data.
    Disconnected,
    /// First fetch (or a retry) in progress.
    Connecting,
    /// Periodic sync in progress on an established connection.
    Syncing,
    Connected,
    /// Last attempt failed; a retry is scheduled.
    Error,
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Syncing => write!(f, "syncing"),
            Self::Connected => write!(f, "connected"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Snapshot published to connection subscribers.
///
/// `error` is set only while `status` is [`ConnectionStatus::Error`], and
/// `reconnect_attempts` is zero whenever `status` is `Connected`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionState {
    pub status: ConnectionStatus,
    pub last_connected_at: Option<DateTime<Utc>>,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub reconnect_attempts: u32,
    pub error: Option<String>,
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self {
            status: ConnectionStatus::Disconnected,
            last_connected_at: None,
            last_sync_at: None,
            reconnect_attempts: 0,
            error: None,
        }
    }
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self.status, ConnectionStatus::Connected | ConnectionStatus::Syncing)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    Start,
    FetchOk,
    FetchFail(String),
    SyncStart,
    SyncOk,
    SyncFail(String),
    Retry,
    ManualReconnect,
    Stop,
}

impl ConnectionEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::FetchOk => "fetch_ok",
            Self::FetchFail(_) => "fetch_fail",
            Self::SyncStart => "sync_start",
            Self::SyncOk => "sync_ok",
            Self::SyncFail(_) => "sync_fail",
            Self::Retry => "retry",
            Self::ManualReconnect => "manual_reconnect",
            Self::Stop => "stop",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid transition: {event} while {from}")]
pub struct TransitionError {
    pub from: ConnectionStatus,
    pub event: &'static str,
}

#[derive(Debug, Default, Clone)]
pub struct ConnectionStateMachine {
    state: ConnectionState,
}

impl ConnectionStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    pub fn status(&self) -> ConnectionStatus {
        self.state.status
    }

    /// Apply `event` at time `now`.
    ///
    /// On an invalid transition the state is left as it was.
    pub fn apply(
        &mut self,
        event: ConnectionEvent,
        now: DateTime<Utc>,
    ) -> Result<&ConnectionState, TransitionError> {
        use ConnectionStatus::*;

        let s = &mut self.state;
        match (s.status, event) {
            (Disconnected, ConnectionEvent::Start) | (Error, ConnectionEvent::Retry) => {
                s.status = Connecting;
                s.error = None;
            }
            (Connecting, ConnectionEvent::FetchOk) => {
                s.status = Connected;
                s.reconnect_attempts = 0;
                s.last_connected_at = Some(now);
                s.last_sync_at = Some(now);
            }
            (Syncing, ConnectionEvent::SyncOk) => {
                s.status = Connected;
                s.reconnect_attempts = 0;
                s.last_sync_at = Some(now);
            }
            (Connecting, ConnectionEvent::FetchFail(error))
            | (Syncing, ConnectionEvent::SyncFail(error)) => {
                s.status = Error;
                s.reconnect_attempts = s.reconnect_attempts.saturating_add(1);
                s.error = Some(error);
            }
            (Connected, ConnectionEvent::SyncStart) => {
                s.status = Syncing;
            }
            (_, ConnectionEvent::ManualReconnect) => {
                s.status = Connecting;
                s.reconnect_attempts = 0;
                s.error = None;
            }
            (_, ConnectionEvent::Stop) => {
                s.status = Disconnected;
                s.reconnect_attempts = 0;
                s.error = None;
            }
            (from, event) => {
                return Err(TransitionError {
                    from,
                    event: event.name(),
                })
            }
        }
        Ok(&self.state)
    }
}
