//! Global error types for Courier.
//!
//! All error categories across the workspace are unified into a single
//! `CourierError` enum with conversions from underlying library errors.
//! Fetch paths collapse these into a `SyncFailure`, which is what the
//! connection state machine ultimately records.

use thiserror::Error;

/// Convenience type alias for Results using CourierError.
pub type CourierResult<T> = Result<T, CourierError>;

/// Unified error type covering all error categories in Courier.
#[derive(Error, Debug)]
pub enum CourierError {
    // -- Configuration errors --
    /// Failed to load or parse application configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// A required configuration value is missing.
    #[error("missing configuration: {0}")]
    MissingConfig(String),

    // -- Network errors --
    /// HTTP request failed before a response arrived.
    #[error("http error: {0}")]
    Http(String),

    /// HTTP request timed out.
    #[error("request timeout: {0}")]
    Timeout(String),

    // -- Backend errors --
    /// Backend returned a non-success response.
    #[error("server error (status {status}): {message}")]
    ServerError {
        /// HTTP status code.
        status: u16,
        /// Error message from the backend.
        message: String,
    },

    /// Backend rejected our credentials.
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    // -- Payload errors --
    /// A payload arrived but could not be turned into messages.
    #[error("decode error: {0}")]
    Decode(String),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    // -- File/IO errors --
    /// File system operation failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    // -- Generic --
    /// An unexpected internal error.
    #[error("internal error: {0}")]
    Internal(String),

    /// Wrapping anyhow errors for interop.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<serde_json::Error> for CourierError {
    fn from(e: serde_json::Error) -> Self {
        CourierError::Serialization(e.to_string())
    }
}

impl From<toml::de::Error> for CourierError {
    fn from(e: toml::de::Error) -> Self {
        CourierError::Config(e.to_string())
    }
}

/// Which part of a sync attempt broke.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Request rejected, connection refused, or timed out.
    Network,
    /// Backend answered with a non-success status.
    Backend,
    /// Response body was not a valid message page.
    Decode,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Network => write!(f, "network"),
            Self::Backend => write!(f, "backend"),
            Self::Decode => write!(f, "decode"),
        }
    }
}

/// The single failure type a remote fetcher reports.
///
/// Never thrown at UI consumers: the scheduler records it on the
/// connection state and retries.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind} failure: {message}")]
pub struct SyncFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl SyncFailure {
    pub fn network(message: impl Into<String>) -> Self {
        Self { kind: FailureKind::Network, message: message.into() }
    }

    pub fn backend(message: impl Into<String>) -> Self {
        Self { kind: FailureKind::Backend, message: message.into() }
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self { kind: FailureKind::Decode, message: message.into() }
    }
}

impl From<CourierError> for SyncFailure {
    fn from(e: CourierError) -> Self {
        let kind = match &e {
            CourierError::ServerError { .. } | CourierError::AuthFailed(_) => FailureKind::Backend,
            CourierError::Decode(_) | CourierError::Serialization(_) => FailureKind::Decode,
            _ => FailureKind::Network,
        };
        Self { kind, message: e.to_string() }
    }
}
