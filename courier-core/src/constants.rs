//! Application-wide constants.

/// Application name.
pub const APP_NAME: &str = "Courier";

/// Application version.
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default backend request timeout in milliseconds.
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;

/// Default interval between healthy syncs in milliseconds.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 30_000;

/// Default first retry delay after a failed sync in milliseconds.
pub const DEFAULT_BACKOFF_BASE_MS: u64 = 2_000;

/// Default cap on the retry delay in milliseconds.
pub const DEFAULT_BACKOFF_MAX_MS: u64 = 60_000;

/// Default jitter as a fraction of the computed retry delay.
pub const DEFAULT_JITTER_RATIO: f64 = 0.2;

/// Failures after which retries stay pinned at the maximum delay.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 8;

/// Default bound on a whole sync attempt (trigger + fetch) in milliseconds.
pub const DEFAULT_FETCH_TIMEOUT_MS: u64 = 30_000;

/// How long the scheduler keeps running after the last subscriber leaves.
pub const DEFAULT_STOP_GRACE_MS: u64 = 2_000;

/// Default number of messages handed to message subscribers.
pub const DEFAULT_SNAPSHOT_LIMIT: usize = 200;

/// Default page size requested from the message endpoint.
pub const DEFAULT_PAGE_SIZE: u32 = 100;

/// Default message endpoint path, relative to the backend base URL.
pub const DEFAULT_MESSAGES_PATH: &str = "/messages";

/// Default trigger endpoint path, relative to the backend base URL.
pub const DEFAULT_TRIGGER_PATH: &str = "/sync";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_defaults_are_ordered() {
        assert!(DEFAULT_BACKOFF_BASE_MS < DEFAULT_BACKOFF_MAX_MS);
        assert!((0.0..=1.0).contains(&DEFAULT_JITTER_RATIO));
    }
}
