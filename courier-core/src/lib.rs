//! Courier Core - Foundation types, error handling, configuration, and logging.
//!
//! This crate provides the shared foundation used by all other Courier crates:
//! - Application configuration (backend endpoint, auth, sync timing)
//! - Global error type and the collapsed `SyncFailure` surfaced by fetchers
//! - Structured logging with tracing
//! - Platform directory lookup
//! - Common constants

pub mod config;
pub mod error;
pub mod logging;
pub mod platform;
pub mod constants;

// Re-export commonly used items at the crate root
pub use config::AppConfig;
pub use error::{CourierError, CourierResult, FailureKind, SyncFailure};
pub use logging::init_logging;
pub use platform::Platform;
