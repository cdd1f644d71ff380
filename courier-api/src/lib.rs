//! Courier API - HTTP client for the message-source backend.
//!
//! This crate provides the typed client for the backend's paged message
//! read and its upstream sync trigger, and `HttpFetcher`, the
//! `RemoteFetcher` the sync core uses in production. It handles
//! authentication, custom headers, timeouts, and short retries of gateway
//! errors.

pub mod client;
pub mod endpoints;
pub mod fetcher;
pub mod response;

// Re-export key types
pub use client::{ApiClient, EndpointPaths, RetryConfig};
pub use fetcher::HttpFetcher;
pub use response::{ServerError, ServerResponse};
