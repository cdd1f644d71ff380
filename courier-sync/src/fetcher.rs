//! The seam between the sync core and the message-source backend.

use async_trait::async_trait;
use courier_core::error::SyncFailure;
use courier_models::{Cursor, FetchPage, Message};

/// Access to the backend that holds the mirrored messages.
///
/// Every failure is reported as a [`SyncFailure`]. Calls may be abandoned
/// at any await point (the service wraps them in a timeout), so
/// implementations must not rely on running to completion.
#[async_trait]
pub trait RemoteFetcher: Send + Sync {
    /// Messages newer than `cursor`, or the latest page when `None`.
    async fn fetch_latest(&self, cursor: Option<&Cursor>) -> Result<FetchPage, SyncFailure>;

    /// Ask the backend to pull from its upstream source. Returns whether it
    /// actually started a sync.
    async fn trigger_sync(&self) -> Result<bool, SyncFailure>;

    /// Runs after a successful fetch with the page that was merged. Errors
    /// are logged and otherwise ignored.
    async fn post_sync(&self, _messages: &[Message]) -> Result<(), SyncFailure> {
        Ok(())
    }
}

/// Extra work attached to a fetcher's post-sync step.
#[async_trait]
pub trait PostSyncHook: Send + Sync {
    async fn after_sync(&self, messages: &[Message]) -> Result<(), SyncFailure>;
}

#[async_trait]
impl<F: RemoteFetcher + ?Sized> RemoteFetcher for std::sync::Arc<F> {
    async fn fetch_latest(&self, cursor: Option<&Cursor>) -> Result<FetchPage, SyncFailure> {
        (**self).fetch_latest(cursor).await
    }

    async fn trigger_sync(&self) -> Result<bool, SyncFailure> {
        (**self).trigger_sync().await
    }

    async fn post_sync(&self, messages: &[Message]) -> Result<(), SyncFailure> {
        (**self).post_sync(messages).await
    }
}
