//! `RemoteFetcher` over the HTTP backend.

use async_trait::async_trait;
use tracing::debug;

use courier_core::config::BackendConfig;
use courier_core::error::{CourierResult, SyncFailure};
use courier_models::{Cursor, FetchPage, Message};
use courier_sync::{PostSyncHook, RemoteFetcher};

use crate::client::ApiClient;

pub struct HttpFetcher {
    client: ApiClient,
    chat_id: String,
    page_size: u32,
    hook: Option<Box<dyn PostSyncHook>>,
}

impl HttpFetcher {
    /// Build a fetcher for the chat named in `config`.
    pub fn new(config: &BackendConfig) -> CourierResult<Self> {
        config.validate()?;
        Ok(Self::with_client(
            ApiClient::new(config)?,
            config.chat_id.clone(),
            config.page_size,
        ))
    }

    pub fn with_client(client: ApiClient, chat_id: impl Into<String>, page_size: u32) -> Self {
        Self {
            client,
            chat_id: chat_id.into(),
            page_size: page_size.max(1),
            hook: None,
        }
    }

    /// Run `hook` after every successful sync.
    pub fn with_hook(mut self, hook: impl PostSyncHook + 'static) -> Self {
        self.hook = Some(Box::new(hook));
        self
    }

    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    pub fn chat_id(&self) -> &str {
        &self.chat_id
    }
}

#[async_trait]
impl RemoteFetcher for HttpFetcher {
    async fn fetch_latest(&self, cursor: Option<&Cursor>) -> Result<FetchPage, SyncFailure> {
        let page = self
            .client
            .fetch_messages(&self.chat_id, cursor, self.page_size)
            .await?;
        debug!(
            "chat {}: {} messages after {}",
            self.chat_id,
            page.messages.len(),
            cursor.map_or("start", |c| c.as_str())
        );
        Ok(page)
    }

    async fn trigger_sync(&self) -> Result<bool, SyncFailure> {
        Ok(self.client.trigger_sync(&self.chat_id).await?)
    }

    async fn post_sync(&self, messages: &[Message]) -> Result<(), SyncFailure> {
        match &self.hook {
            Some(hook) => hook.after_sync(messages).await,
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_core::error::CourierError;
    use courier_sync::ThreadDirectory;

    fn config() -> BackendConfig {
        BackendConfig {
            base_url: "https://backend.example.com/functions/v1".into(),
            chat_id: "-1001".into(),
            page_size: 0,
            ..BackendConfig::default()
        }
    }

    #[test]
    fn test_new_requires_chat() {
        let mut missing = config();
        missing.chat_id.clear();
        assert!(matches!(
            HttpFetcher::new(&missing),
            Err(CourierError::MissingConfig(_))
        ));
    }

    #[test]
    fn test_page_size_is_at_least_one() {
        let fetcher = HttpFetcher::new(&config()).unwrap();
        assert_eq!(fetcher.page_size, 1);
        assert_eq!(fetcher.chat_id(), "-1001");
        assert_eq!(
            fetcher.client().base_url(),
            "https://backend.example.com/functions/v1"
        );
    }

    #[tokio::test]
    async fn test_post_sync_runs_hook() {
        let directory = ThreadDirectory::new();
        let fetcher = HttpFetcher::new(&config())
            .unwrap()
            .with_hook(directory.clone());

        let mut message = Message::new("1", chrono::Utc::now(), "hi");
        message.thread_id = Some("42".into());
        fetcher.post_sync(&[message]).await.unwrap();
        assert_eq!(directory.threads()[0].thread_id, "42");
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_network_failure() {
        let mut cfg = config();
        cfg.base_url = "http://127.0.0.1:9".into();
        cfg.request_timeout_ms = 2_000;
        let client = ApiClient::new(&cfg)
            .unwrap()
            .with_retry_config(crate::client::RetryConfig {
                max_retries: 0,
                ..Default::default()
            });
        let fetcher = HttpFetcher::with_client(client, "-1001", 10);
        let failure = fetcher.fetch_latest(None).await.unwrap_err();
        assert_eq!(failure.kind, courier_core::error::FailureKind::Network);
    }
}
