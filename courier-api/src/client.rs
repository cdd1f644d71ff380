//! HTTP client for the message-source backend.
//!
//! Handles authentication headers, custom headers, timeouts, bounded
//! retry of gateway errors, and status classification.

use std::time::Duration;

use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use tracing::{debug, warn};

use courier_core::config::{AppConfig, BackendConfig};
use courier_core::error::{CourierError, CourierResult};

/// Retry configuration for a single HTTP request.
///
/// Retries across sync attempts are the scheduler's business; these
/// defaults only cover a gateway blip.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts.
    pub max_retries: u32,
    /// Base delay between retries (doubles each attempt).
    pub base_delay: Duration,
    /// Maximum delay cap.
    pub max_delay: Duration,
    /// HTTP status codes that trigger a retry.
    pub retryable_statuses: Vec<u16>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(2),
            retryable_statuses: vec![502, 503, 504],
        }
    }
}

/// HTTP client for the backend REST API.
#[derive(Clone)]
pub struct ApiClient {
    inner: Client,
    /// Sanitized base URL, no trailing slash.
    base_url: String,
    api_key: String,
    timeout: Duration,
    custom_headers: Vec<(String, String)>,
    retry_config: RetryConfig,
    paths: EndpointPaths,
}

/// Where the message endpoints live under the base URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointPaths {
    pub messages: String,
    pub trigger: String,
}

impl ApiClient {
    /// Create a new ApiClient from backend configuration.
    pub fn new(config: &BackendConfig) -> CourierResult<Self> {
        if config.base_url.trim().is_empty() {
            return Err(CourierError::MissingConfig("backend.base_url".into()));
        }
        let base_url = AppConfig::sanitize_base_url(&config.base_url);
        let timeout = config.request_timeout();

        let inner = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .pool_max_idle_per_host(2)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(30))
            .build()
            .map_err(|e| CourierError::Http(format!("failed to build HTTP client: {e}")))?;

        let mut custom_headers: Vec<(String, String)> = config
            .custom_headers
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        custom_headers.sort();

        Ok(Self {
            inner,
            base_url,
            api_key: config.api_key.clone(),
            timeout,
            custom_headers,
            retry_config: RetryConfig::default(),
            paths: EndpointPaths {
                messages: config.messages_path.clone(),
                trigger: config.trigger_path.clone(),
            },
        })
    }

    /// Set custom retry configuration.
    pub fn with_retry_config(mut self, config: RetryConfig) -> Self {
        self.retry_config = config;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn paths(&self) -> &EndpointPaths {
        &self.paths
    }

    /// Full URL for an API path.
    pub fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{path}", self.base_url)
        } else {
            format!("{}/{path}", self.base_url)
        }
    }

    /// Auth and custom headers applied to every request.
    fn apply_headers(&self, mut builder: RequestBuilder) -> RequestBuilder {
        if !self.api_key.is_empty() {
            builder = builder
                .header("apikey", self.api_key.as_str())
                .bearer_auth(&self.api_key);
        }
        for (key, value) in &self.custom_headers {
            builder = builder.header(key.as_str(), value.as_str());
        }
        builder
    }

    fn build_request(
        &self,
        method: Method,
        url: &str,
        query: &[(&str, String)],
        body: Option<&serde_json::Value>,
    ) -> RequestBuilder {
        let mut builder = self.inner.request(method, url).timeout(self.timeout);
        if !query.is_empty() {
            builder = builder.query(query);
        }
        if let Some(b) = body {
            builder = builder.json(b);
        }
        self.apply_headers(builder)
    }

    /// Execute a request with exponential backoff retry.
    async fn request_with_retry(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&serde_json::Value>,
    ) -> CourierResult<Response> {
        let url = self.url(path);
        debug!("{} {}", method, path);

        let mut last_error: Option<CourierError> = None;

        for attempt in 0..=self.retry_config.max_retries {
            if attempt > 0 {
                let delay = self.calculate_retry_delay(attempt - 1);
                warn!(
                    "retrying {} {} (attempt {}/{}) after {:.1}s",
                    method,
                    path,
                    attempt + 1,
                    self.retry_config.max_retries + 1,
                    delay.as_secs_f64()
                );
                tokio::time::sleep(delay).await;
            }

            let builder = self.build_request(method.clone(), &url, query, body);

            match builder.send().await {
                Ok(response) => {
                    let status = response.status();
                    if self
                        .retry_config
                        .retryable_statuses
                        .contains(&status.as_u16())
                        && attempt < self.retry_config.max_retries
                    {
                        warn!("retryable status {} from {}", status.as_u16(), path);
                        last_error = Some(CourierError::ServerError {
                            status: status.as_u16(),
                            message: format!("retryable status {status}"),
                        });
                        continue;
                    }

                    return Self::check_status(response).await;
                }
                Err(e) => {
                    let is_retryable = e.is_connect();
                    let err = Self::classify_error(e);

                    if is_retryable && attempt < self.retry_config.max_retries {
                        warn!("retryable error on {}: {}", path, err);
                        last_error = Some(err);
                        continue;
                    }

                    return Err(err);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| CourierError::Http("max retries exceeded".into())))
    }

    /// Calculate retry delay with exponential backoff.
    fn calculate_retry_delay(&self, attempt: u32) -> Duration {
        let base_ms = self.retry_config.base_delay.as_millis() as u64;
        let delay_ms = base_ms.saturating_mul(1u64 << attempt.min(20));
        let max_ms = self.retry_config.max_delay.as_millis() as u64;
        Duration::from_millis(delay_ms.min(max_ms))
    }

    /// GET `path` with query parameters and decode the body as JSON.
    pub async fn get_json(&self, path: &str, query: &[(&str, String)]) -> CourierResult<serde_json::Value> {
        let response = self.request_with_retry(Method::GET, path, query, None).await?;
        Self::parse_json(response).await
    }

    /// POST a JSON body to `path` and decode the reply as JSON. An empty
    /// reply decodes as `null`.
    pub async fn post_json(&self, path: &str, body: &serde_json::Value) -> CourierResult<serde_json::Value> {
        let response = self.request_with_retry(Method::POST, path, &[], Some(body)).await?;
        Self::parse_json(response).await
    }

    async fn parse_json(response: Response) -> CourierResult<serde_json::Value> {
        let text = response
            .text()
            .await
            .map_err(|e| CourierError::Http(format!("failed to read response body: {e}")))?;
        if text.trim().is_empty() {
            return Ok(serde_json::Value::Null);
        }
        serde_json::from_str(&text)
            .map_err(|e| CourierError::Decode(format!("response is not valid JSON: {e}")))
    }

    /// Check the HTTP status code and convert to CourierError if needed.
    async fn check_status(response: Response) -> CourierResult<Response> {
        let status = response.status();

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(CourierError::AuthFailed(format!("server returned {status}")));
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CourierError::ServerError {
                status: status.as_u16(),
                message: summarize_body(&body),
            });
        }

        Ok(response)
    }

    /// Classify a reqwest error into a CourierError variant.
    fn classify_error(e: reqwest::Error) -> CourierError {
        if e.is_timeout() {
            CourierError::Timeout(e.to_string())
        } else if e.is_connect() {
            CourierError::Http(format!("connection failed: {e}"))
        } else if e.is_decode() {
            CourierError::Decode(e.to_string())
        } else {
            CourierError::Http(e.to_string())
        }
    }
}

/// Error bodies can be whole HTML pages; keep the log line readable.
fn summarize_body(body: &str) -> String {
    const MAX: usize = 200;
    let trimmed = body.trim();
    match trimmed.char_indices().nth(MAX) {
        Some((cut, _)) => format!("{}...", &trimmed[..cut]),
        None => trimmed.to_string(),
    }
}
