//! Comic service HTTP client implementation.

use std::pin::Pin;
use std::time::Duration;

use bytes::Bytes;
use futures_util::{Stream, StreamExt, TryStreamExt};
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{ClientError, ComicRecord};

/// Base URL of the public comic service.
pub const DEFAULT_SERVICE_URL: &str = "https://xkcd.com";

/// Body of an image download, yielded chunk by chunk.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, ClientError>> + Send>>;

/// Network settings for [`ComicClient`].
///
/// Every request is bounded by `request_timeout_secs`, so a hung connection
/// surfaces as an [`ClientError::Http`] instead of blocking forever.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub base_url: String,
    pub connect_timeout_secs: u64,
    pub request_timeout_secs: u64,
    /// Retries after a 5xx or 429 response. Connection failures are not retried.
    pub max_retries: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_SERVICE_URL.to_string(),
            connect_timeout_secs: 10,
            request_timeout_secs: 30,
            max_retries: 2,
        }
    }
}

/// Client for the comic service.
#[derive(Debug, Clone)]
pub struct ComicClient {
    http: Client,
    config: ClientConfig,
}

impl ComicClient {
    /// Create a new client from the given settings.
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self { http, config })
    }

    /// Create a client for the given base URL with default timeouts.
    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self, ClientError> {
        Self::new(ClientConfig {
            base_url: base_url.into(),
            ..ClientConfig::default()
        })
    }

    /// Get the base URL.
    pub fn base_url(&self) -> &str {
        self.config.base_url.trim_end_matches('/')
    }

    /// Fetch the metadata of comic `number`.
    pub async fn fetch(&self, number: i64) -> Result<ComicRecord, ClientError> {
        let url = format!("{}/{}/info.0.json", self.base_url(), number);
        self.get_json(&url).await
    }

    /// Fetch the metadata of the newest published comic.
    pub async fn fetch_newest(&self) -> Result<ComicRecord, ClientError> {
        let url = format!("{}/info.0.json", self.base_url());
        self.get_json(&url).await
    }

    /// Start downloading an image, returning its body as a stream.
    pub async fn fetch_image(&self, url: &str) -> Result<ByteStream, ClientError> {
        if url.is_empty() {
            return Err(ClientError::InvalidResponse("empty image URL".to_string()));
        }

        let response = self.get_with_retry(url).await?;
        Ok(response.bytes_stream().map_err(ClientError::from).boxed())
    }

    async fn get_json(&self, url: &str) -> Result<ComicRecord, ClientError> {
        let response = self.get_with_retry(url).await?;
        let body = response.bytes().await?;
        let comic = serde_json::from_slice(&body)?;
        Ok(comic)
    }

    /// GET `url`, retrying transient failures with backoff (500ms, 1s, 2s, ...).
    async fn get_with_retry(&self, url: &str) -> Result<Response, ClientError> {
        let mut attempt = 0;
        loop {
            let response = self.http.get(url).send().await?;

            match Self::check_status(response, url) {
                Ok(response) => return Ok(response),
                Err(e) if e.is_transient() && attempt < self.config.max_retries => {
                    let backoff_ms = 500 * (1u64 << attempt.min(6));
                    debug!(
                        attempt = attempt + 1,
                        backoff_ms,
                        error = %e,
                        "transient error from comic service, retrying"
                    );
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Map non-success statuses to errors.
    fn check_status(response: Response, url: &str) -> Result<Response, ClientError> {
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            return Err(ClientError::NotFound {
                url: url.to_string(),
            });
        }

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse().ok());
            return Err(ClientError::RateLimited { retry_after_secs });
        }

        if !status.is_success() {
            return Err(ClientError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        Ok(response)
    }
}
