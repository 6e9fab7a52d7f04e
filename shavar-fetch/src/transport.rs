use std::future::Future;
use std::time::Duration;

use bytes::Bytes;

use crate::error::Error;

/// Base delay for exponential backoff (doubles each retry)
const RETRY_BASE_DELAY_MS: u64 = 100;

/// Cap on the backoff exponent
const MAX_BACKOFF_SHIFT: u32 = 10;

/// Moves request bodies to the service and response bodies back.
///
/// Every shavar call is a POST, including redirect fetches (which carry an empty body).
pub trait Transport: Send + Sync {
    fn post(&self, url: &str, body: Bytes) -> impl Future<Output = Result<Bytes, Error>> + Send;
}

/// [`Transport`] over reqwest with per-request timeout and retry with exponential backoff.
pub struct HttpTransport {
    client: reqwest::Client,
    max_retries: u32,
}

impl HttpTransport {
    pub fn new(timeout: Duration, max_retries: u32) -> Result<Self, Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("shavar/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(Error::ClientBuild)?;
        Ok(Self { client, max_retries })
    }

    async fn post_once(&self, url: &str, body: Bytes) -> Result<Bytes, Error> {
        let response = self
            .client
            .post(url)
            .body(body)
            .send()
            .await
            .map_err(|source| Error::HttpRequest { url: url.to_string(), source })?;

        if !response.status().is_success() {
            return Err(Error::HttpStatus {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }

        response.bytes().await.map_err(|source| Error::HttpRequest { url: url.to_string(), source })
    }
}

impl Transport for HttpTransport {
    async fn post(&self, url: &str, body: Bytes) -> Result<Bytes, Error> {
        let mut last_error = None;
        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = RETRY_BASE_DELAY_MS * (1 << attempt.min(MAX_BACKOFF_SHIFT));
                tracing::debug!(url, attempt, delay_ms = delay, "retrying request");
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }

            match self.post_once(url, body.clone()).await {
                Ok(bytes) => return Ok(bytes),
                Err(e) if e.is_retryable() => {
                    tracing::warn!(url, attempt, error = %e, "request failed");
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or_else(|| Error::MaxRetriesExceeded {
            url: url.to_string(),
            retries: self.max_retries,
        }))
    }
}
