//! Rate-limited HTTP transport
//!
//! All outbound requests (media downloads, feed page fetches) go through a
//! single [`Fetcher`] so the process-wide minimum delay between requests
//! holds no matter who is calling. Connection-level failures are retried a
//! bounded number of times with a fixed sleep between attempts; when the
//! retries are exhausted the error propagates to the caller.

use crate::config::TransportConfig;
use crate::error::FetchError;
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use reqwest::{
    header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT},
    Client, Response,
};
use std::num::NonZeroU32;
use std::time::Duration;
use url::Url;

/// HTTP fetcher with process-wide rate limiting and bounded retry
pub struct Fetcher {
    /// HTTP client with configured timeout and compression
    client: Client,

    /// Rate limiter enforcing the minimum delay between requests
    rate_limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,

    /// Maximum number of retry attempts for failed requests
    max_retries: u32,

    /// Fixed sleep between retry attempts
    retry_delay: Duration,

    /// Optional base URL override for testing with mock servers
    base_url: Option<String>,
}

impl Fetcher {
    /// Create a new fetcher from transport configuration
    ///
    /// # Errors
    ///
    /// Returns `FetchError::Http` if the HTTP client cannot be created.
    pub fn new(config: &TransportConfig) -> Result<Self, FetchError> {
        let mut builder = Client::builder()
            .timeout(config.request_timeout())
            .gzip(true);

        if let Some(addr) = &config.proxy {
            builder = builder.proxy(reqwest::Proxy::https(format!("http://{addr}"))?);
        }

        let client = builder.build()?;

        // A zero delay disables throttling in practice
        let quota = Quota::with_period(Duration::from_secs(config.request_delay_secs))
            .unwrap_or_else(|| {
                Quota::per_second(NonZeroU32::new(1000).unwrap_or(NonZeroU32::MIN))
            });
        let rate_limiter = RateLimiter::direct(quota);

        Ok(Self {
            client,
            rate_limiter,
            max_retries: config.max_retries,
            retry_delay: Duration::from_secs(config.retry_delay_secs),
            base_url: None,
        })
    }

    /// Create a new fetcher with a custom base URL for testing
    ///
    /// # Errors
    ///
    /// Returns `FetchError::Http` if the HTTP client cannot be created.
    pub fn with_base_url(config: &TransportConfig, base_url: &str) -> Result<Self, FetchError> {
        let mut fetcher = Self::new(config)?;
        fetcher.base_url = Some(base_url.to_string());
        Ok(fetcher)
    }

    /// Fetch a URL and return the body as text
    ///
    /// # Errors
    ///
    /// Returns `FetchError::MaxRetriesExceeded` if all retries fail, or the
    /// first non-retryable error encountered.
    pub async fn fetch_text(&self, url: &str) -> Result<String, FetchError> {
        let response = self.fetch_with_retry(url).await?;
        Ok(response.text().await?)
    }

    /// Fetch a URL and return the raw body bytes
    ///
    /// # Errors
    ///
    /// Same failure modes as [`Fetcher::fetch_text`].
    pub async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let response = self.fetch_with_retry(url).await?;
        Ok(response.bytes().await?.to_vec())
    }

    /// Fetch with rate limiting and fixed-backoff retry
    async fn fetch_with_retry(&self, url: &str) -> Result<Response, FetchError> {
        let full_url = if let Some(base) = &self.base_url {
            format!("{base}{url}")
        } else {
            url.to_string()
        };

        let mut last_error = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                tracing::debug!(
                    attempt = attempt,
                    max_retries = self.max_retries,
                    url = %full_url,
                    "Retrying request after delay"
                );
                tokio::time::sleep(self.retry_delay).await;
            }

            self.rate_limiter.until_ready().await;

            match self
                .client
                .get(&full_url)
                .headers(self.build_headers())
                .send()
                .await
            {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        return Ok(response);
                    } else if Self::should_retry(status.as_u16()) {
                        last_error = Some(FetchError::ServerError(status.as_u16()));
                    } else {
                        return Err(FetchError::ServerError(status.as_u16()));
                    }
                }
                Err(e) => {
                    if e.is_timeout() {
                        last_error = Some(FetchError::Timeout);
                    } else {
                        last_error = Some(FetchError::Http(e));
                    }
                }
            }
        }

        tracing::warn!(url = %full_url, "All retry attempts exhausted");
        Err(last_error.unwrap_or(FetchError::MaxRetriesExceeded))
    }

    /// Determine if a status code should trigger a retry
    ///
    /// Retry on 429 and transient 5xx; fail fast on client errors.
    fn should_retry(status: u16) -> bool {
        matches!(status, 429 | 500 | 502 | 503 | 504)
    }

    fn build_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static(concat!("artcast/", env!("CARGO_PKG_VERSION"))),
        );
        headers.insert(ACCEPT, HeaderValue::from_static("*/*"));
        headers
    }
}

// ============================================================================
// URL helpers
// ============================================================================

/// Strip query arguments and fragment from a URL
///
/// Used before extension checks so `…/a.jpg?width=400` is recognized as a
/// JPEG. Unparsable input is returned unchanged.
pub fn strip_query_args(url: &str) -> String {
    match Url::parse(url) {
        Ok(mut parsed) => {
            parsed.set_query(None);
            parsed.set_fragment(None);
            parsed.to_string()
        }
        Err(_) => url.to_string(),
    }
}

/// Append a query argument to a URL
///
/// Unparsable input is returned unchanged.
pub fn add_query_arg(url: &str, key: &str, value: &str) -> String {
    match Url::parse(url) {
        Ok(mut parsed) => {
            parsed.query_pairs_mut().append_pair(key, value);
            parsed.to_string()
        }
        Err(_) => url.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn test_strip_query_args() {
        assert_eq!(
            strip_query_args("https://cdn.example/a.jpg?width=400&h=2#frag"),
            "https://cdn.example/a.jpg"
        );
        assert_eq!(
            strip_query_args("https://cdn.example/a.jpg"),
            "https://cdn.example/a.jpg"
        );
        assert_eq!(strip_query_args("not a url"), "not a url");
    }

    #[test]
    fn test_add_query_arg() {
        assert_eq!(
            add_query_arg("https://cdn.example/a.jpg", "random", "42"),
            "https://cdn.example/a.jpg?random=42"
        );
        assert_eq!(
            add_query_arg("https://cdn.example/a.jpg?w=1", "random", "42"),
            "https://cdn.example/a.jpg?w=1&random=42"
        );
    }

    #[test]
    fn test_should_retry() {
        assert!(Fetcher::should_retry(429));
        assert!(Fetcher::should_retry(500));
        assert!(Fetcher::should_retry(503));

        assert!(!Fetcher::should_retry(400));
        assert!(!Fetcher::should_retry(404));
        assert!(!Fetcher::should_retry(200));
    }

    #[test]
    fn test_fetcher_creation() {
        let config = Config::default();
        assert!(Fetcher::new(&config.transport).is_ok());
    }

    #[test]
    fn test_fetcher_with_proxy() {
        let mut config = Config::default();
        config.transport.proxy = Some("127.0.0.1:8080".into());
        assert!(Fetcher::new(&config.transport).is_ok());
    }
}
