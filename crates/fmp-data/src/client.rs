//! HTTP transport for the Financial Modeling Prep API with rate limiting
//! and retries.

use crate::config::Config;
use crate::error::{DataError, Result};
use async_trait::async_trait;
use fmp_engine::{Request, Transport, TransportError};
use reqwest::StatusCode;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{Instant, sleep};

/// User agent sent with every request
const USER_AGENT: &str = concat!("fmp-client/", env!("CARGO_PKG_VERSION"));

/// Base delay of the exponential retry backoff
const RETRY_BASE_DELAY: Duration = Duration::from_millis(500);

/// Spaces requests at least `min_interval` apart.
struct RateLimiter {
    last_request: Instant,
    min_interval: Duration,
}

impl RateLimiter {
    fn new(min_interval: Duration) -> Self {
        Self {
            last_request: Instant::now() - min_interval,
            min_interval,
        }
    }

    async fn wait(&mut self) {
        let elapsed = self.last_request.elapsed();
        if elapsed < self.min_interval {
            sleep(self.min_interval - elapsed).await;
        }
        self.last_request = Instant::now();
    }
}

/// [`Transport`] over HTTPS.
///
/// Requests go to `{base_url}/api/{version}/{path}` with the API key as the
/// `apikey` query parameter. Connection errors, HTTP 429 and 5xx responses
/// are retried with exponential backoff.
pub struct HttpTransport {
    client: reqwest::Client,
    rate_limiter: Arc<Mutex<RateLimiter>>,
    base_url: String,
    api_key: String,
    max_retries: u32,
    retry_base_delay: Duration,
}

impl HttpTransport {
    /// Create a transport from a configuration.
    ///
    /// # Errors
    /// Returns [`DataError::MissingApiKey`] when no key is configured.
    ///
    /// # Example
    /// ```no_run
    /// use fmp_data::{Config, HttpTransport};
    ///
    /// # fn example() -> fmp_data::Result<()> {
    /// let transport = HttpTransport::new(&Config::with_api_key("demo"))?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn new(config: &Config) -> Result<Self> {
        let api_key = config.api_key()?.to_string();
        config.validate()?;

        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(DataError::Network)?;

        Ok(Self {
            client,
            rate_limiter: Arc::new(Mutex::new(RateLimiter::new(Duration::from_millis(
                config.rate_limit_ms,
            )))),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            max_retries: config.max_retries,
            retry_base_delay: RETRY_BASE_DELAY,
        })
    }

    /// Full URL of `request`, without credentials.
    pub fn url(&self, request: &Request) -> String {
        format!(
            "{}/api/{}/{}",
            self.base_url,
            request.version,
            request.path.trim_start_matches('/')
        )
    }

    fn backoff(&self, attempt: u32) -> Duration {
        self.retry_base_delay * 2_u32.saturating_pow(attempt.saturating_sub(1))
    }

    async fn attempt(&self, url: &str, request: &Request) -> Attempt {
        self.rate_limiter.lock().await.wait().await;

        let response = match self
            .client
            .get(url)
            .query(&request.query)
            .query(&[("apikey", self.api_key.as_str())])
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                return Attempt::Retry(TransportError::Request {
                    url: url.to_string(),
                    message: e.without_url().to_string(),
                });
            }
        };

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            return Attempt::Retry(TransportError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        if status != StatusCode::OK && status != StatusCode::ACCEPTED {
            return Attempt::Done(Err(TransportError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            }));
        }

        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                return Attempt::Retry(TransportError::Request {
                    url: url.to_string(),
                    message: e.without_url().to_string(),
                });
            }
        };
        Attempt::Done(decode(url, &body))
    }
}

enum Attempt {
    Done(std::result::Result<Value, TransportError>),
    Retry(TransportError),
}

/// Decode a response body, turning the provider's error object into an error.
fn decode(url: &str, body: &str) -> std::result::Result<Value, TransportError> {
    if body.trim().is_empty() {
        return Ok(Value::Null);
    }
    let value: Value = serde_json::from_str(body).map_err(|e| TransportError::Decode {
        url: url.to_string(),
        message: e.to_string(),
    })?;
    if let Some(message) = value.get("Error Message").and_then(Value::as_str) {
        return Err(TransportError::Provider {
            url: url.to_string(),
            message: message.to_string(),
        });
    }
    Ok(value)
}

#[async_trait]
impl Transport for HttpTransport {
    async fn fetch(&self, request: &Request) -> std::result::Result<Value, TransportError> {
        let url = self.url(request);
        let mut attempt = 0;
        loop {
            match self.attempt(&url, request).await {
                Attempt::Done(result) => return result,
                Attempt::Retry(error) => {
                    attempt += 1;
                    if attempt > self.max_retries {
                        log::debug!("giving up on {url} after {attempt} attempt(s): {error}");
                        return Err(error);
                    }
                    let delay = self.backoff(attempt);
                    log::debug!("retrying {url} in {delay:?} ({error})");
                    sleep(delay).await;
                }
            }
        }
    }
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("base_url", &self.base_url)
            .field("max_retries", &self.max_retries)
            .finish_non_exhaustive()
    }
}
