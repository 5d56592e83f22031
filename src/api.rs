//! Outbound HTTP with a reusable retry-on-status policy.
//!
//! The module uses a trait-based design so the resolver can be exercised
//! without a network:
//! - [`HttpClient`]: minimal `GET` / `HEAD` contract
//! - [`ReqwestClient`]: the real client
//! - [`RetryingClient`]: decorator applying a [`RetryPolicy`] to any client
//!
//! # Retry Strategy
//!
//! A response whose status is in `retryable_statuses` is retried until
//! `max_attempts` is reached. The wait before retry `n` is
//!
//! ```text
//! delay = base_interval * backoff_multiplier^(n-1) * (1 ± jitter_fraction)
//! ```
//!
//! When attempts run out the last response is returned as-is, so callers see
//! an ordinary status and decide what it means. Transport errors are not
//! retried.

use crate::config::HttpSettings;
use crate::error::Result;
use rand::{Rng, rng};
use std::fmt;
use std::future::Future;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, instrument, warn};

/// Status and body of an HTTP exchange. `HEAD` responses carry an empty body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_not_found(&self) -> bool {
        self.status == 404
    }
}

/// Minimal HTTP contract used by the resolver and the packager.
pub trait HttpClient {
    async fn get(&self, url: &str) -> Result<HttpResponse>;
    async fn head(&self, url: &str) -> Result<HttpResponse>;
}

impl<T: HttpClient> HttpClient for &T {
    async fn get(&self, url: &str) -> Result<HttpResponse> {
        (**self).get(url).await
    }

    async fn head(&self, url: &str) -> Result<HttpResponse> {
        (**self).head(url).await
    }
}

/// [`HttpClient`] backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct ReqwestClient {
    http: reqwest::Client,
}

impl ReqwestClient {
    pub fn new(settings: &HttpSettings) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(&settings.user_agent)
            .timeout(Duration::from_secs(settings.timeout_secs))
            .use_rustls_tls()
            .build()?;
        Ok(Self { http })
    }
}

impl HttpClient for ReqwestClient {
    #[instrument(level = "debug", skip(self))]
    async fn get(&self, url: &str) -> Result<HttpResponse> {
        let response = self
            .http
            .get(url)
            .header("Accept", "application/json, */*;q=0.8")
            .send()
            .await?;
        let status = response.status().as_u16();
        let body = response.bytes().await?.to_vec();
        debug!(status, bytes = body.len(), "GET finished");
        Ok(HttpResponse { status, body })
    }

    #[instrument(level = "debug", skip(self))]
    async fn head(&self, url: &str) -> Result<HttpResponse> {
        let response = self.http.head(url).send().await?;
        let status = response.status().as_u16();
        debug!(status, "HEAD finished");
        Ok(HttpResponse {
            status,
            body: Vec::new(),
        })
    }
}

/// Retry parameters applied uniformly to outbound requests.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: usize,
    pub base_interval: Duration,
    /// Relative jitter applied to each delay, `0.5` meaning ±50%.
    pub jitter_fraction: f64,
    pub backoff_multiplier: f64,
    pub retryable_statuses: Vec<u16>,
}

impl Default for RetryPolicy {
    /// One attempt plus four retries on "not found".
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_interval: Duration::from_millis(500),
            jitter_fraction: 0.5,
            backoff_multiplier: 2.0,
            retryable_statuses: vec![404],
        }
    }
}

impl RetryPolicy {
    pub fn is_retryable(&self, status: u16) -> bool {
        self.retryable_statuses.contains(&status)
    }

    /// Delay before retry number `retry` (1-based), without jitter.
    pub fn nominal_delay(&self, retry: usize) -> Duration {
        let exponent = retry.saturating_sub(1) as i32;
        self.base_interval
            .mul_f64(self.backoff_multiplier.powi(exponent))
    }

    /// Delay before retry number `retry` with jitter applied.
    pub fn delay(&self, retry: usize) -> Duration {
        let nominal = self.nominal_delay(retry);
        if self.jitter_fraction <= 0.0 || nominal.is_zero() {
            return nominal;
        }
        let jitter: f64 = rng().random_range(-self.jitter_fraction..=self.jitter_fraction);
        nominal.mul_f64((1.0 + jitter).max(0.0))
    }
}

/// Decorator adding a [`RetryPolicy`] to any [`HttpClient`].
pub struct RetryingClient<T> {
    inner: T,
    policy: RetryPolicy,
}

impl<T: HttpClient> RetryingClient<T> {
    pub fn new(inner: T, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    async fn run<F, Fut>(&self, method: &str, url: &str, mut request: F) -> Result<HttpResponse>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<HttpResponse>>,
    {
        let total_t0 = Instant::now();
        let mut attempt = 1usize;

        loop {
            let response = request().await?;
            if !self.policy.is_retryable(response.status) {
                return Ok(response);
            }
            if attempt >= self.policy.max_attempts {
                debug!(
                    method,
                    url,
                    attempt,
                    status = response.status,
                    elapsed_ms_total = total_t0.elapsed().as_millis() as u64,
                    "Retries exhausted"
                );
                return Ok(response);
            }

            let delay = self.policy.delay(attempt);
            warn!(
                method,
                url,
                attempt,
                max = self.policy.max_attempts,
                status = response.status,
                ?delay,
                "Retryable status; backing off"
            );
            sleep(delay).await;
            attempt += 1;
        }
    }
}

impl<T> fmt::Debug for RetryingClient<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryingClient")
            .field("policy", &self.policy)
            .finish()
    }
}

impl<T: HttpClient> HttpClient for RetryingClient<T> {
    async fn get(&self, url: &str) -> Result<HttpResponse> {
        self.run("GET", url, || self.inner.get(url)).await
    }

    async fn head(&self, url: &str) -> Result<HttpResponse> {
        self.run("HEAD", url, || self.inner.head(url)).await
    }
}
