//! Retry-aware HTTP fetcher.
//!
//! [`Fetcher`] is the sole point of contact with the remote catalog. Every
//! `get` runs a bounded retry loop: classify the failure, ask the
//! [`RetryPolicy`] for a decision, honor a server-supplied Retry-After on
//! 429, sleep, try again. Exhausting the budget surfaces
//! [`FetchError::Exhausted`] with the final cause.
//!
//! The fetcher has no persistent side effects; it only updates in-memory
//! [`FetchStats`] visible to the caller.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tracing::{debug, info, instrument, warn};

use super::error::FetchError;
use super::retry::{FailureType, RetryDecision, RetryPolicy, classify_error};
use crate::config::RetryConfig;

/// Maximum Retry-After value honored, to bound worst-case stalls.
const MAX_RETRY_AFTER: Duration = Duration::from_secs(3600);

/// A successfully fetched response, fully buffered.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    /// Final URL after redirects.
    pub final_url: String,
    /// HTTP status code.
    pub status: u16,
    /// Content-Type header value, empty when absent.
    pub content_type: String,
    /// Response body.
    pub body: Vec<u8>,
}

impl FetchResponse {
    /// Returns the body decoded as UTF-8, lossily.
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Caller-visible counters for a fetcher's lifetime.
#[derive(Debug, Default)]
pub struct FetchStats {
    attempts: AtomicU64,
    wait_ms: AtomicU64,
}

impl FetchStats {
    /// Total request attempts made (including retries).
    #[must_use]
    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Total time spent sleeping between retries.
    #[must_use]
    pub fn total_wait(&self) -> Duration {
        Duration::from_millis(self.wait_ms.load(Ordering::SeqCst))
    }

    fn record_attempt(&self) {
        self.attempts.fetch_add(1, Ordering::SeqCst);
    }

    #[allow(clippy::cast_possible_truncation)]
    fn record_wait(&self, delay: Duration) {
        self.wait_ms
            .fetch_add(delay.as_millis() as u64, Ordering::SeqCst);
    }
}

/// HTTP fetcher with retry logic and consistent headers.
#[derive(Debug)]
pub struct Fetcher {
    client: reqwest::Client,
    policy: RetryPolicy,
    stats: FetchStats,
}

impl Fetcher {
    /// Creates a fetcher from a retry configuration and user agent.
    ///
    /// The per-attempt timeout comes from `config.timeout`; exceeding it is a
    /// transient failure and counts against the retry budget.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Network`]-free construction errors as
    /// `reqwest::Error` if the client cannot be built.
    pub fn new(config: &RetryConfig, user_agent: &str) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(config.timeout())
            .connect_timeout(Duration::from_secs(10))
            .gzip(true)
            .build()?;

        Ok(Self {
            client,
            policy: config.policy(),
            stats: FetchStats::default(),
        })
    }

    /// Returns the fetcher's cumulative statistics.
    #[must_use]
    pub fn stats(&self) -> &FetchStats {
        &self.stats
    }

    /// Returns the configured retry policy.
    #[must_use]
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Fetches a URL with bounded retries.
    ///
    /// # Errors
    ///
    /// Returns the first [`FailureType::Permanent`] error immediately, or
    /// [`FetchError::Exhausted`] once transient retries are spent.
    #[instrument(skip(self), fields(url = %url))]
    pub async fn get(&self, url: &str) -> Result<FetchResponse, FetchError> {
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            self.stats.record_attempt();
            debug!(attempt, "attempting fetch");

            let error = match self.try_get(url).await {
                Ok(response) => return Ok(response),
                Err(e) => e,
            };

            let failure_type = classify_error(&error);

            // 429 may carry a server-mandated delay; prefer it to backoff.
            let retry_after_delay = if failure_type == FailureType::RateLimited {
                retry_after_of(&error).and_then(|v| parse_retry_after(&v))
            } else {
                None
            };

            match self.policy.should_retry(failure_type, attempt) {
                RetryDecision::Retry {
                    delay: backoff_delay,
                    attempt: next_attempt,
                } => {
                    let delay = retry_after_delay.unwrap_or(backoff_delay);
                    info!(
                        attempt = next_attempt,
                        max_attempts = self.policy.max_retries(),
                        delay_ms = delay.as_millis(),
                        using_retry_after = retry_after_delay.is_some(),
                        error = %error,
                        "retrying fetch"
                    );
                    self.stats.record_wait(delay);
                    tokio::time::sleep(delay).await;
                }
                RetryDecision::DoNotRetry { reason } => {
                    debug!(%reason, "not retrying fetch");
                    if failure_type == FailureType::Permanent {
                        return Err(error);
                    }
                    return Err(FetchError::exhausted(url, attempt, error));
                }
            }
        }
    }

    /// Performs a single attempt, mapping transport failures onto
    /// [`FetchError`] variants.
    async fn try_get(&self, url: &str) -> Result<FetchResponse, FetchError> {
        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::timeout(url)
            } else if e.is_builder() {
                FetchError::invalid_url(url)
            } else {
                FetchError::network(url, e)
            }
        })?;

        let status = response.status();
        let final_url = response.url().to_string();

        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            if retry_after.is_some() {
                warn!(status = status.as_u16(), "server requested backoff");
            }
            return Err(FetchError::http_status_with_retry_after(
                url,
                status.as_u16(),
                retry_after,
            ));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        let body = response.bytes().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::timeout(url)
            } else {
                FetchError::malformed(url, format!("body read failed: {e}"))
            }
        })?;

        Ok(FetchResponse {
            final_url,
            status: status.as_u16(),
            content_type,
            body: body.to_vec(),
        })
    }
}

/// Pulls the Retry-After header value out of a fetch error, if any.
fn retry_after_of(error: &FetchError) -> Option<String> {
    match error {
        FetchError::HttpStatus { retry_after, .. } => retry_after.clone(),
        _ => None,
    }
}

/// Parses a Retry-After header value into a [`Duration`].
///
/// Accepts integer seconds or an RFC 7231 HTTP-date. Values are capped at
/// one hour; negative or unparseable values return `None`.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use lexgraph_core::fetch::parse_retry_after;
///
/// assert_eq!(parse_retry_after("120"), Some(Duration::from_secs(120)));
/// assert_eq!(parse_retry_after("0"), Some(Duration::ZERO));
/// assert_eq!(parse_retry_after("soon"), None);
/// ```
#[must_use]
pub fn parse_retry_after(header_value: &str) -> Option<Duration> {
    let header_value = header_value.trim();

    // Integer seconds is the common form
    if let Ok(seconds) = header_value.parse::<i64>() {
        if seconds < 0 {
            debug!(seconds, "negative Retry-After value, ignoring");
            return None;
        }

        #[allow(clippy::cast_sign_loss)]
        let duration = Duration::from_secs(seconds as u64);

        if duration > MAX_RETRY_AFTER {
            warn!(
                seconds,
                max_seconds = MAX_RETRY_AFTER.as_secs(),
                "Retry-After exceeds maximum, capping"
            );
            return Some(MAX_RETRY_AFTER);
        }

        return Some(duration);
    }

    // HTTP-date form
    if let Ok(datetime) = httpdate::parse_http_date(header_value) {
        let now = std::time::SystemTime::now();

        match datetime.duration_since(now) {
            Ok(duration) if duration > MAX_RETRY_AFTER => {
                warn!(
                    delay_secs = duration.as_secs(),
                    max_secs = MAX_RETRY_AFTER.as_secs(),
                    "Retry-After date exceeds maximum, capping"
                );
                Some(MAX_RETRY_AFTER)
            }
            Ok(duration) => Some(duration),
            Err(_) => {
                debug!(header_value, "Retry-After date is in the past");
                Some(Duration::ZERO)
            }
        }
    } else {
        debug!(header_value, "unparseable Retry-After value");
        None
    }
}
