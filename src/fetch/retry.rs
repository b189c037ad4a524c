//! Retry logic with exponential backoff for transient fetch failures.
//!
//! Failures are classified into a [`FailureType`]; the [`RetryPolicy`] then
//! decides whether to retry and with what delay. The policy is a pure state
//! machine (attempt counter in, decision out) so it can be tested without
//! sleeping: the caller owns the actual waiting.
//!
//! # Example
//!
//! ```
//! use lexgraph_core::fetch::{FetchError, RetryPolicy, RetryDecision, classify_error};
//!
//! let policy = RetryPolicy::default();
//! let error = FetchError::http_status("https://example.com/doc", 503);
//!
//! match policy.should_retry(classify_error(&error), 1) {
//!     RetryDecision::Retry { delay, attempt } => {
//!         println!("retrying in {:?} (attempt {})", delay, attempt);
//!     }
//!     RetryDecision::DoNotRetry { reason } => {
//!         println!("not retrying: {}", reason);
//!     }
//! }
//! ```

use std::time::Duration;

use rand::Rng;
use tracing::debug;

use super::FetchError;

/// Default maximum retry attempts (including the initial attempt).
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default base delay for exponential backoff.
const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

/// Default maximum delay cap.
const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(60);

/// Default backoff multiplier (doubles each attempt).
const DEFAULT_EXPONENTIAL_BASE: f64 = 2.0;

/// Classification of fetch failures for retry decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureType {
    /// Temporary failure that may succeed on retry.
    ///
    /// Examples: timeout, 5xx server errors, connection reset.
    Transient,

    /// Permanent failure that won't succeed regardless of retries.
    ///
    /// Examples: 404 Not Found, malformed response, invalid URL.
    Permanent,

    /// Server rate limiting (HTTP 429); retried, honoring Retry-After
    /// when the server supplies one.
    RateLimited,
}

/// Decision on whether to retry a failed fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after the specified delay.
    Retry {
        /// How long to wait before retrying.
        delay: Duration,
        /// Which attempt number this will be (1-indexed).
        attempt: u32,
    },

    /// Do not retry.
    DoNotRetry {
        /// Human-readable reason why retry is not attempted.
        reason: String,
    },
}

/// Configuration for retry behavior with exponential backoff.
///
/// # Delay calculation
///
/// ```text
/// backoff = min(max_delay, base_delay * exponential_base^(attempt - 1))
/// delay   = backoff + jitter, jitter uniform in [0, backoff)
/// ```
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the initial attempt).
    max_retries: u32,

    /// Base delay for the first retry.
    base_delay: Duration,

    /// Maximum delay cap (before jitter).
    max_delay: Duration,

    /// Multiplier applied each attempt.
    exponential_base: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            exponential_base: DEFAULT_EXPONENTIAL_BASE,
        }
    }
}

impl RetryPolicy {
    /// Creates a new retry policy with custom settings.
    ///
    /// `max_retries` is clamped to at least 1.
    #[must_use]
    pub fn new(
        max_retries: u32,
        base_delay: Duration,
        max_delay: Duration,
        exponential_base: f64,
    ) -> Self {
        Self {
            max_retries: max_retries.max(1),
            base_delay,
            max_delay,
            exponential_base,
        }
    }

    /// Creates a policy with a custom retry budget, defaults otherwise.
    #[must_use]
    pub fn with_max_retries(max_retries: u32) -> Self {
        Self {
            max_retries: max_retries.max(1),
            ..Self::default()
        }
    }

    /// Returns the maximum number of attempts configured.
    #[must_use]
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Determines whether to retry a failed fetch.
    ///
    /// `attempt` is the attempt number that just failed (1-indexed).
    #[must_use]
    pub fn should_retry(&self, failure_type: FailureType, attempt: u32) -> RetryDecision {
        if failure_type == FailureType::Permanent {
            return RetryDecision::DoNotRetry {
                reason: "permanent failure - retry would not help".to_string(),
            };
        }

        if attempt >= self.max_retries {
            debug!(attempt, max = self.max_retries, "retry budget spent");
            return RetryDecision::DoNotRetry {
                reason: format!("max attempts ({}) exhausted", self.max_retries),
            };
        }

        let delay = self.calculate_delay(attempt);

        debug!(
            attempt,
            next_attempt = attempt + 1,
            delay_ms = delay.as_millis(),
            "will retry"
        );

        RetryDecision::Retry {
            delay,
            attempt: attempt + 1,
        }
    }

    /// Calculates the delay for a retry with exponential backoff and jitter.
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn calculate_delay(&self, attempt: u32) -> Duration {
        let base_ms = self.base_delay.as_millis() as f64;

        // attempt is 1-indexed; the first retry waits base_delay. Saturate
        // so an out-of-contract attempt of 0 behaves like the first.
        let exponent = f64::from(attempt.saturating_sub(1));
        let backoff_ms = base_ms * self.exponential_base.powf(exponent);
        let capped_ms = backoff_ms.min(self.max_delay.as_millis() as f64) as u64;

        // Uniform jitter in [0, backoff) spreads retries from concurrent runs.
        let jitter_ms = if capped_ms == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..capped_ms)
        };

        Duration::from_millis(capped_ms + jitter_ms)
    }
}

/// Classifies a fetch error into a failure type for retry decisions.
///
/// | Condition | Type |
/// |-----------|------|
/// | timeout, connection reset/refused | Transient |
/// | 5xx, 408 | Transient |
/// | 429 | RateLimited |
/// | other 4xx | Permanent |
/// | malformed response, invalid URL | Permanent |
/// | retry budget already exhausted | Permanent |
#[must_use]
pub fn classify_error(error: &FetchError) -> FailureType {
    match error {
        FetchError::HttpStatus { status, .. } => classify_http_status(*status),
        FetchError::Timeout { .. } => FailureType::Transient,
        FetchError::Network { .. } => FailureType::Transient,
        FetchError::MalformedResponse { .. } => FailureType::Permanent,
        FetchError::InvalidUrl { .. } => FailureType::Permanent,
        FetchError::Exhausted { .. } => FailureType::Permanent,
    }
}

/// Classifies an HTTP status code into a failure type.
fn classify_http_status(status: u16) -> FailureType {
    match status {
        408 => FailureType::Transient,
        429 => FailureType::RateLimited,
        status if (400..500).contains(&status) => FailureType::Permanent,
        status if (500..600).contains(&status) => FailureType::Transient,
        // Anything else is unexpected, treat as permanent
        _ => FailureType::Permanent,
    }
}
