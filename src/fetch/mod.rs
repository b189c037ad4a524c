//! Retrying HTTP fetcher for remote legal catalogs.
//!
//! The sole point of contact with the unreliable remote endpoint:
//! - bounded exponential backoff with uniform jitter
//! - failure classification (transient vs. permanent vs. rate-limited)
//! - Retry-After support for 429 responses
//! - per-attempt timeouts
//! - caller-visible attempt/wait statistics, no persistent side effects

mod client;
mod error;
mod retry;

pub use client::{FetchResponse, FetchStats, Fetcher, parse_retry_after};
pub use error::FetchError;
pub use retry::{DEFAULT_MAX_RETRIES, FailureType, RetryDecision, RetryPolicy, classify_error};
