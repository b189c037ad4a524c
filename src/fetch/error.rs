//! Error types for the fetch module.
//!
//! Structured errors for all remote-catalog requests, carrying enough
//! context (URL, status, attempt counts) to attribute every failure.

use thiserror::Error;

/// Errors that can occur while fetching a remote resource.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS resolution, connection refused/reset, TLS).
    #[error("network error fetching {url}: {source}")]
    Network {
        /// The URL that failed.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// Request exceeded the per-attempt timeout.
    #[error("timeout fetching {url}")]
    Timeout {
        /// The URL that timed out.
        url: String,
    },

    /// HTTP error response (4xx client errors, 5xx server errors).
    #[error("HTTP {status} fetching {url}")]
    HttpStatus {
        /// The URL that returned an error status.
        url: String,
        /// The HTTP status code.
        status: u16,
        /// The Retry-After header value, if present (for 429 responses).
        retry_after: Option<String>,
    },

    /// The response body could not be read or decoded.
    #[error("malformed response from {url}: {reason}")]
    MalformedResponse {
        /// The URL whose response was unusable.
        url: String,
        /// What made the response unusable.
        reason: String,
    },

    /// The provided URL is malformed or invalid.
    #[error("invalid URL: {url}")]
    InvalidUrl {
        /// The invalid URL string.
        url: String,
    },

    /// All retry attempts were exhausted.
    #[error("fetch of {url} exhausted after {attempts} attempts: {source}")]
    Exhausted {
        /// The URL that could not be fetched.
        url: String,
        /// How many attempts were made.
        attempts: u32,
        /// The failure from the final attempt.
        #[source]
        source: Box<FetchError>,
    },
}

impl FetchError {
    /// Creates a network error from a reqwest error.
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            url: url.into(),
            source,
        }
    }

    /// Creates a timeout error.
    pub fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout { url: url.into() }
    }

    /// Creates an HTTP status error.
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
            retry_after: None,
        }
    }

    /// Creates an HTTP status error with a Retry-After header value.
    pub fn http_status_with_retry_after(
        url: impl Into<String>,
        status: u16,
        retry_after: Option<String>,
    ) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
            retry_after,
        }
    }

    /// Creates a malformed-response error.
    pub fn malformed(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedResponse {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }

    /// Wraps a final-attempt failure once the retry budget is spent.
    pub fn exhausted(url: impl Into<String>, attempts: u32, source: FetchError) -> Self {
        Self::Exhausted {
            url: url.into(),
            attempts,
            source: Box::new(source),
        }
    }
}

// Note: no `From<reqwest::Error>` impl on purpose. Every variant needs the
// URL for attribution, which the source error does not carry; the helper
// constructors are the supported path.
