//! Retry and timing settings for the request executor and its transport.

use std::time::Duration;

/// Retry behavior for one dispatcher.
///
/// Every attempt that does not return a result uses up one of
/// `max_attempts`, whatever went wrong.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts per input before giving up.
    /// Default: 2
    pub max_attempts: u32,

    /// Pause after a rate-limit error before the next attempt.
    /// Default: 10 seconds
    pub rate_limit_backoff: Duration,

    /// HTTP timeout for a single attempt, applied by the transport.
    /// Expiry counts as a connection error.
    /// Default: 60 seconds
    pub request_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            rate_limit_backoff: Duration::from_secs(10),
            request_timeout: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    pub fn with_rate_limit_backoff(mut self, backoff: Duration) -> Self {
        self.rate_limit_backoff = backoff;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}
