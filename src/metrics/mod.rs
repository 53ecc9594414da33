//! Request statistics for a dispatcher.
//!
//! Every attempt the executor makes is counted by outcome class, together
//! with the token usage the provider reports. Counters are lock-free and
//! shared by all workers of one dispatcher.

pub mod usage;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

pub use usage::{parse_usage, TokenUsage};

/// Live counters for one dispatcher.
#[derive(Debug)]
pub struct DispatchStats {
    started: Instant,
    attempts: AtomicU64,
    successes: AtomicU64,
    connection_errors: AtomicU64,
    malformed_responses: AtomicU64,
    rate_limited: AtomicU64,
    quota_exhausted: AtomicU64,
    invalid_prompts: AtomicU64,
    api_errors: AtomicU64,
    skipped_over_budget: AtomicU64,
    usage: Mutex<TokenUsage>,
}

impl Default for DispatchStats {
    fn default() -> Self {
        Self::new()
    }
}

impl DispatchStats {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            attempts: AtomicU64::new(0),
            successes: AtomicU64::new(0),
            connection_errors: AtomicU64::new(0),
            malformed_responses: AtomicU64::new(0),
            rate_limited: AtomicU64::new(0),
            quota_exhausted: AtomicU64::new(0),
            invalid_prompts: AtomicU64::new(0),
            api_errors: AtomicU64::new(0),
            skipped_over_budget: AtomicU64::new(0),
            usage: Mutex::new(TokenUsage::default()),
        }
    }

    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_attempt(&self) {
        Self::bump(&self.attempts);
    }

    pub fn record_success(&self, usage: Option<TokenUsage>) {
        Self::bump(&self.successes);
        if let Some(usage) = usage {
            let mut total = self.usage.lock().unwrap_or_else(|p| p.into_inner());
            *total += usage;
        }
    }

    pub fn record_connection_error(&self) {
        Self::bump(&self.connection_errors);
    }

    pub fn record_malformed(&self) {
        Self::bump(&self.malformed_responses);
    }

    pub fn record_rate_limited(&self) {
        Self::bump(&self.rate_limited);
    }

    pub fn record_quota_exhausted(&self) {
        Self::bump(&self.quota_exhausted);
    }

    pub fn record_invalid_prompt(&self) {
        Self::bump(&self.invalid_prompts);
    }

    pub fn record_api_error(&self) {
        Self::bump(&self.api_errors);
    }

    pub fn record_skipped(&self) {
        Self::bump(&self.skipped_over_budget);
    }

    /// Point-in-time copy of all counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        StatsSnapshot {
            elapsed: self.started.elapsed(),
            attempts: load(&self.attempts),
            successes: load(&self.successes),
            connection_errors: load(&self.connection_errors),
            malformed_responses: load(&self.malformed_responses),
            rate_limited: load(&self.rate_limited),
            quota_exhausted: load(&self.quota_exhausted),
            invalid_prompts: load(&self.invalid_prompts),
            api_errors: load(&self.api_errors),
            skipped_over_budget: load(&self.skipped_over_budget),
            usage: *self.usage.lock().unwrap_or_else(|p| p.into_inner()),
        }
    }
}

/// Serializable copy of [`DispatchStats`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    /// Time since the dispatcher was built
    pub elapsed: Duration,
    /// HTTP requests sent, retries included
    pub attempts: u64,
    pub successes: u64,
    pub connection_errors: u64,
    pub malformed_responses: u64,
    pub rate_limited: u64,
    pub quota_exhausted: u64,
    pub invalid_prompts: u64,
    pub api_errors: u64,
    /// Inputs skipped because no output room was left
    pub skipped_over_budget: u64,
    /// Provider-reported token usage
    pub usage: TokenUsage,
}

impl StatsSnapshot {
    /// Attempts that did not produce a result.
    pub fn failed_attempts(&self) -> u64 {
        self.connection_errors
            + self.malformed_responses
            + self.rate_limited
            + self.quota_exhausted
            + self.api_errors
    }

    /// Requests per minute since start.
    pub fn requests_per_minute(&self) -> f64 {
        let minutes = self.elapsed.as_secs_f64() / 60.0;
        if minutes <= 0.0 {
            return 0.0;
        }
        self.attempts as f64 / minutes
    }
}
