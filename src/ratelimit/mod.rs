//! Global request pacing.
//!
//! A [`RateLimiter`] grants at most one request per `1 / QPS` seconds to all
//! of its callers combined. Callers reserve their slot under a FIFO lock and
//! then sleep until it arrives, so nobody is starved and the lock is never
//! held while waiting.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{info, warn};

/// Window over which the verbose request rate is measured.
const RATE_WINDOW: Duration = Duration::from_secs(60);

#[derive(Debug, Default)]
struct LimiterState {
    /// Most recently reserved grant time.
    last_grant: Option<Instant>,
    /// Grant times inside [`RATE_WINDOW`], kept only in verbose mode.
    recent: VecDeque<Instant>,
}

/// Spaces request grants by a fixed interval.
#[derive(Debug)]
pub struct RateLimiter {
    interval: Option<Duration>,
    verbose: bool,
    state: Mutex<LimiterState>,
}

impl RateLimiter {
    /// Create a limiter for `query_per_second` requests per second.
    ///
    /// A non-positive rate disables limiting, as does a rate so small that
    /// its interval does not fit in a [`Duration`].
    pub fn new(query_per_second: f64) -> Self {
        let interval = interval_for(query_per_second);
        if query_per_second > 0.0 && interval.is_none() {
            warn!(query_per_second, "request interval out of range, rate limiting disabled");
        }
        Self {
            interval,
            verbose: false,
            state: Mutex::new(LimiterState::default()),
        }
    }

    /// Log the measured requests per minute on every grant.
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Minimum spacing between grants, if limiting is enabled.
    pub fn interval(&self) -> Option<Duration> {
        self.interval
    }

    /// Wait until this caller may send a request.
    pub async fn acquire(&self) {
        let grant = {
            let mut state = self.state.lock().await;
            let now = Instant::now();
            let grant = match (state.last_grant, self.interval) {
                (Some(last), Some(interval)) => last.checked_add(interval).map_or(now, |t| t.max(now)),
                _ => now,
            };
            state.last_grant = Some(grant);

            if self.verbose {
                state.recent.push_back(grant);
                while let Some(&oldest) = state.recent.front() {
                    if grant.duration_since(oldest) > RATE_WINDOW {
                        state.recent.pop_front();
                    } else {
                        break;
                    }
                }
                info!(rpm = state.recent.len(), "request rate over the last minute");
            }
            grant
        };

        tokio::time::sleep_until(grant).await;
    }
}

/// Spacing between grants for `query_per_second`, if limiting applies.
pub fn interval_for(query_per_second: f64) -> Option<Duration> {
    if query_per_second > 0.0 && query_per_second.is_finite() {
        Duration::try_from_secs_f64(1.0 / query_per_second).ok()
    } else {
        None
    }
}
