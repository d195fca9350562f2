// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Inline retries of transient API failures.
//!
//! Only failures the caller classifies as transient are retried, with
//! exponential backoff and jitter. Everything else, conflicts included, is
//! returned on the first attempt and left to the reconcile requeue.

use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// First delay between attempts
const INITIAL_INTERVAL_MILLIS: u64 = 100;

/// Ceiling of a single delay
const MAX_INTERVAL_SECS: u64 = 10;

/// Total time spent retrying one call
const MAX_ELAPSED_SECS: u64 = 60;

/// Jitter applied to every delay (±10%)
const JITTER: f64 = 0.1;

/// Doubling backoff with jitter, bounded by a total elapsed time.
#[derive(Debug)]
pub struct Backoff {
    pub next: Duration,
    pub max_interval: Duration,
    pub max_elapsed: Duration,
    started: Instant,
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(
            Duration::from_millis(INITIAL_INTERVAL_MILLIS),
            Duration::from_secs(MAX_INTERVAL_SECS),
            Duration::from_secs(MAX_ELAPSED_SECS),
        )
    }
}

impl Backoff {
    #[must_use]
    pub fn new(initial: Duration, max_interval: Duration, max_elapsed: Duration) -> Self {
        Self {
            next: initial,
            max_interval,
            max_elapsed,
            started: Instant::now(),
        }
    }

    /// The delay before the next attempt, or `None` once the budget is spent.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.started.elapsed() >= self.max_elapsed {
            return None;
        }
        let delay = jitter(self.next);
        self.next = (self.next * 2).min(self.max_interval);
        Some(delay)
    }
}

fn jitter(interval: Duration) -> Duration {
    let secs = interval.as_secs_f64();
    let spread = secs * JITTER;
    Duration::from_secs_f64(rand::rng().random_range(secs - spread..=secs + spread).max(0.0))
}

/// True for HTTP statuses that indicate throttling or a server-side failure.
#[must_use]
pub fn is_retryable_http_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

/// Run `operation`, retrying while `is_transient` holds for its error.
///
/// # Errors
///
/// The first non-transient error, or the last transient one once the backoff
/// budget is spent.
pub async fn retry_transient<T, E, F, Fut>(
    description: &str,
    is_transient: impl Fn(&E) -> bool,
    mut operation: F,
) -> Result<T, E>
where
    E: std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut backoff = Backoff::default();
    let mut attempt = 1;
    loop {
        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(operation = description, attempt, "Succeeded after retrying");
                }
                return Ok(value);
            }
            Err(e) if is_transient(&e) => {
                let Some(delay) = backoff.next_delay() else {
                    warn!(operation = description, attempt, error = %e, "Giving up after retrying");
                    return Err(e);
                };
                warn!(
                    operation = description,
                    attempt,
                    retry_after = ?delay,
                    error = %e,
                    "Transient failure, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
#[path = "retry_tests.rs"]
mod retry_tests;
