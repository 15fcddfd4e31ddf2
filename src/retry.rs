//! Bounded exponential-backoff retry around a single lookup.

use crate::config::EnrichConfig;
use crate::error::Result;
use crate::pacing::Sleeper;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// What one attempt produced.
#[derive(Debug)]
pub enum AttemptOutcome<T> {
    /// Usable value; stop.
    Success(T),
    /// Nothing usable this time; counts as a failed attempt.
    NoResult,
    /// Nothing usable and another attempt cannot change that; stop.
    Terminal(String),
}

/// Runs an operation up to `max_retries + 1` times, sleeping
/// `base_delay * 2^i` between attempt `i` and `i + 1`.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    max_retries: u32,
    base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    pub fn from_config(config: &EnrichConfig) -> Self {
        Self::new(config.max_retries, config.base_delay())
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Backoff after the failed attempt with zero-based index `attempt`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }

    /// Run `op` until it succeeds, gives up, or attempts run out.
    ///
    /// Errors and `NoResult` are retried; `Terminal` is not. Never returns an
    /// error: exhaustion yields `None`.
    pub async fn run<T, F, Fut, Z>(&self, sleeper: &Z, label: &str, mut op: F) -> Option<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<AttemptOutcome<T>>>,
        Z: Sleeper + ?Sized,
    {
        let attempts = self.max_attempts();
        for attempt in 0..attempts {
            match op().await {
                Ok(AttemptOutcome::Success(value)) => {
                    if attempt > 0 {
                        debug!(label, attempt = attempt + 1, "Succeeded after retry");
                    }
                    return Some(value);
                }
                Ok(AttemptOutcome::Terminal(reason)) => {
                    warn!(label, attempt = attempt + 1, reason = %reason, "Giving up without retry");
                    return None;
                }
                Ok(AttemptOutcome::NoResult) => {
                    warn!(label, attempt = attempt + 1, "Attempt returned no result");
                }
                Err(e) => {
                    warn!(label, attempt = attempt + 1, error = %e, "Attempt failed");
                }
            }

            if attempt + 1 < attempts {
                let wait = self.backoff(attempt);
                debug!(label, wait_secs = wait.as_secs_f64(), "Backing off");
                sleeper.sleep(wait).await;
            }
        }

        warn!(label, attempts, "Retries exhausted");
        None
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&EnrichConfig::default())
    }
}
