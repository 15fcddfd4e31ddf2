//! Request pacing: per-row jitter and batch pauses.
//!
//! Both delays are awaited on the pipeline task itself, so nothing else runs
//! while the pipeline waits.

use crate::config::{BatchPause, EnrichConfig, JitterRange};
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;
use tracing::info;

/// Something that can wait. Production code uses [`TokioSleeper`].
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Sleeps on the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            tokio::time::sleep(duration).await;
        }
    }
}

/// Jitter before each lookup plus escalating pauses after every N processed rows.
pub struct RateGovernor {
    jitter: JitterRange,
    /// Sorted descending by threshold
    pauses: Vec<BatchPause>,
    processed: u64,
    rng: StdRng,
}

impl RateGovernor {
    pub fn new(jitter: JitterRange, pauses: &[BatchPause]) -> Self {
        Self::with_rng(jitter, pauses, StdRng::from_entropy())
    }

    /// Deterministic jitter, for tests and reproducible runs.
    pub fn with_seed(jitter: JitterRange, pauses: &[BatchPause], seed: u64) -> Self {
        Self::with_rng(jitter, pauses, StdRng::seed_from_u64(seed))
    }

    fn with_rng(jitter: JitterRange, pauses: &[BatchPause], rng: StdRng) -> Self {
        let mut pauses = pauses.to_vec();
        pauses.sort_by(|a, b| b.threshold.cmp(&a.threshold));
        Self {
            jitter,
            pauses,
            processed: 0,
            rng,
        }
    }

    pub fn from_config(config: &EnrichConfig) -> Self {
        Self::new(config.jitter, &config.batch_pauses)
    }

    /// Rows counted so far (successes and failures alike).
    pub fn processed(&self) -> u64 {
        self.processed
    }

    /// Draw the next per-row jitter.
    pub fn next_jitter(&mut self) -> Duration {
        let JitterRange { min_secs, max_secs } = self.jitter;
        let secs = if max_secs > min_secs {
            self.rng.gen_range(min_secs..=max_secs)
        } else {
            min_secs
        };
        Duration::try_from_secs_f64(secs.max(0.0)).unwrap_or(Duration::MAX)
    }

    /// Count one processed row and return the batch pause it triggers, if any.
    ///
    /// Only the coarsest matching threshold applies.
    pub fn record_processed(&mut self) -> Option<Duration> {
        self.processed += 1;
        batch_delay(&self.pauses, self.processed)
    }

    /// Sleep for a freshly drawn jitter.
    pub async fn pause_before_lookup<Z: Sleeper + ?Sized>(&mut self, sleeper: &Z) {
        let delay = self.next_jitter();
        info!(delay_secs = format!("{:.2}", delay.as_secs_f64()), "Search delay");
        sleeper.sleep(delay).await;
    }

    /// Count a processed row and sleep for the batch pause it triggers.
    pub async fn pause_after_row<Z: Sleeper + ?Sized>(&mut self, sleeper: &Z) {
        if let Some(delay) = self.record_processed() {
            info!(
                processed = self.processed,
                delay_secs = delay.as_secs(),
                "Batch pause"
            );
            sleeper.sleep(delay).await;
        }
    }
}

/// First pause (in descending threshold order) whose threshold divides `count`.
fn batch_delay(pauses: &[BatchPause], count: u64) -> Option<Duration> {
    pauses
        .iter()
        .find(|p| p.threshold > 0 && count % p.threshold == 0)
        .map(|p| Duration::from_secs(p.delay_secs))
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Mutex;

    /// Records requested sleeps instead of waiting.
    #[derive(Default)]
    pub struct RecordingSleeper {
        slept: Mutex<Vec<Duration>>,
    }

    impl RecordingSleeper {
        pub fn slept(&self) -> Vec<Duration> {
            self.slept.lock().map(|s| s.clone()).unwrap_or_default()
        }
    }

    #[async_trait]
    impl Sleeper for RecordingSleeper {
        async fn sleep(&self, duration: Duration) {
            if let Ok(mut slept) = self.slept.lock() {
                slept.push(duration);
            }
        }
    }
}
