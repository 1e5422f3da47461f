//! Bounded random delays.
//!
//! Every timing value the governor uses (task pacing, per-character typing,
//! break length, work interval before a break) is drawn through
//! [`TimingPolicy::random_delay`], so swapping the [`RandomSource`] makes the
//! whole governor deterministic.

use std::sync::Arc;

use crate::clock::RandomSource;
use crate::error::SolveError;
use crate::pattern::AntiBanConfig;

#[derive(Clone)]
pub struct TimingPolicy {
    rng: Arc<dyn RandomSource>,
}

impl std::fmt::Debug for TimingPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimingPolicy").finish_non_exhaustive()
    }
}

impl TimingPolicy {
    pub fn new(rng: Arc<dyn RandomSource>) -> Self {
        Self { rng }
    }

    pub fn rng(&self) -> &dyn RandomSource {
        self.rng.as_ref()
    }

    /// Uniform integer in `[min, max]` inclusive.
    ///
    /// # Errors
    ///
    /// `CONFIGURATION_ERROR` when `min > max`.
    pub fn random_delay(&self, min: u64, max: u64) -> Result<u64, SolveError> {
        if min > max {
            return Err(SolveError::configuration(format!(
                "invalid delay bounds: min ({min}) > max ({max})"
            ))
            .with_context("min", min)
            .with_context("max", max));
        }
        Ok(self.rng.range_inclusive(min, max))
    }

    /// `true` with probability `p`, i.e. `random() < p`.
    pub fn chance(&self, p: f64) -> bool {
        self.rng.next_f64() < p
    }

    pub fn task_delay(&self, config: &AntiBanConfig) -> Result<u64, SolveError> {
        self.random_delay(config.min_delay_ms, config.max_delay_ms)
    }

    pub fn typing_delay(&self, config: &AntiBanConfig) -> Result<u64, SolveError> {
        self.random_delay(config.min_typing_delay_ms, config.max_typing_delay_ms)
    }

    pub fn break_duration(&self, config: &AntiBanConfig) -> Result<u64, SolveError> {
        self.random_delay(config.min_break_duration_ms, config.max_break_duration_ms)
    }

    /// How long to work before the next break.
    pub fn break_threshold(&self, config: &AntiBanConfig) -> Result<u64, SolveError> {
        self.random_delay(
            config.min_work_before_break_ms,
            config.max_work_before_break_ms,
        )
    }
}
