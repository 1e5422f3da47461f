//! Time and randomness providers.
//!
//! Every component that needs the current time, a suspension, or a random
//! draw receives one of these through the governor, never from globals.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::prelude::*;
use rand_pcg::Mcg128Xsl64;

/// Wall clock plus the ability to suspend the current task.
#[async_trait]
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// Suspend for `duration`. Dropping the future abandons the wait.
    async fn sleep(&self, duration: Duration);
}

/// Real time, backed by `chrono` and `tokio::time`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Manually driven clock. `sleep` advances the clock instead of waiting.
///
/// Clones share the same underlying instant, so a test can keep a handle
/// and move time while the governor owns another.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    pub fn set(&self, instant: DateTime<Utc>) {
        *self.lock() = instant;
    }

    pub fn advance(&self, duration: Duration) {
        let delta = chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::zero());
        let mut now = self.lock();
        *now = now.checked_add_signed(delta).unwrap_or(*now);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, DateTime<Utc>> {
        self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.lock()
    }

    async fn sleep(&self, duration: Duration) {
        self.advance(duration);
    }
}

/// Source of uniform random numbers.
pub trait RandomSource: Send + Sync {
    /// Uniform float in `[0, 1)`.
    fn next_f64(&self) -> f64;

    /// Uniform integer in `[min, max]`. Callers guarantee `min <= max`.
    fn range_inclusive(&self, min: u64, max: u64) -> u64;
}

/// Thread-local OS-seeded generator.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadRandom;

impl RandomSource for ThreadRandom {
    fn next_f64(&self) -> f64 {
        thread_rng().gen::<f64>()
    }

    fn range_inclusive(&self, min: u64, max: u64) -> u64 {
        thread_rng().gen_range(min..=max)
    }
}

/// Reproducible generator for simulations and tests.
#[derive(Debug)]
pub struct SeededRandom {
    rng: Mutex<Mcg128Xsl64>,
}

impl SeededRandom {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(Mcg128Xsl64::seed_from_u64(seed)),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Mcg128Xsl64> {
        self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl RandomSource for SeededRandom {
    fn next_f64(&self) -> f64 {
        self.lock().gen::<f64>()
    }

    fn range_inclusive(&self, min: u64, max: u64) -> u64 {
        self.lock().gen_range(min..=max)
    }
}

/// Milliseconds from `since` to `now`, clamped at zero.
pub(crate) fn elapsed_ms(since: DateTime<Utc>, now: DateTime<Utc>) -> u64 {
    (now - since).num_milliseconds().max(0) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[tokio::test]
    async fn manual_clock_sleep_advances_time() {
        let start = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        let clock = ManualClock::new(start);
        let handle = clock.clone();

        clock.sleep(Duration::from_secs(90)).await;

        assert_eq!(handle.now(), start + chrono::Duration::seconds(90));
    }

    #[test]
    fn seeded_random_is_reproducible() {
        let a = SeededRandom::new(7);
        let b = SeededRandom::new(7);
        let xs: Vec<u64> = (0..16).map(|_| a.range_inclusive(0, 1_000)).collect();
        let ys: Vec<u64> = (0..16).map(|_| b.range_inclusive(0, 1_000)).collect();
        assert_eq!(xs, ys);
    }

    #[test]
    fn elapsed_is_never_negative() {
        let now = Utc::now();
        assert_eq!(elapsed_ms(now + chrono::Duration::seconds(5), now), 0);
        assert_eq!(elapsed_ms(now, now + chrono::Duration::seconds(5)), 5_000);
    }
}
