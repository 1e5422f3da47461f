//! Break scheduling.
//!
//! ## State Transitions
//!
//! ```text
//! Working -> OnBreak -> Working
//! ```
//!
//! `take_break` runs to completion once started; a second call while the
//! session is on break fails with `BREAK_IN_PROGRESS`. If the future is
//! dropped mid-sleep the break ends at that moment and still counts.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use super::SessionState;
use crate::clock::{elapsed_ms, Clock};
use crate::error::SolveError;
use crate::events::{EventBus, GovernorEvent};
use crate::pattern::{AntiBanConfig, BreakSampling};
use crate::timing::TimingPolicy;

pub struct BreakScheduler {
    timing: TimingPolicy,
    clock: Arc<dyn Clock>,
    /// Work-interval threshold for [`BreakSampling::PerInterval`], drawn lazily.
    threshold_ms: Option<u64>,
}

impl std::fmt::Debug for BreakScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BreakScheduler")
            .field("threshold_ms", &self.threshold_ms)
            .finish_non_exhaustive()
    }
}

impl BreakScheduler {
    pub fn new(timing: TimingPolicy, clock: Arc<dyn Clock>) -> Self {
        Self {
            timing,
            clock,
            threshold_ms: None,
        }
    }

    /// Threshold for the current work interval, if one has been drawn.
    pub fn pending_threshold_ms(&self) -> Option<u64> {
        self.threshold_ms
    }

    /// Forget the current threshold; the next check draws a new one.
    pub fn reset(&mut self) {
        self.threshold_ms = None;
    }

    /// Whether the time worked since the last break has reached the threshold.
    pub fn should_take_break(
        &mut self,
        session: &SessionState,
        config: &AntiBanConfig,
    ) -> Result<bool, SolveError> {
        if session.on_break() {
            return Ok(false);
        }

        let threshold = match config.break_sampling {
            BreakSampling::PerCheck => self.timing.break_threshold(config)?,
            BreakSampling::PerInterval => match self.threshold_ms {
                Some(t) => t,
                None => {
                    let t = self.timing.break_threshold(config)?;
                    self.threshold_ms = Some(t);
                    t
                }
            },
        };

        Ok(session.since_last_break_ms(self.clock.now()) >= threshold)
    }

    /// Suspend for a random break duration and record the completed break.
    ///
    /// Returns the break length in milliseconds.
    pub async fn take_break(
        &mut self,
        session: &mut SessionState,
        config: &AntiBanConfig,
        events: &EventBus,
    ) -> Result<u64, SolveError> {
        if session.on_break() {
            return Err(SolveError::break_in_progress());
        }

        let duration_ms = self.timing.break_duration(config)?;
        let started_at = self.clock.now();
        events.publish(&GovernorEvent::BreakStarted {
            duration_ms,
            at: started_at,
        });
        session.begin_break();
        tracing::info!(duration_ms, session_id = %session.id(), "taking a break");

        let mut active = ActiveBreak {
            session,
            clock: self.clock.as_ref(),
            events,
            threshold_ms: &mut self.threshold_ms,
            started_at,
            duration_ms,
            completed: false,
        };
        active.clock.sleep(Duration::from_millis(duration_ms)).await;
        active.completed = true;
        drop(active);

        Ok(duration_ms)
    }
}

/// A break in progress. Dropping it ends the break, so a caller that
/// abandons the future mid-sleep cannot leave the session stuck on break.
struct ActiveBreak<'a> {
    session: &'a mut SessionState,
    clock: &'a dyn Clock,
    events: &'a EventBus,
    threshold_ms: &'a mut Option<u64>,
    started_at: DateTime<Utc>,
    duration_ms: u64,
    completed: bool,
}

impl Drop for ActiveBreak<'_> {
    fn drop(&mut self) {
        let now = self.clock.now();
        self.session.end_break(now);
        *self.threshold_ms = None;

        let duration_ms = if self.completed {
            self.duration_ms
        } else {
            elapsed_ms(self.started_at, now)
        };
        self.events.publish(&GovernorEvent::BreakEnded {
            break_count: self.session.break_count(),
            duration_ms,
            at: now,
        });

        if self.completed {
            tracing::info!(break_count = self.session.break_count(), "break finished");
        } else {
            tracing::warn!(
                duration_ms,
                planned_ms = self.duration_ms,
                session_id = %self.session.id(),
                "break interrupted, ending it early"
            );
        }
    }
}
