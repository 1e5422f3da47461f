//! Work-hour window and session cap checks.
//!
//! The predicates publish an event on every evaluation that comes out in
//! violation, not only on the first crossing. [`LimitEnforcer::status`] is
//! the quiet variant used for summaries.

use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};

use super::SessionState;
use crate::events::{EventBus, GovernorEvent};
use crate::pattern::AntiBanConfig;

pub struct LimitEnforcer<'a> {
    config: &'a AntiBanConfig,
    events: &'a EventBus,
}

/// Snapshot of every limit, without side effects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitStatus {
    pub within_work_hours: bool,
    pub max_work_time_exceeded: bool,
    pub max_tasks_exceeded: bool,
}

impl LimitStatus {
    /// Session caps only; the work-hour window is not a session limit.
    pub fn is_within_limits(&self) -> bool {
        !self.max_work_time_exceeded && !self.max_tasks_exceeded
    }
}

impl<'a> LimitEnforcer<'a> {
    pub fn new(config: &'a AntiBanConfig, events: &'a EventBus) -> Self {
        Self { config, events }
    }

    pub fn is_within_work_hours(&self, now: DateTime<Utc>) -> bool {
        let hour = now.hour();
        let within = self.config.is_work_hour(hour);
        if !within {
            self.events.publish(&GovernorEvent::OutsideWorkHours {
                hour,
                start_hour: self.config.work_hours_start,
                end_hour: self.config.work_hours_end,
                at: now,
            });
        }
        within
    }

    pub fn has_exceeded_max_work_time(&self, session: &SessionState, now: DateTime<Utc>) -> bool {
        let elapsed_ms = session.elapsed_ms(now);
        let exceeded = elapsed_ms >= self.config.max_continuous_work_ms;
        if exceeded {
            self.events.publish(&GovernorEvent::MaxWorkTimeExceeded {
                elapsed_ms,
                limit_ms: self.config.max_continuous_work_ms,
                at: now,
            });
        }
        exceeded
    }

    pub fn has_exceeded_max_tasks(&self, session: &SessionState, now: DateTime<Utc>) -> bool {
        let exceeded = session.tasks_completed() >= self.config.max_tasks_per_session;
        if exceeded {
            self.events.publish(&GovernorEvent::MaxTasksExceeded {
                tasks_completed: session.tasks_completed(),
                limit: self.config.max_tasks_per_session,
                at: now,
            });
        }
        exceeded
    }

    /// Evaluate both session caps, publishing for each one exceeded.
    pub fn has_exceeded_session_limits(&self, session: &SessionState, now: DateTime<Utc>) -> bool {
        let over_time = self.has_exceeded_max_work_time(session, now);
        let over_tasks = self.has_exceeded_max_tasks(session, now);
        over_time || over_tasks
    }

    pub fn status(&self, session: &SessionState, now: DateTime<Utc>) -> LimitStatus {
        LimitStatus {
            within_work_hours: self.config.is_work_hour(now.hour()),
            max_work_time_exceeded: session.elapsed_ms(now) >= self.config.max_continuous_work_ms,
            max_tasks_exceeded: session.tasks_completed() >= self.config.max_tasks_per_session,
        }
    }
}
