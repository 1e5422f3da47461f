//! Per-session progress, limit checks and the break state machine.

mod breaks;
mod limits;

pub use breaks::BreakScheduler;
pub use limits::{LimitEnforcer, LimitStatus};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::clock::elapsed_ms;

/// Progress of one work session.
///
/// Only the governor mutates a session: tasks through
/// [`record_task_done`](Self::record_task_done), breaks through the
/// [`BreakScheduler`]. Nothing is persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    id: Uuid,
    start_time: DateTime<Utc>,
    tasks_completed: u64,
    break_count: u32,
    last_break_time: DateTime<Utc>,
    on_break: bool,
}

impl SessionState {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            start_time: now,
            tasks_completed: 0,
            break_count: 0,
            last_break_time: now,
            on_break: false,
        }
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    pub fn tasks_completed(&self) -> u64 {
        self.tasks_completed
    }

    pub fn break_count(&self) -> u32 {
        self.break_count
    }

    pub fn last_break_time(&self) -> DateTime<Utc> {
        self.last_break_time
    }

    pub fn on_break(&self) -> bool {
        self.on_break
    }

    pub fn elapsed_ms(&self, now: DateTime<Utc>) -> u64 {
        elapsed_ms(self.start_time, now)
    }

    pub fn since_last_break_ms(&self, now: DateTime<Utc>) -> u64 {
        elapsed_ms(self.last_break_time, now)
    }

    // ── Mutations ────────────────────────────────────────────────────

    /// Returns the new total.
    pub(crate) fn record_task_done(&mut self) -> u64 {
        self.tasks_completed = self.tasks_completed.saturating_add(1);
        self.tasks_completed
    }

    pub(crate) fn begin_break(&mut self) {
        self.on_break = true;
    }

    pub(crate) fn end_break(&mut self, now: DateTime<Utc>) {
        self.on_break = false;
        self.last_break_time = now;
        self.break_count = self.break_count.saturating_add(1);
    }
}
