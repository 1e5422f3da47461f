//! Session summary and the fixed-layout text report.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::pattern::{AntiBanConfig, PatternName};
use crate::session::{LimitStatus, SessionState};

const MINUTE_MS: u64 = 60_000;
const HOUR_MS: u64 = 60 * MINUTE_MS;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Running,
    Stopped,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionStatus::Running => f.write_str("running"),
            SessionStatus::Stopped => f.write_str("stopped"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub tasks_completed: u64,
    pub session_duration_ms: u64,
    pub breaks_count: u32,
    /// Tasks per hour, rounded. Zero for sessions shorter than a minute.
    pub average_per_hour: u64,
    pub is_within_limits: bool,
}

impl SessionSummary {
    pub fn compute(session: &SessionState, limits: LimitStatus, now: DateTime<Utc>) -> Self {
        let duration_ms = session.elapsed_ms(now);
        Self {
            tasks_completed: session.tasks_completed(),
            session_duration_ms: duration_ms,
            breaks_count: session.break_count(),
            average_per_hour: rate_per_hour(session.tasks_completed(), duration_ms),
            is_within_limits: limits.is_within_limits(),
        }
    }
}

fn rate_per_hour(tasks: u64, duration_ms: u64) -> u64 {
    if duration_ms < MINUTE_MS {
        return 0;
    }
    let hours = duration_ms as f64 / HOUR_MS as f64;
    (tasks as f64 / hours).round() as u64
}

/// Everything an operator sees in the status report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionReport {
    pub pattern: PatternName,
    pub status: SessionStatus,
    pub tasks_completed: u64,
    pub elapsed_minutes: u64,
    pub breaks_taken: u32,
    pub rate_per_hour: u64,
    pub remaining_minutes: u64,
    pub remaining_tasks: u64,
    pub within_limits: bool,
}

impl SessionReport {
    pub fn build(
        pattern: PatternName,
        status: SessionStatus,
        config: &AntiBanConfig,
        summary: &SessionSummary,
    ) -> Self {
        Self {
            pattern,
            status,
            tasks_completed: summary.tasks_completed,
            elapsed_minutes: summary.session_duration_ms / MINUTE_MS,
            breaks_taken: summary.breaks_count,
            rate_per_hour: summary.average_per_hour,
            remaining_minutes: config
                .max_continuous_work_ms
                .saturating_sub(summary.session_duration_ms)
                / MINUTE_MS,
            remaining_tasks: config
                .max_tasks_per_session
                .saturating_sub(summary.tasks_completed),
            within_limits: summary.is_within_limits,
        }
    }
}

impl fmt::Display for SessionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const WIDTH: usize = 36;
        let rows = [
            ("Pattern", self.pattern.to_string()),
            ("Status", self.status.to_string()),
            ("Tasks completed", self.tasks_completed.to_string()),
            ("Elapsed", format!("{} min", self.elapsed_minutes)),
            ("Breaks taken", self.breaks_taken.to_string()),
            ("Rate", format!("{}/h", self.rate_per_hour)),
            ("Remaining time", format!("{} min", self.remaining_minutes)),
            ("Remaining quota", self.remaining_tasks.to_string()),
            (
                "Within limits",
                if self.within_limits { "yes" } else { "no" }.to_string(),
            ),
        ];

        writeln!(f, "╔{}╗", "═".repeat(WIDTH))?;
        writeln!(f, "║{:^WIDTH$}║", "SESSION REPORT")?;
        writeln!(f, "╠{}╣", "═".repeat(WIDTH))?;
        for (label, value) in rows {
            writeln!(f, "║ {label:<17}{value:>17} ║")?;
        }
        write!(f, "╚{}╝", "═".repeat(WIDTH))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::PatternCatalog;

    fn quiet_limits() -> LimitStatus {
        LimitStatus {
            within_work_hours: true,
            max_work_time_exceeded: false,
            max_tasks_exceeded: false,
        }
    }

    #[test]
    fn sub_minute_sessions_have_zero_rate() {
        assert_eq!(rate_per_hour(10, 0), 0);
        assert_eq!(rate_per_hour(10, 59_999), 0);
    }

    #[test]
    fn rate_is_rounded_per_hour() {
        assert_eq!(rate_per_hour(30, 30 * MINUTE_MS), 60);
        assert_eq!(rate_per_hour(10, 3 * HOUR_MS), 3);
    }

    #[test]
    fn report_derives_remaining_budget() {
        let cfg = PatternCatalog::get(PatternName::Cautious);
        let summary = SessionSummary {
            tasks_completed: 50,
            session_duration_ms: 90 * MINUTE_MS,
            breaks_count: 2,
            average_per_hour: 33,
            is_within_limits: true,
        };

        let report = SessionReport::build(PatternName::Cautious, SessionStatus::Running, cfg, &summary);

        assert_eq!(report.elapsed_minutes, 90);
        assert_eq!(report.remaining_minutes, 150);
        assert_eq!(report.remaining_tasks, 150);
    }

    #[test]
    fn display_lists_every_field() {
        let cfg = PatternCatalog::get(PatternName::Normal);
        let session = SessionState::new(Utc::now());
        let summary = SessionSummary::compute(&session, quiet_limits(), session.start_time());
        let text = SessionReport::build(PatternName::Normal, SessionStatus::Stopped, cfg, &summary)
            .to_string();

        for label in [
            "Pattern",
            "Status",
            "Tasks completed",
            "Elapsed",
            "Breaks taken",
            "Rate",
            "Remaining time",
            "Remaining quota",
            "Within limits",
        ] {
            assert!(text.contains(label), "missing {label}");
        }
        assert!(text.contains("stopped"));
        assert!(text.contains("normal"));
    }
}
