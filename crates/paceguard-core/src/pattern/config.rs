use serde::{Deserialize, Serialize};

use crate::error::SolveError;

/// How the work interval before a break is drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakSampling {
    /// One draw per work interval, kept until the next break.
    #[default]
    PerInterval,
    /// A fresh draw on every break check.
    PerCheck,
}

/// Timing and limit configuration for one pattern. All durations are milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AntiBanConfig {
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
    pub min_typing_delay_ms: u64,
    pub max_typing_delay_ms: u64,
    /// Probability in `[0, 1]` that a task is skipped and marked unsolvable.
    pub skip_rate: f64,
    /// Probability in `[0, 1]` of a best-effort mouse move or scroll before a task.
    pub incidental_interaction_rate: f64,
    /// Hour (0-23) the work window opens.
    pub work_hours_start: u8,
    /// Hour (0-23) the work window closes. Smaller than the start hour means
    /// the window wraps past midnight; equal means the whole day.
    pub work_hours_end: u8,
    pub min_work_before_break_ms: u64,
    pub max_work_before_break_ms: u64,
    pub min_break_duration_ms: u64,
    pub max_break_duration_ms: u64,
    pub max_continuous_work_ms: u64,
    pub max_tasks_per_session: u64,
    #[serde(default)]
    pub break_sampling: BreakSampling,
}

impl AntiBanConfig {
    /// # Errors
    ///
    /// `CONFIGURATION_ERROR` naming the first offending field.
    pub fn validate(&self) -> Result<(), SolveError> {
        let bounds = [
            ("delay", self.min_delay_ms, self.max_delay_ms),
            ("typing_delay", self.min_typing_delay_ms, self.max_typing_delay_ms),
            (
                "work_before_break",
                self.min_work_before_break_ms,
                self.max_work_before_break_ms,
            ),
            (
                "break_duration",
                self.min_break_duration_ms,
                self.max_break_duration_ms,
            ),
        ];
        for (field, min, max) in bounds {
            if min > max {
                return Err(SolveError::configuration(format!(
                    "min_{field}_ms ({min}) must not exceed max_{field}_ms ({max})"
                ))
                .with_context("field", field));
            }
        }

        for (field, p) in [
            ("skip_rate", self.skip_rate),
            ("incidental_interaction_rate", self.incidental_interaction_rate),
        ] {
            if !(0.0..=1.0).contains(&p) {
                return Err(SolveError::configuration(format!(
                    "{field} must be within [0, 1], got {p}"
                ))
                .with_context("field", field));
            }
        }

        for (field, hour) in [
            ("work_hours_start", self.work_hours_start),
            ("work_hours_end", self.work_hours_end),
        ] {
            if hour > 23 {
                return Err(SolveError::configuration(format!(
                    "{field} must be within 0-23, got {hour}"
                ))
                .with_context("field", field));
            }
        }

        if self.max_continuous_work_ms == 0 || self.max_tasks_per_session == 0 {
            return Err(SolveError::configuration(
                "session caps (max_continuous_work_ms, max_tasks_per_session) must be non-zero",
            ));
        }

        Ok(())
    }

    /// Whether `hour` (0-23) falls inside the work window.
    pub fn is_work_hour(&self, hour: u32) -> bool {
        let start = self.work_hours_start as u32;
        let end = self.work_hours_end as u32;

        if start == end {
            return true;
        }

        // Overnight window (e.g., 20:00 - 08:00)
        if start > end {
            return hour >= start || hour < end;
        }

        hour >= start && hour < end
    }
}

/// Per-field overrides applied on top of a pattern at construction time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigOverrides {
    pub min_delay_ms: Option<u64>,
    pub max_delay_ms: Option<u64>,
    pub min_typing_delay_ms: Option<u64>,
    pub max_typing_delay_ms: Option<u64>,
    pub skip_rate: Option<f64>,
    pub incidental_interaction_rate: Option<f64>,
    pub work_hours_start: Option<u8>,
    pub work_hours_end: Option<u8>,
    pub min_work_before_break_ms: Option<u64>,
    pub max_work_before_break_ms: Option<u64>,
    pub min_break_duration_ms: Option<u64>,
    pub max_break_duration_ms: Option<u64>,
    pub max_continuous_work_ms: Option<u64>,
    pub max_tasks_per_session: Option<u64>,
    pub break_sampling: Option<BreakSampling>,
}

impl ConfigOverrides {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Copy of `base` with every set override applied, then validated.
    pub fn apply(&self, base: &AntiBanConfig) -> Result<AntiBanConfig, SolveError> {
        let cfg = AntiBanConfig {
            min_delay_ms: self.min_delay_ms.unwrap_or(base.min_delay_ms),
            max_delay_ms: self.max_delay_ms.unwrap_or(base.max_delay_ms),
            min_typing_delay_ms: self.min_typing_delay_ms.unwrap_or(base.min_typing_delay_ms),
            max_typing_delay_ms: self.max_typing_delay_ms.unwrap_or(base.max_typing_delay_ms),
            skip_rate: self.skip_rate.unwrap_or(base.skip_rate),
            incidental_interaction_rate: self
                .incidental_interaction_rate
                .unwrap_or(base.incidental_interaction_rate),
            work_hours_start: self.work_hours_start.unwrap_or(base.work_hours_start),
            work_hours_end: self.work_hours_end.unwrap_or(base.work_hours_end),
            min_work_before_break_ms: self
                .min_work_before_break_ms
                .unwrap_or(base.min_work_before_break_ms),
            max_work_before_break_ms: self
                .max_work_before_break_ms
                .unwrap_or(base.max_work_before_break_ms),
            min_break_duration_ms: self
                .min_break_duration_ms
                .unwrap_or(base.min_break_duration_ms),
            max_break_duration_ms: self
                .max_break_duration_ms
                .unwrap_or(base.max_break_duration_ms),
            max_continuous_work_ms: self
                .max_continuous_work_ms
                .unwrap_or(base.max_continuous_work_ms),
            max_tasks_per_session: self
                .max_tasks_per_session
                .unwrap_or(base.max_tasks_per_session),
            break_sampling: self.break_sampling.unwrap_or(base.break_sampling),
        };
        cfg.validate()?;
        Ok(cfg)
    }
}
