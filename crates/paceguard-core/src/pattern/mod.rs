//! Named timing/limit profiles.
//!
//! The catalog is an immutable registry keyed by [`PatternName`]. Switching
//! patterns swaps which entry the governor points at; entries themselves are
//! never mutated.

mod config;

pub use config::{AntiBanConfig, BreakSampling, ConfigOverrides};

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::SolveError;

const SECOND: u64 = 1_000;
const MINUTE: u64 = 60 * SECOND;
const HOUR: u64 = 60 * MINUTE;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PatternName {
    #[default]
    Normal,
    Aggressive,
    Cautious,
    NightOwl,
}

impl PatternName {
    pub const ALL: [PatternName; 4] = [
        PatternName::Normal,
        PatternName::Aggressive,
        PatternName::Cautious,
        PatternName::NightOwl,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            PatternName::Normal => "normal",
            PatternName::Aggressive => "aggressive",
            PatternName::Cautious => "cautious",
            PatternName::NightOwl => "night-owl",
        }
    }
}

impl fmt::Display for PatternName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PatternName {
    type Err = SolveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PatternName::ALL
            .iter()
            .copied()
            .find(|p| p.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                SolveError::configuration(format!("unknown pattern '{s}'"))
                    .with_context("pattern", s)
            })
    }
}

static NORMAL: AntiBanConfig = AntiBanConfig {
    min_delay_ms: 3 * SECOND,
    max_delay_ms: 8 * SECOND,
    min_typing_delay_ms: 50,
    max_typing_delay_ms: 150,
    skip_rate: 0.05,
    incidental_interaction_rate: 0.1,
    work_hours_start: 8,
    work_hours_end: 22,
    min_work_before_break_ms: 30 * MINUTE,
    max_work_before_break_ms: 60 * MINUTE,
    min_break_duration_ms: 5 * MINUTE,
    max_break_duration_ms: 15 * MINUTE,
    max_continuous_work_ms: 8 * HOUR,
    max_tasks_per_session: 500,
    break_sampling: BreakSampling::PerInterval,
};

static AGGRESSIVE: AntiBanConfig = AntiBanConfig {
    min_delay_ms: SECOND,
    max_delay_ms: 3 * SECOND,
    min_typing_delay_ms: 30,
    max_typing_delay_ms: 80,
    skip_rate: 0.02,
    incidental_interaction_rate: 0.05,
    work_hours_start: 6,
    work_hours_end: 23,
    min_work_before_break_ms: 60 * MINUTE,
    max_work_before_break_ms: 120 * MINUTE,
    min_break_duration_ms: 2 * MINUTE,
    max_break_duration_ms: 5 * MINUTE,
    max_continuous_work_ms: 12 * HOUR,
    max_tasks_per_session: 1_000,
    break_sampling: BreakSampling::PerInterval,
};

static CAUTIOUS: AntiBanConfig = AntiBanConfig {
    min_delay_ms: 5 * SECOND,
    max_delay_ms: 15 * SECOND,
    min_typing_delay_ms: 80,
    max_typing_delay_ms: 200,
    skip_rate: 0.10,
    incidental_interaction_rate: 0.2,
    work_hours_start: 9,
    work_hours_end: 18,
    min_work_before_break_ms: 20 * MINUTE,
    max_work_before_break_ms: 40 * MINUTE,
    min_break_duration_ms: 10 * MINUTE,
    max_break_duration_ms: 20 * MINUTE,
    max_continuous_work_ms: 4 * HOUR,
    max_tasks_per_session: 200,
    break_sampling: BreakSampling::PerInterval,
};

static NIGHT_OWL: AntiBanConfig = AntiBanConfig {
    min_delay_ms: 3 * SECOND,
    max_delay_ms: 10 * SECOND,
    min_typing_delay_ms: 60,
    max_typing_delay_ms: 180,
    skip_rate: 0.07,
    incidental_interaction_rate: 0.1,
    work_hours_start: 20,
    work_hours_end: 8,
    min_work_before_break_ms: 30 * MINUTE,
    max_work_before_break_ms: 60 * MINUTE,
    min_break_duration_ms: 5 * MINUTE,
    max_break_duration_ms: 15 * MINUTE,
    max_continuous_work_ms: 8 * HOUR,
    max_tasks_per_session: 400,
    break_sampling: BreakSampling::PerInterval,
};

/// Registry of the built-in patterns.
pub struct PatternCatalog;

impl PatternCatalog {
    pub fn get(name: PatternName) -> &'static AntiBanConfig {
        match name {
            PatternName::Normal => &NORMAL,
            PatternName::Aggressive => &AGGRESSIVE,
            PatternName::Cautious => &CAUTIOUS,
            PatternName::NightOwl => &NIGHT_OWL,
        }
    }

    /// Look up by name string (`normal`, `aggressive`, `cautious`, `night-owl`).
    pub fn by_name(name: &str) -> Option<(PatternName, &'static AntiBanConfig)> {
        let pattern = name.parse::<PatternName>().ok()?;
        Some((pattern, Self::get(pattern)))
    }

    pub fn iter() -> impl Iterator<Item = (PatternName, &'static AntiBanConfig)> {
        PatternName::ALL.into_iter().map(|p| (p, Self::get(p)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_builtin_pattern_is_valid() {
        for (name, cfg) in PatternCatalog::iter() {
            assert!(cfg.validate().is_ok(), "{name} failed validation");
        }
    }

    #[test]
    fn names_parse_and_display() {
        for name in PatternName::ALL {
            assert_eq!(name.to_string().parse::<PatternName>().unwrap(), name);
        }
        assert_eq!("Night-Owl".parse::<PatternName>().unwrap(), PatternName::NightOwl);
        assert!("turbo".parse::<PatternName>().is_err());
    }

    #[test]
    fn serde_uses_kebab_case() {
        let json = serde_json::to_string(&PatternName::NightOwl).unwrap();
        assert_eq!(json, "\"night-owl\"");
    }

    #[test]
    fn night_owl_window_wraps() {
        let cfg = PatternCatalog::get(PatternName::NightOwl);
        assert!(cfg.work_hours_start > cfg.work_hours_end);
        assert!(cfg.is_work_hour(23));
        assert!(cfg.is_work_hour(3));
        assert!(!cfg.is_work_hour(12));
    }

    #[test]
    fn by_name_unknown_is_none() {
        assert!(PatternCatalog::by_name("aggressive").is_some());
        assert!(PatternCatalog::by_name("reckless").is_none());
    }
}
