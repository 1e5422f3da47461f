//! Integration tests for the session governor.
//!
//! Drives whole task loops on a manual clock with a seeded random source,
//! covering quotas, work hours, breaks, resets and pattern switches.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use paceguard_core::{
    Alert, AlertLevel, BrowserSurface, Clock, ConfigOverrides, ElementHandle, ErrorKind, EventLog,
    GovernorEvent, ListenerResult, ManualClock, NotificationSink, PatternName, SeededRandom,
    SessionGovernor, SessionStatus, SolveError, Viewport,
};

fn at_hour(hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 11, hour, 0, 0).unwrap()
}

/// Overrides that make `before_task` deterministic apart from the delay draw.
fn quiet() -> ConfigOverrides {
    ConfigOverrides {
        skip_rate: Some(0.0),
        incidental_interaction_rate: Some(0.0),
        ..Default::default()
    }
}

struct Harness {
    governor: SessionGovernor,
    clock: ManualClock,
    log: EventLog,
}

fn harness(pattern: PatternName, overrides: ConfigOverrides, start: DateTime<Utc>) -> Harness {
    let clock = ManualClock::new(start);
    let log = EventLog::new();
    let governor = SessionGovernor::builder()
        .pattern(pattern)
        .overrides(overrides)
        .clock(Arc::new(clock.clone()))
        .rng(Arc::new(SeededRandom::new(7)))
        .listener(Arc::new(log.clone()))
        .build()
        .unwrap();
    Harness {
        governor,
        clock,
        log,
    }
}

/// Manual clock whose first long sleep never completes.
struct StallingClock {
    inner: ManualClock,
    stall_next_long_sleep: AtomicBool,
}

#[async_trait]
impl Clock for StallingClock {
    fn now(&self) -> DateTime<Utc> {
        self.inner.now()
    }

    async fn sleep(&self, duration: Duration) {
        if duration >= Duration::from_secs(60) && self.stall_next_long_sleep.swap(false, Ordering::SeqCst)
        {
            std::future::pending::<()>().await;
        }
        self.inner.advance(duration);
    }
}

#[derive(Default)]
struct FakeBrowser {
    has_element: bool,
    fail_interactions: bool,
    typed: Mutex<Vec<(char, u64)>>,
}

#[async_trait]
impl BrowserSurface for FakeBrowser {
    async fn locate(&self, selector: &str) -> Result<Option<ElementHandle>, SolveError> {
        Ok(self.has_element.then(|| ElementHandle(selector.to_string())))
    }

    async fn type_char(&self, _selector: &str, ch: char, delay_ms: u64) -> Result<(), SolveError> {
        self.typed.lock().unwrap().push((ch, delay_ms));
        Ok(())
    }

    async fn move_mouse(&self, _x: f64, _y: f64) -> Result<(), SolveError> {
        self.interaction()
    }

    async fn scroll_by(&self, _amount: i64) -> Result<(), SolveError> {
        self.interaction()
    }

    async fn viewport_size(&self) -> Option<Viewport> {
        Some(Viewport {
            width: 1280,
            height: 720,
        })
    }
}

impl FakeBrowser {
    fn interaction(&self) -> Result<(), SolveError> {
        if self.fail_interactions {
            Err(SolveError::new(ErrorKind::Unclassified, "page detached"))
        } else {
            Ok(())
        }
    }
}

#[tokio::test]
async fn test_task_quota_is_terminal() {
    let mut h = harness(
        PatternName::Normal,
        ConfigOverrides {
            max_tasks_per_session: Some(2),
            ..quiet()
        },
        at_hour(10),
    );

    h.governor.before_task().await.unwrap();
    assert_eq!(h.governor.after_task().await.unwrap(), 1);

    h.governor.before_task().await.unwrap();
    let err = h.governor.after_task().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SessionLimitsExceeded);
    assert_eq!(h.governor.session().tasks_completed(), 2);

    let err = h.governor.before_task().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SessionLimitsExceeded);
    assert!(!err.is_recoverable());
    assert!(!err.is_retryable());
    assert_eq!(err.context()["maxTasksPerSession"], 2);

    assert!(h.log.count("MaxTasksExceeded") >= 2);
    assert_eq!(h.governor.status(), SessionStatus::Stopped);
    assert!(!h.governor.summary().is_within_limits);
}

#[tokio::test]
async fn test_after_task_counts_every_task() {
    let mut h = harness(PatternName::Aggressive, quiet(), at_hour(10));

    for _ in 0..25 {
        h.governor.after_task().await.unwrap();
    }

    let summary = h.governor.summary();
    assert_eq!(summary.tasks_completed, 25);
    assert_eq!(h.log.count("TaskSolved"), 25);
}

#[tokio::test]
async fn test_reset_starts_a_fresh_session() {
    let mut h = harness(
        PatternName::Normal,
        ConfigOverrides {
            min_work_before_break_ms: Some(1_000),
            max_work_before_break_ms: Some(1_000),
            ..quiet()
        },
        at_hour(10),
    );
    for _ in 0..3 {
        h.governor.before_task().await.unwrap();
        h.governor.after_task().await.unwrap();
    }
    assert!(h.governor.session().break_count() > 0);
    let old_id = h.governor.session().id();
    h.clock.advance(Duration::from_secs(600));

    h.governor.reset_session();

    let session = h.governor.session();
    assert_ne!(session.id(), old_id);
    assert_eq!(session.tasks_completed(), 0);
    assert_eq!(session.break_count(), 0);
    assert!(!session.on_break());
    assert_eq!(session.start_time(), h.clock.now());
    assert_eq!(session.last_break_time(), h.clock.now());
    assert_eq!(h.governor.summary().session_duration_ms, 0);
    assert_eq!(h.log.count("SessionReset"), 1);
}

#[tokio::test]
async fn test_switch_pattern_applies_new_delays() {
    let mut h = harness(PatternName::Cautious, quiet(), at_hour(10));

    assert!(h.governor.switch_pattern("aggressive"));
    assert_eq!(h.governor.pattern(), PatternName::Aggressive);
    h.log.drain();

    for _ in 0..20 {
        match h.governor.before_task().await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::MarkedUnsolvable => {}
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    let delays: Vec<u64> = h
        .log
        .snapshot()
        .into_iter()
        .filter_map(|e| match e {
            GovernorEvent::TaskDelayed { delay_ms, .. } => Some(delay_ms),
            _ => None,
        })
        .collect();
    assert_eq!(delays.len(), 20);
    assert!(delays.iter().all(|d| (1_000..=3_000).contains(d)));
}

#[tokio::test]
async fn test_switch_pattern_drops_overrides() {
    let mut h = harness(
        PatternName::Normal,
        ConfigOverrides {
            max_tasks_per_session: Some(3),
            ..quiet()
        },
        at_hour(10),
    );

    h.governor.switch_pattern("cautious");

    assert_eq!(h.governor.config().max_tasks_per_session, 200);
    let switched: Vec<_> = h
        .log
        .snapshot()
        .into_iter()
        .filter(|e| matches!(e, GovernorEvent::PatternSwitched { .. }))
        .collect();
    assert_eq!(switched.len(), 1);
    assert!(matches!(
        switched[0],
        GovernorEvent::PatternSwitched {
            from: PatternName::Normal,
            to: PatternName::Cautious,
            ..
        }
    ));
}

#[tokio::test]
async fn test_night_owl_spans_midnight() {
    let mut late = harness(PatternName::NightOwl, quiet(), at_hour(23));
    assert!(late.governor.before_task().await.is_ok());

    let mut early = harness(PatternName::NightOwl, quiet(), at_hour(7));
    assert!(early.governor.before_task().await.is_ok());

    let mut noon = harness(PatternName::NightOwl, quiet(), at_hour(12));
    let err = noon.governor.before_task().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::OutsideWorkHours);
    assert!(err.is_retryable());
    assert_eq!(noon.log.count("OutsideWorkHours"), 1);
}

#[tokio::test]
async fn test_max_work_time_blocks_tasks() {
    let mut h = harness(PatternName::Cautious, quiet(), at_hour(9));
    let cap = h.governor.config().max_continuous_work_ms;

    h.clock.advance(Duration::from_millis(cap - 1));
    assert!(h.governor.before_task().await.is_ok());

    h.clock.set(at_hour(9) + chrono::Duration::milliseconds(cap as i64));
    let err = h.governor.before_task().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SessionLimitsExceeded);
    assert_eq!(h.log.count("MaxWorkTimeExceeded"), 1);
}

#[tokio::test]
async fn test_break_is_taken_after_work_interval() {
    let mut h = harness(
        PatternName::Normal,
        ConfigOverrides {
            min_delay_ms: Some(30_000),
            max_delay_ms: Some(30_000),
            min_work_before_break_ms: Some(60_000),
            max_work_before_break_ms: Some(60_000),
            min_break_duration_ms: Some(300_000),
            max_break_duration_ms: Some(300_000),
            ..quiet()
        },
        at_hour(10),
    );

    h.governor.before_task().await.unwrap();
    h.governor.after_task().await.unwrap();
    assert_eq!(h.governor.session().break_count(), 0);

    h.governor.before_task().await.unwrap();

    assert_eq!(h.governor.session().break_count(), 1);
    assert!(!h.governor.session().on_break());
    assert_eq!(h.clock.now(), at_hour(10) + chrono::Duration::minutes(6));
    assert_eq!(h.governor.session().last_break_time(), h.clock.now());

    let names: Vec<_> = h.log.snapshot().iter().map(|e| e.name()).collect();
    assert_eq!(
        names,
        vec![
            "TaskDelayed",
            "TaskSolved",
            "TaskDelayed",
            "BreakStarted",
            "BreakEnded"
        ]
    );
}

#[tokio::test]
async fn test_incidental_failures_are_swallowed() {
    let clock = ManualClock::new(at_hour(10));
    let log = EventLog::new();
    let mut governor = SessionGovernor::builder()
        .overrides(ConfigOverrides {
            skip_rate: Some(0.0),
            incidental_interaction_rate: Some(1.0),
            ..Default::default()
        })
        .clock(Arc::new(clock.clone()))
        .rng(Arc::new(SeededRandom::new(3)))
        .browser(Arc::new(FakeBrowser {
            fail_interactions: true,
            ..Default::default()
        }))
        .listener(Arc::new(log.clone()))
        .build()
        .unwrap();

    for _ in 0..5 {
        governor.before_task().await.unwrap();
    }

    assert_eq!(log.count("InteractionFailed"), 5);
}

#[tokio::test]
async fn test_type_text_types_each_character() {
    let browser = Arc::new(FakeBrowser {
        has_element: true,
        ..Default::default()
    });
    let governor = SessionGovernor::builder()
        .pattern(PatternName::Cautious)
        .clock(Arc::new(ManualClock::new(at_hour(10))))
        .rng(Arc::new(SeededRandom::new(11)))
        .browser(browser.clone())
        .build()
        .unwrap();

    governor.type_text("#captcha", "x7Kq").await.unwrap();

    let typed = browser.typed.lock().unwrap();
    let chars: String = typed.iter().map(|(c, _)| *c).collect();
    assert_eq!(chars, "x7Kq");
    assert!(typed.iter().all(|(_, d)| (80..=200).contains(d)));
}

#[tokio::test]
async fn test_type_text_missing_element() {
    let governor = SessionGovernor::builder()
        .clock(Arc::new(ManualClock::new(at_hour(10))))
        .browser(Arc::new(FakeBrowser::default()))
        .build()
        .unwrap();

    let err = governor.type_text("#missing", "abc").await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ElementNotFound);
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_failing_listener_does_not_stop_the_governor() {
    let mut h = harness(PatternName::Normal, quiet(), at_hour(10));
    h.governor
        .subscribe(Arc::new(|_: &GovernorEvent| -> ListenerResult {
            Err("listener offline".into())
        }));
    h.governor
        .subscribe(Arc::new(|_: &GovernorEvent| -> ListenerResult {
            panic!("listener bug")
        }));

    h.governor.before_task().await.unwrap();
    h.governor.after_task().await.unwrap();

    assert_eq!(h.log.count("TaskSolved"), 1);
}

#[derive(Default)]
struct CollectSink(Mutex<Vec<Alert>>);

impl NotificationSink for CollectSink {
    fn name(&self) -> &str {
        "collect"
    }

    fn notify(&self, alert: Alert) {
        self.0.lock().unwrap().push(alert);
    }
}

#[tokio::test]
async fn test_sinks_receive_limit_alerts() {
    let sink = Arc::new(CollectSink::default());
    let mut governor = SessionGovernor::builder()
        .overrides(ConfigOverrides {
            max_tasks_per_session: Some(1),
            ..quiet()
        })
        .clock(Arc::new(ManualClock::new(at_hour(10))))
        .rng(Arc::new(SeededRandom::new(5)))
        .sink(sink.clone())
        .build()
        .unwrap();

    governor.before_task().await.unwrap();
    assert!(governor.after_task().await.is_err());

    let alerts = sink.0.lock().unwrap();
    assert!(alerts
        .iter()
        .any(|a| a.level == AlertLevel::Warning && a.title == "Task quota reached"));
}

#[tokio::test]
async fn test_report_reflects_session() {
    let mut h = harness(PatternName::Normal, quiet(), at_hour(10));
    for _ in 0..4 {
        h.governor.after_task().await.unwrap();
    }
    h.clock.advance(Duration::from_secs(30 * 60));

    let report = h.governor.report();

    assert_eq!(report.pattern, PatternName::Normal);
    assert_eq!(report.status, SessionStatus::Running);
    assert_eq!(report.tasks_completed, 4);
    assert_eq!(report.elapsed_minutes, 30);
    assert_eq!(report.rate_per_hour, 8);
    assert_eq!(report.remaining_tasks, 496);
    assert_eq!(report.remaining_minutes, 8 * 60 - 30);
    assert!(report.to_string().contains("SESSION REPORT"));
}

#[tokio::test]
async fn test_abandoned_break_does_not_wedge_the_session() {
    let clock = ManualClock::new(at_hour(10));
    let log = EventLog::new();
    let mut governor = SessionGovernor::builder()
        .overrides(ConfigOverrides {
            min_delay_ms: Some(2_000),
            max_delay_ms: Some(2_000),
            min_work_before_break_ms: Some(1_000),
            max_work_before_break_ms: Some(1_000),
            min_break_duration_ms: Some(300_000),
            max_break_duration_ms: Some(300_000),
            ..quiet()
        })
        .clock(Arc::new(StallingClock {
            inner: clock.clone(),
            stall_next_long_sleep: AtomicBool::new(true),
        }))
        .rng(Arc::new(SeededRandom::new(7)))
        .listener(Arc::new(log.clone()))
        .build()
        .unwrap();

    let outcome = tokio::time::timeout(Duration::from_millis(50), governor.before_task()).await;
    assert!(outcome.is_err());
    assert!(!governor.session().on_break());
    assert_eq!(governor.session().break_count(), 1);
    assert_eq!(governor.session().last_break_time(), clock.now());
    assert_eq!(log.count("BreakEnded"), 1);

    for _ in 0..3 {
        governor.before_task().await.unwrap();
    }

    assert_eq!(governor.session().break_count(), 4);
    assert_eq!(log.count("BreakStarted"), 4);
    assert_eq!(log.count("BreakEnded"), 4);
}

#[tokio::test]
async fn test_skip_rate_holds_over_many_tasks() {
    let mut h = harness(
        PatternName::Normal,
        ConfigOverrides {
            skip_rate: Some(0.07),
            incidental_interaction_rate: Some(0.0),
            min_delay_ms: Some(1),
            max_delay_ms: Some(1),
            work_hours_start: Some(0),
            work_hours_end: Some(0),
            ..Default::default()
        },
        at_hour(10),
    );
    let trials = 10_000;

    let mut skipped = 0;
    for _ in 0..trials {
        match h.governor.before_task().await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::MarkedUnsolvable => skipped += 1,
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    let ratio = skipped as f64 / trials as f64;
    assert!((ratio - 0.07).abs() <= 0.015, "skip ratio {ratio}");
    assert_eq!(h.log.count("TaskSkipped"), skipped);
    assert_eq!(h.log.count("TaskDelayed"), trials);

    let events = h.log.snapshot();
    for (i, event) in events.iter().enumerate() {
        if event.name() == "TaskSkipped" {
            assert!(i > 0 && events[i - 1].name() == "TaskDelayed");
        }
    }
}
