//! Session governor.
//!
//! The governor owns one [`SessionState`] and decides, around every task,
//! whether the worker may proceed and how long it must wait.
//!
//! ## Usage
//!
//! ```ignore
//! let mut governor = SessionGovernor::builder()
//!     .pattern(PatternName::Cautious)
//!     .build()?;
//! loop {
//!     match governor.before_task().await {
//!         Ok(()) => {}
//!         Err(e) if e.kind() == ErrorKind::MarkedUnsolvable => continue,
//!         Err(e) => return Err(e),
//!     }
//!     solve_one().await?;
//!     governor.after_task().await?;
//! }
//! ```
//!
//! One governor per worker. It holds no locks, so sharing an instance
//! between concurrent task loops corrupts its counters.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Timelike, Utc};

use crate::browser::BrowserSurface;
use crate::clock::{Clock, RandomSource, SystemClock, ThreadRandom};
use crate::error::{ErrorKind, SolveError};
use crate::events::{EventBus, EventListener, GovernorEvent, SubscriptionId};
use crate::notify::{AlertForwarder, NotificationSink};
use crate::pattern::{AntiBanConfig, ConfigOverrides, PatternCatalog, PatternName};
use crate::report::{SessionReport, SessionStatus, SessionSummary};
use crate::session::{BreakScheduler, LimitEnforcer, SessionState};
use crate::timing::TimingPolicy;

/// Largest incidental scroll, in pixels, either direction.
const MAX_INCIDENTAL_SCROLL: u64 = 400;

pub struct SessionGovernor {
    pattern: PatternName,
    config: Arc<AntiBanConfig>,
    session: SessionState,
    breaks: BreakScheduler,
    timing: TimingPolicy,
    clock: Arc<dyn Clock>,
    events: EventBus,
    browser: Option<Arc<dyn BrowserSurface>>,
    stopped: bool,
}

impl std::fmt::Debug for SessionGovernor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionGovernor")
            .field("pattern", &self.pattern)
            .field("session", &self.session)
            .field("stopped", &self.stopped)
            .finish_non_exhaustive()
    }
}

impl SessionGovernor {
    pub fn builder() -> GovernorBuilder {
        GovernorBuilder::default()
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn pattern(&self) -> PatternName {
        self.pattern
    }

    pub fn config(&self) -> &AntiBanConfig {
        &self.config
    }

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    pub fn timing(&self) -> &TimingPolicy {
        &self.timing
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    pub fn summary(&self) -> SessionSummary {
        let now = self.clock.now();
        let status = LimitEnforcer::new(&self.config, &self.events).status(&self.session, now);
        SessionSummary::compute(&self.session, status, now)
    }

    /// Stopped once [`stop`](Self::stop) was called or a session cap was hit.
    pub fn status(&self) -> SessionStatus {
        if self.stopped || !self.summary().is_within_limits {
            SessionStatus::Stopped
        } else {
            SessionStatus::Running
        }
    }

    pub fn report(&self) -> SessionReport {
        let summary = self.summary();
        SessionReport::build(self.pattern, self.status(), &self.config, &summary)
    }

    // ── Events ───────────────────────────────────────────────────────

    pub fn subscribe(&mut self, listener: Arc<dyn EventListener>) -> SubscriptionId {
        self.events.subscribe(listener)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.events.unsubscribe(id)
    }

    // ── Task guards ──────────────────────────────────────────────────

    /// Gate, pace and possibly rest before the caller performs a task.
    ///
    /// # Errors
    ///
    /// - `OUTSIDE_WORK_HOURS` outside the configured window
    /// - `SESSION_LIMITS_EXCEEDED` once a session cap is reached (terminal)
    /// - `MARKED_UNSOLVABLE` when the skip draw says to pass on this task
    /// - `JOB_CANCELLED` after [`stop`](Self::stop)
    pub async fn before_task(&mut self) -> Result<(), SolveError> {
        if self.stopped {
            return Err(SolveError::new(ErrorKind::JobCancelled, "session was stopped")
                .with_context("sessionId", self.session.id().to_string()));
        }

        let config = Arc::clone(&self.config);
        let now = self.clock.now();
        self.check_guards(&config, now)?;

        let delay_ms = self.timing.task_delay(&config)?;
        self.events
            .publish(&GovernorEvent::TaskDelayed { delay_ms, at: now });
        tracing::debug!(delay_ms, "pacing before task");
        self.clock.sleep(Duration::from_millis(delay_ms)).await;

        if self.timing.chance(config.skip_rate) {
            self.events.publish(&GovernorEvent::TaskSkipped {
                at: self.clock.now(),
            });
            tracing::debug!("task skipped by skip rate");
            return Err(SolveError::marked_unsolvable());
        }

        self.incidental_interaction(&config).await;

        if self.breaks.should_take_break(&self.session, &config)? {
            self.breaks
                .take_break(&mut self.session, &config, &self.events)
                .await?;
        }

        Ok(())
    }

    /// Record a solved task. Returns the new task count.
    ///
    /// # Errors
    ///
    /// `SESSION_LIMITS_EXCEEDED` when this task reached a cap. The session
    /// is over: stop scheduling tasks until [`reset_session`](Self::reset_session).
    pub async fn after_task(&mut self) -> Result<u64, SolveError> {
        let total = self.session.record_task_done();
        let now = self.clock.now();
        self.events.publish(&GovernorEvent::TaskSolved {
            tasks_completed: total,
            at: now,
        });

        let config = Arc::clone(&self.config);
        if LimitEnforcer::new(&config, &self.events).has_exceeded_session_limits(&self.session, now)
        {
            tracing::warn!(
                tasks_completed = total,
                session_id = %self.session.id(),
                "session limits reached"
            );
            return Err(self.limits_error(&config, now));
        }

        if self.breaks.should_take_break(&self.session, &config)? {
            self.breaks
                .take_break(&mut self.session, &config, &self.events)
                .await?;
        }

        Ok(total)
    }

    /// Type `text` into `selector` one character at a time with typing delays.
    ///
    /// Unlike incidental interaction, failures here propagate: typing is the
    /// guarded action itself.
    pub async fn type_text(&self, selector: &str, text: &str) -> Result<(), SolveError> {
        let browser = self
            .browser
            .as_ref()
            .ok_or_else(|| SolveError::initialization("no browser surface attached"))?;

        if browser.locate(selector).await?.is_none() {
            return Err(SolveError::element_not_found(selector));
        }

        for ch in text.chars() {
            let delay_ms = self.timing.typing_delay(&self.config)?;
            browser.type_char(selector, ch, delay_ms).await?;
        }
        Ok(())
    }

    // ── Session control ──────────────────────────────────────────────

    /// Start a fresh session: counters zeroed, break state cleared.
    pub fn reset_session(&mut self) {
        let now = self.clock.now();
        self.session = SessionState::new(now);
        self.breaks.reset();
        self.stopped = false;
        self.events.publish(&GovernorEvent::SessionReset {
            session_id: self.session.id(),
            at: now,
        });
        tracing::info!(session_id = %self.session.id(), "session reset");
    }

    /// Refuse further tasks until the next reset.
    pub fn stop(&mut self) {
        self.stopped = true;
        tracing::info!(session_id = %self.session.id(), "session stopped");
    }

    /// Switch to the pattern called `name`. Returns `false` if unknown.
    pub fn switch_pattern(&mut self, name: &str) -> bool {
        match name.parse::<PatternName>() {
            Ok(pattern) => {
                self.switch_to(pattern);
                true
            }
            Err(e) => {
                tracing::warn!(pattern = name, error = %e, "pattern switch rejected");
                false
            }
        }
    }

    /// Replace the active configuration with the catalog entry for `pattern`.
    ///
    /// Overrides given at construction do not carry over. The session and
    /// every event subscription stay as they are; only the break threshold
    /// is redrawn.
    pub fn switch_to(&mut self, pattern: PatternName) {
        let from = self.pattern;
        self.config = Arc::new(PatternCatalog::get(pattern).clone());
        self.pattern = pattern;
        self.breaks.reset();
        self.events.publish(&GovernorEvent::PatternSwitched {
            from,
            to: pattern,
            at: self.clock.now(),
        });
        tracing::info!(%from, to = %pattern, "pattern switched");
    }

    // ── Internal ─────────────────────────────────────────────────────

    fn check_guards(&self, config: &AntiBanConfig, now: DateTime<Utc>) -> Result<(), SolveError> {
        let limits = LimitEnforcer::new(config, &self.events);
        if !limits.is_within_work_hours(now) {
            return Err(SolveError::outside_work_hours(
                now.hour(),
                config.work_hours_start,
                config.work_hours_end,
            ));
        }
        if limits.has_exceeded_session_limits(&self.session, now) {
            return Err(self.limits_error(config, now));
        }
        Ok(())
    }

    fn limits_error(&self, config: &AntiBanConfig, now: DateTime<Utc>) -> SolveError {
        SolveError::limits_exceeded(
            self.session.tasks_completed(),
            config.max_tasks_per_session,
            self.session.elapsed_ms(now),
            config.max_continuous_work_ms,
        )
    }

    /// Occasionally move the mouse or scroll. Failures are logged and dropped.
    async fn incidental_interaction(&self, config: &AntiBanConfig) {
        let Some(browser) = self.browser.as_ref() else {
            return;
        };
        if !self.timing.chance(config.incidental_interaction_rate) {
            return;
        }

        let rng = self.timing.rng();
        let (action, result) = if self.timing.chance(0.5) {
            match browser.viewport_size().await {
                Some(v) if v.width > 0 && v.height > 0 => {
                    let x = rng.range_inclusive(0, u64::from(v.width - 1)) as f64;
                    let y = rng.range_inclusive(0, u64::from(v.height - 1)) as f64;
                    ("move_mouse", browser.move_mouse(x, y).await)
                }
                _ => {
                    tracing::debug!("viewport unavailable, skipping mouse move");
                    return;
                }
            }
        } else {
            let amount = rng.range_inclusive(0, 2 * MAX_INCIDENTAL_SCROLL) as i64
                - MAX_INCIDENTAL_SCROLL as i64;
            ("scroll_by", browser.scroll_by(amount).await)
        };

        if let Err(e) = result {
            tracing::warn!(action, error = %e, "incidental interaction failed");
            self.events.publish(&GovernorEvent::InteractionFailed {
                action: action.to_string(),
                message: e.to_string(),
                at: self.clock.now(),
            });
        }
    }
}

/// Builder for [`SessionGovernor`].
#[derive(Default)]
pub struct GovernorBuilder {
    pattern: PatternName,
    overrides: ConfigOverrides,
    clock: Option<Arc<dyn Clock>>,
    rng: Option<Arc<dyn RandomSource>>,
    browser: Option<Arc<dyn BrowserSurface>>,
    sinks: Vec<Arc<dyn NotificationSink>>,
    listeners: Vec<Arc<dyn EventListener>>,
}

impl GovernorBuilder {
    pub fn pattern(mut self, pattern: PatternName) -> Self {
        self.pattern = pattern;
        self
    }

    pub fn overrides(mut self, overrides: ConfigOverrides) -> Self {
        self.overrides = overrides;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn rng(mut self, rng: Arc<dyn RandomSource>) -> Self {
        self.rng = Some(rng);
        self
    }

    pub fn browser(mut self, browser: Arc<dyn BrowserSurface>) -> Self {
        self.browser = Some(browser);
        self
    }

    /// Forward governor alerts to `sink`.
    pub fn sink(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn listener(mut self, listener: Arc<dyn EventListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    /// # Errors
    ///
    /// `CONFIGURATION_ERROR` when the overrides produce an invalid configuration.
    pub fn build(self) -> Result<SessionGovernor, SolveError> {
        let config = self.overrides.apply(PatternCatalog::get(self.pattern))?;
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let rng = self.rng.unwrap_or_else(|| Arc::new(ThreadRandom));
        let timing = TimingPolicy::new(rng);

        let mut events = EventBus::new();
        for listener in self.listeners {
            events.subscribe(listener);
        }
        if !self.sinks.is_empty() {
            events.subscribe(Arc::new(AlertForwarder::new(self.sinks)));
        }

        let session = SessionState::new(clock.now());
        tracing::debug!(pattern = %self.pattern, session_id = %session.id(), "governor created");

        Ok(SessionGovernor {
            pattern: self.pattern,
            config: Arc::new(config),
            session,
            breaks: BreakScheduler::new(timing.clone(), Arc::clone(&clock)),
            timing,
            clock,
            events,
            browser: self.browser,
            stopped: false,
        })
    }
}
