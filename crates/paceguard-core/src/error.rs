//! Error taxonomy for paceguard-core.
//!
//! Every failure raised by the core is a [`SolveError`] whose [`ErrorKind`]
//! fixes its stable code, HTTP status hint, and the recoverable/retryable
//! flags a caller uses to decide between continuing, retrying, or aborting.
//! Kinds are plain data; there is no behavior attached beyond the metadata.
//!
//! The governor never retries on its own. Callers pair [`classify`] with
//! [`BackoffPolicy`] to decide whether and how long to wait before trying
//! an action again.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::clock::RandomSource;

/// Broad family an error kind belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Detection,
    Solving,
    Submission,
    Timeout,
    Cancellation,
    Queue,
    Configuration,
    /// Work-hour, quota, skip and break guards raised by the governor.
    Guard,
    Unclassified,
}

/// Closed set of failure kinds.
///
/// Serializes as its stable code, e.g. `"SOLVER_TIMEOUT"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    NoCaptchaFound,
    UnsupportedType,
    ElementNotFound,
    SolverUnavailable,
    SolverTimeout,
    InvalidSolution,
    SubmitButtonNotFound,
    SubmissionFailed,
    OperationTimeout,
    JobTimeout,
    JobCancelled,
    JobNotFound,
    InvalidJobState,
    WorkerPoolExhausted,
    #[serde(rename = "CONFIGURATION_ERROR")]
    Configuration,
    #[serde(rename = "INITIALIZATION_ERROR")]
    Initialization,
    OutsideWorkHours,
    SessionLimitsExceeded,
    MarkedUnsolvable,
    BreakInProgress,
    Unclassified,
}

/// Fixed metadata attached to every kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct KindMeta {
    code: &'static str,
    http_status: u16,
    recoverable: bool,
    retryable: bool,
    category: ErrorCategory,
}

const fn meta(
    code: &'static str,
    http_status: u16,
    recoverable: bool,
    retryable: bool,
    category: ErrorCategory,
) -> KindMeta {
    KindMeta {
        code,
        http_status,
        recoverable,
        retryable,
        category,
    }
}

impl ErrorKind {
    pub const ALL: [ErrorKind; 21] = [
        ErrorKind::NoCaptchaFound,
        ErrorKind::UnsupportedType,
        ErrorKind::ElementNotFound,
        ErrorKind::SolverUnavailable,
        ErrorKind::SolverTimeout,
        ErrorKind::InvalidSolution,
        ErrorKind::SubmitButtonNotFound,
        ErrorKind::SubmissionFailed,
        ErrorKind::OperationTimeout,
        ErrorKind::JobTimeout,
        ErrorKind::JobCancelled,
        ErrorKind::JobNotFound,
        ErrorKind::InvalidJobState,
        ErrorKind::WorkerPoolExhausted,
        ErrorKind::Configuration,
        ErrorKind::Initialization,
        ErrorKind::OutsideWorkHours,
        ErrorKind::SessionLimitsExceeded,
        ErrorKind::MarkedUnsolvable,
        ErrorKind::BreakInProgress,
        ErrorKind::Unclassified,
    ];

    fn meta(self) -> KindMeta {
        use ErrorCategory as C;
        match self {
            ErrorKind::NoCaptchaFound => meta("NO_CAPTCHA_FOUND", 404, true, true, C::Detection),
            ErrorKind::UnsupportedType => meta("UNSUPPORTED_TYPE", 422, true, false, C::Detection),
            ErrorKind::ElementNotFound => meta("ELEMENT_NOT_FOUND", 404, true, true, C::Detection),
            ErrorKind::SolverUnavailable => meta("SOLVER_UNAVAILABLE", 503, true, true, C::Solving),
            ErrorKind::SolverTimeout => meta("SOLVER_TIMEOUT", 504, true, true, C::Solving),
            ErrorKind::InvalidSolution => meta("INVALID_SOLUTION", 422, true, true, C::Solving),
            ErrorKind::SubmitButtonNotFound => {
                meta("SUBMIT_BUTTON_NOT_FOUND", 404, true, true, C::Submission)
            }
            ErrorKind::SubmissionFailed => meta("SUBMISSION_FAILED", 502, true, true, C::Submission),
            ErrorKind::OperationTimeout => meta("OPERATION_TIMEOUT", 408, true, true, C::Timeout),
            ErrorKind::JobTimeout => meta("JOB_TIMEOUT", 504, true, true, C::Timeout),
            ErrorKind::JobCancelled => meta("JOB_CANCELLED", 499, true, false, C::Cancellation),
            ErrorKind::JobNotFound => meta("JOB_NOT_FOUND", 404, true, false, C::Queue),
            ErrorKind::InvalidJobState => meta("INVALID_JOB_STATE", 409, true, false, C::Queue),
            ErrorKind::WorkerPoolExhausted => {
                meta("WORKER_POOL_EXHAUSTED", 503, true, true, C::Queue)
            }
            ErrorKind::Configuration => {
                meta("CONFIGURATION_ERROR", 500, false, false, C::Configuration)
            }
            ErrorKind::Initialization => {
                meta("INITIALIZATION_ERROR", 500, false, false, C::Configuration)
            }
            ErrorKind::OutsideWorkHours => meta("OUTSIDE_WORK_HOURS", 503, true, true, C::Guard),
            ErrorKind::SessionLimitsExceeded => {
                meta("SESSION_LIMITS_EXCEEDED", 429, false, false, C::Guard)
            }
            ErrorKind::MarkedUnsolvable => meta("MARKED_UNSOLVABLE", 422, true, false, C::Guard),
            ErrorKind::BreakInProgress => meta("BREAK_IN_PROGRESS", 409, true, true, C::Guard),
            ErrorKind::Unclassified => meta("UNCLASSIFIED", 500, true, true, C::Unclassified),
        }
    }

    /// Stable symbolic code, unique per kind.
    pub fn code(self) -> &'static str {
        self.meta().code
    }

    pub fn http_status(self) -> u16 {
        self.meta().http_status
    }

    /// The surrounding workflow may continue without aborting the session.
    pub fn is_recoverable(self) -> bool {
        self.meta().recoverable
    }

    /// The same action may be safely reattempted.
    pub fn is_retryable(self) -> bool {
        self.meta().retryable
    }

    pub fn category(self) -> ErrorCategory {
        self.meta().category
    }

    /// Look up a kind by its stable code (case-insensitive).
    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|kind| kind.code().eq_ignore_ascii_case(code))
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// A failure carrying the full taxonomy contract.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{code}: {message}", code = .kind.code())]
pub struct SolveError {
    kind: ErrorKind,
    message: String,
    context: BTreeMap<String, Value>,
}

impl SolveError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            context: BTreeMap::new(),
        }
    }

    /// Attach a diagnostic value under `key`.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    // ── Detection ────────────────────────────────────────────────────

    pub fn no_captcha_found(url: &str) -> Self {
        Self::new(ErrorKind::NoCaptchaFound, "no captcha found on page").with_context("url", url)
    }

    pub fn unsupported_type(captcha_type: &str) -> Self {
        Self::new(
            ErrorKind::UnsupportedType,
            format!("unsupported captcha type '{captcha_type}'"),
        )
        .with_context("captchaType", captcha_type)
    }

    pub fn element_not_found(selector: &str) -> Self {
        Self::new(ErrorKind::ElementNotFound, format!("element not found: {selector}"))
            .with_context("selector", selector)
    }

    // ── Solving ──────────────────────────────────────────────────────

    pub fn solver_unavailable(solver: &str) -> Self {
        Self::new(ErrorKind::SolverUnavailable, format!("solver '{solver}' is unavailable"))
            .with_context("solver", solver)
    }

    pub fn solver_timeout(solver: &str, timeout_ms: u64, elapsed_ms: u64) -> Self {
        Self::new(
            ErrorKind::SolverTimeout,
            format!("solver '{solver}' did not answer within {timeout_ms}ms"),
        )
        .with_context("solver", solver)
        .with_context("timeoutMs", timeout_ms)
        .with_context("elapsedMs", elapsed_ms)
    }

    pub fn invalid_solution(reason: &str) -> Self {
        Self::new(ErrorKind::InvalidSolution, format!("solution rejected: {reason}"))
            .with_context("reason", reason)
    }

    // ── Submission ───────────────────────────────────────────────────

    pub fn submit_button_not_found(selector: &str) -> Self {
        Self::new(
            ErrorKind::SubmitButtonNotFound,
            format!("submit button not found: {selector}"),
        )
        .with_context("selector", selector)
    }

    pub fn submission_failed(reason: &str) -> Self {
        Self::new(ErrorKind::SubmissionFailed, format!("submission failed: {reason}"))
            .with_context("reason", reason)
    }

    // ── Timeout / cancellation ───────────────────────────────────────

    pub fn operation_timeout(operation: &str, timeout_ms: u64, elapsed_ms: u64) -> Self {
        Self::new(
            ErrorKind::OperationTimeout,
            format!("operation '{operation}' timed out after {elapsed_ms}ms"),
        )
        .with_context("operation", operation)
        .with_context("timeoutMs", timeout_ms)
        .with_context("elapsedMs", elapsed_ms)
    }

    pub fn job_timeout(job_id: &str, timeout_ms: u64, elapsed_ms: u64) -> Self {
        Self::new(
            ErrorKind::JobTimeout,
            format!("job {job_id} timed out after {elapsed_ms}ms"),
        )
        .with_context("jobId", job_id)
        .with_context("timeoutMs", timeout_ms)
        .with_context("elapsedMs", elapsed_ms)
    }

    pub fn job_cancelled(job_id: &str) -> Self {
        Self::new(ErrorKind::JobCancelled, format!("job {job_id} was cancelled"))
            .with_context("jobId", job_id)
    }

    // ── Queue ────────────────────────────────────────────────────────

    pub fn job_not_found(job_id: &str) -> Self {
        Self::new(ErrorKind::JobNotFound, format!("job {job_id} not found"))
            .with_context("jobId", job_id)
    }

    pub fn invalid_job_state(job_id: &str, state: &str, expected: &str) -> Self {
        Self::new(
            ErrorKind::InvalidJobState,
            format!("job {job_id} is '{state}', expected '{expected}'"),
        )
        .with_context("jobId", job_id)
        .with_context("state", state)
        .with_context("expected", expected)
    }

    pub fn worker_pool_exhausted(capacity: usize) -> Self {
        Self::new(
            ErrorKind::WorkerPoolExhausted,
            format!("all {capacity} workers are busy"),
        )
        .with_context("capacity", capacity as u64)
    }

    // ── Configuration / initialization ───────────────────────────────

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Configuration, message)
    }

    pub fn initialization(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Initialization, message)
    }

    // ── Governor guards ──────────────────────────────────────────────

    pub fn outside_work_hours(hour: u32, start_hour: u8, end_hour: u8) -> Self {
        Self::new(
            ErrorKind::OutsideWorkHours,
            format!("hour {hour} is outside the work window {start_hour:02}:00-{end_hour:02}:00"),
        )
        .with_context("hour", hour)
        .with_context("startHour", start_hour)
        .with_context("endHour", end_hour)
    }

    pub fn limits_exceeded(
        tasks_completed: u64,
        max_tasks: u64,
        elapsed_ms: u64,
        max_work_ms: u64,
    ) -> Self {
        Self::new(
            ErrorKind::SessionLimitsExceeded,
            "session limits exceeded; reset the session before scheduling more tasks",
        )
        .with_context("tasksCompleted", tasks_completed)
        .with_context("maxTasksPerSession", max_tasks)
        .with_context("elapsedMs", elapsed_ms)
        .with_context("maxContinuousWorkMs", max_work_ms)
    }

    pub fn marked_unsolvable() -> Self {
        Self::new(ErrorKind::MarkedUnsolvable, "task skipped and marked unsolvable")
    }

    pub fn break_in_progress() -> Self {
        Self::new(ErrorKind::BreakInProgress, "a break is already in progress")
    }

    // ── Accessors ────────────────────────────────────────────────────

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn code(&self) -> &'static str {
        self.kind.code()
    }

    pub fn http_status(&self) -> u16 {
        self.kind.http_status()
    }

    pub fn is_recoverable(&self) -> bool {
        self.kind.is_recoverable()
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn context(&self) -> &BTreeMap<String, Value> {
        &self.context
    }

    /// `timeoutMs` for timeout kinds.
    pub fn timeout_ms(&self) -> Option<u64> {
        self.context.get("timeoutMs").and_then(Value::as_u64)
    }

    /// `elapsedMs` for timeout kinds.
    pub fn elapsed_ms(&self) -> Option<u64> {
        self.context.get("elapsedMs").and_then(Value::as_u64)
    }

    pub fn record(&self) -> ErrorRecord {
        ErrorRecord {
            code: self.code().to_string(),
            http_status: self.http_status(),
            recoverable: self.is_recoverable(),
            retryable: self.is_retryable(),
            message: self.message.clone(),
            context: self.context.clone(),
        }
    }
}

/// Serializable snapshot of a [`SolveError`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorRecord {
    pub code: String,
    pub http_status: u16,
    pub recoverable: bool,
    pub retryable: bool,
    pub message: String,
    #[serde(default)]
    pub context: BTreeMap<String, Value>,
}

/// Result of [`classify`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Classification {
    pub kind: ErrorKind,
    pub code: &'static str,
    pub http_status: u16,
    pub recoverable: bool,
    pub retryable: bool,
}

impl From<ErrorKind> for Classification {
    fn from(kind: ErrorKind) -> Self {
        Self {
            kind,
            code: kind.code(),
            http_status: kind.http_status(),
            recoverable: kind.is_recoverable(),
            retryable: kind.is_retryable(),
        }
    }
}

/// Map an arbitrary failure onto the taxonomy.
///
/// Walks the `source()` chain; anything unrecognised is `UNCLASSIFIED`,
/// which is recoverable and retryable.
pub fn classify(err: &(dyn std::error::Error + 'static)) -> Classification {
    let mut current = Some(err);
    while let Some(e) = current {
        if let Some(kind) = known_kind(e) {
            return kind.into();
        }
        current = e.source();
    }
    ErrorKind::Unclassified.into()
}

fn known_kind(err: &(dyn std::error::Error + 'static)) -> Option<ErrorKind> {
    if let Some(solve) = err.downcast_ref::<SolveError>() {
        return Some(solve.kind());
    }
    if let Some(io) = err.downcast_ref::<std::io::Error>() {
        if io.kind() == std::io::ErrorKind::TimedOut {
            return Some(ErrorKind::OperationTimeout);
        }
    }
    if err.downcast_ref::<tokio::time::error::Elapsed>().is_some() {
        return Some(ErrorKind::OperationTimeout);
    }
    None
}

pub const DEFAULT_BACKOFF_BASE_MS: u64 = 1_000;
pub const DEFAULT_BACKOFF_CAP_MS: u64 = 60_000;

/// Exponential backoff with additive jitter:
/// `min(base * 2^attempt + uniform(0, base), cap)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackoffPolicy {
    pub base_ms: u64,
    pub cap_ms: u64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_ms: DEFAULT_BACKOFF_BASE_MS,
            cap_ms: DEFAULT_BACKOFF_CAP_MS,
        }
    }
}

impl BackoffPolicy {
    pub fn new(base_ms: u64, cap_ms: u64) -> Self {
        Self { base_ms, cap_ms }
    }

    /// Delay before zero-based retry `attempt`, in milliseconds.
    pub fn delay_ms(&self, attempt: u32, rng: &dyn RandomSource) -> u64 {
        let exponential = 1u64
            .checked_shl(attempt)
            .map(|factor| self.base_ms.saturating_mul(factor))
            .unwrap_or(u64::MAX);
        let jitter = if self.base_ms == 0 {
            0
        } else {
            rng.range_inclusive(0, self.base_ms - 1)
        };
        exponential.saturating_add(jitter).min(self.cap_ms)
    }

    pub fn delay(&self, attempt: u32, rng: &dyn RandomSource) -> Duration {
        Duration::from_millis(self.delay_ms(attempt, rng))
    }
}

/// [`BackoffPolicy::delay_ms`] with the default 1s base and 60s cap.
pub fn backoff_delay(attempt: u32, rng: &dyn RandomSource) -> u64 {
    BackoffPolicy::default().delay_ms(attempt, rng)
}
