//! # paceguard Core Library
//!
//! This library provides the session governor used by the paceguard solver
//! workers. A worker asks the governor before every task whether it may
//! proceed, how long to wait, and when to rest; after every task it reports
//! back so the governor can track quotas.
//!
//! ## Architecture
//!
//! - **Clock / RandomSource**: injected time and randomness so every timing
//!   decision can be replayed deterministically in tests
//! - **Timing**: bounded random delays (task pacing, typing, breaks)
//! - **Patterns**: immutable named configurations selectable at runtime
//! - **Session**: per-session counters, limit checks and the break state machine
//! - **Events**: synchronous listener bus for governor lifecycle events
//! - **Errors**: closed error taxonomy with retry/backoff classification
//!
//! ## Key Components
//!
//! - [`SessionGovernor`]: orchestrates `before_task` / `after_task`
//! - [`PatternCatalog`]: the `normal`, `aggressive`, `cautious` and `night-owl` profiles
//! - [`SolveError`]: every failure raised by the core
//! - [`BackoffPolicy`]: exponential backoff with jitter for caller-side retries

pub mod browser;
pub mod clock;
pub mod config;
pub mod error;
pub mod events;
pub mod governor;
pub mod notify;
pub mod pattern;
pub mod report;
pub mod session;
pub mod timing;

pub use browser::{BrowserSurface, ElementHandle, Viewport};
pub use clock::{Clock, ManualClock, RandomSource, SeededRandom, SystemClock, ThreadRandom};
pub use config::{ConfigError, NotificationsConfig, Settings};
pub use error::{
    backoff_delay, classify, BackoffPolicy, Classification, ErrorCategory, ErrorKind,
    ErrorRecord, SolveError,
};
pub use events::{
    EventBus, EventListener, EventLog, GovernorEvent, ListenerResult, SubscriptionId,
};
pub use governor::{GovernorBuilder, SessionGovernor};
pub use notify::{
    Alert, AlertForwarder, AlertLevel, LogSink, NotificationSink, WebhookError, WebhookSink,
};
pub use pattern::{AntiBanConfig, BreakSampling, ConfigOverrides, PatternCatalog, PatternName};
pub use report::{SessionReport, SessionStatus, SessionSummary};
pub use session::{BreakScheduler, LimitEnforcer, LimitStatus, SessionState};
pub use timing::TimingPolicy;
