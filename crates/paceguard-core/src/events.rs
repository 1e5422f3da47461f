//! Governor lifecycle events and the listener bus that delivers them.
//!
//! Delivery is synchronous and in registration order. A listener that
//! returns an error or panics is logged and skipped; it never reaches the
//! governor's state or the remaining listeners.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::pattern::PatternName;

/// Every state change in the governor produces an event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum GovernorEvent {
    /// Inter-task pacing delay about to be awaited.
    TaskDelayed {
        delay_ms: u64,
        at: DateTime<Utc>,
    },
    /// Task skipped by the skip-rate draw.
    TaskSkipped {
        at: DateTime<Utc>,
    },
    TaskSolved {
        tasks_completed: u64,
        at: DateTime<Utc>,
    },
    BreakStarted {
        duration_ms: u64,
        at: DateTime<Utc>,
    },
    BreakEnded {
        break_count: u32,
        duration_ms: u64,
        at: DateTime<Utc>,
    },
    OutsideWorkHours {
        hour: u32,
        start_hour: u8,
        end_hour: u8,
        at: DateTime<Utc>,
    },
    MaxWorkTimeExceeded {
        elapsed_ms: u64,
        limit_ms: u64,
        at: DateTime<Utc>,
    },
    MaxTasksExceeded {
        tasks_completed: u64,
        limit: u64,
        at: DateTime<Utc>,
    },
    SessionReset {
        session_id: Uuid,
        at: DateTime<Utc>,
    },
    PatternSwitched {
        from: PatternName,
        to: PatternName,
        at: DateTime<Utc>,
    },
    /// A best-effort browser interaction failed and was swallowed.
    InteractionFailed {
        action: String,
        message: String,
        at: DateTime<Utc>,
    },
}

impl GovernorEvent {
    pub fn at(&self) -> DateTime<Utc> {
        match self {
            GovernorEvent::TaskDelayed { at, .. }
            | GovernorEvent::TaskSkipped { at }
            | GovernorEvent::TaskSolved { at, .. }
            | GovernorEvent::BreakStarted { at, .. }
            | GovernorEvent::BreakEnded { at, .. }
            | GovernorEvent::OutsideWorkHours { at, .. }
            | GovernorEvent::MaxWorkTimeExceeded { at, .. }
            | GovernorEvent::MaxTasksExceeded { at, .. }
            | GovernorEvent::SessionReset { at, .. }
            | GovernorEvent::PatternSwitched { at, .. }
            | GovernorEvent::InteractionFailed { at, .. } => *at,
        }
    }

    /// Variant name, as used in the serialized `type` tag.
    pub fn name(&self) -> &'static str {
        match self {
            GovernorEvent::TaskDelayed { .. } => "TaskDelayed",
            GovernorEvent::TaskSkipped { .. } => "TaskSkipped",
            GovernorEvent::TaskSolved { .. } => "TaskSolved",
            GovernorEvent::BreakStarted { .. } => "BreakStarted",
            GovernorEvent::BreakEnded { .. } => "BreakEnded",
            GovernorEvent::OutsideWorkHours { .. } => "OutsideWorkHours",
            GovernorEvent::MaxWorkTimeExceeded { .. } => "MaxWorkTimeExceeded",
            GovernorEvent::MaxTasksExceeded { .. } => "MaxTasksExceeded",
            GovernorEvent::SessionReset { .. } => "SessionReset",
            GovernorEvent::PatternSwitched { .. } => "PatternSwitched",
            GovernorEvent::InteractionFailed { .. } => "InteractionFailed",
        }
    }
}

pub type ListenerResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// Receives governor events.
pub trait EventListener: Send + Sync {
    fn on_event(&self, event: &GovernorEvent) -> ListenerResult;

    /// Name used when logging listener failures.
    fn name(&self) -> &str {
        "listener"
    }
}

impl<F> EventListener for F
where
    F: Fn(&GovernorEvent) -> ListenerResult + Send + Sync,
{
    fn on_event(&self, event: &GovernorEvent) -> ListenerResult {
        self(event)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

#[derive(Default)]
pub struct EventBus {
    listeners: Vec<(SubscriptionId, Arc<dyn EventListener>)>,
    next_id: u64,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, listener: Arc<dyn EventListener>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.listeners.push((id, listener));
        id
    }

    /// Returns `false` if `id` was not subscribed.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(sid, _)| *sid != id);
        self.listeners.len() != before
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// Deliver `event` to every listener. Returns how many failed.
    pub fn publish(&self, event: &GovernorEvent) -> usize {
        let mut failures = 0;
        for (_, listener) in &self.listeners {
            match catch_unwind(AssertUnwindSafe(|| listener.on_event(event))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    failures += 1;
                    tracing::warn!(
                        listener = listener.name(),
                        event = event.name(),
                        error = %e,
                        "event listener failed"
                    );
                }
                Err(_) => {
                    failures += 1;
                    tracing::warn!(
                        listener = listener.name(),
                        event = event.name(),
                        "event listener panicked"
                    );
                }
            }
        }
        failures
    }
}

/// Listener that buffers events for later polling.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<GovernorEvent>>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<GovernorEvent>> {
        self.events.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn snapshot(&self) -> Vec<GovernorEvent> {
        self.lock().clone()
    }

    /// Take all buffered events.
    pub fn drain(&self) -> Vec<GovernorEvent> {
        std::mem::take(&mut *self.lock())
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn count(&self, name: &str) -> usize {
        self.lock().iter().filter(|e| e.name() == name).count()
    }
}

impl EventListener for EventLog {
    fn on_event(&self, event: &GovernorEvent) -> ListenerResult {
        self.lock().push(event.clone());
        Ok(())
    }

    fn name(&self) -> &str {
        "event-log"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solved(n: u64) -> GovernorEvent {
        GovernorEvent::TaskSolved {
            tasks_completed: n,
            at: Utc::now(),
        }
    }

    #[test]
    fn delivers_in_registration_order() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut bus = EventBus::new();
        for i in 0..3 {
            let order = order.clone();
            bus.subscribe(Arc::new(move |_: &GovernorEvent| -> ListenerResult {
                order.lock().unwrap().push(i);
                Ok(())
            }));
        }

        bus.publish(&solved(1));

        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn failing_listener_does_not_block_others() {
        let log = EventLog::new();
        let mut bus = EventBus::new();
        bus.subscribe(Arc::new(|_: &GovernorEvent| -> ListenerResult {
            Err("sink offline".into())
        }));
        bus.subscribe(Arc::new(|_: &GovernorEvent| -> ListenerResult {
            panic!("listener bug")
        }));
        bus.subscribe(Arc::new(log.clone()));

        let failures = bus.publish(&solved(1));

        assert_eq!(failures, 2);
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let log = EventLog::new();
        let mut bus = EventBus::new();
        let id = bus.subscribe(Arc::new(log.clone()));

        bus.publish(&solved(1));
        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        bus.publish(&solved(2));

        assert_eq!(log.len(), 1);
        assert!(bus.is_empty());
    }

    #[test]
    fn event_log_drain_empties_buffer() {
        let log = EventLog::new();
        log.on_event(&solved(1)).unwrap();
        log.on_event(&GovernorEvent::TaskSkipped { at: Utc::now() }).unwrap();

        assert_eq!(log.count("TaskSolved"), 1);
        assert_eq!(log.drain().len(), 2);
        assert!(log.is_empty());
    }

    #[test]
    fn serializes_with_type_tag() {
        let json = serde_json::to_value(solved(3)).unwrap();
        assert_eq!(json["type"], "TaskSolved");
        assert_eq!(json["tasks_completed"], 3);
    }
}
