//! Alerts for operators.
//!
//! Delivery is fire-and-forget: a sink never blocks the governor and never
//! hands an error back. Failures are logged.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::error::SolveError;
use crate::events::{EventListener, GovernorEvent, ListenerResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub level: AlertLevel,
    pub title: String,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl Alert {
    pub fn new(level: AlertLevel, title: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            level,
            title: title.into(),
            text: text.into(),
            timestamp: Utc::now(),
        }
    }

    /// Set the timestamp (defaults to now).
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

pub trait NotificationSink: Send + Sync {
    fn name(&self) -> &str;

    /// Queue `alert` for delivery. Must not block or fail.
    fn notify(&self, alert: Alert);
}

/// Writes alerts to the tracing log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl NotificationSink for LogSink {
    fn name(&self) -> &str {
        "log"
    }

    fn notify(&self, alert: Alert) {
        match alert.level {
            AlertLevel::Info => tracing::info!(title = %alert.title, "{}", alert.text),
            AlertLevel::Warning => tracing::warn!(title = %alert.title, "{}", alert.text),
            AlertLevel::Error => tracing::error!(title = %alert.title, "{}", alert.text),
        }
    }
}

#[derive(Error, Debug)]
pub enum WebhookError {
    #[error("webhook request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("webhook error (HTTP {status}): {body}")]
    Status { status: u16, body: String },
}

/// Posts alerts as JSON to a webhook URL.
#[derive(Debug, Clone)]
pub struct WebhookSink {
    url: Url,
    client: Client,
}

impl WebhookSink {
    /// # Errors
    ///
    /// `CONFIGURATION_ERROR` when `url` is not an absolute http(s) URL.
    pub fn new(url: &str) -> Result<Self, SolveError> {
        let parsed = Url::parse(url).map_err(|e| {
            SolveError::configuration(format!("invalid webhook URL: {e}")).with_context("url", url)
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(SolveError::configuration(format!(
                "webhook URL must use http or https, got '{}'",
                parsed.scheme()
            ))
            .with_context("url", url));
        }
        Ok(Self {
            url: parsed,
            client: Client::new(),
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Post `alert` and wait for the response.
    pub async fn deliver(&self, alert: &Alert) -> Result<(), WebhookError> {
        let resp = self.client.post(self.url.clone()).json(alert).send().await?;
        let status = resp.status();
        if status.is_success() {
            Ok(())
        } else {
            let body = resp.text().await.unwrap_or_default();
            Err(WebhookError::Status {
                status: status.as_u16(),
                body,
            })
        }
    }
}

impl NotificationSink for WebhookSink {
    fn name(&self) -> &str {
        "webhook"
    }

    fn notify(&self, alert: Alert) {
        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                tracing::warn!(title = %alert.title, "no async runtime, dropping webhook alert");
                return;
            }
        };
        let sink = self.clone();
        handle.spawn(async move {
            if let Err(e) = sink.deliver(&alert).await {
                tracing::warn!(url = %sink.url, error = %e, "webhook delivery failed");
            }
        });
    }
}

/// Turns governor events into alerts and fans them out to sinks.
#[derive(Clone, Default)]
pub struct AlertForwarder {
    sinks: Vec<Arc<dyn NotificationSink>>,
}

impl std::fmt::Debug for AlertForwarder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.sinks.iter().map(|s| s.name()).collect();
        f.debug_struct("AlertForwarder").field("sinks", &names).finish()
    }
}

impl AlertForwarder {
    pub fn new(sinks: Vec<Arc<dyn NotificationSink>>) -> Self {
        Self { sinks }
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    /// The alert an event maps to, if any.
    pub fn alert_for(event: &GovernorEvent) -> Option<Alert> {
        let alert = match event {
            GovernorEvent::BreakStarted { duration_ms, .. } => Alert::new(
                AlertLevel::Info,
                "Break started",
                format!("Pausing for {} min", duration_ms / 60_000),
            ),
            GovernorEvent::BreakEnded { break_count, .. } => Alert::new(
                AlertLevel::Info,
                "Break finished",
                format!("Resuming work after break #{break_count}"),
            ),
            GovernorEvent::OutsideWorkHours {
                hour,
                start_hour,
                end_hour,
                ..
            } => Alert::new(
                AlertLevel::Warning,
                "Outside work hours",
                format!("Hour {hour} is outside {start_hour:02}:00-{end_hour:02}:00"),
            ),
            GovernorEvent::MaxWorkTimeExceeded {
                elapsed_ms,
                limit_ms,
                ..
            } => Alert::new(
                AlertLevel::Warning,
                "Work time limit reached",
                format!(
                    "Worked {} min of {} min allowed",
                    elapsed_ms / 60_000,
                    limit_ms / 60_000
                ),
            ),
            GovernorEvent::MaxTasksExceeded {
                tasks_completed,
                limit,
                ..
            } => Alert::new(
                AlertLevel::Warning,
                "Task quota reached",
                format!("{tasks_completed} of {limit} tasks completed"),
            ),
            GovernorEvent::SessionReset { session_id, .. } => Alert::new(
                AlertLevel::Info,
                "Session reset",
                format!("New session {session_id}"),
            ),
            GovernorEvent::PatternSwitched { from, to, .. } => Alert::new(
                AlertLevel::Info,
                "Pattern switched",
                format!("{from} -> {to}"),
            ),
            _ => return None,
        };
        Some(alert.at(event.at()))
    }
}

impl EventListener for AlertForwarder {
    fn on_event(&self, event: &GovernorEvent) -> ListenerResult {
        if let Some(alert) = Self::alert_for(event) {
            for sink in &self.sinks {
                sink.notify(alert.clone());
            }
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "alert-forwarder"
    }
}
