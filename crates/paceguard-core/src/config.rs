//! TOML-based worker settings.
//!
//! Stores:
//! - The pattern a new governor starts with
//! - Per-field overrides applied on top of that pattern
//! - Alert delivery preferences
//!
//! Settings are stored at `~/.config/paceguard/config.toml`
//! (`paceguard-dev` when `PACEGUARD_ENV=dev`).

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::error::SolveError;
use crate::governor::GovernorBuilder;
use crate::notify::{LogSink, NotificationSink, WebhookSink};
use crate::pattern::{ConfigOverrides, PatternName};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    #[error("Unknown configuration key: {0}")]
    UnknownKey(String),

    #[error("Failed to parse configuration: {0}")]
    ParseFailed(String),
}

impl From<ConfigError> for SolveError {
    fn from(err: ConfigError) -> Self {
        SolveError::configuration(err.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Alerts are also posted here when set.
    #[serde(default)]
    pub webhook_url: Option<String>,
}

fn default_true() -> bool {
    true
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            webhook_url: None,
        }
    }
}

/// Serialized to/from TOML at `~/.config/paceguard/config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub pattern: PatternName,
    #[serde(default)]
    pub overrides: ConfigOverrides,
    #[serde(default)]
    pub notifications: NotificationsConfig,
}

/// Settings directory, created on first use.
pub fn data_dir() -> Result<PathBuf, ConfigError> {
    let base_dir = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config");

    let env = std::env::var("PACEGUARD_ENV").unwrap_or_else(|_| "production".to_string());

    let dir = if env == "dev" {
        base_dir.join("paceguard-dev")
    } else {
        base_dir.join("paceguard")
    };

    std::fs::create_dir_all(&dir).map_err(|e| ConfigError::SaveFailed {
        path: dir.clone(),
        message: e.to_string(),
    })?;
    Ok(dir)
}

impl Settings {
    pub fn path() -> Result<PathBuf, ConfigError> {
        Ok(data_dir()?.join("config.toml"))
    }

    /// Load from the default location, writing defaults if the file is missing.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::path()?)
    }

    /// # Errors
    ///
    /// Fails if the file exists but cannot be read or parsed, or if the
    /// defaults cannot be written.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => {
                toml::from_str(&content).map_err(|e| ConfigError::ParseFailed(e.to_string()))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let settings = Self::default();
                settings.save_to(path)?;
                Ok(settings)
            }
            Err(e) => Err(ConfigError::LoadFailed {
                path: path.to_path_buf(),
                message: e.to_string(),
            }),
        }
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let save_failed = |message: String| ConfigError::SaveFailed {
            path: path.to_path_buf(),
            message,
        };
        let content = toml::to_string_pretty(self).map_err(|e| save_failed(e.to_string()))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| save_failed(e.to_string()))?;
        }
        std::fs::write(path, content).map_err(|e| save_failed(e.to_string()))
    }

    /// Value at a dot-separated key, rendered as a string.
    ///
    /// Unset overrides read as `null`.
    pub fn get(&self, key: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        match value_at(&json, key)? {
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Set a value in memory. Use [`set`](Self::set) to persist as well.
    pub fn set_value(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let mut json =
            serde_json::to_value(&*self).map_err(|e| ConfigError::ParseFailed(e.to_string()))?;
        set_value_at(&mut json, key, value)?;
        let updated: Settings =
            serde_json::from_value(json).map_err(|e| ConfigError::InvalidValue {
                key: key.to_string(),
                message: e.to_string(),
            })?;
        if let Some(url) = &updated.notifications.webhook_url {
            WebhookSink::new(url).map_err(|e| ConfigError::InvalidValue {
                key: key.to_string(),
                message: e.message().to_string(),
            })?;
        }
        *self = updated;
        Ok(())
    }

    /// Set a value by key and save to the default location.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        self.set_value(key, value)?;
        self.save()
    }

    /// Alert sinks selected by `[notifications]`.
    pub fn sinks(&self) -> Result<Vec<Arc<dyn NotificationSink>>, SolveError> {
        if !self.notifications.enabled {
            return Ok(Vec::new());
        }
        let mut sinks: Vec<Arc<dyn NotificationSink>> = vec![Arc::new(LogSink)];
        if let Some(url) = &self.notifications.webhook_url {
            sinks.push(Arc::new(WebhookSink::new(url)?));
        }
        Ok(sinks)
    }

    /// A governor builder preloaded with this pattern, overrides and sinks.
    pub fn governor_builder(&self) -> Result<GovernorBuilder, SolveError> {
        let mut builder = GovernorBuilder::default()
            .pattern(self.pattern)
            .overrides(self.overrides.clone());
        for sink in self.sinks()? {
            builder = builder.sink(sink);
        }
        Ok(builder)
    }
}

fn value_at<'a>(root: &'a Value, key: &str) -> Option<&'a Value> {
    if key.is_empty() {
        return None;
    }
    let mut current = root;
    for part in key.split('.') {
        current = current.get(part)?;
    }
    Some(current)
}

fn set_value_at(root: &mut Value, key: &str, value: &str) -> Result<(), ConfigError> {
    let unknown = || ConfigError::UnknownKey(key.to_string());
    let invalid = |message: String| ConfigError::InvalidValue {
        key: key.to_string(),
        message,
    };

    let mut parts = key.split('.').peekable();
    if key.is_empty() {
        return Err(unknown());
    }

    let mut current = root;
    while let Some(part) = parts.next() {
        if parts.peek().is_some() {
            current = current.get_mut(part).ok_or_else(unknown)?;
            continue;
        }

        let obj = current.as_object_mut().ok_or_else(unknown)?;
        let existing = obj.get(part).ok_or_else(unknown)?;
        let new_value = match existing {
            Value::Bool(_) => Value::Bool(
                value
                    .parse::<bool>()
                    .map_err(|e| invalid(e.to_string()))?,
            ),
            Value::Number(_) => parse_number(value).ok_or_else(|| {
                invalid(format!("cannot parse '{value}' as number"))
            })?,
            Value::Object(_) | Value::Array(_) => {
                serde_json::from_str(value).map_err(|e| invalid(e.to_string()))?
            }
            // Unset optional: infer from the text, "null" clears it.
            Value::Null => infer(value),
            Value::String(_) => Value::String(value.to_string()),
        };
        obj.insert(part.to_string(), new_value);
        return Ok(());
    }

    Err(unknown())
}

fn parse_number(value: &str) -> Option<Value> {
    if let Ok(n) = value.parse::<u64>() {
        return Some(Value::Number(n.into()));
    }
    value
        .parse::<f64>()
        .ok()
        .and_then(serde_json::Number::from_f64)
        .map(Value::Number)
}

fn infer(value: &str) -> Value {
    if value == "null" {
        return Value::Null;
    }
    if let Ok(b) = value.parse::<bool>() {
        return Value::Bool(b);
    }
    parse_number(value).unwrap_or_else(|| Value::String(value.to_string()))
}
