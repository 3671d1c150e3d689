//! Monitor configuration.
//!
//! Built once at startup from defaults, an optional TOML file and CLI/env
//! overrides, validated, then shared read-only with every component.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::entity::{is_valid_entity_id, normalize_entity_id};
use crate::error::{Result, SentinelError};

/// Consecutive eligible units before an alert fires.
pub const DEFAULT_ALERT_THRESHOLD: u64 = 1000;

/// Hard cap on units scanned per tick.
pub const DEFAULT_MAX_WINDOW: u64 = 100;

/// Seconds between scheduler ticks.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 12;

/// Per-request timeout for ledger calls.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Retry policy for one unit of work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetryConfig {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Backoff base; delay is `base^(attempt + offset)` seconds.
    pub base: u64,
    pub offset: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base: 3,
            offset: 4,
        }
    }
}

/// A statically configured entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EntityConfig {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// Webhook targets for the alert sink.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NotificationConfig {
    pub slack_webhook_url: Option<String>,
    pub discord_webhook_url: Option<String>,
}

/// Full monitor configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MonitorConfig {
    /// JSON-RPC endpoint of the ledger node.
    pub rpc_url: String,
    /// Contract answering `isEligible(address)` and `listEntities()`.
    pub checker_address: String,
    /// Event topic emitted when an entity was acted upon.
    pub action_topic: Option<String>,
    /// Entities to monitor; empty means discover them from the ledger.
    pub entities: Vec<EntityConfig>,
    pub alert_threshold: u64,
    pub max_window: u64,
    pub poll_interval_secs: u64,
    pub request_timeout_secs: u64,
    pub retry: RetryConfig,
    /// Directory holding persisted entity records.
    pub state_dir: PathBuf,
    /// Resume from the highest persisted unit instead of the chain head.
    pub resume_from_store: bool,
    /// Re-list entities every N ticks in discovery mode (0 disables).
    pub rediscover_every_ticks: u32,
    /// Port for the HTTP control server; disabled when unset.
    pub http_port: Option<u16>,
    pub notifications: NotificationConfig,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            rpc_url: String::new(),
            checker_address: String::new(),
            action_topic: None,
            entities: Vec::new(),
            alert_threshold: DEFAULT_ALERT_THRESHOLD,
            max_window: DEFAULT_MAX_WINDOW,
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            retry: RetryConfig::default(),
            state_dir: PathBuf::from("./sentinel-state"),
            resume_from_store: true,
            rediscover_every_ticks: 0,
            http_port: None,
            notifications: NotificationConfig::default(),
        }
    }
}

/// Values supplied on the command line or through the environment.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub rpc_url: Option<String>,
    pub checker_address: Option<String>,
    pub state_dir: Option<PathBuf>,
    pub alert_threshold: Option<u64>,
    pub max_window: Option<u64>,
    pub poll_interval_secs: Option<u64>,
    pub http_port: Option<u16>,
    pub slack_webhook_url: Option<String>,
    pub discord_webhook_url: Option<String>,
}

impl MonitorConfig {
    /// Load defaults, then the TOML file at `path` if one is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };

        let content = std::fs::read_to_string(path).map_err(|e| {
            SentinelError::config(format!("cannot read '{}': {e}", path.display()))
        })?;
        Self::from_toml(&content)
            .map_err(|e| SentinelError::config(format!("'{}': {e}", path.display())))
    }

    /// Parse a TOML document on top of the defaults.
    pub fn from_toml(content: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Apply overrides; set values win over file values.
    #[must_use]
    pub fn with_overrides(mut self, overrides: ConfigOverrides) -> Self {
        if let Some(v) = overrides.rpc_url {
            self.rpc_url = v;
        }
        if let Some(v) = overrides.checker_address {
            self.checker_address = v;
        }
        if let Some(v) = overrides.state_dir {
            self.state_dir = v;
        }
        if let Some(v) = overrides.alert_threshold {
            self.alert_threshold = v;
        }
        if let Some(v) = overrides.max_window {
            self.max_window = v;
        }
        if let Some(v) = overrides.poll_interval_secs {
            self.poll_interval_secs = v;
        }
        if overrides.http_port.is_some() {
            self.http_port = overrides.http_port;
        }
        if overrides.slack_webhook_url.is_some() {
            self.notifications.slack_webhook_url = overrides.slack_webhook_url;
        }
        if overrides.discord_webhook_url.is_some() {
            self.notifications.discord_webhook_url = overrides.discord_webhook_url;
        }
        self.normalize()
    }

    /// Lowercase addresses so ids compare equal regardless of checksum casing.
    fn normalize(mut self) -> Self {
        self.checker_address = normalize_entity_id(&self.checker_address);
        for entity in &mut self.entities {
            entity.id = normalize_entity_id(&entity.id);
        }
        self.action_topic = self
            .action_topic
            .map(|topic| topic.trim().to_ascii_lowercase())
            .filter(|topic| !topic.is_empty());
        self
    }

    /// Validate scanning and alerting settings.
    pub fn validate(&self) -> Result<()> {
        if self.alert_threshold == 0 {
            return Err(SentinelError::config("alert_threshold must be at least 1"));
        }
        if self.max_window == 0 {
            return Err(SentinelError::config("max_window must be at least 1"));
        }
        if self.poll_interval_secs == 0 {
            return Err(SentinelError::config("poll_interval_secs must be at least 1"));
        }
        if self.request_timeout_secs == 0 {
            return Err(SentinelError::config(
                "request_timeout_secs must be at least 1",
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(SentinelError::config("retry.max_attempts must be at least 1"));
        }
        if self.retry.base < 2 {
            return Err(SentinelError::config("retry.base must be at least 2"));
        }
        // 3^40 seconds is already far beyond any sane backoff.
        let exponent = self.retry.offset.checked_add(self.retry.max_attempts);
        if exponent.is_none_or(|e| e > 40) {
            return Err(SentinelError::config(
                "retry.offset + retry.max_attempts must not exceed 40",
            ));
        }

        let mut seen = HashSet::new();
        for entity in &self.entities {
            if !is_valid_entity_id(&entity.id) {
                return Err(SentinelError::config(format!(
                    "malformed entity id '{}': expected 0x followed by 40 hex digits",
                    entity.id
                )));
            }
            if !seen.insert(entity.id.as_str()) {
                return Err(SentinelError::config(format!(
                    "duplicate entity id '{}'",
                    entity.id
                )));
            }
        }
        Ok(())
    }

    /// Validate the settings needed to talk to the ledger.
    pub fn validate_ledger(&self) -> Result<()> {
        if self.rpc_url.trim().is_empty() {
            return Err(SentinelError::config("rpc_url is required"));
        }
        if !self.rpc_url.starts_with("http://") && !self.rpc_url.starts_with("https://") {
            return Err(SentinelError::config(format!(
                "rpc_url '{}' must be an http(s) URL",
                self.rpc_url
            )));
        }
        if !is_valid_entity_id(&self.checker_address) {
            return Err(SentinelError::config(format!(
                "malformed checker_address '{}'",
                self.checker_address
            )));
        }
        if let Some(topic) = &self.action_topic {
            let valid = topic
                .strip_prefix("0x")
                .is_some_and(|hex| hex.len() == 64 && hex.chars().all(|c| c.is_ascii_hexdigit()));
            if !valid {
                return Err(SentinelError::config(format!(
                    "malformed action_topic '{topic}': expected 0x followed by 64 hex digits"
                )));
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Whether entities come from the ledger rather than the config.
    #[must_use]
    pub fn discovery_mode(&self) -> bool {
        self.entities.is_empty()
    }
}
