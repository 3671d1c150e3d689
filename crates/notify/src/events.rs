//! Notification event types for the sentinel monitor.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Severity levels for alerts and notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational - normal operations
    Info,
    /// Critical - immediate action required
    Critical,
}

impl Severity {
    /// Get the Discord embed color for this severity.
    #[must_use]
    pub const fn color(&self) -> u32 {
        match self {
            Self::Info => 0x0034_98db,     // Blue
            Self::Critical => 0x00e7_4c3c, // Red
        }
    }

    /// Get display name for this severity.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "Info",
            Self::Critical => "Critical",
        }
    }
}

/// Events that can trigger notifications.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotifyEvent {
    // =========================================================================
    // Monitor lifecycle
    // =========================================================================
    /// The monitor finished initialization and is about to start ticking
    MonitorStarted {
        entity_count: usize,
        cursor: u64,
        threshold: u64,
        #[serde(default = "Utc::now")]
        timestamp: DateTime<Utc>,
    },

    // =========================================================================
    // Eligibility events
    // =========================================================================
    /// An entity stayed eligible for at least `threshold` consecutive units
    EligibilityAlert {
        entity_id: String,
        name: String,
        consecutive_units: u64,
        threshold: u64,
        unit: u64,
        #[serde(default = "Utc::now")]
        timestamp: DateTime<Utc>,
    },

    /// Periodic or on-demand report over all monitored entities
    Summary {
        cursor: u64,
        threshold: u64,
        lines: Vec<String>,
        #[serde(default = "Utc::now")]
        timestamp: DateTime<Utc>,
    },
}

impl NotifyEvent {
    /// Get a short title for this event type.
    #[must_use]
    pub fn title(&self) -> String {
        match self {
            Self::MonitorStarted { entity_count, .. } => {
                format!("Monitor Started: {entity_count} entities")
            }
            Self::EligibilityAlert {
                name,
                consecutive_units,
                ..
            } => format!("Eligible for {consecutive_units} units: {name}"),
            Self::Summary { cursor, .. } => format!("Summary at unit {cursor}"),
        }
    }

    /// Get the severity/color for this event.
    #[must_use]
    pub const fn severity(&self) -> Severity {
        match self {
            Self::MonitorStarted { .. } | Self::Summary { .. } => Severity::Info,
            Self::EligibilityAlert { .. } => Severity::Critical,
        }
    }

    /// Get the timestamp for this event.
    #[must_use]
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::MonitorStarted { timestamp, .. }
            | Self::EligibilityAlert { timestamp, .. }
            | Self::Summary { timestamp, .. } => *timestamp,
        }
    }

    /// Plain-text body shared by all channels.
    #[must_use]
    pub fn description(&self) -> String {
        match self {
            Self::MonitorStarted {
                entity_count,
                cursor,
                threshold,
                ..
            } => format!(
                "Watching {entity_count} entities from unit {cursor} (alert threshold {threshold})"
            ),
            Self::EligibilityAlert {
                entity_id,
                consecutive_units,
                threshold,
                unit,
                ..
            } => format!(
                "`{entity_id}` has been eligible for {consecutive_units} consecutive units \
                 (threshold {threshold}) as of unit {unit}"
            ),
            Self::Summary { lines, .. } => {
                if lines.is_empty() {
                    "No entities monitored".to_string()
                } else {
                    lines.join("\n")
                }
            }
        }
    }

    /// Key/value fields rendered next to the body.
    #[must_use]
    pub fn fields(&self) -> Vec<(String, String)> {
        match self {
            Self::MonitorStarted {
                entity_count,
                cursor,
                threshold,
                ..
            } => vec![
                ("Entities".to_string(), entity_count.to_string()),
                ("Cursor".to_string(), cursor.to_string()),
                ("Threshold".to_string(), threshold.to_string()),
            ],
            Self::EligibilityAlert {
                entity_id,
                consecutive_units,
                threshold,
                unit,
                ..
            } => vec![
                ("Entity".to_string(), entity_id.clone()),
                ("Consecutive".to_string(), consecutive_units.to_string()),
                ("Threshold".to_string(), threshold.to_string()),
                ("Unit".to_string(), unit.to_string()),
            ],
            Self::Summary {
                cursor, threshold, ..
            } => vec![
                ("Cursor".to_string(), cursor.to_string()),
                ("Threshold".to_string(), threshold.to_string()),
            ],
        }
    }
}
