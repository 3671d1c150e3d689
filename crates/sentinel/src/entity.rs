//! Monitored entity record.

use serde::{Deserialize, Serialize};

/// Index of one unit of ledger progress (a block).
pub type UnitIndex = u64;

/// Check that an entity id is a `0x`-prefixed 20-byte hex address.
#[must_use]
pub fn is_valid_entity_id(id: &str) -> bool {
    id.strip_prefix("0x")
        .is_some_and(|hex| hex.len() == 40 && hex.chars().all(|c| c.is_ascii_hexdigit()))
}

/// Lowercase an id so lookups do not depend on checksum casing.
#[must_use]
pub fn normalize_entity_id(id: &str) -> String {
    id.trim().to_ascii_lowercase()
}

/// Short label used when no display name was configured, e.g. `0x1234...abcd`.
#[must_use]
pub fn default_display_name(id: &str) -> String {
    if id.len() <= 12 || !id.is_ascii() {
        return id.to_string();
    }
    format!("{}...{}", &id[..6], &id[id.len() - 4..])
}

/// One monitored entity and its eligibility history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entity {
    pub id: String,
    pub display_name: String,
    /// Last observed eligibility.
    #[serde(default)]
    pub is_eligible: bool,
    /// Length of the current unbroken run of eligible observations.
    #[serde(default)]
    pub consecutive_eligible_units: u64,
    /// Unit of the last applied observation; `None` until first observed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_checked_unit: Option<UnitIndex>,
    /// Unit at which an action was confirmed after an eligible run ended.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_acted_unit: Option<UnitIndex>,
    /// Alerts ever attempted for this entity.
    #[serde(default)]
    pub alerts_sent: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_alert_unit: Option<UnitIndex>,
}

impl Entity {
    /// Fresh, never-observed entity.
    pub fn new(id: impl Into<String>, display_name: Option<String>) -> Self {
        let id = id.into();
        let display_name = display_name
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| default_display_name(&id));
        Self {
            id,
            display_name,
            is_eligible: false,
            consecutive_eligible_units: 0,
            last_checked_unit: None,
            last_acted_unit: None,
            alerts_sent: 0,
            last_alert_unit: None,
        }
    }

    /// Whether an observation for `unit` was already applied.
    #[must_use]
    pub fn has_observed(&self, unit: UnitIndex) -> bool {
        self.last_checked_unit.is_some_and(|last| unit <= last)
    }
}
