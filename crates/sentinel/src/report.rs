//! Status snapshots and the human-readable summary report.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::warn;

use crate::entity::{Entity, UnitIndex};
use crate::error::Result;
use crate::policy::AlertSink;
use crate::scanner::ScanReport;
use crate::store::EntityStore;

/// Lifecycle of the monitor scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerState {
    Initializing,
    Idle,
    Ticking,
    Stopped,
}

impl std::fmt::Display for SchedulerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Initializing => "initializing",
            Self::Idle => "idle",
            Self::Ticking => "ticking",
            Self::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// Per-entity view exposed by status queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntitySummary {
    pub id: String,
    pub name: String,
    pub is_eligible: bool,
    pub consecutive_eligible_units: u64,
    pub alerts_sent: u64,
    pub last_alert_unit: Option<UnitIndex>,
    pub last_checked_unit: Option<UnitIndex>,
    pub last_acted_unit: Option<UnitIndex>,
}

impl From<&Entity> for EntitySummary {
    fn from(entity: &Entity) -> Self {
        Self {
            id: entity.id.clone(),
            name: entity.display_name.clone(),
            is_eligible: entity.is_eligible,
            consecutive_eligible_units: entity.consecutive_eligible_units,
            alerts_sent: entity.alerts_sent,
            last_alert_unit: entity.last_alert_unit,
            last_checked_unit: entity.last_checked_unit,
            last_acted_unit: entity.last_acted_unit,
        }
    }
}

/// Point-in-time view of the monitor.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSnapshot {
    pub state: SchedulerState,
    pub cursor: Option<UnitIndex>,
    pub last_head: Option<UnitIndex>,
    pub threshold: u64,
    pub ticks: u64,
    pub last_tick_at: Option<DateTime<Utc>>,
    pub last_report: Option<ScanReport>,
    pub last_error: Option<String>,
    pub entities: Vec<EntitySummary>,
}

impl StatusSnapshot {
    pub fn initializing(threshold: u64) -> Self {
        Self {
            state: SchedulerState::Initializing,
            cursor: None,
            last_head: None,
            threshold,
            ticks: 0,
            last_tick_at: None,
            last_report: None,
            last_error: None,
            entities: Vec::new(),
        }
    }
}

/// One line per entity.
pub fn summary_lines(entities: &[EntitySummary]) -> Vec<String> {
    entities
        .iter()
        .map(|e| {
            let state = if e.is_eligible {
                "ELIGIBLE"
            } else {
                "not eligible"
            };
            let last_alert = e
                .last_alert_unit
                .map_or_else(|| "never".to_string(), |u| u.to_string());
            format!(
                "{} ({}): {state}, run {} units, {} alert(s), last alert {last_alert}",
                e.name, e.id, e.consecutive_eligible_units, e.alerts_sent
            )
        })
        .collect()
}

/// Formatted summary of persisted entity state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SummaryReport {
    pub cursor: Option<UnitIndex>,
    pub threshold: u64,
    pub lines: Vec<String>,
}

impl SummaryReport {
    /// Build from persisted records; the cursor is the highest checked unit.
    pub fn from_entities(entities: &[Entity], threshold: u64) -> Self {
        let summaries: Vec<EntitySummary> = entities.iter().map(EntitySummary::from).collect();
        Self {
            cursor: entities.iter().filter_map(|e| e.last_checked_unit).max(),
            threshold,
            lines: summary_lines(&summaries),
        }
    }

    pub fn render(&self) -> String {
        let cursor = self
            .cursor
            .map_or_else(|| "none".to_string(), |c| c.to_string());
        let mut out = format!(
            "Sentinel summary: cursor {cursor}, threshold {} units, {} entities\n",
            self.threshold,
            self.lines.len()
        );
        for line in &self.lines {
            out.push_str("  ");
            out.push_str(line);
            out.push('\n');
        }
        out
    }
}

/// Read every persisted entity, format the report and hand it to the sink.
pub async fn send_summary(
    store: &dyn EntityStore,
    sink: &dyn AlertSink,
    threshold: u64,
) -> Result<SummaryReport> {
    let entities = store.list().await?;
    let report = SummaryReport::from_entities(&entities, threshold);
    if !sink
        .send_summary(report.cursor.unwrap_or_default(), threshold, report.lines.clone())
        .await
    {
        warn!("Summary report not delivered");
    }
    Ok(report)
}
