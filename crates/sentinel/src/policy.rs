//! Alerting rule: threshold plus a suppression window of the same size.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use notify::{Notifier, NotifyEvent};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::entity::{Entity, UnitIndex};

/// Payload handed to the alert sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Alert {
    pub entity_id: String,
    pub name: String,
    pub count: u64,
    pub threshold: u64,
    pub unit: UnitIndex,
}

/// Where alerts and summary reports go.
#[async_trait]
pub trait AlertSink: Send + Sync {
    /// Deliver an alert; `false` means delivery failed.
    async fn send(&self, alert: &Alert) -> bool;

    /// Deliver a formatted summary report.
    async fn send_summary(&self, cursor: UnitIndex, threshold: u64, lines: Vec<String>) -> bool;

    /// Announce that monitoring started. Best effort, no delivery result.
    async fn started(&self, _entity_count: usize, _cursor: UnitIndex, _threshold: u64) {}
}

async fn deliver(notifier: &Notifier, event: NotifyEvent) -> bool {
    if !notifier.has_channels() {
        return true;
    }
    let results = notifier.notify_and_wait(event).await;
    let mut delivered = false;
    for (channel, result) in results {
        match result {
            Ok(()) => delivered = true,
            Err(e) => error!(channel = %channel, error = %e, "Alert delivery failed"),
        }
    }
    delivered
}

#[async_trait]
impl AlertSink for Notifier {
    async fn send(&self, alert: &Alert) -> bool {
        if !self.has_channels() {
            warn!(
                entity = %alert.entity_id,
                name = %alert.name,
                count = alert.count,
                threshold = alert.threshold,
                unit = alert.unit,
                "ALERT (no channels configured)"
            );
        }
        deliver(
            self,
            NotifyEvent::EligibilityAlert {
                entity_id: alert.entity_id.clone(),
                name: alert.name.clone(),
                consecutive_units: alert.count,
                threshold: alert.threshold,
                unit: alert.unit,
                timestamp: Utc::now(),
            },
        )
        .await
    }

    async fn send_summary(&self, cursor: UnitIndex, threshold: u64, lines: Vec<String>) -> bool {
        if !self.has_channels() {
            info!(cursor, "Summary (no channels configured):\n{}", lines.join("\n"));
        }
        deliver(
            self,
            NotifyEvent::Summary {
                cursor,
                threshold,
                lines,
                timestamp: Utc::now(),
            },
        )
        .await
    }

    async fn started(&self, entity_count: usize, cursor: UnitIndex, threshold: u64) {
        self.notify(NotifyEvent::MonitorStarted {
            entity_count,
            cursor,
            threshold,
            timestamp: Utc::now(),
        });
    }
}

/// Decides when an entity's eligible run warrants an alert.
pub struct AlertPolicy {
    threshold: u64,
    sink: Arc<dyn AlertSink>,
}

impl AlertPolicy {
    pub fn new(threshold: u64, sink: Arc<dyn AlertSink>) -> Self {
        Self { threshold, sink }
    }

    pub fn threshold(&self) -> u64 {
        self.threshold
    }

    pub fn sink(&self) -> &Arc<dyn AlertSink> {
        &self.sink
    }

    /// Pure firing rule.
    ///
    /// Fires once the run reaches `threshold`, then at most once per
    /// `threshold` units for the same entity.
    #[must_use]
    pub fn should_fire(entity: &Entity, unit: UnitIndex, threshold: u64) -> bool {
        if entity.consecutive_eligible_units < threshold {
            return false;
        }
        entity
            .last_alert_unit
            .is_none_or(|last| unit.saturating_sub(last) >= threshold)
    }

    /// Fire if due: records the alert on the entity, then hands it to the sink.
    ///
    /// The alert counts as sent once attempted; a failed delivery is logged
    /// and not rolled back.
    pub async fn maybe_alert(&self, entity: &mut Entity, unit: UnitIndex) -> bool {
        if !Self::should_fire(entity, unit, self.threshold) {
            return false;
        }

        entity.alerts_sent += 1;
        entity.last_alert_unit = Some(unit);

        let alert = Alert {
            entity_id: entity.id.clone(),
            name: entity.display_name.clone(),
            count: entity.consecutive_eligible_units,
            threshold: self.threshold,
            unit,
        };
        info!(
            entity = %alert.entity_id,
            count = alert.count,
            unit,
            "Eligibility threshold reached, alerting"
        );

        if !self.sink.send(&alert).await {
            warn!(entity = %alert.entity_id, unit, "Alert attempted but not delivered");
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::Mutex;

    const A: &str = "0x00000000000000000000000000000000000000aa";

    #[derive(Default)]
    struct RecordingSink {
        alerts: Mutex<Vec<Alert>>,
        fail: bool,
    }

    #[async_trait]
    impl AlertSink for RecordingSink {
        async fn send(&self, alert: &Alert) -> bool {
            self.alerts.lock().await.push(alert.clone());
            !self.fail
        }

        async fn send_summary(&self, _: UnitIndex, _: u64, _: Vec<String>) -> bool {
            true
        }
    }

    fn eligible_for(count: u64) -> Entity {
        let mut entity = Entity::new(A, Some("alpha".to_string()));
        entity.is_eligible = true;
        entity.consecutive_eligible_units = count;
        entity
    }

    #[test]
    fn test_below_threshold_never_fires() {
        assert!(!AlertPolicy::should_fire(&eligible_for(999), 5000, 1000));
        assert!(AlertPolicy::should_fire(&eligible_for(1000), 5000, 1000));
    }

    #[test]
    fn test_suppression_window_equals_threshold() {
        let mut entity = eligible_for(1500);
        entity.last_alert_unit = Some(10_000);
        assert!(!AlertPolicy::should_fire(&entity, 10_999, 1000));
        assert!(AlertPolicy::should_fire(&entity, 11_000, 1000));
    }

    #[tokio::test]
    async fn test_sustained_run_fires_once_per_window() {
        let sink = Arc::new(RecordingSink::default());
        let policy = AlertPolicy::new(1000, sink.clone());
        let mut entity = eligible_for(0);
        let start = 50_000;

        let mut fired_at = Vec::new();
        for offset in 0..2500 {
            entity.consecutive_eligible_units += 1;
            let unit = start + offset;
            if policy.maybe_alert(&mut entity, unit).await {
                fired_at.push(unit);
            }
        }

        // count reaches 1000 at start+999, then every 1000 units
        assert_eq!(fired_at, vec![start + 999, start + 1999]);
        assert_eq!(entity.alerts_sent, 2);
        assert_eq!(sink.alerts.lock().await.len(), 2);
        assert_eq!(sink.alerts.lock().await[0].count, 1000);
    }

    #[tokio::test]
    async fn test_failed_delivery_still_suppresses() {
        let sink = Arc::new(RecordingSink {
            fail: true,
            ..RecordingSink::default()
        });
        let policy = AlertPolicy::new(3, sink.clone());
        let mut entity = eligible_for(3);

        assert!(policy.maybe_alert(&mut entity, 100).await);
        entity.consecutive_eligible_units += 1;
        assert!(!policy.maybe_alert(&mut entity, 101).await);
        assert_eq!(entity.last_alert_unit, Some(100));
        assert_eq!(entity.alerts_sent, 1);
    }

    #[tokio::test]
    async fn test_notifier_without_channels_counts_as_delivered() {
        let sink: Arc<dyn AlertSink> = Arc::new(Notifier::disabled());
        let alert = Alert {
            entity_id: A.to_string(),
            name: "alpha".to_string(),
            count: 5,
            threshold: 5,
            unit: 1,
        };
        assert!(sink.send(&alert).await);
    }
}
