//! Bounded block-window scanner.
//!
//! Each pass walks the units after the cursor in increasing order, never
//! more than `max_window` of them. Every unit checks all entities
//! concurrently, applies the observations, evaluates alerts and persists
//! the touched records before the cursor moves past it.

use std::ops::RangeInclusive;
use std::sync::Arc;

use futures::future::join_all;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::entity::UnitIndex;
use crate::error::{LedgerError, LedgerResult, Result, SentinelError};
use crate::ledger::LedgerClient;
use crate::policy::AlertPolicy;
use crate::registry::EntityRegistry;
use crate::retry::RetryExecutor;
use crate::store::EntityStore;
use crate::tracker::{EntityStateTracker, Observation, Transition};

/// Outcome of one scan pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScanReport {
    pub head: UnitIndex,
    /// Cursor before the pass.
    pub from: UnitIndex,
    /// Cursor after the pass.
    pub advanced_to: UnitIndex,
    /// Units whose observations were applied.
    pub processed: u64,
    /// Units given up on after exhausting retries.
    pub skipped: Vec<UnitIndex>,
    pub alerts: usize,
    /// Shutdown stopped the pass before the window end.
    pub interrupted: bool,
}

impl ScanReport {
    /// Units still between the cursor and the head.
    #[must_use]
    pub fn backlog(&self) -> u64 {
        self.head.saturating_sub(self.advanced_to)
    }
}

/// Units to scan this pass, or `None` when the cursor is caught up.
#[must_use]
pub fn plan_window(
    cursor: UnitIndex,
    head: UnitIndex,
    max_window: u64,
) -> Option<RangeInclusive<UnitIndex>> {
    if head <= cursor || max_window == 0 {
        return None;
    }
    let window = (head - cursor).min(max_window);
    Some(cursor + 1..=cursor + window)
}

/// Check every entity at `unit` concurrently.
///
/// Any retryable failure fails the whole batch so it is retried together.
/// Fatal per-entity failures become [`Observation::Errored`].
async fn check_all(
    ledger: &dyn LedgerClient,
    ids: &[String],
    unit: UnitIndex,
) -> LedgerResult<Vec<(String, Observation)>> {
    let checks = ids
        .iter()
        .map(|id| async move { (id, ledger.check_eligible(id, unit).await) });
    let results = join_all(checks).await;

    let mut observations = Vec::with_capacity(results.len());
    let mut retryable: Option<LedgerError> = None;
    let mut retryable_count = 0usize;

    for (id, result) in results {
        match result {
            Ok(eligible) => observations.push((id.clone(), Observation::from(eligible))),
            Err(e) if e.is_retryable() => {
                retryable_count += 1;
                retryable.get_or_insert(e);
            }
            Err(e) => {
                warn!(entity = %id, unit, error = %e, "Eligibility check failed");
                observations.push((id.clone(), Observation::Errored(e.message)));
            }
        }
    }

    match retryable {
        Some(e) => Err(LedgerError::retryable(format!(
            "{retryable_count}/{} checks failed: {}",
            ids.len(),
            e.message
        ))),
        None => Ok(observations),
    }
}

/// Drives the tracker, alert policy and store across a bounded unit window.
pub struct WindowScanner {
    registry: EntityRegistry,
    cursor: UnitIndex,
    max_window: u64,
    ledger: Arc<dyn LedgerClient>,
    store: Arc<dyn EntityStore>,
    policy: AlertPolicy,
    retry: RetryExecutor,
    cancel: CancellationToken,
    needs_reload: bool,
}

impl WindowScanner {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        registry: EntityRegistry,
        cursor: UnitIndex,
        max_window: u64,
        ledger: Arc<dyn LedgerClient>,
        store: Arc<dyn EntityStore>,
        policy: AlertPolicy,
        retry: RetryExecutor,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            registry,
            cursor,
            max_window,
            ledger,
            store,
            policy,
            retry,
            cancel,
            needs_reload: false,
        }
    }

    pub fn cursor(&self) -> UnitIndex {
        self.cursor
    }

    pub fn registry(&self) -> &EntityRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut EntityRegistry {
        &mut self.registry
    }

    pub fn threshold(&self) -> u64 {
        self.policy.threshold()
    }

    /// Scan up to `max_window` units after the cursor, bounded by `head`.
    ///
    /// Units that exhaust their retries are skipped and the cursor moves on.
    /// A persistence failure aborts the pass; the next pass reloads state
    /// from the store and repeats the failed unit.
    pub async fn scan(&mut self, head: UnitIndex) -> Result<ScanReport> {
        if self.needs_reload {
            let persisted = self.store.list().await?;
            self.registry.reset_to_persisted(persisted);
            self.needs_reload = false;
        }

        let mut report = ScanReport {
            head,
            from: self.cursor,
            advanced_to: self.cursor,
            ..ScanReport::default()
        };

        let Some(window) = plan_window(self.cursor, head, self.max_window) else {
            debug!(cursor = self.cursor, head, "No new units");
            return Ok(report);
        };
        debug!(from = window.start(), to = window.end(), head, "Scanning window");

        for unit in window {
            if self.cancel.is_cancelled() {
                report.interrupted = true;
                break;
            }

            match self.process_unit(unit).await {
                Ok(alerts) => {
                    report.processed += 1;
                    report.alerts += alerts;
                }
                Err(SentinelError::ShuttingDown) => {
                    report.interrupted = true;
                    break;
                }
                Err(e @ SentinelError::Persistence { .. }) => {
                    self.needs_reload = true;
                    return Err(e);
                }
                Err(e) => {
                    warn!(unit, error = %e, "Skipping unit");
                    report.skipped.push(unit);
                }
            }

            self.cursor = unit;
            report.advanced_to = unit;
        }

        if report.backlog() > 0 && !report.interrupted {
            info!(
                cursor = report.advanced_to,
                head,
                backlog = report.backlog(),
                "Window cap reached, backlog remains"
            );
        }
        Ok(report)
    }

    /// Check, apply, alert and persist one unit. Returns alerts fired.
    async fn process_unit(&mut self, unit: UnitIndex) -> Result<usize> {
        let ids = self.registry.ids();
        if ids.is_empty() {
            return Ok(0);
        }

        let ledger = self.ledger.as_ref();
        let observations = self
            .retry
            .execute(unit, || check_all(ledger, &ids, unit))
            .await?;

        let transitions = EntityStateTracker::apply_unit(&mut self.registry, unit, &observations);
        self.confirm_actions(unit, &transitions).await;

        let mut alerts = 0;
        let mut touched = Vec::with_capacity(transitions.len());
        for (id, transition) in transitions {
            match transition {
                Transition::Stale => continue,
                Transition::Entered | Transition::Continued => {
                    let entity = self.registry.entry_or_default(&id);
                    if self.policy.maybe_alert(entity, unit).await {
                        alerts += 1;
                    }
                }
                Transition::Ended | Transition::Unchanged => {}
            }
            touched.push(id);
        }

        self.persist(unit, &touched).await?;
        Ok(alerts)
    }

    /// Best-effort lookup of whether ended runs were acted upon.
    async fn confirm_actions(&mut self, unit: UnitIndex, transitions: &[(String, Transition)]) {
        let ledger = self.ledger.as_ref();
        let lookups = transitions
            .iter()
            .filter(|(_, t)| *t == Transition::Ended)
            .map(|(id, _)| async move { (id, ledger.confirm_acted(id, unit).await) });

        for (id, result) in join_all(lookups).await {
            match result {
                Ok(true) => {
                    EntityStateTracker::record_acted(self.registry.entry_or_default(id), unit);
                }
                Ok(false) => debug!(entity = %id, unit, "No action recorded"),
                Err(e) => debug!(entity = %id, unit, error = %e, "Action confirmation failed"),
            }
        }
    }

    /// Write every touched record; one failure does not stop the others.
    async fn persist(&self, unit: UnitIndex, ids: &[String]) -> Result<()> {
        let store = self.store.as_ref();
        let writes = ids
            .iter()
            .filter_map(|id| self.registry.get(id))
            .map(|entity| async move { store.upsert(entity).await });

        let mut failures = join_all(writes)
            .await
            .into_iter()
            .filter_map(std::result::Result::err)
            .collect::<Vec<_>>();

        if failures.is_empty() {
            return Ok(());
        }
        for e in &failures {
            warn!(unit, error = %e, "Failed to persist entity");
        }
        Err(SentinelError::Persistence {
            unit,
            failed: failures.len(),
            first: failures.swap_remove(0),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_window_caps_and_noops() {
        assert_eq!(plan_window(100, 100, 50), None);
        assert_eq!(plan_window(100, 90, 50), None);
        assert_eq!(plan_window(100, 103, 50), Some(101..=103));
        assert_eq!(plan_window(100, 10_000, 50), Some(101..=150));
    }

    #[test]
    fn test_window_advance_is_min_of_gap_and_cap() {
        for (gap, cap) in [(1u64, 100u64), (99, 100), (100, 100), (101, 100), (5000, 7)] {
            let window = plan_window(1000, 1000 + gap, cap).unwrap();
            assert_eq!(window.end() - 1000, gap.min(cap));
            assert_eq!(*window.start(), 1001);
        }
    }

    #[test]
    fn test_backlog() {
        let report = ScanReport {
            head: 500,
            advanced_to: 420,
            ..ScanReport::default()
        };
        assert_eq!(report.backlog(), 80);
    }
}
