//! Scripted ledger and recording sink shared by the integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use sentinel::{
    Alert, AlertPolicy, AlertSink, EntityRegistry, EntityStore, LedgerClient, LedgerError,
    LedgerResult, RetryConfig, RetryExecutor, UnitIndex, WindowScanner,
};
use tokio_util::sync::CancellationToken;

pub const A: &str = "0x00000000000000000000000000000000000000aa";
pub const B: &str = "0x00000000000000000000000000000000000000bb";
pub const C: &str = "0x00000000000000000000000000000000000000cc";

type EligibilityFn = dyn Fn(&str, UnitIndex) -> bool + Send + Sync;

/// Ledger whose answers come from a closure and a few failure tables.
pub struct ScriptedLedger {
    head: AtomicU64,
    entities: Vec<String>,
    eligibility: Box<EligibilityFn>,
    /// Units where every check fails with a retryable error.
    retryable_units: Mutex<HashSet<UnitIndex>>,
    /// (entity, unit) pairs that fail fatally.
    fatal_checks: Mutex<HashSet<(String, UnitIndex)>>,
    /// (entity, unit) pairs where an action was recorded.
    acted: Mutex<HashSet<(String, UnitIndex)>>,
    fail_confirmations: bool,
    check_delay: Option<Duration>,
    checked: Mutex<HashMap<UnitIndex, usize>>,
    head_calls: AtomicUsize,
}

impl ScriptedLedger {
    pub fn new<F>(head: UnitIndex, entities: &[&str], eligibility: F) -> Self
    where
        F: Fn(&str, UnitIndex) -> bool + Send + Sync + 'static,
    {
        Self {
            head: AtomicU64::new(head),
            entities: entities.iter().map(ToString::to_string).collect(),
            eligibility: Box::new(eligibility),
            retryable_units: Mutex::new(HashSet::new()),
            fatal_checks: Mutex::new(HashSet::new()),
            acted: Mutex::new(HashSet::new()),
            fail_confirmations: false,
            check_delay: None,
            checked: Mutex::new(HashMap::new()),
            head_calls: AtomicUsize::new(0),
        }
    }

    /// Every entity is eligible at every unit.
    pub fn always_eligible(head: UnitIndex, entities: &[&str]) -> Self {
        Self::new(head, entities, |_, _| true)
    }

    pub fn with_check_delay(mut self, delay: Duration) -> Self {
        self.check_delay = Some(delay);
        self
    }

    pub fn with_failing_confirmations(mut self) -> Self {
        self.fail_confirmations = true;
        self
    }

    pub fn set_head(&self, head: UnitIndex) {
        self.head.store(head, Ordering::SeqCst);
    }

    pub fn fail_unit(&self, unit: UnitIndex) {
        self.retryable_units.lock().unwrap().insert(unit);
    }

    pub fn fail_fatally(&self, entity: &str, unit: UnitIndex) {
        self.fatal_checks
            .lock()
            .unwrap()
            .insert((entity.to_string(), unit));
    }

    pub fn record_action(&self, entity: &str, unit: UnitIndex) {
        self.acted.lock().unwrap().insert((entity.to_string(), unit));
    }

    /// Units queried so far, ascending.
    pub fn checked_units(&self) -> Vec<UnitIndex> {
        let mut units: Vec<_> = self.checked.lock().unwrap().keys().copied().collect();
        units.sort_unstable();
        units
    }

    /// Check calls issued for `unit`, retries included.
    pub fn checks_at(&self, unit: UnitIndex) -> usize {
        self.checked
            .lock()
            .unwrap()
            .get(&unit)
            .copied()
            .unwrap_or_default()
    }

    pub fn head_calls(&self) -> usize {
        self.head_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LedgerClient for ScriptedLedger {
    async fn head_unit(&self) -> LedgerResult<UnitIndex> {
        self.head_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.head.load(Ordering::SeqCst))
    }

    async fn list_entities(&self) -> LedgerResult<Vec<String>> {
        Ok(self.entities.clone())
    }

    async fn check_eligible(&self, entity_id: &str, unit: UnitIndex) -> LedgerResult<bool> {
        *self.checked.lock().unwrap().entry(unit).or_default() += 1;
        if let Some(delay) = self.check_delay {
            tokio::time::sleep(delay).await;
        }

        if self.retryable_units.lock().unwrap().contains(&unit) {
            return Err(LedgerError::retryable("HTTP 429 Too Many Requests"));
        }
        if self
            .fatal_checks
            .lock()
            .unwrap()
            .contains(&(entity_id.to_string(), unit))
        {
            return Err(LedgerError::fatal("execution reverted"));
        }
        Ok((self.eligibility)(entity_id, unit))
    }

    async fn confirm_acted(&self, entity_id: &str, unit: UnitIndex) -> LedgerResult<bool> {
        if self.fail_confirmations {
            return Err(LedgerError::retryable("connection reset"));
        }
        Ok(self
            .acted
            .lock()
            .unwrap()
            .contains(&(entity_id.to_string(), unit)))
    }
}

/// Sink that remembers everything it was given.
#[derive(Default)]
pub struct RecordingSink {
    pub alerts: Mutex<Vec<Alert>>,
    pub summaries: Mutex<Vec<Vec<String>>>,
    pub started: AtomicUsize,
}

impl RecordingSink {
    pub fn alerts(&self) -> Vec<Alert> {
        self.alerts.lock().unwrap().clone()
    }

    pub fn alert_units(&self, entity: &str) -> Vec<UnitIndex> {
        self.alerts
            .lock()
            .unwrap()
            .iter()
            .filter(|a| a.entity_id == entity)
            .map(|a| a.unit)
            .collect()
    }
}

#[async_trait]
impl AlertSink for RecordingSink {
    async fn send(&self, alert: &Alert) -> bool {
        self.alerts.lock().unwrap().push(alert.clone());
        true
    }

    async fn send_summary(&self, _cursor: UnitIndex, _threshold: u64, lines: Vec<String>) -> bool {
        self.summaries.lock().unwrap().push(lines);
        true
    }

    async fn started(&self, _entity_count: usize, _cursor: UnitIndex, _threshold: u64) {
        self.started.fetch_add(1, Ordering::SeqCst);
    }
}

/// Scanner over `entities` starting at `cursor`.
pub fn scanner(
    ledger: Arc<ScriptedLedger>,
    store: Arc<dyn EntityStore>,
    sink: Arc<RecordingSink>,
    entities: &[&str],
    cursor: UnitIndex,
    threshold: u64,
    max_window: u64,
) -> WindowScanner {
    let mut registry = EntityRegistry::new();
    registry.add_discovered(entities.iter().map(ToString::to_string));
    WindowScanner::new(
        registry,
        cursor,
        max_window,
        ledger,
        store,
        AlertPolicy::new(threshold, sink),
        RetryExecutor::new(RetryConfig::default(), CancellationToken::new()),
        CancellationToken::new(),
    )
}
