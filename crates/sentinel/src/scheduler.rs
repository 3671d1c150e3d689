//! Tick scheduling with at most one tick in flight.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{watch, Mutex};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::MonitorConfig;
use crate::entity::UnitIndex;
use crate::error::{Result, SentinelError};
use crate::ledger::LedgerClient;
use crate::policy::{AlertPolicy, AlertSink};
use crate::registry::EntityRegistry;
use crate::report::{self, EntitySummary, SchedulerState, StatusSnapshot, SummaryReport};
use crate::retry::RetryExecutor;
use crate::scanner::{ScanReport, WindowScanner};
use crate::store::EntityStore;

/// What asked for a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickTrigger {
    /// Interval timer; dropped when a tick is already running.
    Timer,
    /// Force check; waits for any running tick, then runs.
    Manual,
}

/// Owns the scanner and drives it on a fixed interval.
pub struct MonitorScheduler {
    config: MonitorConfig,
    ledger: Arc<dyn LedgerClient>,
    store: Arc<dyn EntityStore>,
    sink: Arc<dyn AlertSink>,
    retry: RetryExecutor,
    cancel: CancellationToken,
    scanner: Mutex<Option<WindowScanner>>,
    status: watch::Sender<StatusSnapshot>,
    ticks: AtomicU64,
}

impl MonitorScheduler {
    pub fn new(
        config: MonitorConfig,
        ledger: Arc<dyn LedgerClient>,
        store: Arc<dyn EntityStore>,
        sink: Arc<dyn AlertSink>,
        cancel: CancellationToken,
    ) -> Self {
        let retry = RetryExecutor::new(config.retry.clone(), cancel.clone());
        let (status, _) = watch::channel(StatusSnapshot::initializing(config.alert_threshold));
        Self {
            config,
            ledger,
            store,
            sink,
            retry,
            cancel,
            scanner: Mutex::new(None),
            status,
            ticks: AtomicU64::new(0),
        }
    }

    /// Populate the registry, merge persisted state and place the cursor.
    ///
    /// Ledger calls go through the retry executor; exhaustion aborts startup.
    pub async fn initialize(&self) -> Result<()> {
        let mut registry = if self.config.discovery_mode() {
            let ids = self
                .retry
                .execute(0, || self.ledger.list_entities())
                .await?;
            let mut registry = EntityRegistry::new();
            let added = registry.add_discovered(ids);
            info!(added, "Discovered entities from ledger");
            registry
        } else {
            EntityRegistry::from_config(&self.config.entities)
        };

        let persisted = self.store.list().await?;
        let merged = registry.merge_persisted(persisted);

        let head = self.retry.execute(0, || self.ledger.head_unit()).await?;
        let cursor = match registry.max_last_checked() {
            Some(last) if self.config.resume_from_store => last.min(head),
            _ => head,
        };

        info!(
            entities = registry.len(),
            merged,
            head,
            cursor,
            threshold = self.config.alert_threshold,
            max_window = self.config.max_window,
            "Monitor initialized"
        );

        let entity_count = registry.len();
        let scanner = WindowScanner::new(
            registry,
            cursor,
            self.config.max_window,
            self.ledger.clone(),
            self.store.clone(),
            AlertPolicy::new(self.config.alert_threshold, self.sink.clone()),
            self.retry.clone(),
            self.cancel.clone(),
        );

        {
            let mut slot = self.scanner.lock().await;
            self.publish(&scanner, SchedulerState::Idle, Some(head), None, None);
            *slot = Some(scanner);
        }

        self.sink
            .started(entity_count, cursor, self.config.alert_threshold)
            .await;
        Ok(())
    }

    /// Run one tick. Returns `None` when a timer tick was dropped.
    pub async fn tick(&self, trigger: TickTrigger) -> Result<Option<ScanReport>> {
        let mut guard = match trigger {
            TickTrigger::Timer => {
                if let Ok(guard) = self.scanner.try_lock() {
                    guard
                } else {
                    debug!("Tick already in flight, dropping timer fire");
                    return Ok(None);
                }
            }
            TickTrigger::Manual => self.scanner.lock().await,
        };
        let Some(scanner) = guard.as_mut() else {
            return Err(SentinelError::NotInitialized);
        };
        if self.cancel.is_cancelled() {
            return Err(SentinelError::ShuttingDown);
        }

        self.status.send_modify(|s| s.state = SchedulerState::Ticking);
        let tick = self.ticks.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(tick, ?trigger, cursor = scanner.cursor(), "Tick started");

        self.maybe_rediscover(scanner, tick).await;

        let result = match self
            .retry
            .execute(scanner.cursor(), || self.ledger.head_unit())
            .await
        {
            Ok(head) => scanner.scan(head).await,
            Err(e) => Err(e),
        };

        let next = if self.cancel.is_cancelled() {
            SchedulerState::Stopped
        } else {
            SchedulerState::Idle
        };
        match &result {
            Ok(report) => {
                info!(
                    tick,
                    from = report.from,
                    to = report.advanced_to,
                    head = report.head,
                    processed = report.processed,
                    skipped = report.skipped.len(),
                    alerts = report.alerts,
                    backlog = report.backlog(),
                    "Tick complete"
                );
                self.publish(scanner, next, Some(report.head), Some(report.clone()), None);
            }
            Err(e) => {
                error!(tick, error = %e, "Tick failed");
                self.publish(scanner, next, None, None, Some(e.to_string()));
            }
        }

        result.map(Some)
    }

    /// Periodically pick up entities added to the ledger.
    async fn maybe_rediscover(&self, scanner: &mut WindowScanner, tick: u64) {
        let every = u64::from(self.config.rediscover_every_ticks);
        if every == 0 || !self.config.discovery_mode() || tick % every != 0 {
            return;
        }
        match self
            .retry
            .execute(scanner.cursor(), || self.ledger.list_entities())
            .await
        {
            Ok(ids) => {
                let added = scanner.registry_mut().add_discovered(ids);
                if added > 0 {
                    info!(added, "Discovered new entities");
                }
            }
            Err(e) => warn!(error = %e, "Entity rediscovery failed"),
        }
    }

    /// Tick on the configured interval until shutdown.
    pub async fn run(&self) {
        let mut interval = tokio::time::interval(self.config.poll_interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(
            interval_secs = self.config.poll_interval_secs,
            "Scheduler running"
        );

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => break,
                _ = interval.tick() => {
                    // tick failures are logged where they happen
                    if let Err(SentinelError::NotInitialized) = self.tick(TickTrigger::Timer).await {
                        warn!("Timer fired before initialization");
                    }
                }
            }
        }

        self.shutdown().await;
    }

    /// Stop the timer and wait for any in-flight tick to reach a unit boundary.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let _guard = self.scanner.lock().await;
        self.status.send_modify(|s| s.state = SchedulerState::Stopped);
        info!("Scheduler stopped");
    }

    /// Read persisted state, format it and deliver it through the sink.
    pub async fn send_summary(&self) -> Result<SummaryReport> {
        report::send_summary(
            self.store.as_ref(),
            self.sink.as_ref(),
            self.config.alert_threshold,
        )
        .await
    }

    pub fn status(&self) -> StatusSnapshot {
        self.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<StatusSnapshot> {
        self.status.subscribe()
    }

    pub fn state(&self) -> SchedulerState {
        self.status.borrow().state
    }

    pub fn is_initialized(&self) -> bool {
        !matches!(self.state(), SchedulerState::Initializing)
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn cursor(&self) -> Option<UnitIndex> {
        self.status.borrow().cursor
    }

    fn publish(
        &self,
        scanner: &WindowScanner,
        state: SchedulerState,
        head: Option<UnitIndex>,
        report: Option<ScanReport>,
        error: Option<String>,
    ) {
        let entities: Vec<EntitySummary> = scanner
            .registry()
            .entities()
            .map(EntitySummary::from)
            .collect();
        let ticks = self.ticks.load(Ordering::SeqCst);
        self.status.send_modify(|s| {
            s.state = state;
            s.cursor = Some(scanner.cursor());
            if head.is_some() {
                s.last_head = head;
            }
            s.threshold = scanner.threshold();
            s.ticks = ticks;
            if ticks > 0 {
                s.last_tick_at = Some(Utc::now());
            }
            if report.is_some() {
                s.last_report = report;
            }
            s.last_error = error;
            s.entities = entities;
        });
    }
}
