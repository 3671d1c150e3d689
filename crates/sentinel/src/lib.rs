//! Sentinel: watches a bounded set of ledger entities block by block and
//! alerts when one stays eligible for an action too long.
//!
//! Each scheduler tick reads the ledger head and scans a capped window of
//! new blocks. Every entity is checked concurrently per block, its run of
//! consecutive eligible blocks is updated and persisted, and an alert is
//! raised once the run reaches the configured threshold, then at most once
//! per threshold-sized span.
//!
//! # Example
//!
//! ```rust,ignore
//! use sentinel::{MonitorConfig, MonitorScheduler, RpcLedgerClient, FileStore};
//!
//! let scheduler = MonitorScheduler::new(config, ledger, store, sink, cancel);
//! scheduler.initialize().await?;
//! scheduler.run().await;
//! ```

pub mod config;
pub mod entity;
pub mod error;
pub mod ledger;
pub mod policy;
pub mod registry;
pub mod report;
pub mod retry;
pub mod scanner;
pub mod scheduler;
pub mod server;
pub mod store;
pub mod tracker;

pub use config::{ConfigOverrides, EntityConfig, MonitorConfig, NotificationConfig, RetryConfig};
pub use entity::{Entity, UnitIndex};
pub use error::{ErrorKind, LedgerError, LedgerResult, Result, SentinelError, StoreError};
pub use ledger::{LedgerClient, RpcLedgerClient};
pub use policy::{Alert, AlertPolicy, AlertSink};
pub use registry::EntityRegistry;
pub use report::{EntitySummary, SchedulerState, StatusSnapshot, SummaryReport};
pub use retry::RetryExecutor;
pub use scanner::{ScanReport, WindowScanner};
pub use scheduler::{MonitorScheduler, TickTrigger};
pub use store::{EntityStore, FileStore, MemoryStore};
pub use tracker::{EntityStateTracker, Observation, Transition};
