//! Error types for the sentinel crate.

use thiserror::Error;

/// How a failed ledger query should be handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Transient failure or rate limit; the same query may succeed later.
    Retryable,
    /// Anything else; retrying will not help.
    Fatal,
}

/// A failed ledger query, classified where the transport result is known.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind:?} ledger error: {message}")]
pub struct LedgerError {
    pub kind: ErrorKind,
    pub message: String,
}

impl LedgerError {
    pub fn retryable(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Retryable,
            message: message.into(),
        }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Fatal,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.kind == ErrorKind::Retryable
    }
}

pub type LedgerResult<T> = std::result::Result<T, LedgerError>;

/// Durable store failures.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Failed to access '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Corrupt entity record '{path}': {source}")]
    Corrupt {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to serialize entity '{id}': {source}")]
    Serialize {
        id: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Write rejected for entity '{id}'")]
    Rejected { id: String },
}

/// Crate-level error type.
#[derive(Error, Debug)]
pub enum SentinelError {
    #[error("Configuration error: {reason}")]
    Config { reason: String },

    #[error("Ledger query failed: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Unit {unit} gave up after {attempts} attempts: {last_error}")]
    Exhausted {
        unit: u64,
        attempts: u32,
        last_error: LedgerError,
    },

    #[error("Failed to persist {failed} entity record(s) at unit {unit}: {first}")]
    Persistence {
        unit: u64,
        failed: usize,
        first: StoreError,
    },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Monitor has not finished initialization")]
    NotInitialized,

    #[error("Shutdown in progress")]
    ShuttingDown,
}

impl SentinelError {
    pub fn config(reason: impl Into<String>) -> Self {
        Self::Config {
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, SentinelError>;
