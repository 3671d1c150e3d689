//! Ledger collaborator: the remote chain the monitor observes.

mod abi;
mod rpc;

pub use rpc::RpcLedgerClient;

use async_trait::async_trait;

use crate::entity::UnitIndex;
use crate::error::LedgerResult;

/// Read-only queries the monitor issues against the ledger.
///
/// Every failure is already classified as retryable or fatal.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Current head unit.
    async fn head_unit(&self) -> LedgerResult<UnitIndex>;

    /// All entities the ledger knows about; used to populate the registry.
    async fn list_entities(&self) -> LedgerResult<Vec<String>>;

    /// Whether `entity_id` is eligible as of `unit`.
    async fn check_eligible(&self, entity_id: &str, unit: UnitIndex) -> LedgerResult<bool>;

    /// Whether an action on `entity_id` was recorded at `unit`.
    async fn confirm_acted(&self, entity_id: &str, unit: UnitIndex) -> LedgerResult<bool>;
}
