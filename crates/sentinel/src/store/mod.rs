//! Durable entity state.

mod file;
mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use async_trait::async_trait;

use crate::entity::Entity;
use crate::error::StoreError;

/// Key-value persistence for entity records, keyed by entity id.
#[async_trait]
pub trait EntityStore: Send + Sync {
    async fn get(&self, id: &str) -> Result<Option<Entity>, StoreError>;

    /// Insert or replace the record for `entity.id`.
    async fn upsert(&self, entity: &Entity) -> Result<(), StoreError>;

    async fn list(&self) -> Result<Vec<Entity>, StoreError>;

    /// Remove a record; missing records are not an error.
    async fn delete(&self, id: &str) -> Result<(), StoreError>;
}
