//! In-memory entity store with write-failure injection, used by tests.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::EntityStore;
use crate::entity::Entity;
use crate::error::StoreError;

/// `HashMap`-backed store with optional write-failure injection.
#[derive(Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<String, Entity>>,
    failing: RwLock<HashSet<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every upsert for `id` fail until [`Self::heal`] is called.
    pub async fn fail_writes_for(&self, id: &str) {
        self.failing.write().await.insert(id.to_string());
    }

    pub async fn heal(&self) {
        self.failing.write().await.clear();
    }
}

#[async_trait]
impl EntityStore for MemoryStore {
    async fn get(&self, id: &str) -> Result<Option<Entity>, StoreError> {
        Ok(self.records.read().await.get(id).cloned())
    }

    async fn upsert(&self, entity: &Entity) -> Result<(), StoreError> {
        if self.failing.read().await.contains(&entity.id) {
            return Err(StoreError::Rejected {
                id: entity.id.clone(),
            });
        }
        self.records
            .write()
            .await
            .insert(entity.id.clone(), entity.clone());
        Ok(())
    }

    async fn list(&self) -> Result<Vec<Entity>, StoreError> {
        let mut entities: Vec<Entity> = self.records.read().await.values().cloned().collect();
        entities.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(entities)
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        self.records.write().await.remove(id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_injected_failure_only_hits_one_id() {
        let store = MemoryStore::new();
        store.fail_writes_for("0xa").await;

        assert!(store.upsert(&Entity::new("0xa", None)).await.is_err());
        store.upsert(&Entity::new("0xb", None)).await.unwrap();
        assert_eq!(store.list().await.unwrap().len(), 1);

        store.heal().await;
        store.upsert(&Entity::new("0xa", None)).await.unwrap();
        assert!(store.get("0xa").await.unwrap().is_some());
    }
}
