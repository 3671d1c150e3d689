//! The bounded set of monitored entities.

use std::collections::{BTreeMap, HashMap};

use tracing::{debug, info, warn};

use crate::config::EntityConfig;
use crate::entity::{is_valid_entity_id, normalize_entity_id, Entity, UnitIndex};

/// Monitored entities keyed by id, iterated in id order.
#[derive(Debug, Clone, Default)]
pub struct EntityRegistry {
    entities: BTreeMap<String, Entity>,
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry seeded from configured entities.
    pub fn from_config(configured: &[EntityConfig]) -> Self {
        let entities = configured
            .iter()
            .map(|c| (c.id.clone(), Entity::new(c.id.clone(), c.name.clone())))
            .collect();
        Self { entities }
    }

    /// Add ids reported by the ledger; malformed ids are skipped.
    ///
    /// Returns how many new entities were registered.
    pub fn add_discovered<I>(&mut self, ids: I) -> usize
    where
        I: IntoIterator<Item = String>,
    {
        let mut added = 0;
        for raw in ids {
            let id = normalize_entity_id(&raw);
            if !is_valid_entity_id(&id) {
                warn!(entity = %raw, "Ignoring malformed entity id from ledger");
                continue;
            }
            if !self.entities.contains_key(&id) {
                debug!(entity = %id, "Registered entity");
                self.entities.insert(id.clone(), Entity::new(id, None));
                added += 1;
            }
        }
        added
    }

    /// Adopt persisted state for known entities.
    ///
    /// Display names stay as registered so config renames take effect.
    /// Returns how many records were applied.
    pub fn merge_persisted(&mut self, persisted: Vec<Entity>) -> usize {
        let mut merged = 0;
        for record in persisted {
            match self.entities.get_mut(&record.id) {
                Some(entity) => {
                    let display_name = std::mem::take(&mut entity.display_name);
                    *entity = Entity {
                        display_name,
                        ..record
                    };
                    merged += 1;
                }
                None => debug!(entity = %record.id, "Ignoring persisted record for unmonitored entity"),
            }
        }
        merged
    }

    /// Discard in-memory state and re-derive it from persisted records.
    ///
    /// Entities without a record go back to their initial state. Alert
    /// bookkeeping is kept at the newer of the two copies: an alert already
    /// handed to the sink stays suppressed even if its record never landed.
    pub fn reset_to_persisted(&mut self, persisted: Vec<Entity>) {
        let mut alerted = HashMap::new();
        for entity in self.entities.values_mut() {
            alerted.insert(entity.id.clone(), (entity.alerts_sent, entity.last_alert_unit));
            *entity = Entity::new(entity.id.clone(), Some(entity.display_name.clone()));
        }
        let merged = self.merge_persisted(persisted);

        for (id, (alerts_sent, last_alert_unit)) in alerted {
            if let Some(entity) = self.entities.get_mut(&id) {
                entity.alerts_sent = entity.alerts_sent.max(alerts_sent);
                entity.last_alert_unit = entity.last_alert_unit.max(last_alert_unit);
            }
        }
        info!(merged, total = self.entities.len(), "Reloaded entity state from store");
    }

    /// Entity for `id`, created with default state on first sight.
    pub fn entry_or_default(&mut self, id: &str) -> &mut Entity {
        self.entities.entry(id.to_string()).or_insert_with(|| {
            info!(entity = %id, "Tracking previously unknown entity");
            Entity::new(id, None)
        })
    }

    pub fn get(&self, id: &str) -> Option<&Entity> {
        self.entities.get(id)
    }

    pub fn ids(&self) -> Vec<String> {
        self.entities.keys().cloned().collect()
    }

    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Highest unit any entity was observed at; the implicit scan cursor.
    pub fn max_last_checked(&self) -> Option<UnitIndex> {
        self.entities
            .values()
            .filter_map(|e| e.last_checked_unit)
            .max()
    }
}
