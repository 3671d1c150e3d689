//! Per-entity eligibility state machine.
//!
//! Two states, `NotEligible` and `Eligible`, driven by one observation per
//! unit. The counter always equals the length of the trailing run of
//! eligible observations.

use tracing::{debug, trace};

use crate::entity::{Entity, UnitIndex};
use crate::registry::EntityRegistry;

/// Result of checking one entity at one unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation {
    Eligible,
    NotEligible,
    /// The check failed with a non-retryable error; counts as not eligible.
    Errored(String),
}

impl Observation {
    #[must_use]
    pub fn is_eligible(&self) -> bool {
        matches!(self, Self::Eligible)
    }
}

impl From<bool> for Observation {
    fn from(eligible: bool) -> Self {
        if eligible {
            Self::Eligible
        } else {
            Self::NotEligible
        }
    }
}

/// What an observation did to an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// NotEligible -> Eligible, counter set to 1.
    Entered,
    /// Eligible -> Eligible, counter incremented.
    Continued,
    /// Eligible -> NotEligible, counter reset; worth confirming an action.
    Ended,
    /// NotEligible -> NotEligible.
    Unchanged,
    /// The unit was already applied; nothing changed.
    Stale,
}

/// Applies observations to entities. Holds no state of its own.
#[derive(Debug, Clone, Copy, Default)]
pub struct EntityStateTracker;

impl EntityStateTracker {
    /// Apply one observation for `unit` to `entity`.
    pub fn apply(entity: &mut Entity, unit: UnitIndex, observation: &Observation) -> Transition {
        if entity.has_observed(unit) {
            trace!(entity = %entity.id, unit, "Observation already applied");
            return Transition::Stale;
        }

        if let Observation::Errored(reason) = observation {
            debug!(entity = %entity.id, unit, reason = %reason, "Check errored, treating as not eligible");
        }

        let transition = match (entity.is_eligible, observation.is_eligible()) {
            (false, true) => {
                entity.consecutive_eligible_units = 1;
                Transition::Entered
            }
            (true, true) => {
                entity.consecutive_eligible_units += 1;
                Transition::Continued
            }
            (true, false) => {
                entity.consecutive_eligible_units = 0;
                Transition::Ended
            }
            (false, false) => {
                entity.consecutive_eligible_units = 0;
                Transition::Unchanged
            }
        };

        entity.is_eligible = observation.is_eligible();
        entity.last_checked_unit = Some(unit);
        transition
    }

    /// Apply a unit's observations, registering unknown entities lazily.
    pub fn apply_unit(
        registry: &mut EntityRegistry,
        unit: UnitIndex,
        observations: &[(String, Observation)],
    ) -> Vec<(String, Transition)> {
        observations
            .iter()
            .map(|(id, observation)| {
                let entity = registry.entry_or_default(id);
                (id.clone(), Self::apply(entity, unit, observation))
            })
            .collect()
    }

    /// Record that an action was confirmed when an eligible run ended.
    pub fn record_acted(entity: &mut Entity, unit: UnitIndex) {
        debug!(entity = %entity.id, unit, "Action confirmed");
        entity.last_acted_unit = Some(unit);
    }
}
