//! Registry of every entity currently visible in the stream.
//!
//! The registry owns one [`Entity`] per id and tracks which id belongs to the
//! local player ("the character"). The character id is tracked independently
//! of membership: it may point at an id the registry has not seen yet.
//!
//! Only the character receives field-level patches via [`EntityRegistry::route`].
//! Every other entity changes solely by whole-entity replacement
//! ([`upsert`](EntityRegistry::upsert), [`replace_all`](EntityRegistry::replace_all))
//! or [`remove`](EntityRegistry::remove).
//!
//! Iteration follows first-insertion order, the order in which the stream
//! reported the entities. Replacing an entity in place keeps its position.

use std::collections::HashMap;

use crate::entity::{Entity, EntityId, EntitySpec};
use crate::event::EntityEventKind;

/// What [`EntityRegistry::route`] did with an update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    /// The update was applied to the character entity.
    Applied,
    /// The target is not the tracked character.
    NotCharacter,
    /// The target is the character id but no such entity is registered.
    Missing,
}

/// Owns all entity projections, keyed by [`EntityId`].
#[derive(Debug, Clone, Default)]
pub struct EntityRegistry {
    entities: HashMap<EntityId, Entity>,
    /// Ids in first-insertion order. Always holds exactly the keys of
    /// `entities`.
    order: Vec<EntityId>,
    character_id: EntityId,
}

impl EntityRegistry {
    /// Create an empty registry with no tracked character.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a fresh entity built from `spec`, discarding any previous
    /// projection with the same id.
    pub fn upsert(&mut self, spec: EntitySpec) {
        let id = spec.id;
        if self.entities.insert(id, Entity::from_spec(spec)).is_some() {
            tracing::debug!(entity = %id, "replaced existing entity");
        } else {
            self.order.push(id);
        }
    }

    /// Remove an entity. Removing an absent id is a no-op.
    ///
    /// Returns `true` if an entity was removed.
    pub fn remove(&mut self, id: EntityId) -> bool {
        if self.entities.remove(&id).is_none() {
            return false;
        }
        self.order.retain(|&kept| kept != id);
        true
    }

    /// Replace the whole registry with `specs`.
    ///
    /// The new map is built before the old one is swapped out, so the
    /// registry is never observed empty mid-replace. Iteration order becomes
    /// the order of `specs`; a repeated id keeps its first position and its
    /// last specification. The character id is left as is.
    pub fn replace_all(&mut self, specs: Vec<EntitySpec>) {
        let mut entities = HashMap::with_capacity(specs.len());
        let mut order = Vec::with_capacity(specs.len());
        for spec in specs {
            let id = spec.id;
            if entities.insert(id, Entity::from_spec(spec)).is_none() {
                order.push(id);
            }
        }
        self.entities = entities;
        self.order = order;
    }

    /// Forward a field-level update to the entity `id`, but only if it is the
    /// tracked character. Updates for any other entity are dropped.
    pub fn route(&mut self, id: EntityId, kind: &EntityEventKind) -> RouteOutcome {
        if id != self.character_id {
            return RouteOutcome::NotCharacter;
        }
        match self.entities.get_mut(&id) {
            Some(entity) => {
                entity.apply_update(kind);
                RouteOutcome::Applied
            }
            None => RouteOutcome::Missing,
        }
    }

    // -- character tracking -------------------------------------------------

    pub fn character_id(&self) -> EntityId {
        self.character_id
    }

    pub fn set_character_id(&mut self, id: EntityId) {
        self.character_id = id;
    }

    /// The character's entity, if it is registered.
    pub fn character(&self) -> Option<&Entity> {
        self.entities.get(&self.character_id)
    }

    // -- queries ------------------------------------------------------------

    pub fn get(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(&id)
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.entities.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// All entities in first-insertion order. Use
    /// [`sorted_by_index`](Self::sorted_by_index) for the game's display order.
    pub fn iter(&self) -> impl Iterator<Item = &Entity> {
        self.order.iter().filter_map(|id| self.entities.get(id))
    }

    /// All entities ordered by their display index, then id.
    pub fn sorted_by_index(&self) -> Vec<&Entity> {
        let mut entities: Vec<&Entity> = self.entities.values().collect();
        entities.sort_by_key(|e| (e.index(), e.id()));
        entities
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
