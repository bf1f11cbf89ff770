//! Entity identifiers, wire payloads, and the per-entity projection.
//!
//! An [`Entity`] is the locally reconciled view of one actor in the stream. It
//! is built from a full [`EntitySpec`] and afterwards only changes through
//! [`Entity::apply_update`], which understands the field-level event kinds of
//! the entity channel. Everything else (add, remove, full replace) happens one
//! level up, in the [`EntityRegistry`](crate::registry::EntityRegistry).

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::event::EntityEventKind;

// ---------------------------------------------------------------------------
// EntityId
// ---------------------------------------------------------------------------

/// Identifier of an actor, stable for the lifetime of the process.
///
/// Serialized as a bare integer, matching the transport's representation.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub u64);

impl EntityId {
    /// Raw `u64` representation.
    #[inline]
    pub fn to_raw(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityId({})", self.0)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for EntityId {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

// ---------------------------------------------------------------------------
// Wire payloads
// ---------------------------------------------------------------------------

/// The class (job) an entity is currently playing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassJob {
    pub id: u32,
    pub name: String,
    pub abbreviation: String,
}

/// The entity's resource pool. Crafters spend CP, which the game reports
/// through the general MP fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resources {
    pub mp: u32,
    #[serde(rename = "maxMP")]
    pub max_mp: u32,
    #[serde(rename = "lastTick", default)]
    pub last_tick: Option<DateTime<Utc>>,
}

/// The most recent action an entity used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    pub id: u32,
    pub name: String,
    #[serde(rename = "targetID")]
    pub target_id: EntityId,
    #[serde(rename = "useTime", default)]
    pub use_time: Option<DateTime<Utc>>,
}

/// A status effect occupying one slot on an entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    pub id: u32,
    /// Effect-specific qualifier (stack count, potency tier, ...). Zero means
    /// the effect carries no qualifier.
    #[serde(alias = "param", default)]
    pub extra: u32,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "startedTime", default)]
    pub started_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub duration: i64,
    #[serde(rename = "actorID", default)]
    pub actor_id: EntityId,
    #[serde(rename = "lastTick", default)]
    pub last_tick: Option<DateTime<Utc>>,
}

/// A full description of an entity as delivered by the initial fetch or by
/// `AddEntity` / `SetEntities` events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntitySpec {
    pub id: EntityId,
    pub index: i32,
    pub name: String,
    pub level: i32,
    pub class_job: ClassJob,
    pub resources: Resources,
    #[serde(default)]
    pub last_action: Option<Action>,
    /// Status slots in slot order. `None` entries are empty slots.
    #[serde(default)]
    pub statuses: Vec<Option<Status>>,
}

// ---------------------------------------------------------------------------
// Entity
// ---------------------------------------------------------------------------

/// The reconciled state of a single entity.
///
/// Status effects are kept in a sparse map keyed by slot index: slots are not
/// contiguous, and an absent key means the slot is empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Entity {
    id: EntityId,
    index: i32,
    name: String,
    level: i32,
    class_job: ClassJob,
    resources: Resources,
    last_action: Option<Action>,
    statuses: BTreeMap<u32, Status>,
}

impl Entity {
    /// Build a fresh projection from a full specification.
    pub fn from_spec(spec: EntitySpec) -> Self {
        let statuses = spec
            .statuses
            .into_iter()
            .enumerate()
            .filter_map(|(slot, status)| status.map(|s| (slot as u32, s)))
            .collect();

        Self {
            id: spec.id,
            index: spec.index,
            name: spec.name,
            level: spec.level,
            class_job: spec.class_job,
            resources: spec.resources,
            last_action: spec.last_action,
            statuses,
        }
    }

    /// Apply a field-level update to this entity.
    ///
    /// Each recognized kind replaces exactly one field or touches one status
    /// slot. Registry-level kinds (`AddEntity`, `RemoveEntity`,
    /// `SetEntities`) and unknown kinds leave the entity untouched.
    pub fn apply_update(&mut self, kind: &EntityEventKind) {
        match kind {
            EntityEventKind::UpdateClass { class_job } => {
                self.class_job = class_job.clone();
            }
            EntityEventKind::UpdateLastAction { action } => {
                self.last_action = Some(action.clone());
            }
            EntityEventKind::UpsertStatus { index, status } => {
                self.statuses.insert(*index, status.clone());
            }
            EntityEventKind::RemoveStatus { index } => {
                self.statuses.remove(index);
            }
            EntityEventKind::UpdateResources { resources } => {
                self.resources = resources.clone();
            }
            EntityEventKind::AddEntity { .. }
            | EntityEventKind::RemoveEntity { .. }
            | EntityEventKind::SetEntities { .. }
            | EntityEventKind::Unknown => {}
        }
    }

    // -- accessors ----------------------------------------------------------

    pub fn id(&self) -> EntityId {
        self.id
    }

    /// Display index assigned by the game.
    pub fn index(&self) -> i32 {
        self.index
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn level(&self) -> i32 {
        self.level
    }

    pub fn class_job(&self) -> &ClassJob {
        &self.class_job
    }

    pub fn resources(&self) -> &Resources {
        &self.resources
    }

    pub fn last_action(&self) -> Option<&Action> {
        self.last_action.as_ref()
    }

    /// Occupied status slots, ordered by slot index.
    pub fn statuses(&self) -> &BTreeMap<u32, Status> {
        &self.statuses
    }

    // -- derived views ------------------------------------------------------

    /// Name of the last action used, or an empty string if none is known.
    pub fn last_action_name(&self) -> &str {
        self.last_action.as_ref().map_or("", |a| a.name.as_str())
    }

    /// Current crafting points. CP is reported through the MP field.
    pub fn cp(&self) -> u32 {
        self.resources.mp
    }

    /// Maximum crafting points.
    pub fn max_cp(&self) -> u32 {
        self.resources.max_mp
    }

    /// One label per occupied slot, in slot order: the status id, followed by
    /// the qualifier in parentheses when it is non-zero (`"48"`, `"251 (3)"`).
    pub fn status_labels(&self) -> Vec<String> {
        self.statuses
            .values()
            .map(|s| {
                if s.extra != 0 {
                    format!("{} ({})", s.id, s.extra)
                } else {
                    s.id.to_string()
                }
            })
            .collect()
    }

    /// The status labels rendered as a JSON array for display.
    pub fn display_status_list(&self) -> String {
        serde_json::to_string(&self.status_labels()).unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn status(id: u32, extra: u32) -> Status {
        Status {
            id,
            extra,
            name: format!("status-{id}"),
            description: String::new(),
            started_time: None,
            duration: 0,
            actor_id: EntityId(0),
            last_tick: None,
        }
    }

    fn spec(id: u64) -> EntitySpec {
        EntitySpec {
            id: EntityId(id),
            index: 0,
            name: "Lalafell Crafter".to_owned(),
            level: 80,
            class_job: ClassJob {
                id: 8,
                name: "carpenter".to_owned(),
                abbreviation: "CRP".to_owned(),
            },
            resources: Resources {
                mp: 500,
                max_mp: 550,
                last_tick: None,
            },
            last_action: None,
            statuses: Vec::new(),
        }
    }

    // -- 1. Construction ----------------------------------------------------

    #[test]
    fn from_spec_skips_empty_status_slots() {
        let mut s = spec(1);
        s.statuses = vec![Some(status(48, 0)), None, None, Some(status(251, 3))];
        let entity = Entity::from_spec(s);

        let slots: Vec<u32> = entity.statuses().keys().copied().collect();
        assert_eq!(slots, vec![0, 3]);
        assert_eq!(entity.statuses()[&3].id, 251);
    }

    #[test]
    fn spec_deserializes_from_transport_shape() {
        let json = serde_json::json!({
            "id": 7,
            "index": 0,
            "name": "Crafter",
            "level": 80,
            "classJob": {"id": 8, "name": "carpenter", "abbreviation": "CRP"},
            "resources": {"mp": 10, "maxMP": 10, "lastTick": "2020-01-01T00:00:00Z"},
            "lastAction": null,
            "statuses": [null, {"id": 48, "param": 2, "name": "Well Fed",
                "description": "", "startedTime": "2020-01-01T00:00:00Z",
                "duration": 30, "actorID": 7, "lastTick": "2020-01-01T00:00:00Z"}]
        });
        let spec: EntitySpec = serde_json::from_value(json).unwrap();
        let entity = Entity::from_spec(spec);
        assert_eq!(entity.id(), EntityId(7));
        assert_eq!(entity.max_cp(), 10);
        assert_eq!(entity.statuses()[&1].extra, 2);
    }

    // -- 2. Field updates ---------------------------------------------------

    #[test]
    fn update_class_replaces_class_job() {
        let mut entity = Entity::from_spec(spec(1));
        entity.apply_update(&EntityEventKind::UpdateClass {
            class_job: ClassJob {
                id: 15,
                name: "culinarian".to_owned(),
                abbreviation: "CUL".to_owned(),
            },
        });
        assert_eq!(entity.class_job().abbreviation, "CUL");
    }

    #[test]
    fn update_resources_drives_cp() {
        let mut entity = Entity::from_spec(spec(1));
        entity.apply_update(&EntityEventKind::UpdateResources {
            resources: Resources {
                mp: 120,
                max_mp: 560,
                last_tick: None,
            },
        });
        assert_eq!(entity.cp(), 120);
        assert_eq!(entity.max_cp(), 560);
    }

    #[test]
    fn last_action_name_empty_until_set() {
        let mut entity = Entity::from_spec(spec(1));
        assert_eq!(entity.last_action_name(), "");

        entity.apply_update(&EntityEventKind::UpdateLastAction {
            action: Action {
                id: 100001,
                name: "Basic Synthesis".to_owned(),
                target_id: EntityId(1),
                use_time: None,
            },
        });
        assert_eq!(entity.last_action_name(), "Basic Synthesis");
    }

    // -- 3. Status slots ----------------------------------------------------

    #[test]
    fn upsert_then_remove_status_deletes_slot() {
        let mut entity = Entity::from_spec(spec(1));
        entity.apply_update(&EntityEventKind::UpsertStatus {
            index: 4,
            status: status(48, 0),
        });
        assert!(entity.statuses().contains_key(&4));

        entity.apply_update(&EntityEventKind::RemoveStatus { index: 4 });
        assert!(entity.statuses().is_empty());
    }

    #[test]
    fn remove_missing_slot_is_noop() {
        let mut entity = Entity::from_spec(spec(1));
        let before = entity.clone();
        entity.apply_update(&EntityEventKind::RemoveStatus { index: 9 });
        assert_eq!(entity, before);
    }

    #[test]
    fn display_status_list_orders_by_slot_and_shows_extra() {
        let mut entity = Entity::from_spec(spec(1));
        entity.apply_update(&EntityEventKind::UpsertStatus {
            index: 5,
            status: status(251, 3),
        });
        entity.apply_update(&EntityEventKind::UpsertStatus {
            index: 1,
            status: status(48, 0),
        });
        assert_eq!(entity.display_status_list(), r#"["48","251 (3)"]"#);
    }

    // -- 4. Non-field kinds -------------------------------------------------

    #[test]
    fn registry_and_unknown_kinds_do_not_touch_entity() {
        let mut entity = Entity::from_spec(spec(1));
        let before = entity.clone();

        entity.apply_update(&EntityEventKind::Unknown);
        entity.apply_update(&EntityEventKind::RemoveEntity { id: EntityId(1) });
        entity.apply_update(&EntityEventKind::AddEntity {
            entity: Box::new(spec(1)),
        });

        assert_eq!(entity, before);
    }
}
