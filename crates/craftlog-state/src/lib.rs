//! Craftlog State -- reconciled projections of a live game stream.
//!
//! This crate holds the synchronous core that turns typed delta events into a
//! consistent local view:
//!
//! - [`entity`]: one actor's nested state (class, resources, last action,
//!   status slots) and the field-level updates it accepts.
//! - [`registry`]: every visible entity, plus which one is the local
//!   character.
//! - [`craft`]: one crafting attempt, its counters, and its frozen step
//!   history.
//! - [`ledger`]: all crafting attempts in creation order, with the current
//!   and selected sessions.
//! - [`event`]: the tagged event kinds of both transport channels.
//!
//! Nothing here performs I/O, reads a clock, or fails: every operation is
//! total over inputs that match the event contracts.
//!
//! # Quick Start
//!
//! ```
//! use craftlog_state::prelude::*;
//!
//! let spec: EntitySpec = serde_json::from_value(serde_json::json!({
//!     "id": 7, "index": 0, "name": "Crafter", "level": 90,
//!     "classJob": {"id": 8, "name": "carpenter", "abbreviation": "CRP"},
//!     "resources": {"mp": 10, "maxMP": 10},
//!     "statuses": []
//! })).unwrap();
//!
//! let mut registry = EntityRegistry::new();
//! registry.set_character_id(EntityId(7));
//! registry.upsert(spec);
//!
//! let update = EntityEventKind::UpdateResources {
//!     resources: Resources { mp: 4, max_mp: 10, last_tick: None },
//! };
//! registry.route(EntityId(7), &update);
//! assert_eq!(registry.character().map(|e| e.cp()), Some(4));
//! ```

#![deny(unsafe_code)]

pub mod craft;
pub mod entity;
pub mod event;
pub mod ledger;
pub mod registry;

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::craft::{delta_string, Condition, CraftSession, CraftStep, CraftingInfo, Recipe};
    pub use crate::entity::{Action, ClassJob, Entity, EntityId, EntitySpec, Resources, Status};
    pub use crate::event::{EntityEvent, EntityEventKind, StreamEvent, StreamEventKind};
    pub use crate::ledger::CraftLedger;
    pub use crate::registry::{EntityRegistry, RouteOutcome};
}
