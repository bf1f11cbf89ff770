//! The stream coordinator: demultiplexes both event channels onto the entity
//! registry and the craft ledger.
//!
//! A [`StreamCoordinator`] starts in the *loading* phase. Until
//! [`load_snapshot`](StreamCoordinator::load_snapshot) seeds it with the
//! stream's full state, every event is dropped: deltas applied to a registry
//! that has not received its authoritative snapshot would be meaningless, and
//! the snapshot supersedes them anyway. A coordinator that hits a terminal
//! [`StreamError`] stops applying events for good.
//!
//! Each `handle_*` call applies one event completely before returning.
//!
//! # Crafting
//!
//! `UpdateCraftingInfo` drives the per-attempt state machine:
//!
//! - no info: the current session is detached (it stays in the ledger);
//! - info, no current session: a new session is opened and the step applied;
//! - info for a new attempt while the current session is finished (the
//!   recipe changed or the step counter restarted): the finished session is
//!   detached and a new one is opened as above;
//! - info, current session: the step is applied to it.
//!
//! After either branch the character's resource pool is copied into the
//! current session, so CP stays fresh even when no step was accepted.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use craftlog_engine::prelude::*;
//!
//! let mut coordinator = StreamCoordinator::new(Arc::new(SystemClock));
//! coordinator.bind_stream(1);
//! coordinator.load_snapshot(StreamSnapshot {
//!     id: 1,
//!     character_id: EntityId(7),
//!     entities: Vec::new(),
//! });
//!
//! let outcome = coordinator.handle_stream_event(StreamEvent {
//!     stream_id: 1,
//!     kind: StreamEventKind::UpdateIds { character_id: EntityId(8) },
//! });
//! assert_eq!(outcome, Dispatch::Applied);
//! assert_eq!(coordinator.character_id(), EntityId(8));
//! ```

use std::sync::Arc;

use craftlog_state::craft::{CraftSession, CraftingInfo};
use craftlog_state::entity::{Entity, EntityId};
use craftlog_state::event::{EntityEvent, EntityEventKind, StreamEvent, StreamEventKind};
use craftlog_state::ledger::CraftLedger;
use craftlog_state::registry::{EntityRegistry, RouteOutcome};

use crate::clock::Clock;
use crate::export::HistoryExport;
use crate::transport::StreamSnapshot;
use crate::StreamError;

// ---------------------------------------------------------------------------
// Dispatch outcome
// ---------------------------------------------------------------------------

/// Why an event was not applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DropReason {
    /// The coordinator is in a terminal error state.
    Halted,
    /// The initial snapshot has not been loaded yet.
    Loading,
    /// The event is addressed to a different stream.
    ForeignStream,
    /// The event kind is not known to this crate.
    UnknownKind,
    /// A field update for an entity other than the character.
    NotCharacter,
    /// A field update for the character id, which is not registered.
    MissingCharacter,
}

/// What happened to one incoming event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    Applied,
    Dropped(DropReason),
}

/// Running totals of dispatch outcomes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchStats {
    /// Events that reached the registry or ledger.
    pub applied: u64,
    /// Events dropped for any [`DropReason`].
    pub dropped: u64,
}

// ---------------------------------------------------------------------------
// StreamCoordinator
// ---------------------------------------------------------------------------

/// Owns the entity registry and the craft ledger for one stream.
#[derive(Debug)]
pub struct StreamCoordinator {
    registry: EntityRegistry,
    ledger: CraftLedger,
    clock: Arc<dyn Clock>,
    stream_id: Option<u64>,
    loading: bool,
    error: Option<StreamError>,
    stats: DispatchStats,
}

impl StreamCoordinator {
    /// Create a coordinator in the loading phase, bound to no stream.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            registry: EntityRegistry::new(),
            ledger: CraftLedger::new(),
            clock,
            stream_id: None,
            loading: true,
            error: None,
            stats: DispatchStats::default(),
        }
    }

    // -- lifecycle ----------------------------------------------------------

    /// Bind to `stream_id`. Events addressed to other streams are dropped
    /// from now on.
    pub fn bind_stream(&mut self, stream_id: u64) {
        tracing::info!(stream_id, "bound to stream");
        self.stream_id = Some(stream_id);
    }

    /// Seed the registry from the stream's full state and leave the loading
    /// phase. Ignored once the coordinator has halted.
    pub fn load_snapshot(&mut self, snapshot: StreamSnapshot) {
        if self.error.is_some() {
            tracing::debug!(stream_id = snapshot.id, "ignoring snapshot for halted coordinator");
            return;
        }
        let entity_count = snapshot.entities.len();
        self.registry.set_character_id(snapshot.character_id);
        self.registry.replace_all(snapshot.entities);
        self.loading = false;
        tracing::info!(
            stream_id = snapshot.id,
            character_id = %snapshot.character_id,
            entity_count,
            "initial snapshot loaded"
        );
    }

    /// Enter the terminal error state. The first error wins.
    pub fn halt(&mut self, error: StreamError) {
        if self.error.is_none() {
            tracing::error!(error = %error, "stream coordinator halted");
            self.error = Some(error);
        }
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn error(&self) -> Option<&StreamError> {
        self.error.as_ref()
    }

    pub fn stream_id(&self) -> Option<u64> {
        self.stream_id
    }

    pub fn stats(&self) -> &DispatchStats {
        &self.stats
    }

    // -- dispatch -----------------------------------------------------------

    /// Apply one event from the entity channel.
    pub fn handle_entity_event(&mut self, event: EntityEvent) -> Dispatch {
        if let Some(reason) = self.gate(event.stream_id) {
            return self.dropped(reason, event.kind.type_name());
        }

        let EntityEvent { entity_id, kind, .. } = event;
        match kind {
            EntityEventKind::AddEntity { entity } => {
                self.registry.upsert(*entity);
            }
            EntityEventKind::RemoveEntity { id } => {
                self.registry.remove(id);
            }
            EntityEventKind::SetEntities { entities } => {
                self.registry.replace_all(entities);
            }
            EntityEventKind::Unknown => {
                return self.dropped(DropReason::UnknownKind, "Unknown");
            }
            field_update => match self.registry.route(entity_id, &field_update) {
                RouteOutcome::Applied => {}
                RouteOutcome::NotCharacter => {
                    return self.dropped(DropReason::NotCharacter, field_update.type_name());
                }
                RouteOutcome::Missing => {
                    return self.dropped(DropReason::MissingCharacter, field_update.type_name());
                }
            },
        }

        self.stats.applied += 1;
        Dispatch::Applied
    }

    /// Apply one event from the stream (crafting) channel.
    pub fn handle_stream_event(&mut self, event: StreamEvent) -> Dispatch {
        if let Some(reason) = self.gate(event.stream_id) {
            return self.dropped(reason, event.kind.type_name());
        }

        match event.kind {
            StreamEventKind::UpdateIds { character_id } => {
                tracing::info!(character_id = %character_id, "character id changed");
                self.registry.set_character_id(character_id);
            }
            StreamEventKind::UpdateCraftingInfo { crafting_info } => {
                self.apply_crafting_info(crafting_info.as_deref());
            }
            StreamEventKind::Unknown => {
                return self.dropped(DropReason::UnknownKind, "Unknown");
            }
        }

        self.stats.applied += 1;
        Dispatch::Applied
    }

    fn apply_crafting_info(&mut self, info: Option<&CraftingInfo>) {
        match info {
            None => {
                self.ledger.end_current();
            }
            Some(info) => {
                let continues = self
                    .ledger
                    .current()
                    .is_some_and(|session| !session.starts_new_attempt(info));

                if continues {
                    if let Some(session) = self.ledger.current_mut() {
                        session.apply_step(info);
                    }
                } else {
                    self.ledger.end_current();
                    let session = self.ledger.open_session(info, self.clock.now());
                    session.apply_step(info);
                }
            }
        }

        if let (Some(character), Some(session)) =
            (self.registry.character(), self.ledger.current_mut())
        {
            session.update_resource_pool(character.cp(), character.max_cp());
        }
    }

    fn gate(&self, stream_id: u64) -> Option<DropReason> {
        if self.error.is_some() {
            Some(DropReason::Halted)
        } else if self.loading {
            Some(DropReason::Loading)
        } else if self.stream_id.is_some_and(|bound| bound != stream_id) {
            Some(DropReason::ForeignStream)
        } else {
            None
        }
    }

    fn dropped(&mut self, reason: DropReason, kind: &str) -> Dispatch {
        tracing::debug!(?reason, kind, "event dropped");
        self.stats.dropped += 1;
        Dispatch::Dropped(reason)
    }

    // -- entity views -------------------------------------------------------

    pub fn registry(&self) -> &EntityRegistry {
        &self.registry
    }

    pub fn entity(&self, id: EntityId) -> Option<&Entity> {
        self.registry.get(id)
    }

    pub fn character_id(&self) -> EntityId {
        self.registry.character_id()
    }

    /// The local player's entity, if it is registered.
    pub fn character_entity(&self) -> Option<&Entity> {
        self.registry.character()
    }

    // -- craft views --------------------------------------------------------

    pub fn ledger(&self) -> &CraftLedger {
        &self.ledger
    }

    /// Sessions newest first.
    pub fn craft_history(&self) -> impl Iterator<Item = &CraftSession> {
        self.ledger.recent_first()
    }

    pub fn current_craft(&self) -> Option<&CraftSession> {
        self.ledger.current()
    }

    pub fn selected_craft(&self) -> Option<&CraftSession> {
        self.ledger.selected()
    }

    /// Select a session for inspection. Unknown ids are ignored.
    pub fn set_selected(&mut self, session_id: &str) -> bool {
        self.ledger.select(session_id)
    }

    /// Export the whole craft ledger, stamped with the current time.
    ///
    /// # Errors
    ///
    /// Returns an error if the ledger cannot be serialized for hashing.
    pub fn export_history(&self) -> Result<HistoryExport, serde_json::Error> {
        HistoryExport::from_ledger(&self.ledger, self.clock.now())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
