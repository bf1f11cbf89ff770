//! Event envelopes and event-kind sum types for both transport channels.
//!
//! The transport tags every event payload with a `__typename`. Each channel's
//! kinds form a closed enum with an explicit [`Unknown`](EntityEventKind::Unknown)
//! arm: a producer that is newer than this crate can emit kinds we have never
//! seen, and those must deserialize to a guaranteed no-op instead of failing
//! the stream.

use serde::{Deserialize, Serialize};

use crate::craft::CraftingInfo;
use crate::entity::{Action, ClassJob, EntityId, EntitySpec, Resources, Status};

// ---------------------------------------------------------------------------
// Entity channel
// ---------------------------------------------------------------------------

/// The kinds of event delivered on the entity channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "__typename")]
pub enum EntityEventKind {
    /// A new entity became visible.
    AddEntity { entity: Box<EntitySpec> },
    /// An entity left the stream.
    RemoveEntity { id: EntityId },
    /// Authoritative replacement of every entity (e.g. on zone change).
    SetEntities { entities: Vec<EntitySpec> },
    UpdateClass {
        #[serde(rename = "classJob")]
        class_job: ClassJob,
    },
    UpdateLastAction { action: Action },
    UpsertStatus { index: u32, status: Status },
    RemoveStatus { index: u32 },
    UpdateResources { resources: Resources },
    /// Any kind this crate does not know about.
    #[serde(other)]
    Unknown,
}

impl EntityEventKind {
    /// The transport type name of this kind, for logging.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::AddEntity { .. } => "AddEntity",
            Self::RemoveEntity { .. } => "RemoveEntity",
            Self::SetEntities { .. } => "SetEntities",
            Self::UpdateClass { .. } => "UpdateClass",
            Self::UpdateLastAction { .. } => "UpdateLastAction",
            Self::UpsertStatus { .. } => "UpsertStatus",
            Self::RemoveStatus { .. } => "RemoveStatus",
            Self::UpdateResources { .. } => "UpdateResources",
            Self::Unknown => "Unknown",
        }
    }
}

/// An event on the entity channel, addressed to one stream and one entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityEvent {
    #[serde(rename = "streamID")]
    pub stream_id: u64,
    #[serde(rename = "entityID")]
    pub entity_id: EntityId,
    #[serde(rename = "type")]
    pub kind: EntityEventKind,
}

// ---------------------------------------------------------------------------
// Stream channel
// ---------------------------------------------------------------------------

/// The kinds of event delivered on the stream (crafting) channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "__typename")]
pub enum StreamEventKind {
    /// The local player's entity id changed.
    #[serde(rename = "UpdateIDs")]
    UpdateIds {
        #[serde(rename = "characterID")]
        character_id: EntityId,
    },
    /// The crafting window changed. `None` means no craft is in progress.
    UpdateCraftingInfo {
        #[serde(rename = "craftingInfo", default)]
        crafting_info: Option<Box<CraftingInfo>>,
    },
    #[serde(other)]
    Unknown,
}

impl StreamEventKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::UpdateIds { .. } => "UpdateIDs",
            Self::UpdateCraftingInfo { .. } => "UpdateCraftingInfo",
            Self::Unknown => "Unknown",
        }
    }
}

/// An event on the stream channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamEvent {
    #[serde(rename = "streamID")]
    pub stream_id: u64,
    #[serde(rename = "type")]
    pub kind: StreamEventKind,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
