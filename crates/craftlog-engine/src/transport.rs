//! Boundary to the stream host's query/subscription service.
//!
//! The network client lives outside this crate. It implements [`Transport`]
//! for the one-shot queries, and delivers subscription events by sending
//! [`EntityEvent`](craftlog_state::event::EntityEvent)s and
//! [`StreamEvent`](craftlog_state::event::StreamEvent)s into the channels
//! given to [`StreamDriver::run`](crate::driver::StreamDriver::run).
//! Retrying failed requests is the transport's job.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use craftlog_state::entity::{EntityId, EntitySpec};

/// Failure reported by a [`Transport`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The request could not be completed (network, auth, server error).
    #[error("request failed: {0}")]
    Request(String),

    /// The response did not have the expected shape.
    #[error("malformed response: {0}")]
    Decode(String),
}

impl From<serde_json::Error> for TransportError {
    fn from(e: serde_json::Error) -> Self {
        Self::Decode(e.to_string())
    }
}

/// One entry of the host's stream list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamSummary {
    pub id: u64,
}

/// Full state of a stream, used to seed the coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamSnapshot {
    pub id: u64,
    #[serde(rename = "characterID")]
    pub character_id: EntityId,
    #[serde(default)]
    pub entities: Vec<EntitySpec>,
}

/// Query side of the stream host.
#[async_trait]
pub trait Transport: Send + Sync {
    /// The host's API version string (semver).
    async fn api_version(&self) -> Result<String, TransportError>;

    /// Streams currently known to the host, most relevant first.
    async fn list_streams(&self) -> Result<Vec<StreamSummary>, TransportError>;

    /// Full state of one stream, or `None` if the host does not know it.
    async fn fetch_stream(&self, stream_id: u64) -> Result<Option<StreamSnapshot>, TransportError>;
}
