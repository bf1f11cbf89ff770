//! Craftlog Engine -- live stream coordinator for the crafting log.
//!
//! This crate builds on [`craftlog_state`] to follow one game stream: it
//! binds to the stream host, seeds the entity registry from the initial
//! snapshot, and then applies entity and crafting events as they arrive.
//!
//! # Modules
//!
//! - [`coordinator`]: the synchronous [`StreamCoordinator`](coordinator::StreamCoordinator)
//!   that owns all state and dispatches events by kind.
//! - [`driver`]: the async loop that pumps transport channels into a shared
//!   coordinator, and the startup sequence (version gate, stream lookup,
//!   snapshot load).
//! - [`transport`]: the boundary trait implemented by the network client.
//! - [`export`]: craft history export with a BLAKE3 content hash.
//! - [`config`] and [`clock`]: connection settings and the time source.

#![deny(unsafe_code)]

pub mod clock;
pub mod config;
pub mod coordinator;
pub mod driver;
pub mod export;
pub mod transport;

/// Re-export the state crate for convenience.
pub use craftlog_state;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Terminal errors of a stream coordinator. Once one occurs, no further
/// events are applied.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StreamError {
    /// The stream host is older than this crate supports.
    #[error(
        "stream host API version {found} is no longer supported (requires {required}); \
         please update the stream host"
    )]
    UnsupportedApiVersion { found: String, required: String },

    /// The stream host reported a version string that is not semver.
    #[error("stream host reported invalid API version '{version}': {reason}")]
    InvalidApiVersion { version: String, reason: String },

    /// No stream id was configured and the host has no active streams.
    #[error("no active stream found")]
    NoStreams,

    /// The configured or listed stream does not exist on the host.
    #[error("stream {stream_id} not found")]
    StreamNotFound { stream_id: u64 },

    /// A query to the stream host failed.
    #[error(transparent)]
    Transport(#[from] transport::TransportError),
}

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common engine usage.
pub mod prelude {
    // Re-export everything from the state prelude.
    pub use craftlog_state::prelude::*;

    pub use crate::clock::{Clock, ManualClock, SystemClock};
    pub use crate::config::StreamConfig;
    pub use crate::coordinator::{Dispatch, DispatchStats, DropReason, StreamCoordinator};
    pub use crate::driver::{SharedCoordinator, StreamDriver};
    pub use crate::export::{CraftRecord, HistoryExport};
    pub use crate::transport::{StreamSnapshot, StreamSummary, Transport, TransportError};
    pub use crate::StreamError;
}
