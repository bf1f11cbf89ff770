//! Async driver that feeds a [`StreamCoordinator`] from the transport.
//!
//! The coordinator lives behind a single [`tokio::sync::Mutex`]. Each event is
//! applied under one lock acquisition, so a reader taking the same lock never
//! sees half of an event (for example, a registry cleared but not yet
//! repopulated by `SetEntities`).
//!
//! Startup mirrors the stream host's expectations:
//!
//! 1. [`run`](StreamDriver::run) is started first so subscriptions are live
//!    (events arriving now are dropped by the loading gate).
//! 2. [`initialize`](StreamDriver::initialize) checks the host's API version,
//!    resolves the stream id, fetches the full snapshot, and loads it.
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use craftlog_engine::prelude::*;
//! # async fn demo(transport: impl Transport) {
//! let (entity_tx, entity_rx) = tokio::sync::mpsc::channel(256);
//! let (stream_tx, stream_rx) = tokio::sync::mpsc::channel(256);
//! let (_shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
//!
//! let driver = StreamDriver::new(
//!     StreamCoordinator::new(Arc::new(SystemClock)),
//!     StreamConfig::default(),
//! );
//! // Hand `entity_tx` / `stream_tx` to the subscription client here.
//! # drop((entity_tx, stream_tx));
//! let (_, init) = tokio::join!(
//!     driver.run(entity_rx, stream_rx, shutdown_rx),
//!     driver.initialize(&transport),
//! );
//! # let _ = init;
//! # }
//! ```

use std::sync::Arc;

use semver::{BuildMetadata, Op, Prerelease, Version, VersionReq};
use tokio::sync::{mpsc, watch, Mutex};

use craftlog_state::event::{EntityEvent, StreamEvent};

use crate::config::StreamConfig;
use crate::coordinator::{DispatchStats, StreamCoordinator};
use crate::transport::Transport;
use crate::StreamError;

/// The coordinator as shared between the driver and its readers.
pub type SharedCoordinator = Arc<Mutex<StreamCoordinator>>;

/// Owns the shared coordinator and pumps events into it.
#[derive(Debug, Clone)]
pub struct StreamDriver {
    coordinator: SharedCoordinator,
    config: StreamConfig,
}

impl StreamDriver {
    pub fn new(coordinator: StreamCoordinator, config: StreamConfig) -> Self {
        Self {
            coordinator: Arc::new(Mutex::new(coordinator)),
            config,
        }
    }

    /// Handle for readers (the presentation layer).
    pub fn coordinator(&self) -> SharedCoordinator {
        Arc::clone(&self.coordinator)
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// Check compatibility, bind the stream, and load its snapshot.
    ///
    /// On failure the coordinator is halted with the same error, which is
    /// also returned. Returns the bound stream id on success.
    pub async fn initialize<T: Transport + ?Sized>(&self, transport: &T) -> Result<u64, StreamError> {
        match self.try_initialize(transport).await {
            Ok(stream_id) => Ok(stream_id),
            Err(error) => {
                self.coordinator.lock().await.halt(error.clone());
                Err(error)
            }
        }
    }

    async fn try_initialize<T: Transport + ?Sized>(&self, transport: &T) -> Result<u64, StreamError> {
        tracing::info!(
            api_url = %self.config.api_url,
            subscription_url = %self.config.subscription_url(),
            authenticated = self.config.authorization().is_some(),
            "connecting to stream host"
        );

        let version = transport.api_version().await?;
        check_api_version(&version, &self.config)?;

        let stream_id = match self.config.stream_id {
            Some(id) => id,
            None => transport
                .list_streams()
                .await?
                .first()
                .map(|s| s.id)
                .ok_or(StreamError::NoStreams)?,
        };
        self.coordinator.lock().await.bind_stream(stream_id);

        let snapshot = transport
            .fetch_stream(stream_id)
            .await?
            .ok_or(StreamError::StreamNotFound { stream_id })?;
        self.coordinator.lock().await.load_snapshot(snapshot);

        Ok(stream_id)
    }

    /// Apply events from both channels until both close or `shutdown` is set
    /// to `true`.
    ///
    /// Events within one channel are applied in arrival order; no ordering is
    /// imposed between the two channels. Returns the coordinator's dispatch
    /// totals at exit.
    pub async fn run(
        &self,
        mut entity_rx: mpsc::Receiver<EntityEvent>,
        mut stream_rx: mpsc::Receiver<StreamEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) -> DispatchStats {
        let mut entity_open = true;
        let mut stream_open = true;
        let mut shutdown_open = true;

        while entity_open || stream_open {
            if *shutdown.borrow() {
                tracing::info!("shutdown requested, stopping event loop");
                break;
            }

            tokio::select! {
                changed = shutdown.changed(), if shutdown_open => {
                    if changed.is_err() {
                        shutdown_open = false;
                    }
                }
                event = entity_rx.recv(), if entity_open => match event {
                    Some(event) => {
                        self.coordinator.lock().await.handle_entity_event(event);
                    }
                    None => {
                        tracing::debug!("entity channel closed");
                        entity_open = false;
                    }
                },
                event = stream_rx.recv(), if stream_open => match event {
                    Some(event) => {
                        self.coordinator.lock().await.handle_stream_event(event);
                    }
                    None => {
                        tracing::debug!("stream channel closed");
                        stream_open = false;
                    }
                },
            }
        }

        self.coordinator.lock().await.stats().clone()
    }
}

/// Check the host's API version against the configured requirement.
///
/// Pre-release versions are accepted when they order at or above every lower
/// bound of the requirement and their release satisfies it: `0.4.0-beta.1`
/// satisfies `>=0.3.1`, while `0.3.1-rc.1` (which precedes `0.3.1`) does not.
fn check_api_version(version: &str, config: &StreamConfig) -> Result<(), StreamError> {
    let parsed = Version::parse(version.trim().trim_start_matches('v')).map_err(|e| {
        StreamError::InvalidApiVersion {
            version: version.to_owned(),
            reason: e.to_string(),
        }
    })?;

    if satisfies_including_prerelease(&config.required_api_version, &parsed) {
        Ok(())
    } else {
        Err(StreamError::UnsupportedApiVersion {
            found: version.to_owned(),
            required: config.required_api_version.to_string(),
        })
    }
}

/// Match `version` against `req`, letting pre-releases take part in ordering.
///
/// Each comparator's range is checked on the release version; lower bounds
/// (and strict `<` upper bounds) are then compared against the full version,
/// so a pre-release sits just below its release.
fn satisfies_including_prerelease(req: &VersionReq, version: &Version) -> bool {
    if version.pre.is_empty() {
        return req.matches(version);
    }

    let release = Version {
        pre: Prerelease::EMPTY,
        ..version.clone()
    };
    req.comparators.iter().all(|comparator| {
        let bound = Version {
            major: comparator.major,
            minor: comparator.minor.unwrap_or(0),
            patch: comparator.patch.unwrap_or(0),
            pre: comparator.pre.clone(),
            build: BuildMetadata::EMPTY,
        };
        match comparator.op {
            Op::Less => *version < bound,
            Op::LessEq | Op::Wildcard => comparator.matches(&release),
            _ => comparator.matches(&release) && *version >= bound,
        }
    })
}
