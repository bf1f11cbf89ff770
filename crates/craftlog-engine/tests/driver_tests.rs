//! Async driver tests against an in-memory stream host.
//!
//! Validates the startup sequence (version gate, stream resolution, snapshot
//! load), terminal error handling, and the event loop's shutdown behaviour.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use craftlog_engine::prelude::*;
use tokio::sync::{mpsc, watch};

// ---------------------------------------------------------------------------
// In-memory host
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct MemoryHost {
    version: String,
    fail_requests: bool,
    streams: Vec<StreamSummary>,
    snapshots: HashMap<u64, StreamSnapshot>,
    list_calls: AtomicUsize,
    fetch_calls: AtomicUsize,
}

impl MemoryHost {
    fn with_stream(stream_id: u64, character_id: u64, entities: Vec<EntitySpec>) -> Self {
        let mut snapshots = HashMap::new();
        snapshots.insert(
            stream_id,
            StreamSnapshot {
                id: stream_id,
                character_id: EntityId(character_id),
                entities,
            },
        );
        Self {
            version: "0.3.1".to_owned(),
            streams: vec![StreamSummary { id: stream_id }],
            snapshots,
            ..Self::default()
        }
    }
}

#[async_trait]
impl Transport for MemoryHost {
    async fn api_version(&self) -> Result<String, TransportError> {
        if self.fail_requests {
            return Err(TransportError::Request("connection refused".to_owned()));
        }
        Ok(self.version.clone())
    }

    async fn list_streams(&self) -> Result<Vec<StreamSummary>, TransportError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.streams.clone())
    }

    async fn fetch_stream(&self, stream_id: u64) -> Result<Option<StreamSnapshot>, TransportError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.snapshots.get(&stream_id).cloned())
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn driver(config: StreamConfig) -> StreamDriver {
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2020, 5, 17, 20, 0, 0).unwrap(),
    ));
    StreamDriver::new(StreamCoordinator::new(clock), config)
}

fn spec(id: u64, index: i32, mp: u32) -> EntitySpec {
    EntitySpec {
        id: EntityId(id),
        index,
        name: format!("entity-{id}"),
        level: 80,
        class_job: ClassJob::default(),
        resources: Resources {
            mp,
            max_mp: mp,
            last_tick: None,
        },
        last_action: None,
        statuses: Vec::new(),
    }
}

fn crafting(stream_id: u64, step_num: u32, action_id: i64) -> StreamEvent {
    StreamEvent {
        stream_id,
        kind: StreamEventKind::UpdateCraftingInfo {
            crafting_info: Some(Box::new(CraftingInfo {
                recipe: Recipe {
                    id: 9,
                    name: "Cloud Pearl".to_owned(),
                    difficulty: 200,
                    quality: 800,
                    durability: 40,
                    ..Recipe::default()
                },
                step_num,
                last_craft_action_id: action_id,
                last_craft_action_name: "Careful Synthesis".to_owned(),
                durability: 40,
                current_condition: 1,
                previous_condition: 1,
                ..CraftingInfo::default()
            })),
        },
    }
}

fn resources(stream_id: u64, entity_id: u64, mp: u32) -> EntityEvent {
    EntityEvent {
        stream_id,
        entity_id: EntityId(entity_id),
        kind: EntityEventKind::UpdateResources {
            resources: Resources {
                mp,
                max_mp: 500,
                last_tick: None,
            },
        },
    }
}

struct Channels {
    entity_tx: mpsc::Sender<EntityEvent>,
    entity_rx: mpsc::Receiver<EntityEvent>,
    stream_tx: mpsc::Sender<StreamEvent>,
    stream_rx: mpsc::Receiver<StreamEvent>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

fn channels() -> Channels {
    let (entity_tx, entity_rx) = mpsc::channel(64);
    let (stream_tx, stream_rx) = mpsc::channel(64);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    Channels {
        entity_tx,
        entity_rx,
        stream_tx,
        stream_rx,
        shutdown_tx,
        shutdown_rx,
    }
}

// ---------------------------------------------------------------------------
// 1. Startup
// ---------------------------------------------------------------------------

#[tokio::test]
async fn initialize_then_stream_events() {
    init_tracing();
    let host = MemoryHost::with_stream(3, 7, vec![spec(7, 0, 450), spec(8, 1, 100)]);
    let driver = driver(StreamConfig::default());
    let Channels {
        entity_tx,
        entity_rx,
        stream_tx,
        stream_rx,
        shutdown_tx: _shutdown_tx,
        shutdown_rx,
    } = channels();

    let (stats, ()) = tokio::join!(driver.run(entity_rx, stream_rx, shutdown_rx), async {
        let bound = driver.initialize(&host).await.unwrap();
        assert_eq!(bound, 3);

        stream_tx.send(crafting(3, 1, 100)).await.unwrap();
        entity_tx.send(resources(3, 7, 420)).await.unwrap();
        entity_tx.send(resources(3, 8, 1)).await.unwrap();
        drop(entity_tx);
        drop(stream_tx);
    });

    assert_eq!(stats.applied, 2);
    assert_eq!(stats.dropped, 1);
    assert_eq!(host.list_calls.load(Ordering::SeqCst), 1);

    let coordinator = driver.coordinator();
    let coordinator = coordinator.lock().await;
    assert_eq!(coordinator.stream_id(), Some(3));
    assert!(!coordinator.is_loading());
    assert_eq!(coordinator.character_entity().unwrap().cp(), 420);
    assert_eq!(coordinator.entity(EntityId(8)).unwrap().cp(), 100);
    assert_eq!(coordinator.ledger().len(), 1);
}

#[tokio::test]
async fn configured_stream_skips_listing() {
    let mut host = MemoryHost::with_stream(5, 7, vec![spec(7, 0, 10)]);
    host.streams.clear();
    let driver = driver(StreamConfig {
        stream_id: Some(5),
        ..StreamConfig::default()
    });

    assert_eq!(driver.initialize(&host).await, Ok(5));
    assert_eq!(host.list_calls.load(Ordering::SeqCst), 0);
    assert_eq!(host.fetch_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn events_for_other_streams_are_dropped() {
    let mut host = MemoryHost::with_stream(3, 7, vec![spec(7, 0, 10)]);
    host.streams.push(StreamSummary { id: 4 });
    let driver = driver(StreamConfig::default());
    let Channels {
        entity_tx,
        entity_rx,
        stream_tx,
        stream_rx,
        shutdown_tx: _shutdown_tx,
        shutdown_rx,
    } = channels();

    let (stats, ()) = tokio::join!(driver.run(entity_rx, stream_rx, shutdown_rx), async {
        driver.initialize(&host).await.unwrap();
        entity_tx.send(resources(4, 7, 1)).await.unwrap();
        stream_tx.send(crafting(4, 1, 100)).await.unwrap();
        drop(entity_tx);
        drop(stream_tx);
    });

    assert_eq!(stats.applied, 0);
    assert_eq!(stats.dropped, 2);
    let coordinator = driver.coordinator();
    let coordinator = coordinator.lock().await;
    assert_eq!(coordinator.character_entity().unwrap().cp(), 10);
    assert!(coordinator.ledger().is_empty());
}

#[tokio::test]
async fn events_before_initialize_are_dropped() {
    let driver = driver(StreamConfig::default());
    let Channels {
        entity_tx,
        entity_rx,
        stream_tx,
        stream_rx,
        shutdown_tx: _shutdown_tx,
        shutdown_rx,
    } = channels();

    entity_tx.send(resources(3, 7, 1)).await.unwrap();
    stream_tx.send(crafting(3, 1, 100)).await.unwrap();
    drop(entity_tx);
    drop(stream_tx);

    let stats = driver.run(entity_rx, stream_rx, shutdown_rx).await;
    assert_eq!(stats.applied, 0);
    assert_eq!(stats.dropped, 2);
    assert!(driver.coordinator().lock().await.is_loading());
}

// ---------------------------------------------------------------------------
// 2. Terminal errors
// ---------------------------------------------------------------------------

#[tokio::test]
async fn old_host_version_halts_before_fetching() {
    let mut host = MemoryHost::with_stream(3, 7, vec![spec(7, 0, 10)]);
    host.version = "0.2.9".to_owned();
    let driver = driver(StreamConfig::default());

    let err = driver.initialize(&host).await.unwrap_err();
    assert!(matches!(err, StreamError::UnsupportedApiVersion { .. }));
    assert!(err.to_string().contains("please update"));
    assert_eq!(host.fetch_calls.load(Ordering::SeqCst), 0);

    let shared = driver.coordinator();
    let mut coordinator = shared.lock().await;
    assert_eq!(coordinator.error(), Some(&err));
    assert_eq!(
        coordinator.handle_stream_event(crafting(3, 1, 100)),
        Dispatch::Dropped(DropReason::Halted)
    );
}

#[tokio::test]
async fn no_streams_is_terminal() {
    let mut host = MemoryHost::with_stream(3, 7, Vec::new());
    host.streams.clear();
    let driver = driver(StreamConfig::default());

    assert_eq!(driver.initialize(&host).await, Err(StreamError::NoStreams));
    assert_eq!(
        driver.coordinator().lock().await.error(),
        Some(&StreamError::NoStreams)
    );
}

#[tokio::test]
async fn missing_stream_is_terminal() {
    let host = MemoryHost::with_stream(3, 7, Vec::new());
    let driver = driver(StreamConfig {
        stream_id: Some(12),
        ..StreamConfig::default()
    });

    assert_eq!(
        driver.initialize(&host).await,
        Err(StreamError::StreamNotFound { stream_id: 12 })
    );
    let shared = driver.coordinator();
    let coordinator = shared.lock().await;
    assert!(coordinator.is_loading());
    assert!(coordinator.error().is_some());
}

#[tokio::test]
async fn transport_failure_is_terminal() {
    let host = MemoryHost {
        fail_requests: true,
        ..MemoryHost::default()
    };
    let driver = driver(StreamConfig::default());

    let err = driver.initialize(&host).await.unwrap_err();
    assert_eq!(
        err,
        StreamError::Transport(TransportError::Request("connection refused".to_owned()))
    );
}

// ---------------------------------------------------------------------------
// 3. Event loop
// ---------------------------------------------------------------------------

#[tokio::test]
async fn shutdown_stops_loop_with_open_channels() {
    let host = MemoryHost::with_stream(3, 7, vec![spec(7, 0, 10)]);
    let driver = driver(StreamConfig::default());
    driver.initialize(&host).await.unwrap();
    let Channels {
        entity_tx: _entity_tx,
        entity_rx,
        stream_tx: _stream_tx,
        stream_rx,
        shutdown_tx,
        shutdown_rx,
    } = channels();

    let run = tokio::time::timeout(
        Duration::from_secs(5),
        driver.run(entity_rx, stream_rx, shutdown_rx),
    );
    let (stats, ()) = tokio::join!(run, async {
        tokio::task::yield_now().await;
        shutdown_tx.send(true).unwrap();
    });

    let stats = stats.expect("loop should stop on shutdown");
    assert_eq!(stats, DispatchStats::default());
}

#[tokio::test]
async fn readers_never_observe_half_applied_replace() {
    let host = MemoryHost::with_stream(3, 7, vec![spec(7, 0, 10)]);
    let driver = driver(StreamConfig::default());
    driver.initialize(&host).await.unwrap();
    let Channels {
        entity_tx,
        entity_rx,
        stream_tx,
        stream_rx,
        shutdown_tx: _shutdown_tx,
        shutdown_rx,
    } = channels();
    drop(stream_tx);

    let reader = driver.coordinator();
    let (stats, (), ()) = tokio::join!(
        driver.run(entity_rx, stream_rx, shutdown_rx),
        async {
            for round in 0..20u64 {
                let entities = if round % 2 == 0 {
                    vec![spec(7, 0, 10), spec(20, 1, 1), spec(21, 2, 1)]
                } else {
                    vec![spec(7, 0, 10)]
                };
                entity_tx
                    .send(EntityEvent {
                        stream_id: 3,
                        entity_id: EntityId(0),
                        kind: EntityEventKind::SetEntities { entities },
                    })
                    .await
                    .unwrap();
                tokio::task::yield_now().await;
            }
            drop(entity_tx);
        },
        async {
            for _ in 0..40 {
                {
                    let coordinator = reader.lock().await;
                    let len = coordinator.registry().len();
                    assert!(len == 1 || len == 3, "observed partial registry: {len}");
                    assert!(coordinator.character_entity().is_some());
                }
                tokio::task::yield_now().await;
            }
        }
    );

    assert_eq!(stats.applied, 20);
    let final_len = driver.coordinator().lock().await.registry().len();
    assert_eq!(final_len, 1);
}
