//! Shared runtime state for cvd-daemon.
//!
//! Handlers receive `State<Arc<AppState>>` from Axum. Background tasks
//! (heartbeat, run forwarder) are spawned from here; the scheduler itself
//! lives in `cvd-runtime`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use cvd_db::GenerationStore;
use cvd_runtime::RunRecord;
use cvd_schemas::Generation;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch, RwLock};
use tracing::{debug, warn};

// ---------------------------------------------------------------------------
// BusMsg: SSE event bus payload
// ---------------------------------------------------------------------------

/// Messages broadcast over the internal event bus and surfaced as SSE events.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BusMsg {
    Heartbeat { ts_millis: i64 },
    Run(RunRecord),
}

// ---------------------------------------------------------------------------
// BuildInfo
// ---------------------------------------------------------------------------

/// Static build metadata included in health responses.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BuildInfo {
    pub service: &'static str,
    pub version: &'static str,
}

// ---------------------------------------------------------------------------
// GenerationCache
// ---------------------------------------------------------------------------

#[derive(Clone)]
struct CacheEntry {
    generation: Option<Arc<Generation>>,
    loaded_at: Instant,
}

/// TTL cache-aside over [`GenerationStore::load_generation`].
///
/// A whole generation is cached as one value, so every response built from
/// it comes from the same publish. "Nothing published yet" is cached too.
pub struct GenerationCache {
    store: Arc<dyn GenerationStore>,
    ttl: Duration,
    entry: RwLock<Option<CacheEntry>>,
}

impl GenerationCache {
    pub fn new(store: Arc<dyn GenerationStore>, ttl: Duration) -> Self {
        Self {
            store,
            ttl,
            entry: RwLock::new(None),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// The published generation, from cache when fresh.
    pub async fn get(&self) -> Result<Option<Arc<Generation>>> {
        if let Some(e) = self.entry.read().await.as_ref() {
            if e.loaded_at.elapsed() < self.ttl {
                return Ok(e.generation.clone());
            }
        }

        let mut slot = self.entry.write().await;
        // Another reader may have refreshed while we waited.
        if let Some(e) = slot.as_ref() {
            if e.loaded_at.elapsed() < self.ttl {
                return Ok(e.generation.clone());
            }
        }

        let generation = self.store.load_generation().await?.map(Arc::new);
        debug!(
            store = self.store.name(),
            published = generation.is_some(),
            "generation cache refreshed"
        );
        *slot = Some(CacheEntry {
            generation: generation.clone(),
            loaded_at: Instant::now(),
        });
        Ok(generation)
    }

    /// Seconds since the cached value was loaded; `None` when empty.
    pub async fn age_secs(&self) -> Option<u64> {
        self.entry
            .read()
            .await
            .as_ref()
            .map(|e| e.loaded_at.elapsed().as_secs())
    }

    /// Drop the cached value so the next read goes to the store.
    pub async fn invalidate(&self) {
        *self.entry.write().await = None;
    }
}

// ---------------------------------------------------------------------------
// AppState
// ---------------------------------------------------------------------------

/// Shared handle for all Axum handlers.
pub struct AppState {
    /// Broadcast bus for SSE.
    pub bus: broadcast::Sender<BusMsg>,
    /// Static build metadata.
    pub build: BuildInfo,
    pub store_name: &'static str,
    pub cache: GenerationCache,
    /// Most recent pipeline run seen by this process.
    pub last_run: RwLock<Option<RunRecord>>,
    /// Provinces listed with the country-level rows for `noProvince=true`.
    pub no_province_exceptions: Vec<String>,
    /// Flips to `true` once on shutdown. SSE streams and the scheduler end on it.
    pub shutdown: watch::Sender<bool>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn GenerationStore>,
        cache_ttl: Duration,
        no_province_exceptions: Vec<String>,
    ) -> Self {
        let (bus, _rx) = broadcast::channel::<BusMsg>(1024);
        let (shutdown, _) = watch::channel(false);

        Self {
            bus,
            build: BuildInfo {
                service: "cvd-daemon",
                version: env!("CARGO_PKG_VERSION"),
            },
            store_name: store.name(),
            cache: GenerationCache::new(store, cache_ttl),
            last_run: RwLock::new(None),
            no_province_exceptions,
            shutdown,
        }
    }

    /// Ask long-lived work (SSE streams, scheduler) to stop.
    pub fn begin_shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    /// Resolves once [`AppState::begin_shutdown`] has been called, including
    /// when it was called before this future was created.
    pub fn shutdown_requested(&self) -> impl std::future::Future<Output = ()> + Send + 'static {
        let mut rx = self.shutdown.subscribe();
        async move {
            let _ = rx.wait_for(|stop| *stop).await;
        }
    }

    /// Record a finished run: keep it for `/v1/status`, drop the cache after
    /// a publish, and forward it to SSE listeners.
    pub async fn record_run(&self, record: RunRecord) {
        if record.result.is_published() {
            self.cache.invalidate().await;
        }
        *self.last_run.write().await = Some(record.clone());
        let _ = self.bus.send(BusMsg::Run(record));
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Monotonically increasing uptime since first call (process lifetime).
pub fn uptime_secs() -> u64 {
    static START: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();
    START.get_or_init(Instant::now).elapsed().as_secs()
}

/// Spawn a background task that emits a heartbeat SSE every `interval`.
pub fn spawn_heartbeat(bus: broadcast::Sender<BusMsg>, interval: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let ts = chrono::Utc::now().timestamp_millis();
            let _ = bus.send(BusMsg::Heartbeat { ts_millis: ts });
        }
    });
}

/// Spawn a task that feeds scheduler run records into [`AppState::record_run`].
/// Ends when the scheduler's sender is dropped.
pub fn spawn_run_forwarder(
    state: Arc<AppState>,
    mut runs: broadcast::Receiver<RunRecord>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match runs.recv().await {
                Ok(record) => state.record_run(record).await,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(skipped = n, "run forwarder lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}
