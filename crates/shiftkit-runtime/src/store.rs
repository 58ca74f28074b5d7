//! Shift state store: process-wide belief about the open shift, with
//! server-authoritative reconciliation, TTL-gated cache hydration, and
//! typed activation events.
//!
//! Reads never block on IO. Writes persist on a spawned blocking task;
//! a failed write is logged and dropped (the server remains the source
//! of truth on the next poll).

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, TimeDelta, Utc};
use tokio::sync::{broadcast, watch};

use shiftkit_core::state::{CACHE_TTL_SECS, CachedShiftState, LocalShiftUpdate, ShiftState};
use shiftkit_core::types::{ShiftEvent, StatusSnapshot};

use crate::storage::CacheStorage;

/// Buffer for the activation event channel. A subscriber that lags past
/// this many events sees `RecvError::Lagged` and should resubscribe.
const EVENT_CHANNEL_CAPACITY: usize = 16;

struct StoreInner {
    state: ShiftState,
    /// Activity level of the last emitted event edge. Starts `false`
    /// every process and is never seeded by hydration: a cached guess
    /// must not start tracking, only a server confirmation may.
    last_emitted_active: bool,
}

/// The store. One per process, shared behind an `Arc`; must live inside
/// a Tokio runtime because mutations schedule persistence tasks.
pub struct ShiftStore {
    inner: Mutex<StoreInner>,
    state_tx: watch::Sender<ShiftState>,
    events_tx: broadcast::Sender<ShiftEvent>,
    storage: Arc<dyn CacheStorage>,
    cache_key: String,
    cache_ttl: TimeDelta,
}

impl ShiftStore {
    pub fn new(storage: Arc<dyn CacheStorage>, cache_key: impl Into<String>) -> Self {
        let initial = ShiftState::initial(Utc::now());
        let (state_tx, _) = watch::channel(initial.clone());
        let (events_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            inner: Mutex::new(StoreInner {
                state: initial,
                last_emitted_active: false,
            }),
            state_tx,
            events_tx,
            storage,
            cache_key: cache_key.into(),
            cache_ttl: TimeDelta::seconds(CACHE_TTL_SECS),
        }
    }

    /// Override the hydration freshness window.
    pub fn with_ttl(mut self, ttl: TimeDelta) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// Current belief. Never blocks on IO, never fails.
    pub fn state(&self) -> ShiftState {
        self.lock().state.clone()
    }

    /// Reactive read for the UI. Receives every mutation; when
    /// mutations coalesce, the last value wins.
    pub fn subscribe(&self) -> watch::Receiver<ShiftState> {
        self.state_tx.subscribe()
    }

    /// Typed activation edges. Emitted only for server-confirmed
    /// transitions, never for optimistic or hydrated values.
    pub fn events(&self) -> broadcast::Receiver<ShiftEvent> {
        self.events_tx.subscribe()
    }

    /// Apply a server snapshot: full overwrite, the server always wins.
    pub fn set_from_server(&self, snapshot: &StatusSnapshot) {
        let now = Utc::now();
        let (next, event) = {
            let mut inner = self.lock();
            let next = inner.state.apply_server(snapshot, now);
            let event = if next.is_active != inner.last_emitted_active {
                inner.last_emitted_active = next.is_active;
                Some(if next.is_active {
                    ShiftEvent::Activated {
                        shift_id: next.shift_id.clone(),
                    }
                } else {
                    ShiftEvent::Deactivated
                })
            } else {
                None
            };
            inner.state = next.clone();
            (next, event)
        };
        self.state_tx.send_replace(next.clone());
        if let Some(event) = event {
            match &event {
                ShiftEvent::Activated { shift_id } => {
                    tracing::info!("shift activated (id={shift_id:?})");
                }
                ShiftEvent::Deactivated => tracing::info!("shift deactivated"),
            }
            let _ = self.events_tx.send(event);
        }
        self.persist(next, now);
    }

    /// Merge a local optimistic update. Overwritten by the next server
    /// snapshot; emits no activation events.
    pub fn set_from_local(&self, update: &LocalShiftUpdate) {
        let now = Utc::now();
        let next = {
            let mut inner = self.lock();
            let next = inner.state.apply_local(update, now);
            inner.state = next.clone();
            next
        };
        self.state_tx.send_replace(next.clone());
        self.persist(next, now);
    }

    /// Adopt the persisted envelope if it is fresh enough. Runs once at
    /// startup, before the first UI read, so an active shift does not
    /// flash as "no shift" while the first poll is in flight.
    pub async fn hydrate(&self) {
        let storage = Arc::clone(&self.storage);
        let key = self.cache_key.clone();
        let loaded = tokio::task::spawn_blocking(move || storage.get_item(&key)).await;
        let raw = match loaded {
            Ok(Ok(Some(raw))) => raw,
            Ok(Ok(None)) => return,
            Ok(Err(e)) => {
                tracing::warn!("cache read failed: {e}");
                return;
            }
            Err(e) => {
                tracing::warn!("cache read task failed: {e}");
                return;
            }
        };
        let cached: CachedShiftState = match serde_json::from_str(&raw) {
            Ok(cached) => cached,
            Err(e) => {
                tracing::warn!("cache decode failed: {e}");
                return;
            }
        };
        if !cached.is_fresh(Utc::now(), self.cache_ttl) {
            tracing::debug!("cache stale (written {}), keeping defaults", cached.written_at);
            return;
        }
        tracing::debug!(
            "hydrated shift state (active={}, source={})",
            cached.state.is_active,
            cached.state.source
        );
        let next = cached.state;
        self.lock().state = next.clone();
        self.state_tx.send_replace(next);
    }

    /// Fire-and-forget persistence on a blocking task.
    fn persist(&self, state: ShiftState, now: DateTime<Utc>) {
        let envelope = CachedShiftState::new(state, now);
        let raw = match serde_json::to_string(&envelope) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!("cache encode failed: {e}");
                return;
            }
        };
        let storage = Arc::clone(&self.storage);
        let key = self.cache_key.clone();
        tokio::spawn(async move {
            match tokio::task::spawn_blocking(move || storage.set_item(&key, &raw)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::warn!("cache write failed: {e}"),
                Err(e) => tracing::warn!("cache write task failed: {e}"),
            }
        });
    }

    fn lock(&self) -> MutexGuard<'_, StoreInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────
