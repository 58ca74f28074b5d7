//! Composition context: one per process, built by the host app's
//! composition root.
//!
//! There are no module-level singletons; every collaborator is passed
//! in explicitly, so each piece stays instantiable on its own in tests.

use std::sync::Arc;

use chrono::TimeDelta;

use shiftkit_client::{ApiError, HttpShiftApi, ShiftApi};

use crate::config::RuntimeConfig;
use crate::dialogs::{AlertPresenter, DialogGuard};
use crate::poller::StatusPoller;
use crate::session::ShiftSession;
use crate::storage::CacheStorage;
use crate::store::ShiftStore;
use crate::tracking::{LocationEngine, TrackingController, spawn_status_bridge};

/// Everything the coordinator owns, wired together.
pub struct ShiftRuntime<A: ShiftApi> {
    config: RuntimeConfig,
    pub store: Arc<ShiftStore>,
    pub poller: Arc<StatusPoller<A>>,
    pub tracking: Arc<TrackingController>,
    pub dialogs: Arc<DialogGuard>,
    api: Arc<A>,
    bridge: tokio::task::JoinHandle<()>,
}

impl<A: ShiftApi + 'static> ShiftRuntime<A> {
    /// Build and hydrate the runtime. The store is hydrated before this
    /// returns, so the first UI read never flashes "no shift" while an
    /// active one sits in the cache.
    pub async fn bootstrap(
        config: RuntimeConfig,
        api: Arc<A>,
        engine: Arc<dyn LocationEngine>,
        storage: Arc<dyn CacheStorage>,
        presenter: Arc<dyn AlertPresenter>,
    ) -> Self {
        let store = Arc::new(
            ShiftStore::new(storage, config.cache_key.clone())
                .with_ttl(TimeDelta::seconds(config.cache_ttl_secs)),
        );
        store.hydrate().await;

        let tracking = Arc::new(TrackingController::new(engine, config.engine.clone()));
        let poller = Arc::new(StatusPoller::new(Arc::clone(&api), config.poll.clone()));
        let dialogs = Arc::new(DialogGuard::with_cooldown(
            presenter,
            config.alert_cooldown_ms,
        ));
        let bridge = spawn_status_bridge(store.events(), Arc::clone(&tracking));
        tracing::info!("shift runtime ready (cache_key={})", config.cache_key);

        Self {
            config,
            store,
            poller,
            tracking,
            dialogs,
            api,
            bridge,
        }
    }

    /// Wire a session for the logged-in user.
    pub fn open_session(&self, user_id: &str, device_id: &str) -> ShiftSession<A> {
        ShiftSession::new(
            user_id,
            device_id,
            Arc::clone(&self.api),
            Arc::clone(&self.store),
            Arc::clone(&self.poller),
            Arc::clone(&self.tracking),
        )
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Stop background tasks. Sessions already handed out keep their
    /// store and tracking handles; polling and the event bridge end
    /// here.
    pub fn shutdown(self) {
        self.poller.stop();
        self.bridge.abort();
        tracing::info!("shift runtime stopped");
    }
}

impl ShiftRuntime<HttpShiftApi> {
    /// Production wiring: build the HTTP adapter from `config.api`.
    pub async fn bootstrap_http(
        config: RuntimeConfig,
        engine: Arc<dyn LocationEngine>,
        storage: Arc<dyn CacheStorage>,
        presenter: Arc<dyn AlertPresenter>,
    ) -> Result<Self, ApiError> {
        let api = Arc::new(HttpShiftApi::new(config.api.clone())?);
        Ok(Self::bootstrap(config, api, engine, storage, presenter).await)
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────
