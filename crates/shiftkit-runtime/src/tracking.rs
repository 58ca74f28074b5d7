//! Tracking controller: idempotent start/stop around the background
//! location engine, plus the bridge task that follows shift events.
//!
//! Engine failures are logged, never raised. Tracking is best-effort
//! and must not block a punch flow; a worker in the field cannot fix a
//! broken GPS stack from an error dialog.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, broadcast};
use tokio::task::JoinHandle;

use shiftkit_core::tracking::{StartDecision, TrackingLifecycle, TrackingPhase};
use shiftkit_core::types::ShiftEvent;

use crate::error::EngineError;

// ─── Engine seam ──────────────────────────────────────────────────────────

/// Black-box contract of the background location engine.
///
/// Calls map to synchronous native-bridge operations; the controller
/// runs them on blocking tasks. Once started, the engine samples and
/// uploads points on its own; nothing here consumes location events.
pub trait LocationEngine: Send + Sync {
    /// Prepare the engine. Returns the state it reports afterwards, so
    /// an engine left running by a previous process can be adopted.
    fn configure(&self, options: &EngineOptions) -> Result<EngineState, EngineError>;
    fn start(&self) -> Result<(), EngineError>;
    fn stop(&self) -> Result<(), EngineError>;
    fn state(&self) -> Result<EngineState, EngineError>;
    /// Number of points buffered locally, not yet uploaded.
    fn buffered_count(&self) -> Result<u64, EngineError>;
    /// Push buffered points to the upload endpoint now.
    fn flush(&self) -> Result<(), EngineError>;
}

/// Engine-reported state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineState {
    pub enabled: bool,
}

/// Configure-time engine options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineOptions {
    /// Upload endpoint for batched points. `None` keeps the engine's
    /// built-in default.
    pub upload_url: Option<String>,
    /// Minimum movement between samples, meters.
    pub distance_filter_m: f64,
    /// Upload batches automatically as they fill.
    pub auto_sync: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            upload_url: None,
            distance_filter_m: 50.0,
            auto_sync: true,
        }
    }
}

// ─── Controller ───────────────────────────────────────────────────────────

/// Idempotent start/stop wrapper around the engine.
///
/// The lifecycle mutex is held across engine calls, so concurrent
/// ensure/stop sequences serialize and at most one start is in flight.
pub struct TrackingController {
    engine: Arc<dyn LocationEngine>,
    lifecycle: Mutex<TrackingLifecycle>,
    options: EngineOptions,
}

impl TrackingController {
    pub fn new(engine: Arc<dyn LocationEngine>, options: EngineOptions) -> Self {
        Self {
            engine,
            lifecycle: Mutex::new(TrackingLifecycle::new()),
            options,
        }
    }

    /// Start the engine unless it already reports enabled.
    pub async fn ensure_started(&self, reason: &str) {
        let mut lifecycle = self.lifecycle.lock().await;
        self.start_locked(&mut lifecycle, reason).await;
    }

    /// Configure once per process, then ensure the engine is started.
    /// Called when a shift is confirmed active or a punch-in begins.
    pub async fn ensure_tracking(&self, user_id: &str) {
        let mut lifecycle = self.lifecycle.lock().await;
        if lifecycle.needs_configure() {
            match self.engine_configure().await {
                Ok(state) => {
                    lifecycle.note_configured(state.enabled);
                    tracing::info!(
                        "engine configured (user={user_id}, enabled={})",
                        state.enabled
                    );
                }
                Err(e) => tracing::warn!("engine configure failed (user={user_id}): {e}"),
            }
        }
        self.start_locked(&mut lifecycle, "ensure-tracking").await;
    }

    /// Flush buffered points (best-effort), then stop the engine.
    pub async fn stop_tracking(&self) {
        let mut lifecycle = self.lifecycle.lock().await;
        match self.engine_buffered_count().await {
            Ok(0) => {}
            Ok(n) => {
                tracing::debug!("flushing {n} buffered points before stop");
                if let Err(e) = self.engine_flush().await {
                    tracing::warn!("flush before stop failed: {e}");
                }
            }
            Err(e) => tracing::warn!("buffered-count check failed: {e}"),
        }
        match self.engine_stop().await {
            Ok(()) => {
                lifecycle.note_stopped();
                tracing::info!("tracking stopped");
            }
            Err(e) => tracing::warn!("tracking stop failed: {e}"),
        }
    }

    /// Shift-status integration seam. Activation ensures tracking is
    /// running. Deactivation is a no-op by contract: tracking may run
    /// briefly past shift end, and shift-ending flows call
    /// [`stop_tracking`](Self::stop_tracking) themselves.
    pub async fn on_shift_status_changed(&self, is_active: bool) {
        if is_active {
            self.ensure_started("shift-active").await;
        } else {
            tracing::debug!("shift inactive: leaving tracking as-is");
        }
    }

    pub async fn phase(&self) -> TrackingPhase {
        self.lifecycle.lock().await.phase()
    }

    async fn start_locked(&self, lifecycle: &mut TrackingLifecycle, reason: &str) {
        let enabled = match self.engine_state().await {
            Ok(state) => state.enabled,
            Err(e) => {
                tracing::warn!("engine state check failed ({reason}): {e}");
                false
            }
        };
        match lifecycle.decide_start(enabled) {
            StartDecision::AlreadyRunning => {
                lifecycle.note_running();
                tracing::debug!("tracking already enabled ({reason})");
            }
            StartDecision::Start => match self.engine_start().await {
                Ok(()) => {
                    lifecycle.note_started();
                    tracing::info!("tracking started ({reason})");
                }
                Err(e) => tracing::warn!("tracking start failed ({reason}): {e}"),
            },
        }
    }

    async fn engine_configure(&self) -> Result<EngineState, EngineError> {
        let engine = Arc::clone(&self.engine);
        let options = self.options.clone();
        run_blocking(move || engine.configure(&options)).await
    }

    async fn engine_start(&self) -> Result<(), EngineError> {
        let engine = Arc::clone(&self.engine);
        run_blocking(move || engine.start()).await
    }

    async fn engine_stop(&self) -> Result<(), EngineError> {
        let engine = Arc::clone(&self.engine);
        run_blocking(move || engine.stop()).await
    }

    async fn engine_state(&self) -> Result<EngineState, EngineError> {
        let engine = Arc::clone(&self.engine);
        run_blocking(move || engine.state()).await
    }

    async fn engine_buffered_count(&self) -> Result<u64, EngineError> {
        let engine = Arc::clone(&self.engine);
        run_blocking(move || engine.buffered_count()).await
    }

    async fn engine_flush(&self) -> Result<(), EngineError> {
        let engine = Arc::clone(&self.engine);
        run_blocking(move || engine.flush()).await
    }
}

async fn run_blocking<T: Send + 'static>(
    f: impl FnOnce() -> Result<T, EngineError> + Send + 'static,
) -> Result<T, EngineError> {
    match tokio::task::spawn_blocking(f).await {
        Ok(result) => result,
        Err(e) => Err(EngineError::Command(format!("engine task failed: {e}"))),
    }
}

// ─── Status bridge ────────────────────────────────────────────────────────

/// Forward store activation edges into the controller. Runs until the
/// event channel closes.
pub fn spawn_status_bridge(
    mut events: broadcast::Receiver<ShiftEvent>,
    controller: Arc<TrackingController>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(ShiftEvent::Activated { shift_id }) => {
                    tracing::debug!("bridge: shift activated (id={shift_id:?})");
                    controller.on_shift_status_changed(true).await;
                }
                Ok(ShiftEvent::Deactivated) => {
                    controller.on_shift_status_changed(false).await;
                }
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::warn!("bridge lagged, {missed} events missed");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

// ─── Tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
    use std::time::Duration;

    /// Engine fake that counts commands and mirrors enabled state.
    struct FakeEngine {
        configure_calls: AtomicUsize,
        start_calls: AtomicUsize,
        stop_calls: AtomicUsize,
        flush_calls: AtomicUsize,
        enabled: AtomicBool,
        buffered: AtomicU64,
        fail_start: AtomicBool,
        fail_stop: AtomicBool,
    }

    impl FakeEngine {
        fn new() -> Self {
            Self {
                configure_calls: AtomicUsize::new(0),
                start_calls: AtomicUsize::new(0),
                stop_calls: AtomicUsize::new(0),
                flush_calls: AtomicUsize::new(0),
                enabled: AtomicBool::new(false),
                buffered: AtomicU64::new(0),
                fail_start: AtomicBool::new(false),
                fail_stop: AtomicBool::new(false),
            }
        }
    }

    impl LocationEngine for FakeEngine {
        fn configure(&self, _options: &EngineOptions) -> Result<EngineState, EngineError> {
            self.configure_calls.fetch_add(1, Ordering::SeqCst);
            Ok(EngineState {
                enabled: self.enabled.load(Ordering::SeqCst),
            })
        }

        fn start(&self) -> Result<(), EngineError> {
            self.start_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_start.load(Ordering::SeqCst) {
                return Err(EngineError::Command("start rejected".to_string()));
            }
            self.enabled.store(true, Ordering::SeqCst);
            Ok(())
        }

        fn stop(&self) -> Result<(), EngineError> {
            self.stop_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_stop.load(Ordering::SeqCst) {
                return Err(EngineError::Command("stop rejected".to_string()));
            }
            self.enabled.store(false, Ordering::SeqCst);
            Ok(())
        }

        fn state(&self) -> Result<EngineState, EngineError> {
            Ok(EngineState {
                enabled: self.enabled.load(Ordering::SeqCst),
            })
        }

        fn buffered_count(&self) -> Result<u64, EngineError> {
            Ok(self.buffered.load(Ordering::SeqCst))
        }

        fn flush(&self) -> Result<(), EngineError> {
            self.flush_calls.fetch_add(1, Ordering::SeqCst);
            self.buffered.store(0, Ordering::SeqCst);
            Ok(())
        }
    }

    fn controller_with(engine: Arc<FakeEngine>) -> TrackingController {
        TrackingController::new(engine, EngineOptions::default())
    }

    async fn wait_until(deadline_ms: u64, mut done: impl FnMut() -> bool) -> bool {
        for _ in 0..(deadline_ms / 5).max(1) {
            if done() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        done()
    }

    // ── Idempotency ──

    #[tokio::test]
    async fn ensure_started_issues_one_start() {
        let engine = Arc::new(FakeEngine::new());
        let controller = controller_with(Arc::clone(&engine));

        controller.ensure_started("boot").await;
        controller.ensure_started("boot").await;
        controller.ensure_started("shift-active").await;

        assert_eq!(engine.start_calls.load(Ordering::SeqCst), 1);
        assert_eq!(controller.phase().await, TrackingPhase::Tracking);
    }

    #[tokio::test]
    async fn ensure_tracking_configures_once() {
        let engine = Arc::new(FakeEngine::new());
        let controller = controller_with(Arc::clone(&engine));

        controller.ensure_tracking("u-1").await;
        controller.ensure_tracking("u-1").await;

        assert_eq!(engine.configure_calls.load(Ordering::SeqCst), 1);
        assert_eq!(engine.start_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn already_running_engine_is_adopted_without_start() {
        let engine = Arc::new(FakeEngine::new());
        engine.enabled.store(true, Ordering::SeqCst);
        let controller = controller_with(Arc::clone(&engine));

        controller.ensure_tracking("u-1").await;

        assert_eq!(engine.start_calls.load(Ordering::SeqCst), 0);
        assert_eq!(controller.phase().await, TrackingPhase::Tracking);
    }

    // ── Failure handling ──

    #[tokio::test]
    async fn failed_start_is_swallowed_and_retried_next_time() {
        let engine = Arc::new(FakeEngine::new());
        engine.fail_start.store(true, Ordering::SeqCst);
        let controller = controller_with(Arc::clone(&engine));

        controller.ensure_started("boot").await;
        assert_eq!(controller.phase().await, TrackingPhase::Uninitialized);

        engine.fail_start.store(false, Ordering::SeqCst);
        controller.ensure_started("retry").await;
        assert_eq!(engine.start_calls.load(Ordering::SeqCst), 2);
        assert_eq!(controller.phase().await, TrackingPhase::Tracking);
    }

    #[tokio::test]
    async fn failed_stop_keeps_tracking_phase() {
        let engine = Arc::new(FakeEngine::new());
        let controller = controller_with(Arc::clone(&engine));
        controller.ensure_tracking("u-1").await;

        engine.fail_stop.store(true, Ordering::SeqCst);
        controller.stop_tracking().await;
        assert_eq!(
            controller.phase().await,
            TrackingPhase::Tracking,
            "phase only advances on a successful stop"
        );
    }

    // ── Flush-before-stop ──

    #[tokio::test]
    async fn stop_flushes_buffered_points_first() {
        let engine = Arc::new(FakeEngine::new());
        engine.buffered.store(5, Ordering::SeqCst);
        let controller = controller_with(Arc::clone(&engine));
        controller.ensure_tracking("u-1").await;

        controller.stop_tracking().await;
        assert_eq!(engine.flush_calls.load(Ordering::SeqCst), 1);
        assert_eq!(engine.stop_calls.load(Ordering::SeqCst), 1);
        assert_eq!(controller.phase().await, TrackingPhase::Ready);
    }

    #[tokio::test]
    async fn stop_skips_flush_when_buffer_is_empty() {
        let engine = Arc::new(FakeEngine::new());
        let controller = controller_with(Arc::clone(&engine));
        controller.ensure_tracking("u-1").await;

        controller.stop_tracking().await;
        assert_eq!(engine.flush_calls.load(Ordering::SeqCst), 0);
        assert_eq!(engine.stop_calls.load(Ordering::SeqCst), 1);
    }

    // ── Status integration ──

    #[tokio::test]
    async fn deactivation_does_not_stop_tracking() {
        let engine = Arc::new(FakeEngine::new());
        let controller = controller_with(Arc::clone(&engine));
        controller.ensure_tracking("u-1").await;

        controller.on_shift_status_changed(false).await;
        assert_eq!(engine.stop_calls.load(Ordering::SeqCst), 0);
        assert_eq!(controller.phase().await, TrackingPhase::Tracking);
    }

    #[tokio::test]
    async fn bridge_starts_tracking_on_activation_edges() {
        let engine = Arc::new(FakeEngine::new());
        let controller = Arc::new(controller_with(Arc::clone(&engine)));
        let (tx, rx) = broadcast::channel(8);
        let bridge = spawn_status_bridge(rx, Arc::clone(&controller));

        tx.send(ShiftEvent::Activated {
            shift_id: Some("9107".to_string()),
        })
        .expect("send");
        assert!(
            wait_until(1_000, || engine.start_calls.load(Ordering::SeqCst) == 1).await,
            "activation should start tracking"
        );

        tx.send(ShiftEvent::Deactivated).expect("send");
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(
            engine.stop_calls.load(Ordering::SeqCst),
            0,
            "deactivation must not stop tracking"
        );

        drop(tx);
        bridge.await.expect("bridge exits when channel closes");
    }
}
