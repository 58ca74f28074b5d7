//! Shift session: per-user orchestration of poller, store, tracking,
//! and the punch flows.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;

use shiftkit_client::ShiftApi;
use shiftkit_core::state::LocalShiftUpdate;
use shiftkit_core::status::parse_worker_status;
use shiftkit_core::types::{
    PunchAck, PunchDirection, PunchOrder, StatusCheck, StatusSnapshot, WorkerStatus,
};

use crate::error::{CaptureError, SessionError};
use crate::poller::{PollerHandle, SnapshotFn, StatusPoller};
use crate::store::ShiftStore;
use crate::tracking::TrackingController;

/// UI status hook. Receives the raw snapshot; the reconciled state is
/// on the store's watch channel.
pub type StatusCallback = Arc<dyn Fn(&StatusSnapshot) + Send + Sync>;

/// Photo capture seam. The camera UX lives in the host app; the punch
/// flows only need a capture that yields a file name or fails.
pub trait PhotoCapture: Send + Sync {
    fn capture(&self) -> impl Future<Output = Result<String, CaptureError>> + Send;
}

/// One logged-in worker's view of the coordinator.
pub struct ShiftSession<A: ShiftApi> {
    user_id: String,
    device_id: String,
    api: Arc<A>,
    store: Arc<ShiftStore>,
    poller: Arc<StatusPoller<A>>,
    tracking: Arc<TrackingController>,
    ui_callback: Arc<Mutex<Option<StatusCallback>>>,
    poll_handle: Mutex<Option<PollerHandle>>,
}

impl<A: ShiftApi + 'static> ShiftSession<A> {
    pub fn new(
        user_id: &str,
        device_id: &str,
        api: Arc<A>,
        store: Arc<ShiftStore>,
        poller: Arc<StatusPoller<A>>,
        tracking: Arc<TrackingController>,
    ) -> Self {
        Self {
            user_id: user_id.to_string(),
            device_id: device_id.to_string(),
            api,
            store,
            poller,
            tracking,
            ui_callback: Arc::new(Mutex::new(None)),
            poll_handle: Mutex::new(None),
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Register the UI hook. Overwrites any previous one; the poll loop
    /// keeps running either way.
    pub fn set_status_callback(&self, callback: StatusCallback) {
        *lock(&self.ui_callback) = Some(callback);
    }

    /// Install the composed snapshot callback and start polling. Every
    /// successful fetch updates the store first, then notifies the UI.
    pub fn connect(&self) {
        let store = Arc::clone(&self.store);
        let ui = Arc::clone(&self.ui_callback);
        let on_snapshot: SnapshotFn = Arc::new(move |snapshot: &StatusSnapshot| {
            store.set_from_server(snapshot);
            // read at delivery time so a swapped callback takes over
            if let Some(cb) = lock(&ui).clone() {
                cb(snapshot);
            }
        });
        let handle = self.poller.start(&self.user_id, on_snapshot);
        *lock(&self.poll_handle) = Some(handle);
    }

    /// Stop polling for this session. Safe to call repeatedly.
    pub fn disconnect(&self) {
        if let Some(handle) = lock(&self.poll_handle).take() {
            handle.stop();
        }
    }

    /// Direct, throttle-free status read used ahead of punch actions.
    /// Failure reports as [`StatusCheck::Unreachable`], never as "no
    /// active shift".
    pub async fn current_status(&self) -> StatusCheck {
        match self.api.fetch_active_shift(&self.user_id).await {
            Ok(snapshot) => StatusCheck::Confirmed(snapshot),
            Err(e) => {
                tracing::warn!("status check failed: {e}");
                StatusCheck::Unreachable
            }
        }
    }

    /// Submit a punch. On success, forces an immediate poll so store
    /// and UI converge without waiting for the next cycle. Does not
    /// touch the store itself; callers own the optimistic updates.
    pub async fn send_punch(&self, direction: PunchDirection) -> Result<PunchAck, SessionError> {
        if self.user_id.trim().is_empty() {
            return Err(SessionError::MissingUserId);
        }
        let now = Utc::now().timestamp();
        let order = PunchOrder {
            user_id: self.user_id.clone(),
            direction,
            timestamp: now,
            device_id: self.device_id.clone(),
            photo_name: punch_photo_name(&self.user_id, now),
        };
        let ack = self.api.send_punch(&order).await?;
        if !ack.success {
            let detail = ack
                .error
                .clone()
                .unwrap_or_else(|| "unspecified".to_string());
            return Err(SessionError::Rejected(detail));
        }
        tracing::info!("punch accepted (direction={direction}, user={})", self.user_id);
        self.poller.force_poll().await;
        Ok(ack)
    }

    /// Full punch-in orchestration: status gate, pre-emptive tracking
    /// start, selfie capture, then the punch itself. Capture or punch
    /// failure rolls tracking back; a shift never starts silently.
    pub async fn punch_in<C: PhotoCapture>(&self, camera: &C) -> Result<PunchAck, SessionError> {
        if self.user_id.trim().is_empty() {
            return Err(SessionError::MissingUserId);
        }

        // 1. Fresh status gate.
        match self.current_status().await {
            StatusCheck::Confirmed(snapshot) => {
                if snapshot.has_active_shift {
                    return Err(SessionError::AlreadyOnShift);
                }
                match parse_worker_status(snapshot.worker_status.as_deref()) {
                    WorkerStatus::Active | WorkerStatus::Unknown => {}
                    blocked @ (WorkerStatus::Inactive
                    | WorkerStatus::Blocked
                    | WorkerStatus::Dismissed) => {
                        return Err(SessionError::NotEligible(blocked));
                    }
                }
            }
            StatusCheck::Unreachable => {
                // known risk: if a shift just opened elsewhere this can
                // double-punch. the backend rejects the duplicate.
                tracing::warn!("status unreachable before punch-in, proceeding");
            }
        }

        // 2. Pre-emptive tracking start, so the first GPS point leads
        //    the shift instead of trailing it.
        self.tracking.ensure_tracking(&self.user_id).await;

        // 3. Selfie capture; an abort rolls tracking back untouched by
        //    any punch.
        let photo = match camera.capture().await {
            Ok(name) => name,
            Err(e) => {
                self.tracking.stop_tracking().await;
                return Err(e.into());
            }
        };
        tracing::debug!("punch-in selfie captured: {photo}");

        // 4. Optimistic flip for instant UI.
        self.store
            .set_from_local(&LocalShiftUpdate::activated(Utc::now()));

        // 5. The punch itself; failure reverts the flip and tracking.
        match self.send_punch(PunchDirection::In).await {
            Ok(ack) => Ok(ack),
            Err(e) => {
                self.store.set_from_local(&LocalShiftUpdate::deactivated());
                self.tracking.stop_tracking().await;
                Err(e)
            }
        }
    }

    /// Punch-out orchestration: selfie, optimistic flip, punch, then
    /// tracking stop (with flush). On failure the shift stays active
    /// locally: it is still open server-side.
    pub async fn punch_out<C: PhotoCapture>(&self, camera: &C) -> Result<PunchAck, SessionError> {
        if self.user_id.trim().is_empty() {
            return Err(SessionError::MissingUserId);
        }

        let photo = camera.capture().await?;
        tracing::debug!("punch-out selfie captured: {photo}");

        self.store.set_from_local(&LocalShiftUpdate::deactivated());

        match self.send_punch(PunchDirection::Out).await {
            Ok(ack) => {
                self.tracking.stop_tracking().await;
                Ok(ack)
            }
            Err(e) => {
                self.store.set_from_local(&LocalShiftUpdate {
                    is_active: Some(true),
                    ..LocalShiftUpdate::default()
                });
                Err(e)
            }
        }
    }

    /// Out-of-band convergence poke (pull-to-refresh and similar).
    pub async fn force_refresh(&self) {
        self.poller.force_poll().await;
    }
}

/// Placeholder name for the selfie upload tied to a punch.
fn punch_photo_name(user_id: &str, epoch: i64) -> String {
    format!("punch_{user_id}_{epoch}.jpg")
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ─── Tests ────────────────────────────────────────────────────────────────
