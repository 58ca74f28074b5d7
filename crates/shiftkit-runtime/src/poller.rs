//! Status poller: the throttled loop that keeps shift state fresh.
//!
//! One poller per process. A second `start` swaps the snapshot callback
//! but neither restarts the loop nor re-targets the user: the app runs
//! exactly one logical user session per process, so the pinned user is
//! deliberate. Revisit if multi-account ever lands.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio::time::{Duration, interval};

use shiftkit_client::ShiftApi;
use shiftkit_core::throttle::{PollDecision, PollGate, PollPolicy};
use shiftkit_core::types::StatusSnapshot;

/// Snapshot callback invoked on every successful fetch. Owns all the
/// derived effects (store update, UI refresh).
pub type SnapshotFn = Arc<dyn Fn(&StatusSnapshot) + Send + Sync>;

/// Outcome of a single poll attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// Fetch completed and the callback ran.
    Fetched,
    /// Fetch completed after the callback was cleared; the response
    /// was discarded.
    Discarded,
    /// Another fetch is in flight; this attempt was dropped.
    InFlight,
    /// The throttle window has not elapsed.
    Throttled,
    /// No user registered yet.
    NoUser,
    /// Fetch failed; error backoff applied.
    Failed,
}

struct PollerShared {
    gate: Mutex<PollGate>,
    user_id: Mutex<Option<String>>,
    callback: Mutex<Option<SnapshotFn>>,
    loop_task: Mutex<Option<JoinHandle<()>>>,
}

impl PollerShared {
    fn stop(&self) {
        if let Some(task) = lock(&self.loop_task).take() {
            task.abort();
        }
        *lock(&self.callback) = None;
        *lock(&self.user_id) = None;
        // the aborted task cannot report back; drop any stale in-flight flag
        lock(&self.gate).reset();
    }
}

/// The poller. Shared behind an `Arc`; `start` requires a Tokio runtime.
pub struct StatusPoller<A: ShiftApi> {
    api: Arc<A>,
    shared: Arc<PollerShared>,
    policy: PollPolicy,
}

impl<A: ShiftApi + 'static> StatusPoller<A> {
    pub fn new(api: Arc<A>, policy: PollPolicy) -> Self {
        Self {
            api,
            shared: Arc::new(PollerShared {
                gate: Mutex::new(PollGate::new(policy.clone())),
                user_id: Mutex::new(None),
                callback: Mutex::new(None),
                loop_task: Mutex::new(None),
            }),
            policy,
        }
    }

    /// Begin polling for `user_id`, or swap the callback if the loop is
    /// already running. The first fetch happens on the immediate first
    /// tick. Returns a handle whose `stop` cancels the loop.
    pub fn start(&self, user_id: &str, on_snapshot: SnapshotFn) -> PollerHandle {
        *lock(&self.shared.callback) = Some(on_snapshot);
        {
            let mut user = lock(&self.shared.user_id);
            if user.is_none() {
                *user = Some(user_id.to_string());
            } else if user.as_deref() != Some(user_id) {
                tracing::warn!("poller already pinned to another user; callback swapped, user kept");
            }
        }
        let mut task = lock(&self.shared.loop_task);
        if task.as_ref().is_none_or(JoinHandle::is_finished) {
            let api = Arc::clone(&self.api);
            let shared = Arc::clone(&self.shared);
            let tick = Duration::from_millis(self.policy.tick_ms);
            *task = Some(tokio::spawn(async move {
                let mut ticker = interval(tick);
                loop {
                    ticker.tick().await;
                    poll_once(&api, &shared).await;
                }
            }));
        }
        PollerHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// One gated poll attempt, outside the loop's cadence.
    pub async fn poll_once(&self) -> PollOutcome {
        poll_once(&self.api, &self.shared).await
    }

    /// Immediate fetch, bypassing the throttle (punch convergence
    /// path). In-flight dedup still applies.
    pub async fn force_poll(&self) -> PollOutcome {
        lock(&self.shared.gate).force();
        poll_once(&self.api, &self.shared).await
    }

    /// Cancel the loop and clear the callback and user.
    pub fn stop(&self) {
        self.shared.stop();
    }

    pub fn is_running(&self) -> bool {
        lock(&self.shared.loop_task)
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }
}

/// Stop handle returned by [`StatusPoller::start`]. Cloneable; any
/// holder may stop the loop, and repeat stops are no-ops.
#[derive(Clone)]
pub struct PollerHandle {
    shared: Arc<PollerShared>,
}

impl PollerHandle {
    /// Cancel the loop, abort any loop-issued fetch, and clear the
    /// callback so late responses are discarded.
    pub fn stop(&self) {
        self.shared.stop();
    }
}

async fn poll_once<A: ShiftApi>(api: &Arc<A>, shared: &Arc<PollerShared>) -> PollOutcome {
    // 1. A poll without a user is a no-op, not a gate stamp.
    let Some(user_id) = lock(&shared.user_id).clone() else {
        return PollOutcome::NoUser;
    };

    // 2. Ask the gate.
    let now_ms = Utc::now().timestamp_millis() as u64;
    match lock(&shared.gate).try_begin(now_ms) {
        PollDecision::Begin => {}
        PollDecision::InFlight => return PollOutcome::InFlight,
        PollDecision::Throttled { retry_in_ms } => {
            tracing::trace!("poll throttled, retry in {retry_in_ms}ms");
            return PollOutcome::Throttled;
        }
    }

    // 3. Fetch, then settle the gate.
    match api.fetch_active_shift(&user_id).await {
        Ok(snapshot) => {
            lock(&shared.gate).finish_ok();
            // re-read: stop() may have cleared the callback mid-flight
            let callback = lock(&shared.callback).clone();
            match callback {
                Some(cb) => {
                    cb(&snapshot);
                    PollOutcome::Fetched
                }
                None => {
                    tracing::debug!("poll result discarded: callback cleared");
                    PollOutcome::Discarded
                }
            }
        }
        Err(e) => {
            let now_ms = Utc::now().timestamp_millis() as u64;
            lock(&shared.gate).finish_err(now_ms);
            tracing::warn!("status poll failed: {e}");
            PollOutcome::Failed
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ─── Tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use shiftkit_client::ApiError;
    use shiftkit_core::types::{PunchAck, PunchOrder};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// In-process backend fake with failure and latency injection.
    struct FakeShiftApi {
        fetch_calls: AtomicUsize,
        fail_fetch: AtomicBool,
        delay: Duration,
    }

    impl FakeShiftApi {
        fn new() -> Self {
            Self {
                fetch_calls: AtomicUsize::new(0),
                fail_fetch: AtomicBool::new(false),
                delay: Duration::ZERO,
            }
        }

        fn slow(delay: Duration) -> Self {
            Self {
                delay,
                ..Self::new()
            }
        }

        fn calls(&self) -> usize {
            self.fetch_calls.load(Ordering::SeqCst)
        }
    }

    impl ShiftApi for FakeShiftApi {
        async fn fetch_active_shift(&self, _user_id: &str) -> Result<StatusSnapshot, ApiError> {
            self.fetch_calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if self.fail_fetch.load(Ordering::SeqCst) {
                return Err(ApiError::Unavailable("simulated outage".to_string()));
            }
            Ok(StatusSnapshot {
                has_active_shift: true,
                ..StatusSnapshot::default()
            })
        }

        async fn send_punch(&self, _order: &PunchOrder) -> Result<PunchAck, ApiError> {
            Ok(PunchAck {
                success: true,
                error: None,
            })
        }
    }

    fn counting_callback() -> (SnapshotFn, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let count2 = Arc::clone(&count);
        let cb: SnapshotFn = Arc::new(move |_snapshot| {
            count2.fetch_add(1, Ordering::SeqCst);
        });
        (cb, count)
    }

    /// Register user and callback without spawning the loop, so tests
    /// control exactly when polls happen.
    fn register(poller: &StatusPoller<FakeShiftApi>, user: &str, cb: SnapshotFn) {
        *lock(&poller.shared.user_id) = Some(user.to_string());
        *lock(&poller.shared.callback) = Some(cb);
    }

    fn poller_with(api: Arc<FakeShiftApi>, policy: PollPolicy) -> Arc<StatusPoller<FakeShiftApi>> {
        Arc::new(StatusPoller::new(api, policy))
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

    // ── Gating ──

    #[tokio::test]
    async fn poll_without_user_is_a_no_op() {
        let api = Arc::new(FakeShiftApi::new());
        let poller = poller_with(Arc::clone(&api), PollPolicy::default());

        assert_eq!(poller.poll_once().await, PollOutcome::NoUser);
        assert_eq!(api.calls(), 0);
    }

    #[tokio::test]
    async fn back_to_back_polls_are_throttled() {
        let api = Arc::new(FakeShiftApi::new());
        let poller = poller_with(Arc::clone(&api), PollPolicy::default());
        let (cb, count) = counting_callback();
        register(&poller, "u-1", cb);

        assert_eq!(poller.poll_once().await, PollOutcome::Fetched);
        assert_eq!(poller.poll_once().await, PollOutcome::Throttled);
        assert_eq!(api.calls(), 1, "one network request, not two");
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn overlapping_poll_is_dropped_not_queued() {
        let api = Arc::new(FakeShiftApi::slow(Duration::from_millis(100)));
        let poller = poller_with(Arc::clone(&api), PollPolicy::default());
        let (cb, _count) = counting_callback();
        register(&poller, "u-1", cb);

        let first = {
            let poller = Arc::clone(&poller);
            tokio::spawn(async move { poller.poll_once().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(poller.poll_once().await, PollOutcome::InFlight);
        assert_eq!(first.await.expect("join"), PollOutcome::Fetched);
        assert_eq!(api.calls(), 1);
    }

    #[tokio::test]
    async fn force_poll_bypasses_the_throttle() {
        let api = Arc::new(FakeShiftApi::new());
        let poller = poller_with(Arc::clone(&api), PollPolicy::default());
        let (cb, _count) = counting_callback();
        register(&poller, "u-1", cb);

        assert_eq!(poller.poll_once().await, PollOutcome::Fetched);
        assert_eq!(poller.force_poll().await, PollOutcome::Fetched);
        assert_eq!(api.calls(), 2);
    }

    // ── Error backoff ──

    #[tokio::test]
    async fn failed_fetch_applies_backoff() {
        let api = Arc::new(FakeShiftApi::new());
        api.fail_fetch.store(true, Ordering::SeqCst);
        let poller = poller_with(Arc::clone(&api), PollPolicy::default());
        let (cb, _count) = counting_callback();
        register(&poller, "u-1", cb);

        let before_ms = Utc::now().timestamp_millis() as u64;
        assert_eq!(poller.poll_once().await, PollOutcome::Failed);
        let after_ms = Utc::now().timestamp_millis() as u64;

        api.fail_fetch.store(false, Ordering::SeqCst);
        assert_eq!(
            poller.poll_once().await,
            PollOutcome::Throttled,
            "backoff outlasts the normal interval"
        );
        assert_eq!(api.calls(), 1);

        // drive a gate copy with a synthetic clock to pin the window:
        // next attempt is allowed no sooner than failure + 60s
        let mut gate = lock(&poller.shared.gate).clone();
        assert!(matches!(
            gate.try_begin(before_ms + 59_999),
            PollDecision::Throttled { .. }
        ));
        let mut gate = lock(&poller.shared.gate).clone();
        assert_eq!(gate.try_begin(after_ms + 60_000), PollDecision::Begin);
    }

    // ── The loop ──

    #[tokio::test]
    async fn loop_fetches_on_its_cadence() {
        let api = Arc::new(FakeShiftApi::new());
        let policy = PollPolicy {
            tick_ms: 10,
            min_interval_ms: 20,
            error_backoff_ms: 40,
        };
        let poller = poller_with(Arc::clone(&api), policy);
        let (cb, count) = counting_callback();

        let handle = poller.start("u-1", cb);
        assert!(poller.is_running());
        assert!(
            wait_until(1_000, || count.load(Ordering::SeqCst) >= 2).await,
            "loop should keep fetching"
        );

        handle.stop();
        assert!(!poller.is_running());
        let settled = api.calls();
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(api.calls(), settled, "no fetches after stop");
    }

    #[tokio::test]
    async fn restart_after_stop_spawns_a_fresh_loop() {
        let api = Arc::new(FakeShiftApi::new());
        let policy = PollPolicy {
            tick_ms: 10,
            min_interval_ms: 20,
            error_backoff_ms: 40,
        };
        let poller = poller_with(Arc::clone(&api), policy);

        let (cb1, count1) = counting_callback();
        let handle = poller.start("u-1", cb1);
        assert!(wait_until(1_000, || count1.load(Ordering::SeqCst) >= 1).await);
        handle.stop();

        let (cb2, count2) = counting_callback();
        let _handle = poller.start("u-1", cb2);
        assert!(poller.is_running());
        assert!(
            wait_until(1_000, || count2.load(Ordering::SeqCst) >= 1).await,
            "restarted loop should fetch again"
        );
    }

    // ── Callback and user semantics ──

    #[tokio::test]
    async fn second_start_swaps_callback_and_keeps_user() {
        let api = Arc::new(FakeShiftApi::new());
        let poller = poller_with(Arc::clone(&api), PollPolicy::default());
        let (cb1, count1) = counting_callback();
        let (cb2, count2) = counting_callback();

        let _handle = poller.start("u-1", cb1);
        assert!(wait_until(1_000, || count1.load(Ordering::SeqCst) == 1).await);

        let _handle = poller.start("u-other", cb2);
        assert_eq!(
            lock(&poller.shared.user_id).as_deref(),
            Some("u-1"),
            "user stays pinned"
        );

        assert_eq!(poller.force_poll().await, PollOutcome::Fetched);
        assert_eq!(count2.load(Ordering::SeqCst), 1, "new callback receives");
        assert_eq!(count1.load(Ordering::SeqCst), 1, "old callback does not");
    }

    #[tokio::test]
    async fn late_response_after_stop_is_discarded() {
        let api = Arc::new(FakeShiftApi::slow(Duration::from_millis(100)));
        let poller = poller_with(Arc::clone(&api), PollPolicy::default());
        let (cb, count) = counting_callback();
        register(&poller, "u-1", cb);

        let in_flight = {
            let poller = Arc::clone(&poller);
            tokio::spawn(async move { poller.poll_once().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        poller.stop();

        assert_eq!(in_flight.await.expect("join"), PollOutcome::Discarded);
        assert_eq!(count.load(Ordering::SeqCst), 0, "cleared callback never runs");
        assert_eq!(poller.poll_once().await, PollOutcome::NoUser);
    }

    #[tokio::test]
    async fn stop_is_idempotent() {
        let api = Arc::new(FakeShiftApi::new());
        let poller = poller_with(Arc::clone(&api), PollPolicy::default());
        let (cb, _count) = counting_callback();

        let handle = poller.start("u-1", cb);
        handle.stop();
        handle.stop();
        poller.stop();
        assert!(!poller.is_running());
    }
}
