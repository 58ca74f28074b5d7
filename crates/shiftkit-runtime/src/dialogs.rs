//! Dialog guard: deduplicates alerts and one-shot permission flows
//! behind a presenter seam.
//!
//! Poll cycles, punch failures, and permission prompts can all fire in
//! the same second; without the gate the worker gets a stack of
//! identical dialogs to dismiss one by one.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;

use shiftkit_core::guard::DialogGate;

// ─── Presenter seam ───────────────────────────────────────────────────────

/// Host bridge to the platform's alert UI. `present` must return
/// immediately; the host reports dismissal via [`DialogGuard::dismissed`].
pub trait AlertPresenter: Send + Sync {
    fn present(&self, request: &AlertRequest);
}

/// A dialog to show.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertRequest {
    pub title: String,
    pub message: String,
    pub buttons: Vec<String>,
}

impl AlertRequest {
    pub fn new(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
            buttons: vec!["OK".to_string()],
        }
    }

    pub fn with_buttons(mut self, buttons: &[&str]) -> Self {
        self.buttons = buttons.iter().map(|b| b.to_string()).collect();
        self
    }
}

// ─── Guard ────────────────────────────────────────────────────────────────

/// Process-wide dialog dedup. One instance per process.
pub struct DialogGuard {
    gate: Mutex<DialogGate>,
    presenter: Arc<dyn AlertPresenter>,
    background_dialog_shown: AtomicBool,
    permission_flow_started: AtomicBool,
}

impl DialogGuard {
    pub fn new(presenter: Arc<dyn AlertPresenter>) -> Self {
        Self {
            gate: Mutex::new(DialogGate::default()),
            presenter,
            background_dialog_shown: AtomicBool::new(false),
            permission_flow_started: AtomicBool::new(false),
        }
    }

    /// Override the post-dismiss cool-down (milliseconds).
    pub fn with_cooldown(presenter: Arc<dyn AlertPresenter>, cooldown_ms: u64) -> Self {
        Self {
            gate: Mutex::new(DialogGate::new(cooldown_ms)),
            ..Self::new(presenter)
        }
    }

    /// Present `request` unless a dialog is already open or cooling
    /// down. Returns whether it was shown.
    pub fn guarded_alert(&self, request: &AlertRequest) -> bool {
        let now_ms = Utc::now().timestamp_millis() as u64;
        let acquired = self
            .gate
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .try_acquire(now_ms);
        if !acquired {
            tracing::debug!("alert suppressed: {}", request.title);
            return false;
        }
        self.presenter.present(request);
        true
    }

    /// Host callback for every dismissal path (button, back gesture,
    /// programmatic close). Starts the cool-down.
    pub fn dismissed(&self) {
        let now_ms = Utc::now().timestamp_millis() as u64;
        self.gate
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .release(now_ms);
    }

    /// One shot per process: the background-location explainer dialog.
    /// Returns `true` for exactly one caller.
    pub fn claim_background_dialog(&self) -> bool {
        !self.background_dialog_shown.swap(true, Ordering::SeqCst)
    }

    /// One shot per process: the sequential permission request flow.
    pub fn claim_permission_flow(&self) -> bool {
        !self.permission_flow_started.swap(true, Ordering::SeqCst)
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingPresenter {
        titles: Mutex<Vec<String>>,
    }

    impl AlertPresenter for RecordingPresenter {
        fn present(&self, request: &AlertRequest) {
            self.titles.lock().unwrap().push(request.title.clone());
        }
    }

    fn shown(presenter: &RecordingPresenter) -> Vec<String> {
        presenter.titles.lock().unwrap().clone()
    }

    #[test]
    fn duplicate_alerts_collapse_to_one() {
        let presenter = Arc::new(RecordingPresenter::default());
        let guard = DialogGuard::new(Arc::clone(&presenter) as Arc<dyn AlertPresenter>);
        let request = AlertRequest::new("Нет связи", "Проверьте подключение");

        assert!(guard.guarded_alert(&request));
        assert!(!guard.guarded_alert(&request));
        assert!(!guard.guarded_alert(&request));
        assert_eq!(shown(&presenter), ["Нет связи"]);
    }

    #[test]
    fn cooldown_suppresses_immediate_reopen() {
        let presenter = Arc::new(RecordingPresenter::default());
        let guard =
            DialogGuard::with_cooldown(Arc::clone(&presenter) as Arc<dyn AlertPresenter>, 30);
        let request = AlertRequest::new("Ошибка", "Попробуйте ещё раз");

        assert!(guard.guarded_alert(&request));
        guard.dismissed();
        assert!(!guard.guarded_alert(&request), "cooldown still active");

        std::thread::sleep(Duration::from_millis(40));
        assert!(guard.guarded_alert(&request), "cooldown elapsed");
        assert_eq!(shown(&presenter).len(), 2);
    }

    #[test]
    fn one_shot_flags_claim_once() {
        let presenter = Arc::new(RecordingPresenter::default());
        let guard = DialogGuard::new(presenter);

        assert!(guard.claim_background_dialog());
        assert!(!guard.claim_background_dialog());
        assert!(guard.claim_permission_flow());
        assert!(!guard.claim_permission_flow());
    }

    #[test]
    fn buttons_are_customizable() {
        let request =
            AlertRequest::new("Включите геолокацию", "Смена требует GPS").with_buttons(&[
                "Настройки",
                "Позже",
            ]);
        assert_eq!(request.buttons, ["Настройки", "Позже"]);
    }
}
