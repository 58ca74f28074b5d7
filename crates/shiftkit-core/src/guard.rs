//! Dialog gate: collapses near-simultaneous alert triggers into one
//! visible dialog, with a fixed cool-down after dismissal.
//!
//! Pure, testable state machine with no IO or async dependencies.

/// Cool-down after a dialog is dismissed (milliseconds).
pub const DIALOG_COOLDOWN_MS: u64 = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GateState {
    Idle,
    Open,
    Cooldown { until_ms: u64 },
}

/// Single-dialog gate with a post-dismiss cool-down.
///
/// `now_ms` is epoch milliseconds supplied by the caller.
#[derive(Debug, Clone)]
pub struct DialogGate {
    state: GateState,
    cooldown_ms: u64,
}

impl DialogGate {
    pub fn new(cooldown_ms: u64) -> Self {
        Self {
            state: GateState::Idle,
            cooldown_ms,
        }
    }

    /// Try to claim the dialog slot at `now_ms`. Returns `false` while
    /// a dialog is open or the cool-down has not elapsed.
    pub fn try_acquire(&mut self, now_ms: u64) -> bool {
        match self.state {
            GateState::Open => false,
            GateState::Cooldown { until_ms } if now_ms < until_ms => false,
            _ => {
                self.state = GateState::Open;
                true
            }
        }
    }

    /// Record dismissal and start the cool-down. Every dismissal path
    /// (button, back gesture, programmatic close) must land here.
    pub fn release(&mut self, now_ms: u64) {
        if self.state == GateState::Open {
            self.state = GateState::Cooldown {
                until_ms: now_ms.saturating_add(self.cooldown_ms),
            };
        }
    }

    pub fn is_open(&self) -> bool {
        self.state == GateState::Open
    }
}

impl Default for DialogGate {
    fn default() -> Self {
        Self::new(DIALOG_COOLDOWN_MS)
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────
