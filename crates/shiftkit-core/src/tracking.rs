//! Tracking lifecycle: the state machine behind the tracking
//! controller's configure-once and start/stop idempotency.
//!
//! Pure, testable state machine with no IO or async dependencies.

use serde::{Deserialize, Serialize};
use std::fmt;

// ─── Phase ────────────────────────────────────────────────────────────────

/// Location engine lifecycle phase, as this process believes it.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackingPhase {
    /// Engine has not been configured this process.
    #[default]
    Uninitialized,
    /// Configured and idle.
    Ready,
    /// Start has been issued, or the engine was found already running.
    Tracking,
}

impl TrackingPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            TrackingPhase::Uninitialized => "uninitialized",
            TrackingPhase::Ready => "ready",
            TrackingPhase::Tracking => "tracking",
        }
    }
}

impl fmt::Display for TrackingPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── Start Decision ───────────────────────────────────────────────────────

/// Decision for an ensure-start request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartDecision {
    /// Issue the engine start command.
    Start,
    /// Engine already reports enabled. Nothing to do.
    AlreadyRunning,
}

// ─── Lifecycle ────────────────────────────────────────────────────────────

/// Configure-once and start/stop bookkeeping for one process.
///
/// `UNINITIALIZED → READY` happens at most once: repeating the engine's
/// configure call mid-session can reset engine internals. `READY ↔
/// TRACKING` is idempotent in both directions.
#[derive(Debug, Clone, Default)]
pub struct TrackingLifecycle {
    phase: TrackingPhase,
    start_requested_once: bool,
}

impl TrackingLifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> TrackingPhase {
        self.phase
    }

    /// True until the first configure is recorded.
    pub fn needs_configure(&self) -> bool {
        self.phase == TrackingPhase::Uninitialized
    }

    /// Record the engine's configure call and the state it reported.
    /// An engine left running by a previous process lands straight in
    /// `Tracking`.
    pub fn note_configured(&mut self, engine_enabled: bool) {
        if self.phase == TrackingPhase::Uninitialized {
            self.phase = if engine_enabled {
                TrackingPhase::Tracking
            } else {
                TrackingPhase::Ready
            };
        }
    }

    /// Decide whether an ensure-start must issue the engine command.
    /// Driven by the engine's own enabled flag, not by `phase`: the
    /// engine is the source of truth for whether it is running.
    pub fn decide_start(&self, engine_enabled: bool) -> StartDecision {
        if engine_enabled {
            StartDecision::AlreadyRunning
        } else {
            StartDecision::Start
        }
    }

    /// Record a successfully issued start.
    pub fn note_started(&mut self) {
        self.phase = TrackingPhase::Tracking;
        self.start_requested_once = true;
    }

    /// Record that the engine was observed already running.
    pub fn note_running(&mut self) {
        self.phase = TrackingPhase::Tracking;
    }

    /// Record a stop. Stopping while not tracking is a no-op.
    pub fn note_stopped(&mut self) {
        if self.phase == TrackingPhase::Tracking {
            self.phase = TrackingPhase::Ready;
        }
    }

    /// Whether this process ever issued a start command.
    pub fn start_requested_once(&self) -> bool {
        self.start_requested_once
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────
