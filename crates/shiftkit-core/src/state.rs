//! Shift state: the process-wide belief about the worker's open shift
//! and the pure transitions that reconcile it with server snapshots.
//!
//! Mutation rules: server writes overwrite everything, local writes
//! merge field-wise. The store in the runtime crate owns locking,
//! persistence, and event fan-out; this module owns only the data.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{StateSource, StatusSnapshot};

/// Freshness window for adopting a persisted state at startup (seconds).
pub const CACHE_TTL_SECS: i64 = 600;

// ─── Shift State ──────────────────────────────────────────────────────────

/// Current belief about the open shift.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShiftState {
    pub is_active: bool,
    pub shift_id: Option<String>,
    pub shift_start: Option<DateTime<Utc>>,
    /// Provenance of the last write.
    pub source: StateSource,
    pub updated_at: DateTime<Utc>,
}

impl ShiftState {
    /// Belief at process start: no shift, locally sourced.
    pub fn initial(now: DateTime<Utc>) -> Self {
        Self {
            is_active: false,
            shift_id: None,
            shift_start: None,
            source: StateSource::Local,
            updated_at: now,
        }
    }

    /// Full overwrite from a server snapshot. The server is always
    /// authoritative: a disagreeing optimistic guess is replaced, not
    /// merged.
    #[must_use]
    pub fn apply_server(&self, snapshot: &StatusSnapshot, now: DateTime<Utc>) -> Self {
        let shift = snapshot.active_shift.as_ref();
        Self {
            is_active: snapshot.has_active_shift,
            shift_id: shift.and_then(|s| s.id.clone()),
            shift_start: shift.and_then(|s| s.shift_start),
            source: StateSource::Server,
            updated_at: now,
        }
    }

    /// Field-wise merge of a local optimistic update. `None` fields keep
    /// their current value; only a server overwrite can clear a field.
    #[must_use]
    pub fn apply_local(&self, update: &LocalShiftUpdate, now: DateTime<Utc>) -> Self {
        Self {
            is_active: update.is_active.unwrap_or(self.is_active),
            shift_id: update.shift_id.clone().or_else(|| self.shift_id.clone()),
            shift_start: update.shift_start.or(self.shift_start),
            source: StateSource::Local,
            updated_at: now,
        }
    }
}

/// Partial optimistic update applied by punch flows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LocalShiftUpdate {
    pub is_active: Option<bool>,
    pub shift_id: Option<String>,
    pub shift_start: Option<DateTime<Utc>>,
}

impl LocalShiftUpdate {
    /// Punch-in guess: shift active, started now.
    pub fn activated(shift_start: DateTime<Utc>) -> Self {
        Self {
            is_active: Some(true),
            shift_id: None,
            shift_start: Some(shift_start),
        }
    }

    /// Punch-out guess: shift over, id and start kept for display.
    pub fn deactivated() -> Self {
        Self {
            is_active: Some(false),
            shift_id: None,
            shift_start: None,
        }
    }
}

// ─── Cache Envelope ───────────────────────────────────────────────────────

/// Persistence envelope: the state plus its write time, so hydration
/// can refuse anything older than the TTL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedShiftState {
    pub state: ShiftState,
    pub written_at: DateTime<Utc>,
}

impl CachedShiftState {
    pub fn new(state: ShiftState, written_at: DateTime<Utc>) -> Self {
        Self { state, written_at }
    }

    /// Whether the envelope is young enough to adopt (`age <= ttl`).
    pub fn is_fresh(&self, now: DateTime<Utc>, ttl: TimeDelta) -> bool {
        now.signed_duration_since(self.written_at) <= ttl
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────
