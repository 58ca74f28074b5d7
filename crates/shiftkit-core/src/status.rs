//! Worker-status boundary parsing.
//!
//! The backend reports worker standing as free-form text (Russian in
//! production, English in some fixtures). It is interpreted here, once,
//! so everything downstream sees only the closed [`WorkerStatus`] enum.

use crate::types::WorkerStatus;

/// Map raw `worker_status` text onto the closed enum.
///
/// Substring heuristics over the lowercased input. Negated forms are
/// checked before the positives they contain ("неактивен" contains
/// "активен"). Missing, empty, or unrecognized input is `Unknown`.
pub fn parse_worker_status(raw: Option<&str>) -> WorkerStatus {
    let Some(raw) = raw else {
        return WorkerStatus::Unknown;
    };
    let lowered = raw.trim().to_lowercase();
    if lowered.is_empty() {
        return WorkerStatus::Unknown;
    }
    if lowered.contains("неактив") || lowered.contains("inactive") {
        WorkerStatus::Inactive
    } else if lowered.contains("блок") || lowered.contains("block") {
        WorkerStatus::Blocked
    } else if lowered.contains("увол") || lowered.contains("dismiss") || lowered.contains("fired") {
        WorkerStatus::Dismissed
    } else if lowered.contains("актив") || lowered.contains("active") {
        WorkerStatus::Active
    } else {
        WorkerStatus::Unknown
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────
