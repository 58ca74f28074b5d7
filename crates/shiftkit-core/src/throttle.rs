//! Poll gate: throttling, in-flight dedup, and error backoff for the
//! status poller.
//!
//! Pure, testable state machine with no IO or async dependencies.

use serde::{Deserialize, Serialize};

// ─── Poll Policy ──────────────────────────────────────────────────────────

/// Timing configuration for the status poll loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollPolicy {
    /// Tick cadence in milliseconds (default 1000). The loop re-checks
    /// the gate this often; actual fetch cadence is `min_interval_ms`.
    pub tick_ms: u64,
    /// Minimum time between fetches in milliseconds (default 30000).
    pub min_interval_ms: u64,
    /// Delay from a failed fetch to the next permitted attempt in
    /// milliseconds (default 60000).
    pub error_backoff_ms: u64,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            tick_ms: 1_000,
            min_interval_ms: 30_000,
            error_backoff_ms: 60_000,
        }
    }
}

// ─── Poll Gate ────────────────────────────────────────────────────────────

/// Decision returned by [`PollGate::try_begin`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollDecision {
    /// Fetch now; the gate is marked in-flight and stamped.
    Begin,
    /// A fetch is already in flight. Drop this attempt, do not queue.
    InFlight,
    /// Too soon since the last stamped attempt.
    Throttled { retry_in_ms: u64 },
}

/// Serializes fetches and enforces the minimum poll interval.
///
/// `now_ms` is epoch milliseconds supplied by the caller. A stamp of 0
/// means "never ran" and always passes the throttle, which is also how
/// [`force`](Self::force) bypasses it.
#[derive(Debug, Clone)]
pub struct PollGate {
    policy: PollPolicy,
    in_flight: bool,
    last_run_ms: u64,
}

impl PollGate {
    pub fn new(policy: PollPolicy) -> Self {
        Self {
            policy,
            in_flight: false,
            last_run_ms: 0,
        }
    }

    /// Ask to start a fetch at `now_ms`.
    pub fn try_begin(&mut self, now_ms: u64) -> PollDecision {
        if self.in_flight {
            return PollDecision::InFlight;
        }
        if self.last_run_ms > 0 {
            let next_allowed = self.last_run_ms.saturating_add(self.policy.min_interval_ms);
            if now_ms < next_allowed {
                return PollDecision::Throttled {
                    retry_in_ms: next_allowed - now_ms,
                };
            }
        }
        self.in_flight = true;
        self.last_run_ms = now_ms;
        PollDecision::Begin
    }

    /// Fetch resolved successfully.
    pub fn finish_ok(&mut self) {
        self.in_flight = false;
    }

    /// Fetch failed. Clears in-flight and pushes the stamp forward so
    /// the next permitted attempt lands `error_backoff_ms` after the
    /// failure instead of `min_interval_ms` after its start.
    pub fn finish_err(&mut self, now_ms: u64) {
        self.in_flight = false;
        let shift = self
            .policy
            .error_backoff_ms
            .saturating_sub(self.policy.min_interval_ms);
        self.last_run_ms = now_ms.saturating_add(shift);
    }

    /// Reset the throttle stamp so the next attempt begins immediately.
    /// In-flight dedup still applies.
    pub fn force(&mut self) {
        self.last_run_ms = 0;
    }

    /// Clear all gate state. Stop path only: an aborted fetch can never
    /// report back, so its in-flight flag must not outlive it.
    pub fn reset(&mut self) {
        self.in_flight = false;
        self.last_run_ms = 0;
    }

    pub fn in_flight(&self) -> bool {
        self.in_flight
    }

    pub fn last_run_ms(&self) -> u64 {
        self.last_run_ms
    }

    pub fn policy(&self) -> &PollPolicy {
        &self.policy
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────
