//! Core domain types shared across the coordinator crates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ─── Provenance ───────────────────────────────────────────────────────────

/// Who last wrote the shift state.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StateSource {
    /// Optimistic guess made by this device (punch just sent, cache).
    #[default]
    Local,
    /// Confirmed by the backend; always authoritative.
    Server,
}

impl StateSource {
    pub fn as_str(self) -> &'static str {
        match self {
            StateSource::Local => "local",
            StateSource::Server => "server",
        }
    }
}

impl fmt::Display for StateSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StateSource {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "local" => Ok(StateSource::Local),
            "server" => Ok(StateSource::Server),
            other => Err(CoreError::InvalidSource(other.to_string())),
        }
    }
}

// ─── Punch ────────────────────────────────────────────────────────────────

/// Punch direction and its canonical numeric wire code.
///
/// This enum is the only spelling callers may use; the raw 0/1 codes
/// exist solely at the wire boundary via [`wire_code`](Self::wire_code).
//
// TODO: confirm the 0/1 mapping with the backend team before release;
// shipped mobile clients disagreed on which code meant punch-in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PunchDirection {
    /// Start a shift.
    In,
    /// End a shift.
    Out,
}

impl PunchDirection {
    pub const ALL: [Self; 2] = [Self::In, Self::Out];

    pub fn as_str(self) -> &'static str {
        match self {
            PunchDirection::In => "in",
            PunchDirection::Out => "out",
        }
    }

    /// Numeric status sent to the punch endpoint (0 = in, 1 = out).
    pub fn wire_code(self) -> u8 {
        match self {
            PunchDirection::In => 0,
            PunchDirection::Out => 1,
        }
    }

    pub fn from_wire(code: u8) -> Result<Self, CoreError> {
        match code {
            0 => Ok(PunchDirection::In),
            1 => Ok(PunchDirection::Out),
            other => Err(CoreError::InvalidPunchCode(other)),
        }
    }
}

impl fmt::Display for PunchDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PunchDirection {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "in" => Ok(PunchDirection::In),
            "out" => Ok(PunchDirection::Out),
            other => Err(CoreError::InvalidDirection(other.to_string())),
        }
    }
}

// ─── Worker standing ──────────────────────────────────────────────────────

/// Worker standing as reported by the backend, reduced to a closed set.
///
/// The wire value is free-form text; [`crate::status::parse_worker_status`]
/// is the only place that text is interpreted. Anything unrecognized is
/// `Unknown`, which is distinct from every definite value.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerStatus {
    Active,
    Inactive,
    Blocked,
    Dismissed,
    /// Missing, empty, or unrecognized status text.
    #[default]
    Unknown,
}

impl WorkerStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            WorkerStatus::Active => "active",
            WorkerStatus::Inactive => "inactive",
            WorkerStatus::Blocked => "blocked",
            WorkerStatus::Dismissed => "dismissed",
            WorkerStatus::Unknown => "unknown",
        }
    }
}

impl fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── Server snapshot ──────────────────────────────────────────────────────

/// Response of the active-shift endpoint.
///
/// Every field is defaulted: the backend omits keys freely, and a poll
/// must never fail to decode because of a missing one.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    #[serde(default)]
    pub has_active_shift: bool,
    #[serde(default)]
    pub active_shift: Option<ActiveShift>,
    /// Raw worker standing text, uninterpreted at this layer.
    #[serde(default)]
    pub worker_status: Option<String>,
    /// Opaque worker record, passed through to the UI untouched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker: Option<serde_json::Value>,
}

/// The open shift inside a [`StatusSnapshot`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActiveShift {
    /// Backend shift identifier. Payloads use either `id` or `shift_id`
    /// as the key and send strings or numbers; both are accepted.
    #[serde(default, alias = "shift_id", deserialize_with = "de_lenient_id")]
    pub id: Option<String>,
    /// Shift start time. Accepts RFC 3339, `YYYY-MM-DD HH:MM:SS` (read
    /// as UTC), or epoch seconds; an unparseable value decodes as `None`
    /// rather than failing the whole snapshot.
    #[serde(default, deserialize_with = "de_lenient_time")]
    pub shift_start: Option<DateTime<Utc>>,
}

fn de_lenient_id<'de, D>(de: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Num(i64),
        Str(String),
    }

    let raw = Option::<RawId>::deserialize(de)?;
    Ok(raw.map(|r| match r {
        RawId::Num(n) => n.to_string(),
        RawId::Str(s) => s,
    }))
}

fn de_lenient_time<'de, D>(de: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawTime {
        Epoch(i64),
        Text(String),
    }

    match Option::<RawTime>::deserialize(de)? {
        None => Ok(None),
        Some(RawTime::Epoch(secs)) => Ok(DateTime::from_timestamp(secs, 0)),
        Some(RawTime::Text(s)) => {
            if let Ok(dt) = DateTime::parse_from_rfc3339(&s) {
                return Ok(Some(dt.with_timezone(&Utc)));
            }
            if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(&s, "%Y-%m-%d %H:%M:%S") {
                return Ok(Some(naive.and_utc()));
            }
            Ok(None)
        }
    }
}

// ─── Punch wire types ─────────────────────────────────────────────────────

/// A punch submission, assembled by the session. The transport adapter
/// injects the api token and flattens it onto the wire shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PunchOrder {
    pub user_id: String,
    pub direction: PunchDirection,
    /// Epoch seconds at submission time.
    pub timestamp: i64,
    /// Device identifier, sent as `phone_imei` on the wire.
    pub device_id: String,
    /// Generated placeholder name for the selfie upload.
    pub photo_name: String,
}

/// Response of the punch endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PunchAck {
    #[serde(default)]
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// ─── Status check ─────────────────────────────────────────────────────────

/// Result of a direct, throttle-free status read.
///
/// A network failure is `Unreachable`, never a claim that no shift is
/// open. Callers decide whether uncertainty blocks them.
#[derive(Debug, Clone, PartialEq)]
pub enum StatusCheck {
    Confirmed(StatusSnapshot),
    Unreachable,
}

impl StatusCheck {
    /// `Some(active)` when confirmed, `None` when the backend could not
    /// be reached.
    pub fn has_active_shift(&self) -> Option<bool> {
        match self {
            StatusCheck::Confirmed(snapshot) => Some(snapshot.has_active_shift),
            StatusCheck::Unreachable => None,
        }
    }

    pub fn is_unreachable(&self) -> bool {
        matches!(self, StatusCheck::Unreachable)
    }
}

// ─── Shift events ─────────────────────────────────────────────────────────

/// Activation edge emitted by the state store on server-confirmed
/// transitions. Consumers react to edges, not levels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ShiftEvent {
    Activated { shift_id: Option<String> },
    Deactivated,
}

// ─── Errors ───────────────────────────────────────────────────────────────

/// Errors for core-level parsing and conversions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    InvalidSource(String),
    InvalidPunchCode(u8),
    InvalidDirection(String),
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoreError::InvalidSource(s) => write!(f, "invalid state source: {s}"),
            CoreError::InvalidPunchCode(c) => write!(f, "invalid punch code: {c}"),
            CoreError::InvalidDirection(s) => write!(f, "invalid punch direction: {s}"),
        }
    }
}

impl std::error::Error for CoreError {}

// ─── Tests ────────────────────────────────────────────────────────────────
