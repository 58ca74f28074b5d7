//! Runtime configuration with environment overrides.

use std::time::Duration;

use shiftkit_client::ClientConfig;
use shiftkit_core::guard::DIALOG_COOLDOWN_MS;
use shiftkit_core::state::CACHE_TTL_SECS;
use shiftkit_core::throttle::PollPolicy;

use crate::tracking::EngineOptions;

/// Default storage key for the persisted shift state envelope.
pub const DEFAULT_CACHE_KEY: &str = "shift-state";

/// Top-level runtime settings. `Default` matches production cadence;
/// [`from_env`](Self::from_env) layers `SHIFTKIT_*` overrides on top.
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeConfig {
    pub api: ClientConfig,
    pub poll: PollPolicy,
    /// Hydration freshness window in seconds.
    pub cache_ttl_secs: i64,
    pub cache_key: String,
    /// Cool-down after an alert is dismissed, milliseconds.
    pub alert_cooldown_ms: u64,
    pub engine: EngineOptions,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            api: ClientConfig::default(),
            poll: PollPolicy::default(),
            cache_ttl_secs: CACHE_TTL_SECS,
            cache_key: DEFAULT_CACHE_KEY.to_string(),
            alert_cooldown_ms: DIALOG_COOLDOWN_MS,
            engine: EngineOptions::default(),
        }
    }
}

impl RuntimeConfig {
    /// Defaults with environment overrides applied. Malformed numeric
    /// values are ignored with a warning rather than failing startup.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(base) = std::env::var("SHIFTKIT_API_BASE") {
            config.api.base_url = base;
        }
        if let Ok(token) = std::env::var("SHIFTKIT_API_TOKEN") {
            config.api.api_token = token;
        }
        if let Some(secs) = env_u64("SHIFTKIT_POLL_INTERVAL_SECS") {
            config.poll.min_interval_ms = secs.saturating_mul(1_000);
        }
        if let Some(secs) = env_u64("SHIFTKIT_POLL_BACKOFF_SECS") {
            config.poll.error_backoff_ms = secs.saturating_mul(1_000);
        }
        if let Some(secs) = env_u64("SHIFTKIT_FETCH_TIMEOUT_SECS") {
            config.api.timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = env_u64("SHIFTKIT_CACHE_TTL_SECS") {
            config.cache_ttl_secs = secs as i64;
        }
        if let Ok(url) = std::env::var("SHIFTKIT_TRACKING_URL") {
            config.engine.upload_url = Some(url);
        }
        config
    }
}

fn env_u64(name: &str) -> Option<u64> {
    let raw = std::env::var(name).ok()?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!("ignoring invalid {name}={raw}");
            None
        }
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────
