//! `ShiftApi` trait and the reqwest-backed production adapter.

use std::future::Future;
use std::time::Duration;

use serde::Serialize;

use shiftkit_core::types::{PunchAck, PunchOrder, StatusSnapshot};

use crate::error::ApiError;

/// Default request timeout for status and punch calls (seconds).
pub const FETCH_TIMEOUT_SECS: u64 = 10;

// ─── Trait ────────────────────────────────────────────────────────────────

/// Backend seam for the coordinator. Implementations are shared behind
/// an `Arc` and called from spawned tasks.
pub trait ShiftApi: Send + Sync {
    /// Fetch the worker's current shift status.
    fn fetch_active_shift(
        &self,
        user_id: &str,
    ) -> impl Future<Output = Result<StatusSnapshot, ApiError>> + Send;

    /// Submit a punch.
    fn send_punch(
        &self,
        order: &PunchOrder,
    ) -> impl Future<Output = Result<PunchAck, ApiError>> + Send;
}

// ─── Config ───────────────────────────────────────────────────────────────

/// Connection settings for [`HttpShiftApi`].
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    pub base_url: String,
    pub api_token: String,
    pub timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            api_token: String::new(),
            timeout: Duration::from_secs(FETCH_TIMEOUT_SECS),
        }
    }
}

// ─── HTTP adapter ─────────────────────────────────────────────────────────

/// Production adapter over the attendance REST backend.
#[derive(Debug, Clone)]
pub struct HttpShiftApi {
    http: reqwest::Client,
    base_url: String,
    api_token: String,
}

/// Wire shape of the punch endpoint body.
#[derive(Debug, Serialize)]
struct PunchBody<'a> {
    api_token: &'a str,
    user_id: &'a str,
    status: u8,
    timestamp: i64,
    phone_imei: &'a str,
    photo_name: &'a str,
}

impl HttpShiftApi {
    pub fn new(config: ClientConfig) -> Result<Self, ApiError> {
        let base_url = config.base_url.trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(ApiError::BaseUrl("base url is empty".to_string()));
        }
        let http = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            http,
            base_url,
            api_token: config.api_token,
        })
    }
}

impl ShiftApi for HttpShiftApi {
    async fn fetch_active_shift(&self, user_id: &str) -> Result<StatusSnapshot, ApiError> {
        let url = format!("{}/api/active-shift/", self.base_url);
        let response = self
            .http
            .get(&url)
            .query(&[("user_id", user_id), ("api_token", self.api_token.as_str())])
            .send()
            .await?
            .error_for_status()?;
        let snapshot = response
            .json::<StatusSnapshot>()
            .await
            .map_err(|e| ApiError::InvalidBody(e.to_string()))?;
        tracing::debug!(
            "active-shift: user={user_id} active={}",
            snapshot.has_active_shift
        );
        Ok(snapshot)
    }

    async fn send_punch(&self, order: &PunchOrder) -> Result<PunchAck, ApiError> {
        let url = format!("{}/api/punch/", self.base_url);
        let body = PunchBody {
            api_token: &self.api_token,
            user_id: &order.user_id,
            status: order.direction.wire_code(),
            timestamp: order.timestamp,
            phone_imei: &order.device_id,
            photo_name: &order.photo_name,
        };
        let response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;
        let ack = response
            .json::<PunchAck>()
            .await
            .map_err(|e| ApiError::InvalidBody(e.to_string()))?;
        if !ack.success {
            tracing::warn!(
                "punch rejected: user={} direction={} error={:?}",
                order.user_id,
                order.direction,
                ack.error
            );
        }
        Ok(ack)
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────
