//! Collector client
//!
//! `Collector` is the seam between the telemetry pipeline and the backend.
//! `HttpCollector` talks to the real service over HTTP/JSON; tests swap in
//! an in-memory recorder.

use std::future::Future;
use std::time::Duration;

use parking_lot::RwLock;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};
use uuid::Uuid;

use super::error::TelemetryError;
use super::event::{BatchReceipt, Event, EventBatch};

const EVENTS_PATH: &str = "/api/v1/events";
const SESSION_START_PATH: &str = "/api/v1/sessions/start";
const SESSION_END_PATH: &str = "/api/v1/sessions/end";

/// Body of `POST /api/v1/sessions/start`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StartSession {
    pub user_id: Uuid,
    pub device_info: Map<String, Value>,
    pub platform: String,
    pub game_version: String,
}

/// Body of `POST /api/v1/sessions/end`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EndSession {
    pub session_id: String,
    pub final_score: u32,
}

/// Collector's answer to a session start; only the id matters here
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SessionStarted {
    pub id: String,
}

/// Collector's answer to a session end
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SessionSummary {
    pub id: String,
    #[serde(default)]
    pub duration_seconds: Option<i64>,
    #[serde(default)]
    pub event_count: Option<u64>,
    #[serde(default)]
    pub final_score: Option<i64>,
}

/// Backend receiving event batches and session calls
pub trait Collector: Send + Sync + 'static {
    fn send_events(
        &self,
        events: &[Event],
    ) -> impl Future<Output = Result<BatchReceipt, TelemetryError>> + Send;

    fn start_session(
        &self,
        request: &StartSession,
    ) -> impl Future<Output = Result<SessionStarted, TelemetryError>> + Send;

    fn end_session(
        &self,
        request: &EndSession,
    ) -> impl Future<Output = Result<SessionSummary, TelemetryError>> + Send;
}

/// HTTP/JSON collector client
pub struct HttpCollector {
    client: Client,
    base_url: String,
    token: RwLock<Option<String>>,
}

impl HttpCollector {
    /// Create a client for `base_url` (e.g. `http://localhost:8000`)
    pub fn new(
        base_url: impl Into<String>,
        request_timeout: Duration,
    ) -> Result<Self, TelemetryError> {
        let client = Client::builder()
            .timeout(request_timeout)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self {
            client,
            base_url,
            token: RwLock::new(None),
        })
    }

    pub fn with_token(self, token: Option<String>) -> Self {
        *self.token.write() = token.filter(|t| !t.is_empty());
        self
    }

    /// Attach `Authorization: Bearer <token>` to every following request
    pub fn set_token(&self, token: impl Into<String>) {
        *self.token.write() = Some(token.into());
    }

    pub fn clear_token(&self) {
        if self.token.write().take().is_some() {
            debug!("Collector token cleared");
        }
    }

    pub fn has_token(&self) -> bool {
        self.token.read().is_some()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post<B, R>(&self, path: &str, body: &B) -> Result<R, TelemetryError>
    where
        B: Serialize + Sync + ?Sized,
        R: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        let token = self.token.read().clone();

        let mut request = self.client.post(&url).json(body);
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            warn!("Collector rejected credentials for {}: {}", path, status);
            return Err(TelemetryError::Unauthorized {
                status: status.as_u16(),
            });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("Collector error on {}: {} - {}", path, status, body);
            return Err(TelemetryError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| TelemetryError::Decode(e.to_string()))
    }
}

impl Collector for HttpCollector {
    async fn send_events(&self, events: &[Event]) -> Result<BatchReceipt, TelemetryError> {
        self.post(EVENTS_PATH, &EventBatch { events }).await
    }

    async fn start_session(
        &self,
        request: &StartSession,
    ) -> Result<SessionStarted, TelemetryError> {
        self.post(SESSION_START_PATH, request).await
    }

    async fn end_session(&self, request: &EndSession) -> Result<SessionSummary, TelemetryError> {
        self.post(SESSION_END_PATH, request).await
    }
}
