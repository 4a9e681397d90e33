//! Session lifecycle
//!
//! Opens a collector session around a play session and makes sure every
//! event of that session is stamped with its id and delivered before the
//! session is closed.

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{json, Map, Value};
use tracing::{info, warn};

use super::collector::{Collector, EndSession, SessionSummary, StartSession};
use super::error::TelemetryError;
use super::queue::EventQueue;

/// Identity reported when a session opens
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub platform: String,
    pub game_version: String,
    pub client_name: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            platform: "native".to_string(),
            game_version: env!("CARGO_PKG_VERSION").to_string(),
            client_name: env!("CARGO_PKG_NAME").to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Lifecycle {
    Idle,
    Starting,
    Active(String),
    Ending,
}

/// Returns the lifecycle to `Idle` unless completed, including when the
/// owning future is dropped mid-call
struct Transition<'a> {
    lifecycle: &'a Mutex<Lifecycle>,
    /// Cleared along with the lifecycle when ending
    queue: Option<&'a EventQueue>,
    completed: bool,
}

impl<'a> Transition<'a> {
    fn starting(lifecycle: &'a Mutex<Lifecycle>) -> Self {
        Self {
            lifecycle,
            queue: None,
            completed: false,
        }
    }

    fn ending(lifecycle: &'a Mutex<Lifecycle>, queue: &'a EventQueue) -> Self {
        Self {
            lifecycle,
            queue: Some(queue),
            completed: false,
        }
    }

    fn complete(mut self, next: Lifecycle) {
        *self.lifecycle.lock() = next;
        self.completed = true;
    }
}

impl Drop for Transition<'_> {
    fn drop(&mut self) {
        if self.completed {
            return;
        }
        *self.lifecycle.lock() = Lifecycle::Idle;
        if let Some(queue) = self.queue {
            queue.set_session_id(None);
        }
    }
}

/// Opens and closes collector sessions
pub struct SessionManager<C> {
    collector: Arc<C>,
    queue: EventQueue,
    config: SessionConfig,
    lifecycle: Mutex<Lifecycle>,
}

impl<C: Collector> SessionManager<C> {
    pub fn new(collector: Arc<C>, queue: EventQueue, config: SessionConfig) -> Self {
        Self {
            collector,
            queue,
            config,
            lifecycle: Mutex::new(Lifecycle::Idle),
        }
    }

    /// Open a session and stamp its id onto the queue
    ///
    /// On failure no session id is set; gameplay simply continues untracked.
    pub async fn start_session(
        &self,
        device_info: Map<String, Value>,
    ) -> Result<String, TelemetryError> {
        let Some(user_id) = self.queue.user_id() else {
            warn!("Cannot start session: user id not set");
            return Err(TelemetryError::MissingUserId);
        };

        {
            let mut lifecycle = self.lifecycle.lock();
            if *lifecycle != Lifecycle::Idle {
                warn!("Session start rejected: {:?}", *lifecycle);
                return Err(TelemetryError::SessionBusy);
            }
            *lifecycle = Lifecycle::Starting;
        }
        let transition = Transition::starting(&self.lifecycle);

        let request = StartSession {
            user_id,
            device_info: self.enrich(device_info),
            platform: self.config.platform.clone(),
            game_version: self.config.game_version.clone(),
        };

        let metrics = self.queue.metrics();
        match self.collector.start_session(&request).await {
            Ok(started) => {
                let id = started.id;
                self.queue.set_session_id(Some(id.clone()));
                transition.complete(Lifecycle::Active(id.clone()));
                metrics.record_session_started();
                info!("Telemetry session {} started", id);

                if let Err(e) =
                    self.queue
                        .enqueue("session", "session_start", json!({ "session_id": id }))
                {
                    warn!("Failed to record session_start: {}", e);
                }
                Ok(id)
            }
            Err(e) => {
                if e.is_auth() {
                    metrics.record_auth_failure();
                }
                metrics.record_session_failed();
                warn!("Failed to start telemetry session: {}", e);
                Err(e)
            }
        }
    }

    /// Record `session_end`, flush, and close the session
    ///
    /// The session id is cleared whether or not the collector accepted the
    /// close. Returns the collector's summary when it did.
    pub async fn end_session(
        &self,
        final_score: u32,
    ) -> Result<Option<SessionSummary>, TelemetryError> {
        let session_id = {
            let mut lifecycle = self.lifecycle.lock();
            match &*lifecycle {
                Lifecycle::Active(id) => {
                    let id = id.clone();
                    *lifecycle = Lifecycle::Ending;
                    id
                }
                Lifecycle::Idle => {
                    warn!("end_session called with no active session");
                    return Err(TelemetryError::NoActiveSession);
                }
                Lifecycle::Starting | Lifecycle::Ending => return Err(TelemetryError::SessionBusy),
            }
        };
        // Dropping this resets to Idle and clears the session id
        let _transition = Transition::ending(&self.lifecycle, &self.queue);

        if let Err(e) = self.queue.enqueue(
            "session",
            "session_end",
            json!({ "final_score": final_score }),
        ) {
            warn!("Failed to record session_end: {}", e);
        }
        if let Err(e) = self.queue.flush().await {
            warn!("Final flush for session {} failed: {}", session_id, e);
        }

        let request = EndSession {
            session_id: session_id.clone(),
            final_score,
        };
        let metrics = self.queue.metrics();
        match self.collector.end_session(&request).await {
            Ok(summary) => {
                metrics.record_session_ended();
                info!(
                    "Telemetry session {} ended: score {}, {} events, {}s",
                    session_id,
                    final_score,
                    summary.event_count.unwrap_or_default(),
                    summary.duration_seconds.unwrap_or_default()
                );
                Ok(Some(summary))
            }
            Err(e) => {
                if e.is_auth() {
                    metrics.record_auth_failure();
                }
                metrics.record_session_failed();
                warn!("Failed to end telemetry session {}: {}", session_id, e);
                Ok(None)
            }
        }
    }

    /// Id of the open session, if any
    pub fn active_session(&self) -> Option<String> {
        match &*self.lifecycle.lock() {
            Lifecycle::Active(id) => Some(id.clone()),
            _ => None,
        }
    }

    /// A start or end call is in flight
    pub fn is_busy(&self) -> bool {
        matches!(
            *self.lifecycle.lock(),
            Lifecycle::Starting | Lifecycle::Ending
        )
    }

    pub fn queue(&self) -> &EventQueue {
        &self.queue
    }

    /// Caller-supplied keys win over the defaults added here
    fn enrich(&self, mut device_info: Map<String, Value>) -> Map<String, Value> {
        let defaults = [
            ("client", Value::from(self.config.client_name.as_str())),
            ("client_version", Value::from(self.config.game_version.as_str())),
            ("os", Value::from(std::env::consts::OS)),
            ("arch", Value::from(std::env::consts::ARCH)),
        ];
        for (key, value) in defaults {
            device_info.entry(key).or_insert(value);
        }
        device_info
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::TelemetryMetrics;
    use crate::telemetry::queue::QueueConfig;
    use crate::telemetry::testing::RecordingCollector;
    use std::sync::atomic::Ordering;
    use std::time::Duration;
    use tokio_test::{assert_err, assert_ok};
    use uuid::Uuid;

    fn manager(collector: &Arc<RecordingCollector>) -> SessionManager<RecordingCollector> {
        let queue = EventQueue::new(
            collector.clone(),
            QueueConfig::default(),
            Arc::new(TelemetryMetrics::new()),
        );
        queue.set_user_id(Uuid::new_v4());
        SessionManager::new(collector.clone(), queue, SessionConfig::default())
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_and_end_round_trip() {
        let collector = Arc::new(RecordingCollector::new("s1"));
        let sessions = manager(&collector);

        let id = assert_ok!(sessions.start_session(Map::new()).await);
        assert_eq!(id, "s1");
        assert_eq!(sessions.active_session().as_deref(), Some("s1"));
        assert_eq!(sessions.queue().session_id().as_deref(), Some("s1"));

        let summary = assert_ok!(sessions.end_session(42).await).unwrap();
        assert_eq!(summary.final_score, Some(42));

        assert_eq!(
            collector.batch_names(),
            vec![vec!["session_start", "session_end"]]
        );
        {
            let batches = collector.batches.lock();
            let end = &batches[0][1];
            assert_eq!(end.payload, json!({ "final_score": 42 }));
            assert_eq!(end.session_id.as_deref(), Some("s1"));
            assert_eq!(batches[0][0].payload, json!({ "session_id": "s1" }));
        }
        assert_eq!(
            *collector.ends.lock(),
            vec![EndSession {
                session_id: "s1".to_string(),
                final_score: 42
            }]
        );
        assert_eq!(sessions.active_session(), None);
        assert_eq!(sessions.queue().session_id(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_request_is_enriched() {
        let collector = Arc::new(RecordingCollector::new("s1"));
        let sessions = manager(&collector);

        let mut device = Map::new();
        device.insert("screen_width".to_string(), json!(800));
        device.insert("os".to_string(), json!("custom"));
        sessions.start_session(device).await.unwrap();

        let starts = collector.starts.lock();
        let info = &starts[0].device_info;
        assert_eq!(info["screen_width"], 800);
        assert_eq!(info["os"], "custom");
        assert_eq!(info["client"], env!("CARGO_PKG_NAME"));
        assert!(info.contains_key("arch"));
        assert_eq!(starts[0].platform, "native");
        assert_eq!(starts[0].user_id, sessions.queue().user_id().unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_requires_user_id() {
        let collector = Arc::new(RecordingCollector::new("s1"));
        let queue = EventQueue::new(
            collector.clone(),
            QueueConfig::default(),
            Arc::new(TelemetryMetrics::new()),
        );
        let sessions = SessionManager::new(collector.clone(), queue, SessionConfig::default());

        let err = sessions.start_session(Map::new()).await.unwrap_err();
        assert!(matches!(err, TelemetryError::MissingUserId));
        assert!(collector.starts.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_start_is_busy() {
        let collector = Arc::new(RecordingCollector::new("s1"));
        let sessions = manager(&collector);

        sessions.start_session(Map::new()).await.unwrap();
        let err = assert_err!(sessions.start_session(Map::new()).await);
        assert!(matches!(err, TelemetryError::SessionBusy));
        assert_eq!(collector.starts.lock().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_start_leaves_no_session() {
        let collector = Arc::new(RecordingCollector::new("s1"));
        *collector.start_failure.lock() = Some(503);
        let sessions = manager(&collector);

        let err = sessions.start_session(Map::new()).await.unwrap_err();
        assert!(matches!(err, TelemetryError::Status { status: 503, .. }));
        assert_eq!(sessions.active_session(), None);
        assert_eq!(sessions.queue().session_id(), None);
        assert!(!sessions.is_busy());

        // Gameplay events still flow, untracked
        sessions
            .queue()
            .enqueue("jump", "player_jump", json!({}))
            .unwrap();

        *collector.start_failure.lock() = None;
        assert_eq!(sessions.start_session(Map::new()).await.unwrap(), "s1");
    }

    #[tokio::test(start_paused = true)]
    async fn test_end_without_session() {
        let collector = Arc::new(RecordingCollector::new("s1"));
        let sessions = manager(&collector);

        let err = assert_err!(sessions.end_session(3).await);
        assert!(matches!(err, TelemetryError::NoActiveSession));
        assert!(collector.ends.lock().is_empty());
        assert_eq!(collector.batch_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_end_still_clears_session() {
        let collector = Arc::new(RecordingCollector::new("s1"));
        let sessions = manager(&collector);
        sessions.start_session(Map::new()).await.unwrap();

        *collector.end_failure.lock() = Some(401);
        let summary = sessions.end_session(7).await.unwrap();

        assert!(summary.is_none());
        assert_eq!(sessions.active_session(), None);
        assert_eq!(sessions.queue().session_id(), None);
        assert!(sessions.queue().metrics().take_auth_rejection());
        assert_eq!(
            sessions.queue().metrics().sessions_failed.load(Ordering::Relaxed),
            1
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_events_before_end_share_the_final_batch() {
        let collector = Arc::new(RecordingCollector::new("s1"));
        let sessions = manager(&collector);
        sessions.start_session(Map::new()).await.unwrap();

        let queue = sessions.queue();
        queue.enqueue("game", "game_start", json!({ "run": 1 })).unwrap();
        queue.enqueue("jump", "player_jump", json!({})).unwrap();
        sessions.end_session(0).await.unwrap();

        // Nothing left for the debounce timer to send
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(
            collector.batch_names(),
            vec![vec!["session_start", "game_start", "player_jump", "session_end"]]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_end_resets_lifecycle() {
        let collector = Arc::new(RecordingCollector::new("s1"));
        *collector.send_delay.lock() = Some(Duration::from_secs(30));
        let sessions = manager(&collector);
        sessions.start_session(Map::new()).await.unwrap();

        let ended = tokio::time::timeout(Duration::from_secs(1), sessions.end_session(5)).await;
        assert!(ended.is_err());
        assert_eq!(sessions.active_session(), None);
        assert_eq!(sessions.queue().session_id(), None);
        assert!(!sessions.is_busy());
    }
}
