//! In-memory collector for tests

use std::time::Duration;

use parking_lot::Mutex;

use super::collector::{Collector, EndSession, SessionStarted, SessionSummary, StartSession};
use super::error::TelemetryError;
use super::event::{BatchReceipt, Event};

/// Records every call; failures are injected per endpoint as HTTP statuses
#[derive(Default)]
pub struct RecordingCollector {
    session_id: String,
    pub batches: Mutex<Vec<Vec<Event>>>,
    pub starts: Mutex<Vec<StartSession>>,
    pub ends: Mutex<Vec<EndSession>>,
    pub send_failure: Mutex<Option<u16>>,
    pub start_failure: Mutex<Option<u16>>,
    pub end_failure: Mutex<Option<u16>>,
    /// Applied to every `send_events` before it completes
    pub send_delay: Mutex<Option<Duration>>,
}

impl RecordingCollector {
    pub fn new(session_id: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
            ..Default::default()
        }
    }

    pub fn batch_count(&self) -> usize {
        self.batches.lock().len()
    }

    /// Event names of every batch, in delivery order
    pub fn batch_names(&self) -> Vec<Vec<String>> {
        self.batches
            .lock()
            .iter()
            .map(|batch| batch.iter().map(|e| e.event_name.clone()).collect())
            .collect()
    }

    fn failure(status: Option<u16>) -> Result<(), TelemetryError> {
        match status {
            None => Ok(()),
            Some(status @ (401 | 403)) => Err(TelemetryError::Unauthorized { status }),
            Some(status) => Err(TelemetryError::Status {
                status,
                body: "injected".to_string(),
            }),
        }
    }
}

impl Collector for RecordingCollector {
    async fn send_events(&self, events: &[Event]) -> Result<BatchReceipt, TelemetryError> {
        let delay = *self.send_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let failure = *self.send_failure.lock();
        Self::failure(failure)?;

        self.batches.lock().push(events.to_vec());
        Ok(BatchReceipt {
            inserted_count: events.len(),
            total_count: events.len(),
        })
    }

    async fn start_session(
        &self,
        request: &StartSession,
    ) -> Result<SessionStarted, TelemetryError> {
        let failure = *self.start_failure.lock();
        Self::failure(failure)?;

        self.starts.lock().push(request.clone());
        Ok(SessionStarted {
            id: self.session_id.clone(),
        })
    }

    async fn end_session(&self, request: &EndSession) -> Result<SessionSummary, TelemetryError> {
        self.ends.lock().push(request.clone());
        let failure = *self.end_failure.lock();
        Self::failure(failure)?;

        Ok(SessionSummary {
            id: request.session_id.clone(),
            duration_seconds: Some(60),
            event_count: Some(self.batches.lock().iter().map(Vec::len).sum::<usize>() as u64),
            final_score: Some(request.final_score as i64),
        })
    }
}
