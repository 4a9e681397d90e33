//! Batching event queue
//!
//! `enqueue` is synchronous so the simulation never waits on I/O. Events are
//! buffered until either `batch_size` is reached or `batch_timeout` passes
//! without another enqueue (debounce). Full buffers are swapped out and
//! handed to a single dispatcher task in one step under the state lock, so
//! the dispatcher sees batches in swap order even with many producers.
//!
//! Delivery is best effort: a batch that fails to send is logged, counted
//! and dropped.

use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::collector::Collector;
use super::error::TelemetryError;
use super::event::Event;
use crate::game::events::{EventListener, GameEvent};
use crate::metrics::TelemetryMetrics;

pub const DEFAULT_BATCH_SIZE: usize = 5;
pub const DEFAULT_BATCH_TIMEOUT: Duration = Duration::from_millis(3000);

/// Flush triggers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueConfig {
    /// Buffer length that triggers an immediate flush
    pub batch_size: usize,
    /// Inactivity after the last enqueue that triggers a flush
    pub batch_timeout: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            batch_timeout: DEFAULT_BATCH_TIMEOUT,
        }
    }
}

type FlushResult = Result<usize, TelemetryError>;

/// A swapped-out buffer on its way to the collector
struct Dispatch {
    events: Vec<Event>,
    done: Option<oneshot::Sender<FlushResult>>,
}

struct QueueState {
    user_id: Option<Uuid>,
    session_id: Option<String>,
    buffer: Vec<Event>,
    timer: Option<JoinHandle<()>>,
    /// Bumped on every timer reset and swap; a timer only flushes if its
    /// generation is still current when it wakes
    generation: u64,
    closed: bool,
}

struct QueueInner {
    config: QueueConfig,
    state: Mutex<QueueState>,
    dispatch_tx: mpsc::UnboundedSender<Dispatch>,
    runtime: Handle,
    metrics: Arc<TelemetryMetrics>,
}

/// Cloneable handle to a telemetry queue
///
/// All clones share one buffer and one dispatcher. The dispatcher stops once
/// the last handle is dropped.
#[derive(Clone)]
pub struct EventQueue {
    inner: Arc<QueueInner>,
}

impl EventQueue {
    /// Create a queue delivering to `collector`
    ///
    /// Must be called inside a Tokio runtime; the dispatcher and debounce
    /// timers run on it.
    pub fn new<C: Collector>(
        collector: Arc<C>,
        config: QueueConfig,
        metrics: Arc<TelemetryMetrics>,
    ) -> Self {
        let config = QueueConfig {
            batch_size: config.batch_size.max(1),
            ..config
        };
        let runtime = Handle::current();
        let (dispatch_tx, dispatch_rx) = mpsc::unbounded_channel();

        runtime.spawn(run_dispatcher(collector, dispatch_rx, metrics.clone()));

        Self {
            inner: Arc::new(QueueInner {
                config,
                state: Mutex::new(QueueState {
                    user_id: None,
                    session_id: None,
                    buffer: Vec::with_capacity(config.batch_size),
                    timer: None,
                    generation: 0,
                    closed: false,
                }),
                dispatch_tx,
                runtime,
                metrics,
            }),
        }
    }

    pub fn set_user_id(&self, user_id: Uuid) {
        self.inner.state.lock().user_id = Some(user_id);
    }

    pub fn user_id(&self) -> Option<Uuid> {
        self.inner.state.lock().user_id
    }

    /// Session stamped onto subsequently enqueued events
    pub fn set_session_id(&self, session_id: Option<String>) {
        self.inner.state.lock().session_id = session_id;
    }

    pub fn session_id(&self) -> Option<String> {
        self.inner.state.lock().session_id.clone()
    }

    /// Stamp and buffer one event
    ///
    /// Flushes immediately at `batch_size`, otherwise (re)starts the
    /// debounce timer.
    pub fn enqueue(
        &self,
        event_type: &str,
        event_name: &str,
        payload: Value,
    ) -> Result<(), TelemetryError> {
        let mut state = self.inner.state.lock();

        if state.closed {
            self.inner.metrics.record_rejected();
            return Err(TelemetryError::QueueClosed);
        }
        let Some(user_id) = state.user_id else {
            warn!("Telemetry event {} rejected: user id not set", event_name);
            self.inner.metrics.record_rejected();
            return Err(TelemetryError::MissingUserId);
        };

        let event = Event::new(
            user_id,
            state.session_id.clone(),
            event_type,
            event_name,
            payload,
        );
        state.buffer.push(event);
        self.inner.metrics.record_enqueued();

        if state.buffer.len() >= self.inner.config.batch_size {
            let batch = take_batch(&mut state);
            debug!("Batch size reached, flushing {} events", batch.len());
            self.dispatch(&state, batch, None);
        } else {
            self.restart_timer(&mut state);
        }

        Ok(())
    }

    /// Send everything buffered and wait for the attempt
    ///
    /// Also acts as a barrier: batches handed off earlier have been
    /// attempted when this returns. Returns the number of events delivered
    /// by this call. A failed batch is dropped, not re-queued.
    pub async fn flush(&self) -> Result<usize, TelemetryError> {
        let (done_tx, done_rx) = oneshot::channel();
        {
            let mut state = self.inner.state.lock();
            let batch = take_batch(&mut state);
            self.dispatch(&state, batch, Some(done_tx));
        }

        done_rx
            .await
            .map_err(|_| TelemetryError::Unavailable("telemetry dispatcher stopped".to_string()))?
    }

    /// Cancel the timer and refuse further events; idempotent
    ///
    /// Events already buffered stay there; a following `flush` still
    /// delivers them.
    pub fn shutdown(&self) {
        let mut state = self.inner.state.lock();
        if state.closed {
            return;
        }
        state.closed = true;
        state.generation += 1;
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
        info!(
            "Telemetry queue shut down ({} events still buffered)",
            state.buffer.len()
        );
    }

    pub fn is_closed(&self) -> bool {
        self.inner.state.lock().closed
    }

    /// Events buffered and not yet handed to the dispatcher
    pub fn pending(&self) -> usize {
        self.inner.state.lock().buffer.len()
    }

    pub fn has_pending_timer(&self) -> bool {
        self.inner.state.lock().timer.is_some()
    }

    pub fn config(&self) -> QueueConfig {
        self.inner.config
    }

    pub fn metrics(&self) -> &Arc<TelemetryMetrics> {
        &self.inner.metrics
    }

    fn restart_timer(&self, state: &mut QueueState) {
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
        state.generation += 1;

        let generation = state.generation;
        let timeout = self.inner.config.batch_timeout;
        let weak: Weak<QueueInner> = Arc::downgrade(&self.inner);

        state.timer = Some(self.inner.runtime.spawn(async move {
            tokio::time::sleep(timeout).await;
            if let Some(inner) = weak.upgrade() {
                EventQueue { inner }.flush_on_timeout(generation);
            }
        }));
    }

    fn flush_on_timeout(&self, generation: u64) {
        let mut state = self.inner.state.lock();
        if state.generation != generation {
            return;
        }
        // This task is the timer; let it finish instead of aborting it
        state.timer = None;
        let batch = take_batch(&mut state);

        debug!("Batch timeout elapsed, flushing {} events", batch.len());
        self.dispatch(&state, batch, None);
    }

    /// Hand a swapped batch to the dispatcher
    ///
    /// Takes the state guard so the swap and the send can't be split by
    /// another producer. The send never blocks.
    fn dispatch(
        &self,
        _held: &QueueState,
        events: Vec<Event>,
        done: Option<oneshot::Sender<FlushResult>>,
    ) {
        let count = events.len();
        if let Err(mpsc::error::SendError(rejected)) =
            self.inner.dispatch_tx.send(Dispatch { events, done })
        {
            warn!("Telemetry dispatcher is gone, dropping {} events", count);
            self.inner.metrics.record_dropped(count);
            if let Some(done) = rejected.done {
                let _ = done.send(Err(TelemetryError::Unavailable(
                    "telemetry dispatcher stopped".to_string(),
                )));
            }
        }
    }
}

/// Cancel the timer and swap the buffer out
fn take_batch(state: &mut QueueState) -> Vec<Event> {
    if let Some(timer) = state.timer.take() {
        timer.abort();
    }
    state.generation += 1;
    std::mem::take(&mut state.buffer)
}

async fn run_dispatcher<C: Collector>(
    collector: Arc<C>,
    mut rx: mpsc::UnboundedReceiver<Dispatch>,
    metrics: Arc<TelemetryMetrics>,
) {
    while let Some(Dispatch { events, done }) = rx.recv().await {
        let result = if events.is_empty() {
            Ok(0)
        } else {
            deliver(collector.as_ref(), &events, &metrics).await
        };

        if let Some(done) = done {
            let _ = done.send(result);
        }
    }
    debug!("Telemetry dispatcher stopped");
}

async fn deliver<C: Collector>(
    collector: &C,
    events: &[Event],
    metrics: &TelemetryMetrics,
) -> FlushResult {
    match collector.send_events(events).await {
        Ok(receipt) => {
            metrics.record_batch_sent(events.len(), receipt.rejected());
            if receipt.rejected() > 0 {
                warn!(
                    "Collector refused {} of {} events",
                    receipt.rejected(),
                    events.len()
                );
            }
            debug!("Sent {} telemetry events", events.len());
            Ok(events.len())
        }
        Err(e) => {
            if e.is_auth() {
                metrics.record_auth_failure();
            }
            metrics.record_batch_failed(events.len());
            warn!("Dropping batch of {} telemetry events: {}", events.len(), e);
            Err(e)
        }
    }
}

impl EventListener for EventQueue {
    fn on_event(&mut self, event: &GameEvent) {
        if let Err(e) = self.enqueue(event.event_type(), event.event_name(), event.payload()) {
            debug!("Telemetry skipped {}: {}", event.event_name(), e);
        }
    }
}
