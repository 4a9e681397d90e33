//! Telemetry pipeline counters
//!
//! Rendered in Prometheus text format, optionally served over HTTP.
//! Endpoint: http://localhost:<METRICS_PORT>/metrics

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tracing::{debug, info};

/// Counters shared by the queue, dispatcher and session manager
#[derive(Debug)]
pub struct TelemetryMetrics {
    // Queue
    pub events_enqueued: AtomicU64,
    pub events_rejected: AtomicU64,

    // Delivery
    pub events_sent: AtomicU64,
    pub events_dropped: AtomicU64,
    /// Delivered but refused by the collector's per-event validation
    pub events_refused: AtomicU64,
    pub batches_sent: AtomicU64,
    pub batches_failed: AtomicU64,

    // Sessions
    pub sessions_started: AtomicU64,
    pub sessions_failed: AtomicU64,
    pub sessions_ended: AtomicU64,

    pub auth_failures: AtomicU64,
    /// Set on 401/403, cleared by `take_auth_rejection`
    auth_rejected: AtomicBool,

    start_time: Instant,
}

impl TelemetryMetrics {
    pub fn new() -> Self {
        Self {
            events_enqueued: AtomicU64::new(0),
            events_rejected: AtomicU64::new(0),
            events_sent: AtomicU64::new(0),
            events_dropped: AtomicU64::new(0),
            events_refused: AtomicU64::new(0),
            batches_sent: AtomicU64::new(0),
            batches_failed: AtomicU64::new(0),
            sessions_started: AtomicU64::new(0),
            sessions_failed: AtomicU64::new(0),
            sessions_ended: AtomicU64::new(0),
            auth_failures: AtomicU64::new(0),
            auth_rejected: AtomicBool::new(false),
            start_time: Instant::now(),
        }
    }

    #[inline]
    pub fn record_enqueued(&self) {
        self.events_enqueued.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_rejected(&self) {
        self.events_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_batch_sent(&self, events: usize, refused: usize) {
        self.batches_sent.fetch_add(1, Ordering::Relaxed);
        self.events_sent.fetch_add(events as u64, Ordering::Relaxed);
        self.events_refused.fetch_add(refused as u64, Ordering::Relaxed);
    }

    pub fn record_batch_failed(&self, events: usize) {
        self.batches_failed.fetch_add(1, Ordering::Relaxed);
        self.events_dropped.fetch_add(events as u64, Ordering::Relaxed);
    }

    /// Events that never made it into a batch
    pub fn record_dropped(&self, events: usize) {
        self.events_dropped.fetch_add(events as u64, Ordering::Relaxed);
    }

    pub fn record_session_started(&self) {
        self.sessions_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_session_failed(&self) {
        self.sessions_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_session_ended(&self) {
        self.sessions_ended.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_auth_failure(&self) {
        self.auth_failures.fetch_add(1, Ordering::Relaxed);
        self.auth_rejected.store(true, Ordering::Release);
    }

    /// True once per burst of auth failures; the host should drop its token
    pub fn take_auth_rejection(&self) -> bool {
        self.auth_rejected.swap(false, Ordering::AcqRel)
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Generate Prometheus-format metrics output
    pub fn to_prometheus(&self) -> String {
        let mut output = String::with_capacity(2048);

        macro_rules! metric {
            ($name:expr, $help:expr, $type:expr, $value:expr) => {
                output.push_str(&format!(
                    "# HELP {} {}\n# TYPE {} {}\n{} {}\n",
                    $name, $help, $name, $type, $name, $value
                ));
            };
        }

        metric!(
            "flappy_telemetry_events_enqueued_total",
            "Events accepted into the queue",
            "counter",
            self.events_enqueued.load(Ordering::Relaxed)
        );
        metric!(
            "flappy_telemetry_events_rejected_total",
            "Events rejected before queueing",
            "counter",
            self.events_rejected.load(Ordering::Relaxed)
        );
        metric!(
            "flappy_telemetry_events_sent_total",
            "Events delivered to the collector",
            "counter",
            self.events_sent.load(Ordering::Relaxed)
        );
        metric!(
            "flappy_telemetry_events_dropped_total",
            "Events discarded after a failed send",
            "counter",
            self.events_dropped.load(Ordering::Relaxed)
        );
        metric!(
            "flappy_telemetry_events_refused_total",
            "Events the collector refused to store",
            "counter",
            self.events_refused.load(Ordering::Relaxed)
        );
        metric!(
            "flappy_telemetry_batches_sent_total",
            "Batches delivered",
            "counter",
            self.batches_sent.load(Ordering::Relaxed)
        );
        metric!(
            "flappy_telemetry_batches_failed_total",
            "Batches that failed to send",
            "counter",
            self.batches_failed.load(Ordering::Relaxed)
        );
        metric!(
            "flappy_telemetry_sessions_started_total",
            "Sessions opened",
            "counter",
            self.sessions_started.load(Ordering::Relaxed)
        );
        metric!(
            "flappy_telemetry_sessions_failed_total",
            "Session start/end calls that failed",
            "counter",
            self.sessions_failed.load(Ordering::Relaxed)
        );
        metric!(
            "flappy_telemetry_sessions_ended_total",
            "Sessions closed",
            "counter",
            self.sessions_ended.load(Ordering::Relaxed)
        );
        metric!(
            "flappy_telemetry_auth_failures_total",
            "Requests rejected with 401/403",
            "counter",
            self.auth_failures.load(Ordering::Relaxed)
        );
        metric!(
            "flappy_telemetry_uptime_seconds",
            "Client uptime in seconds",
            "counter",
            self.uptime_seconds()
        );

        output
    }

    /// Generate JSON format metrics
    pub fn to_json(&self) -> String {
        json!({
            "events": {
                "enqueued": self.events_enqueued.load(Ordering::Relaxed),
                "rejected": self.events_rejected.load(Ordering::Relaxed),
                "sent": self.events_sent.load(Ordering::Relaxed),
                "dropped": self.events_dropped.load(Ordering::Relaxed),
                "refused": self.events_refused.load(Ordering::Relaxed),
            },
            "batches": {
                "sent": self.batches_sent.load(Ordering::Relaxed),
                "failed": self.batches_failed.load(Ordering::Relaxed),
            },
            "sessions": {
                "started": self.sessions_started.load(Ordering::Relaxed),
                "failed": self.sessions_failed.load(Ordering::Relaxed),
                "ended": self.sessions_ended.load(Ordering::Relaxed),
            },
            "auth_failures": self.auth_failures.load(Ordering::Relaxed),
            "uptime_seconds": self.uptime_seconds(),
        })
        .to_string()
    }
}

impl Default for TelemetryMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Start the metrics HTTP server
pub async fn start_metrics_server(metrics: Arc<TelemetryMetrics>, port: u16) -> anyhow::Result<()> {
    let addr = format!("0.0.0.0:{}", port);
    let listener = TcpListener::bind(&addr).await?;
    info!("Metrics server listening on http://{}/metrics", addr);
    serve_metrics(metrics, listener).await
}

/// Answer metrics requests on an already bound listener
pub async fn serve_metrics(
    metrics: Arc<TelemetryMetrics>,
    listener: TcpListener,
) -> anyhow::Result<()> {
    loop {
        let (mut socket, peer) = listener.accept().await?;
        let metrics = metrics.clone();

        tokio::spawn(async move {
            let mut buffer = [0u8; 1024];

            match socket.read(&mut buffer).await {
                Ok(n) if n > 0 => {
                    let request = String::from_utf8_lossy(&buffer[..n]);

                    let response = if request.starts_with("GET /metrics/json") {
                        respond("application/json", &metrics.to_json())
                    } else if request.starts_with("GET /metrics") {
                        respond("text/plain; version=0.0.4", &metrics.to_prometheus())
                    } else if request.starts_with("GET /health") {
                        respond("text/plain", "OK")
                    } else {
                        "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
                            .to_string()
                    };

                    if let Err(e) = socket.write_all(response.as_bytes()).await {
                        debug!("Failed to write metrics response to {}: {}", peer, e);
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    debug!("Failed to read from metrics socket {}: {}", peer, e);
                }
            }
        });
    }
}

fn respond(content_type: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 200 OK\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        content_type,
        body.len(),
        body
    )
}
