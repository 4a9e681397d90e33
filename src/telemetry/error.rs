use thiserror::Error;

/// Telemetry errors
///
/// None of these ever reach the simulation; the engine-facing listener logs
/// and drops them.
#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("No user id set, event rejected")]
    MissingUserId,

    #[error("No active session")]
    NoActiveSession,

    #[error("A session start or end is already in progress")]
    SessionBusy,

    #[error("Event queue is shut down")]
    QueueClosed,

    #[error("Collector rejected credentials (HTTP {status})")]
    Unauthorized { status: u16 },

    #[error("Collector returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Failed to decode collector response: {0}")]
    Decode(String),

    #[error("Collector unavailable: {0}")]
    Unavailable(String),
}

impl TelemetryError {
    /// The collector refused our token
    pub fn is_auth(&self) -> bool {
        matches!(self, TelemetryError::Unauthorized { .. })
    }
}
