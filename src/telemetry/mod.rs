//! Client-side gameplay telemetry
//!
//! ```text
//! Engine ──GameEvent──▶ EventQueue ──batch──▶ dispatcher ──▶ Collector
//!                           ▲                                   ▲
//!                           └──── session id ── SessionManager ─┘
//! ```

pub mod collector;
pub mod error;
pub mod event;
pub mod queue;
pub mod session;

#[cfg(test)]
pub(crate) mod testing;

pub use collector::{Collector, HttpCollector};
pub use error::TelemetryError;
pub use event::Event;
pub use queue::{EventQueue, QueueConfig};
pub use session::{SessionConfig, SessionManager};
