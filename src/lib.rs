//! Flappy Telemetry
//!
//! A deterministic side-scroller simulation (gravity, pipes, scoring) with a
//! client-side telemetry pipeline that batches gameplay events and session
//! lifecycle calls to an HTTP collector.
//!
//! - `game` - engine, frame driver, input buffer, autopilot
//! - `telemetry` - event queue, session manager, collector client
//! - `config` / `metrics` - environment configuration and pipeline counters

pub mod config;
pub mod game;
pub mod metrics;
pub mod telemetry;
