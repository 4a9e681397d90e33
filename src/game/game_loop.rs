//! Frame driver
//!
//! The engine only advances when told to. `GameLoop` asks a `FrameClock` for
//! the next frame, feeds buffered input, then ticks once. Swapping the clock
//! is how tests and benchmarks run the simulation without real time passing.

use std::future::Future;
use std::time::Duration;

use tokio::time::{interval, Interval, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::game::autopilot::Autopilot;
use crate::game::engine::{Engine, EngineError, TickOutcome};
use crate::game::input_buffer::{InputBuffer, InputSender, INPUT_CAPACITY};

/// Source of frame boundaries
pub trait FrameClock {
    /// Wait for the next frame; false once the clock has run out
    fn next_frame(&mut self) -> impl Future<Output = bool> + Send;
}

/// Real-time clock at a fixed frame rate
pub struct IntervalClock {
    interval: Interval,
    remaining: Option<u64>,
}

impl IntervalClock {
    /// Must be created inside a Tokio runtime
    pub fn new(frame_rate: u32) -> Self {
        let period = Duration::from_secs_f64(1.0 / frame_rate.max(1) as f64);
        let mut interval = interval(period);
        // A stalled host drops frames instead of bursting to catch up
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        Self {
            interval,
            remaining: None,
        }
    }

    /// Stop after `frames` frames (0 = unlimited)
    pub fn with_limit(mut self, frames: u64) -> Self {
        self.remaining = (frames > 0).then_some(frames);
        self
    }
}

impl FrameClock for IntervalClock {
    async fn next_frame(&mut self) -> bool {
        if let Some(remaining) = self.remaining.as_mut() {
            if *remaining == 0 {
                return false;
            }
            *remaining -= 1;
        }
        self.interval.tick().await;
        true
    }
}

/// Yields a fixed number of frames back to back
///
/// Each frame still yields to the runtime so background tasks (telemetry
/// dispatch) keep making progress.
pub struct StepClock {
    remaining: u64,
}

impl StepClock {
    pub fn new(frames: u64) -> Self {
        Self { remaining: frames }
    }
}

impl FrameClock for StepClock {
    async fn next_frame(&mut self) -> bool {
        if self.remaining == 0 {
            return false;
        }
        self.remaining -= 1;
        tokio::task::yield_now().await;
        true
    }
}

/// Summary of a `GameLoop::run`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    /// Frames the loop ticked
    pub frames: u64,
    /// Runs that reached game over
    pub games_finished: u32,
    pub best_score: u32,
    /// Score of the most recently finished run
    pub last_score: u32,
}

/// Drives an engine from a clock and an input buffer
pub struct GameLoop {
    engine: Engine,
    inputs: InputBuffer,
    autopilot: Option<Autopilot>,
    report: RunReport,
}

impl GameLoop {
    pub fn new(engine: Engine) -> Self {
        Self {
            engine,
            inputs: InputBuffer::new(INPUT_CAPACITY),
            autopilot: None,
            report: RunReport::default(),
        }
    }

    pub fn with_autopilot(mut self, autopilot: Autopilot) -> Self {
        self.autopilot = Some(autopilot);
        self
    }

    /// Handle for host input sources
    pub fn input_sender(&self) -> InputSender {
        self.inputs.sender()
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn report(&self) -> &RunReport {
        &self.report
    }

    /// One frame: buffered input, autopilot input, one tick
    pub fn step(&mut self) -> Result<TickOutcome, EngineError> {
        for signal in self.inputs.take_frame() {
            self.engine.on_input(signal)?;
        }

        if let Some(pilot) = self.autopilot.as_mut() {
            if let Some(signal) = pilot.decide(&self.engine) {
                self.engine.on_input(signal)?;
            }
        }

        let outcome = self.engine.tick()?;
        self.report.frames += 1;

        if let TickOutcome::GameOver(cause) = outcome {
            let score = self.engine.score();
            self.report.games_finished += 1;
            self.report.last_score = score;
            self.report.best_score = self.report.best_score.max(score);
            debug!(
                "Game {} finished ({}): score {}",
                self.report.games_finished,
                cause.as_str(),
                score
            );
        }

        Ok(outcome)
    }

    /// Run until the clock ends, the engine is destroyed, or a tick fails
    pub async fn run<K: FrameClock>(&mut self, clock: &mut K) -> Result<RunReport, EngineError> {
        info!("Game loop started");

        while clock.next_frame().await {
            if self.engine.is_destroyed() {
                break;
            }
            if let Err(e) = self.step() {
                error!("Game loop stopped: {}", e);
                return Err(e);
            }
        }

        info!(
            "Game loop finished: {} frames, {} games, best score {}",
            self.report.frames, self.report.games_finished, self.report.best_score
        );
        Ok(self.report.clone())
    }

    /// Tear down the engine; further frames are no-ops
    pub fn shutdown(&mut self) {
        self.engine.destroy();
    }
}
