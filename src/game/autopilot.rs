//! Scripted input producer for headless runs
//!
//! Flies toward the gap of the next pipe it hasn't cleared yet and
//! occasionally "stalls" (stops flapping for a while) so runs end and
//! restart, which exercises the full event/session flow.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::game::engine::{Engine, InputSignal};
use crate::game::state::{GamePhase, GameState};

/// How far below the gap center the bird's center is held
///
/// A jump lifts the bird ~60 units, so hovering slightly low keeps the whole
/// oscillation inside a 150 unit gap.
const AIM_BELOW_CENTER: f32 = 20.0;

/// Frames without flapping after a simulated mistake
const STALL_FRAMES: u32 = 24;

/// Deterministic bot that plays through the engine's public input API
pub struct Autopilot {
    rng: StdRng,
    miss_rate: f64,
    stall: u32,
}

impl Autopilot {
    /// `miss_rate` is the chance, per intended flap, of stalling instead
    pub fn new(seed: u64, miss_rate: f64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            miss_rate: miss_rate.clamp(0.0, 1.0),
            stall: 0,
        }
    }

    /// Decide this frame's input, if any
    pub fn decide(&mut self, engine: &Engine) -> Option<InputSignal> {
        let state = engine.state();
        match state.phase {
            GamePhase::Idle => Some(InputSignal::Jump),
            GamePhase::GameOver if engine.is_input_armed() => {
                self.stall = 0;
                Some(InputSignal::Jump)
            }
            GamePhase::GameOver => Some(InputSignal::Acknowledge),
            GamePhase::Running => {
                let fallback = engine.playfield().map(|p| p.height / 2.0)?;
                self.fly(state, fallback)
            }
        }
    }

    fn fly(&mut self, state: &GameState, fallback_target: f32) -> Option<InputSignal> {
        if self.stall > 0 {
            self.stall -= 1;
            return None;
        }

        let bird = &state.bird;
        let target = state
            .pipes
            .iter()
            .find(|pipe| pipe.right(state.tuning.pipe_width) >= bird.x)
            .map(|pipe| pipe.gap_center() + AIM_BELOW_CENTER)
            .unwrap_or(fallback_target);

        if bird.center_y() <= target || bird.velocity < 0.0 {
            return None;
        }

        if self.miss_rate > 0.0 && self.rng.gen_bool(self.miss_rate) {
            self.stall = STALL_FRAMES;
            return None;
        }

        Some(InputSignal::Jump)
    }
}
