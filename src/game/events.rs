//! Semantic events emitted by the engine
//!
//! Each event maps to an `(event_type, event_name, payload)` triple, the
//! shape the telemetry collector stores.

use serde_json::{json, Value};

use crate::game::state::PipeId;
use crate::game::systems::collision::CollisionCause;

/// Something worth recording happened in the simulation
#[derive(Debug, Clone, PartialEq)]
pub enum GameEvent {
    /// A run started (first input, or restart after game over)
    GameStart { run: u32 },
    /// Jump applied
    Jump { bird_y: f32, bird_velocity: f32 },
    /// A pipe was cleared
    Score { score: u32, pipe_id: PipeId },
    /// Periodic position sample for spatial aggregation
    Position { x: i32, y: i32, level: String },
    /// Run ended
    GameOver {
        final_score: u32,
        high_score: u32,
        pipes_passed: u32,
        cause: CollisionCause,
    },
}

impl GameEvent {
    /// Category tag
    pub fn event_type(&self) -> &'static str {
        match self {
            GameEvent::GameStart { .. } => "game",
            GameEvent::Jump { .. } => "jump",
            GameEvent::Score { .. } => "score",
            GameEvent::Position { .. } => "position",
            GameEvent::GameOver { .. } => "collision",
        }
    }

    pub fn event_name(&self) -> &'static str {
        match self {
            GameEvent::GameStart { .. } => "game_start",
            GameEvent::Jump { .. } => "player_jump",
            GameEvent::Score { .. } => "score_update",
            GameEvent::Position { .. } => "position_sample",
            GameEvent::GameOver { .. } => "game_over",
        }
    }

    /// Free-form payload map
    pub fn payload(&self) -> Value {
        match self {
            GameEvent::GameStart { run } => json!({ "run": run }),
            GameEvent::Jump {
                bird_y,
                bird_velocity,
            } => json!({ "bird_y": bird_y, "bird_velocity": bird_velocity }),
            GameEvent::Score { score, pipe_id } => {
                json!({ "score": score, "pipe_passed": pipe_id })
            }
            GameEvent::Position { x, y, level } => json!({ "x": x, "y": y, "level": level }),
            GameEvent::GameOver {
                final_score,
                high_score,
                pipes_passed,
                cause,
            } => json!({
                "final_score": final_score,
                "high_score": high_score,
                "pipes_passed": pipes_passed,
                "cause": cause.as_str(),
            }),
        }
    }
}

/// Observer for engine events
///
/// Called synchronously from `tick`/`on_input`; implementations must not
/// block.
pub trait EventListener: Send {
    fn on_event(&mut self, event: &GameEvent);
}

impl<F> EventListener for F
where
    F: FnMut(&GameEvent) + Send,
{
    fn on_event(&mut self, event: &GameEvent) {
        self(event)
    }
}
