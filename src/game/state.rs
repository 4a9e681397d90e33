//! Game state definitions and structures
//!
//! Contains the bird, the live pipes and the run bookkeeping. Only the
//! engine mutates this; hosts read it through `Engine::state`.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::game::constants::{bird, pipes, Tuning};

/// Pipe identifier, monotonically increasing per engine
pub type PipeId = u64;

/// Current phase of a run
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum GamePhase {
    /// Not started yet, or freshly reset
    #[default]
    Idle,
    /// Physics advancing
    Running,
    /// Run ended, waiting for a restart
    GameOver,
}

/// The player-controlled bird
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Bird {
    /// Left edge
    pub x: f32,
    /// Top edge
    pub y: f32,
    pub width: f32,
    pub height: f32,
    /// Vertical velocity (positive = falling)
    pub velocity: f32,
}

impl Default for Bird {
    fn default() -> Self {
        Self {
            x: bird::START_X,
            y: bird::START_Y,
            width: bird::WIDTH,
            height: bird::HEIGHT,
            velocity: 0.0,
        }
    }
}

impl Bird {
    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    /// Vertical center, used by the autopilot to aim at gaps
    pub fn center_y(&self) -> f32 {
        self.y + self.height / 2.0
    }
}

/// A top/bottom pipe pair with a gap between `top_height` and `bottom_y`
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Pipe {
    pub id: PipeId,
    /// Left edge
    pub x: f32,
    /// Bottom edge of the top pipe
    pub top_height: f32,
    /// Top edge of the bottom pipe
    pub bottom_y: f32,
    /// Set once when the bird clears this pipe
    pub scored: bool,
}

impl Pipe {
    pub fn new(id: PipeId, x: f32, top_height: f32, gap: f32) -> Self {
        Self {
            id,
            x,
            top_height,
            bottom_y: top_height + gap,
            scored: false,
        }
    }

    pub fn right(&self, width: f32) -> f32 {
        self.x + width
    }

    /// Vertical center of the gap
    pub fn gap_center(&self) -> f32 {
        (self.top_height + self.bottom_y) / 2.0
    }
}

/// Live pipes, oldest (leftmost) first
pub type PipeList = SmallVec<[Pipe; pipes::INLINE_CAPACITY]>;

/// Playfield bounds set by `Engine::initialize`
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Playfield {
    pub width: f32,
    pub height: f32,
}

/// Complete game state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameState {
    pub bird: Bird,
    pub tuning: Tuning,
    pub pipes: PipeList,
    pub score: u32,
    pub high_score: u32,
    pub phase: GamePhase,
    /// Ticks advanced in the current run
    pub frame: u64,
    /// Runs started since construction
    pub runs: u32,
    next_pipe_id: PipeId,
}

impl GameState {
    pub fn new(tuning: Tuning) -> Self {
        Self {
            bird: Bird::default(),
            tuning,
            pipes: PipeList::new(),
            score: 0,
            high_score: 0,
            phase: GamePhase::Idle,
            frame: 0,
            runs: 0,
            next_pipe_id: 1,
        }
    }

    /// Reset the run back to `Idle`, keeping the high score
    pub fn reset(&mut self) {
        self.bird = Bird::default();
        self.pipes.clear();
        self.score = 0;
        self.frame = 0;
        self.phase = GamePhase::Idle;
    }

    /// Allocate the next pipe id
    pub fn next_pipe_id(&mut self) -> PipeId {
        let id = self.next_pipe_id;
        self.next_pipe_id += 1;
        id
    }

    pub fn is_running(&self) -> bool {
        self.phase == GamePhase::Running
    }

    pub fn is_game_over(&self) -> bool {
        self.phase == GamePhase::GameOver
    }

    /// Raise the high score if the current run beat it
    ///
    /// Returns true when the high score changed.
    pub fn record_high_score(&mut self) -> bool {
        if self.score > self.high_score {
            self.high_score = self.score;
            true
        } else {
            false
        }
    }
}

impl Default for GameState {
    fn default() -> Self {
        Self::new(Tuning::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_state_is_idle() {
        let state = GameState::default();
        assert_eq!(state.phase, GamePhase::Idle);
        assert_eq!(state.score, 0);
        assert_eq!(state.high_score, 0);
        assert!(state.pipes.is_empty());
        assert_eq!(state.bird.y, bird::START_Y);
        assert_eq!(state.bird.velocity, 0.0);
    }

    #[test]
    fn test_reset_keeps_high_score() {
        let mut state = GameState::default();
        state.phase = GamePhase::GameOver;
        state.score = 7;
        state.record_high_score();
        state.frame = 400;
        state.bird.y = 12.0;
        let id = state.next_pipe_id();
        state.pipes.push(Pipe::new(id, 300.0, 100.0, 150.0));

        state.reset();

        assert_eq!(state.phase, GamePhase::Idle);
        assert_eq!(state.score, 0);
        assert_eq!(state.high_score, 7);
        assert_eq!(state.frame, 0);
        assert!(state.pipes.is_empty());
        assert_eq!(state.bird, Bird::default());
    }

    #[test]
    fn test_pipe_ids_are_monotonic_across_resets() {
        let mut state = GameState::default();
        let a = state.next_pipe_id();
        state.reset();
        let b = state.next_pipe_id();
        assert!(b > a);
    }

    #[test]
    fn test_record_high_score_only_on_improvement() {
        let mut state = GameState::default();
        state.score = 3;
        assert!(state.record_high_score());
        state.score = 2;
        assert!(!state.record_high_score());
        assert_eq!(state.high_score, 3);
    }

    #[test]
    fn test_pipe_geometry() {
        let pipe = Pipe::new(1, 200.0, 100.0, 150.0);
        assert_eq!(pipe.bottom_y, 250.0);
        assert_eq!(pipe.right(60.0), 260.0);
        assert_eq!(pipe.gap_center(), 175.0);
        assert!(!pipe.scored);
    }
}
