//! Pipe spawning, scrolling and scoring

use rand::Rng;
use smallvec::SmallVec;

use crate::game::constants::Tuning;
use crate::game::state::{GameState, Pipe, PipeId, PipeList, Playfield};

/// Vertical range the top pipe's bottom edge is drawn from
///
/// Empty when the playfield is too short for the gap plus both margins.
pub fn gap_range(tuning: &Tuning, playfield: &Playfield) -> std::ops::Range<f32> {
    let min = tuning.gap_margin;
    let max = playfield.height - tuning.pipe_gap - tuning.gap_margin;
    min..max
}

/// Append a new pipe at the right edge with a uniformly random gap
///
/// Caller guarantees a non-empty `gap_range` (checked at initialize).
pub fn spawn<R: Rng + ?Sized>(state: &mut GameState, playfield: &Playfield, rng: &mut R) -> PipeId {
    let top_height = rng.gen_range(gap_range(&state.tuning, playfield));
    let id = state.next_pipe_id();
    state
        .pipes
        .push(Pipe::new(id, playfield.width, top_height, state.tuning.pipe_gap));
    id
}

/// Scroll every pipe left and drop the ones fully past the left edge
///
/// Returns the number of pipes removed.
pub fn scroll(pipes: &mut PipeList, speed: f32, width: f32) -> usize {
    for pipe in pipes.iter_mut() {
        pipe.x -= speed;
    }

    let before = pipes.len();
    pipes.retain(|pipe| pipe.right(width) >= 0.0);
    before - pipes.len()
}

/// Mark every unscored pipe whose trailing edge is behind the bird
///
/// Returns the ids of pipes scored on this call, oldest first. A pipe is
/// returned at most once over its lifetime.
pub fn collect_scored(pipes: &mut PipeList, bird_x: f32, width: f32) -> SmallVec<[PipeId; 2]> {
    let mut scored = SmallVec::new();
    for pipe in pipes
        .iter_mut()
        .filter(|pipe| !pipe.scored && pipe.right(width) < bird_x)
    {
        pipe.scored = true;
        scored.push(pipe.id);
    }
    scored
}
