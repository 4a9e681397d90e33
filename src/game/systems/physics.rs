use crate::game::constants::Tuning;
use crate::game::state::Bird;

/// Advance the bird by one tick
///
/// Semi-implicit Euler: velocity first, then position with the new velocity.
/// Returns false if the result is no longer finite.
#[inline]
pub fn integrate(bird: &mut Bird, tuning: &Tuning) -> bool {
    bird.velocity += tuning.gravity;
    bird.y += bird.velocity;
    bird.velocity.is_finite() && bird.y.is_finite()
}

/// Apply the jump impulse (replaces the current velocity)
#[inline]
pub fn jump(bird: &mut Bird, tuning: &Tuning) {
    bird.velocity = tuning.jump_impulse;
}
