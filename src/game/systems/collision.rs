//! Axis-aligned collision tests between the bird, pipes and the playfield

use crate::game::state::{Bird, Pipe};

/// What ended a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollisionCause {
    /// Hit the top or bottom pipe
    Pipe,
    /// Left the vertical playfield
    Bounds,
}

impl CollisionCause {
    pub fn as_str(&self) -> &'static str {
        match self {
            CollisionCause::Pipe => "pipe",
            CollisionCause::Bounds => "bounds",
        }
    }
}

/// Axis-aligned bounding box
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl Aabb {
    pub fn of_bird(bird: &Bird) -> Self {
        Self {
            left: bird.x,
            top: bird.y,
            right: bird.right(),
            bottom: bird.bottom(),
        }
    }

    /// Strict overlap with the horizontal span `[left, right]`
    #[inline]
    pub fn overlaps_x(&self, left: f32, right: f32) -> bool {
        self.right > left && self.left < right
    }
}

/// Bird box against a pipe pair
///
/// Collides iff the x ranges overlap and the box pokes above the gap or
/// below it.
#[inline]
pub fn hits_pipe(bird: &Aabb, pipe: &Pipe, pipe_width: f32) -> bool {
    bird.overlaps_x(pipe.x, pipe.right(pipe_width))
        && (bird.top < pipe.top_height || bird.bottom > pipe.bottom_y)
}

/// Bird box against the vertical playfield edges
#[inline]
pub fn out_of_bounds(bird: &Aabb, playfield_height: f32) -> bool {
    bird.top < 0.0 || bird.bottom > playfield_height
}

/// First collision for this tick, pipes before bounds
pub fn detect<'a>(
    bird: &Bird,
    pipes: impl IntoIterator<Item = &'a Pipe>,
    pipe_width: f32,
    playfield_height: f32,
) -> Option<CollisionCause> {
    let bird_box = Aabb::of_bird(bird);

    if pipes
        .into_iter()
        .any(|pipe| hits_pipe(&bird_box, pipe, pipe_width))
    {
        return Some(CollisionCause::Pipe);
    }

    if out_of_bounds(&bird_box, playfield_height) {
        return Some(CollisionCause::Bounds);
    }

    None
}
