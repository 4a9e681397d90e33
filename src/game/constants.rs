use serde::{Deserialize, Serialize};

/// Bird physics constants (units per tick, y grows downward)
pub mod physics {
    /// Downward acceleration applied every tick
    pub const GRAVITY: f32 = 0.5;
    /// Velocity set on jump (negative = up)
    pub const JUMP_IMPULSE: f32 = -8.0;
}

/// Bird body constants
pub mod bird {
    /// Fixed horizontal position of the bird's left edge
    pub const START_X: f32 = 100.0;
    /// Vertical position of the bird's top edge after a reset
    pub const START_Y: f32 = 200.0;
    pub const WIDTH: f32 = 30.0;
    pub const HEIGHT: f32 = 30.0;
}

/// Pipe constants
pub mod pipes {
    /// Horizontal scroll speed
    pub const SPEED: f32 = 3.0;
    /// Vertical opening between the top and bottom pipe
    pub const GAP: f32 = 150.0;
    /// Pipe width
    pub const WIDTH: f32 = 60.0;
    /// Minimum distance between the gap and either playfield edge
    pub const GAP_MARGIN: f32 = 50.0;
    /// A new pipe is spawned every this many ticks
    pub const SPAWN_INTERVAL: u64 = 90;
    /// Inline capacity for live pipes (800 wide playfield holds at most 4)
    pub const INLINE_CAPACITY: usize = 8;
}

/// Telemetry sampling constants
pub mod sampling {
    /// A position sample is emitted every this many ticks
    pub const POSITION_INTERVAL: u64 = 30;
    /// Level tag attached to position samples
    pub const DEFAULT_LEVEL: &str = "level1";
}

/// Playfield defaults
pub mod playfield {
    pub const WIDTH: f32 = 800.0;
    pub const HEIGHT: f32 = 600.0;
    /// Host frame rate the physics constants were tuned for
    pub const FRAME_RATE: u32 = 60;
}

/// Tunable simulation parameters
///
/// Defaults reproduce the classic feel. The engine copies this into its
/// state on construction; it never changes during a run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tuning {
    pub gravity: f32,
    pub jump_impulse: f32,
    pub pipe_speed: f32,
    pub pipe_gap: f32,
    pub pipe_width: f32,
    pub gap_margin: f32,
    /// Frames between pipe spawns; 0 disables spawning
    pub spawn_interval: u64,
    /// Frames between position samples; 0 disables sampling
    pub sample_interval: u64,
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            gravity: physics::GRAVITY,
            jump_impulse: physics::JUMP_IMPULSE,
            pipe_speed: pipes::SPEED,
            pipe_gap: pipes::GAP,
            pipe_width: pipes::WIDTH,
            gap_margin: pipes::GAP_MARGIN,
            spawn_interval: pipes::SPAWN_INTERVAL,
            sample_interval: sampling::POSITION_INTERVAL,
        }
    }
}

impl Tuning {
    /// Smallest playfield height that still leaves room for a gap
    pub fn min_playfield_height(&self) -> f32 {
        self.pipe_gap + 2.0 * self.gap_margin
    }
}
