//! Simulation engine
//!
//! Owns the `GameState` and advances it one tick at a time. The engine never
//! schedules itself: a host (see `game_loop`) calls `tick` once per frame and
//! forwards input through `on_input`. Everything observable leaves through
//! the `EventListener`.
//!
//! ```text
//!            Jump                 collision
//!   Idle ───────────▶ Running ───────────────▶ GameOver
//!    ▲                                            │
//!    └──────── reset (Acknowledge, then Jump) ────┘
//! ```

use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, error, info};

use crate::game::constants::{sampling, Tuning};
use crate::game::events::{EventListener, GameEvent};
use crate::game::state::{GamePhase, GameState, Playfield};
use crate::game::systems::collision::{self, CollisionCause};
use crate::game::systems::{self, physics, pipes};

/// Input forwarded by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputSignal {
    /// Key press / click: start, jump or restart depending on phase
    Jump,
    /// Host dismissed the game-over screen; re-arms restart
    Acknowledge,
}

/// What an input did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputOutcome {
    Started,
    Jumped,
    Restarted,
    Acknowledged,
    Ignored,
}

/// What a tick did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Not running, nothing advanced
    Idle,
    Advanced,
    /// The run ended on this tick
    GameOver(CollisionCause),
}

/// Engine errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EngineError {
    #[error("No usable playfield ({width}x{height})")]
    InvalidPlayfield { width: f32, height: f32 },
    #[error("Playfield height {height} is below the minimum {required} for the pipe gap")]
    PlayfieldTooSmall { height: f32, required: f32 },
    #[error("Engine used before initialize")]
    NotInitialized,
    #[error("Simulation diverged at frame {frame}")]
    Diverged { frame: u64 },
}

/// The game simulation
pub struct Engine {
    state: GameState,
    playfield: Option<Playfield>,
    rng: StdRng,
    level: String,
    listener: Option<Box<dyn EventListener>>,
    /// Cleared on game over so one press can't both dismiss and restart
    input_armed: bool,
    destroyed: bool,
}

impl Engine {
    /// Create an engine with a seeded RNG for pipe placement
    pub fn new(tuning: Tuning, seed: u64) -> Self {
        Self {
            state: GameState::new(tuning),
            playfield: None,
            rng: StdRng::seed_from_u64(seed),
            level: sampling::DEFAULT_LEVEL.to_string(),
            listener: None,
            input_armed: true,
            destroyed: false,
        }
    }

    /// Level tag attached to position samples
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }

    pub fn with_listener(mut self, listener: impl EventListener + 'static) -> Self {
        self.set_listener(Box::new(listener));
        self
    }

    /// Replace the event listener
    pub fn set_listener(&mut self, listener: Box<dyn EventListener>) {
        if self.destroyed {
            return;
        }
        self.listener = Some(listener);
    }

    /// Set the playfield bounds and reset to `Idle`
    pub fn initialize(&mut self, width: f32, height: f32) -> Result<(), EngineError> {
        let usable = width.is_finite() && height.is_finite() && width > 0.0 && height > 0.0;
        if !usable {
            return Err(EngineError::InvalidPlayfield { width, height });
        }

        let playfield = Playfield { width, height };
        if pipes::gap_range(&self.state.tuning, &playfield).is_empty() {
            return Err(EngineError::PlayfieldTooSmall {
                height,
                required: self.state.tuning.min_playfield_height(),
            });
        }

        self.playfield = Some(playfield);
        self.state.reset();
        self.input_armed = true;
        info!("Engine initialized: playfield {}x{}", width, height);
        Ok(())
    }

    /// Handle one input signal
    pub fn on_input(&mut self, signal: InputSignal) -> Result<InputOutcome, EngineError> {
        if self.destroyed {
            return Ok(InputOutcome::Ignored);
        }
        if self.playfield.is_none() {
            return Err(EngineError::NotInitialized);
        }

        let outcome = match (signal, self.state.phase) {
            (InputSignal::Jump, GamePhase::Idle) => {
                self.start_run();
                InputOutcome::Started
            }
            (InputSignal::Jump, GamePhase::Running) => {
                physics::jump(&mut self.state.bird, &self.state.tuning);
                let bird = self.state.bird;
                self.emit(GameEvent::Jump {
                    bird_y: bird.y,
                    bird_velocity: bird.velocity,
                });
                InputOutcome::Jumped
            }
            (InputSignal::Jump, GamePhase::GameOver) if self.input_armed => {
                self.state.reset();
                self.start_run();
                InputOutcome::Restarted
            }
            (InputSignal::Jump, GamePhase::GameOver) => {
                debug!("Jump ignored: game over not acknowledged");
                InputOutcome::Ignored
            }
            (InputSignal::Acknowledge, GamePhase::GameOver) if !self.input_armed => {
                self.input_armed = true;
                InputOutcome::Acknowledged
            }
            (InputSignal::Acknowledge, _) => InputOutcome::Ignored,
        };

        Ok(outcome)
    }

    /// Re-arm restart after a game over; false if there was nothing to acknowledge
    pub fn acknowledge_game_over(&mut self) -> bool {
        matches!(
            self.on_input(InputSignal::Acknowledge),
            Ok(InputOutcome::Acknowledged)
        )
    }

    /// Advance the simulation by one tick
    ///
    /// A no-op unless `Running`. A diverging simulation ends the run and
    /// returns an error; the caller is expected to stop its loop.
    pub fn tick(&mut self) -> Result<TickOutcome, EngineError> {
        if self.destroyed || !self.state.is_running() {
            return Ok(TickOutcome::Idle);
        }
        let playfield = self.playfield.ok_or(EngineError::NotInitialized)?;

        if !physics::integrate(&mut self.state.bird, &self.state.tuning) {
            let frame = self.state.frame;
            self.state.phase = GamePhase::GameOver;
            self.input_armed = false;
            error!("Simulation diverged at frame {}: {:?}", frame, self.state.bird);
            return Err(EngineError::Diverged { frame });
        }

        self.state.frame += 1;
        let frame = self.state.frame;
        let tuning = self.state.tuning;

        if systems::on_cadence(frame, tuning.sample_interval) {
            let bird = self.state.bird;
            self.emit(GameEvent::Position {
                x: bird.x.round() as i32,
                y: bird.y.round() as i32,
                level: self.level.clone(),
            });
        }

        if systems::on_cadence(frame, tuning.spawn_interval) {
            let id = pipes::spawn(&mut self.state, &playfield, &mut self.rng);
            debug!("Spawned pipe {} at frame {}", id, frame);
        }

        pipes::scroll(&mut self.state.pipes, tuning.pipe_speed, tuning.pipe_width);

        if let Some(cause) = collision::detect(
            &self.state.bird,
            &self.state.pipes,
            tuning.pipe_width,
            playfield.height,
        ) {
            self.end_run(cause);
            return Ok(TickOutcome::GameOver(cause));
        }

        let bird_x = self.state.bird.x;
        for pipe_id in pipes::collect_scored(&mut self.state.pipes, bird_x, tuning.pipe_width) {
            self.state.score += 1;
            let score = self.state.score;
            self.emit(GameEvent::Score { score, pipe_id });
        }

        Ok(TickOutcome::Advanced)
    }

    /// Stop the engine and detach the listener; safe to call repeatedly
    pub fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.destroyed = true;
        self.listener = None;
        info!(
            "Engine destroyed after {} runs (high score {})",
            self.state.runs, self.state.high_score
        );
    }

    pub fn state(&self) -> &GameState {
        &self.state
    }

    pub fn phase(&self) -> GamePhase {
        self.state.phase
    }

    pub fn score(&self) -> u32 {
        self.state.score
    }

    pub fn high_score(&self) -> u32 {
        self.state.high_score
    }

    pub fn playfield(&self) -> Option<Playfield> {
        self.playfield
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    /// Whether a Jump would restart from game over right now
    pub fn is_input_armed(&self) -> bool {
        self.input_armed
    }

    fn start_run(&mut self) {
        self.state.phase = GamePhase::Running;
        self.state.runs += 1;
        let run = self.state.runs;
        debug!("Run {} started", run);
        self.emit(GameEvent::GameStart { run });
    }

    fn end_run(&mut self, cause: CollisionCause) {
        self.state.phase = GamePhase::GameOver;
        self.input_armed = false;
        if self.state.record_high_score() {
            info!("New high score: {}", self.state.high_score);
        }

        let score = self.state.score;
        debug!(
            "Run {} over at frame {} ({}), score {}",
            self.state.runs,
            self.state.frame,
            cause.as_str(),
            score
        );
        self.emit(GameEvent::GameOver {
            final_score: score,
            high_score: self.state.high_score,
            pipes_passed: score,
            cause,
        });
    }

    fn emit(&mut self, event: GameEvent) {
        if let Some(listener) = self.listener.as_mut() {
            listener.on_event(&event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::state::Pipe;
    use parking_lot::Mutex;
    use std::sync::Arc;

    fn recording_engine(tuning: Tuning) -> (Engine, Arc<Mutex<Vec<GameEvent>>>) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        let mut engine = Engine::new(tuning, 7)
            .with_listener(move |event: &GameEvent| sink.lock().push(event.clone()));
        engine.initialize(800.0, 600.0).unwrap();
        (engine, events)
    }

    fn weightless() -> Tuning {
        Tuning {
            gravity: 0.0,
            ..Tuning::default()
        }
    }

    fn names(events: &Arc<Mutex<Vec<GameEvent>>>) -> Vec<&'static str> {
        events.lock().iter().map(|e| e.event_name()).collect()
    }

    #[test]
    fn test_initial_phase_is_idle() {
        let (engine, events) = recording_engine(Tuning::default());
        assert_eq!(engine.phase(), GamePhase::Idle);
        assert!(events.lock().is_empty());
    }

    #[test]
    fn test_tick_is_noop_when_idle() {
        let (mut engine, events) = recording_engine(Tuning::default());
        let before = engine.state().bird;
        assert_eq!(engine.tick(), Ok(TickOutcome::Idle));
        assert_eq!(engine.state().bird, before);
        assert_eq!(engine.state().frame, 0);
        assert!(events.lock().is_empty());
    }

    #[test]
    fn test_input_before_initialize_fails() {
        let mut engine = Engine::new(Tuning::default(), 1);
        assert_eq!(
            engine.on_input(InputSignal::Jump),
            Err(EngineError::NotInitialized)
        );
        assert_eq!(engine.tick(), Ok(TickOutcome::Idle));
    }

    #[test]
    fn test_initialize_rejects_bad_playfield() {
        let mut engine = Engine::new(Tuning::default(), 1);
        assert!(matches!(
            engine.initialize(0.0, 600.0),
            Err(EngineError::InvalidPlayfield { .. })
        ));
        assert!(matches!(
            engine.initialize(800.0, f32::NAN),
            Err(EngineError::InvalidPlayfield { .. })
        ));
        assert_eq!(
            engine.initialize(800.0, 200.0),
            Err(EngineError::PlayfieldTooSmall {
                height: 200.0,
                required: 250.0
            })
        );
        assert!(engine.playfield().is_none());
    }

    #[test]
    fn test_first_jump_starts_run() {
        let (mut engine, events) = recording_engine(Tuning::default());
        assert_eq!(engine.on_input(InputSignal::Jump), Ok(InputOutcome::Started));
        assert_eq!(engine.phase(), GamePhase::Running);
        // Starting does not apply the impulse
        assert_eq!(engine.state().bird.velocity, 0.0);
        assert_eq!(
            events.lock().as_slice(),
            &[GameEvent::GameStart { run: 1 }]
        );
    }

    #[test]
    fn test_jump_while_running_sets_impulse_and_emits() {
        let (mut engine, events) = recording_engine(Tuning::default());
        engine.on_input(InputSignal::Jump).unwrap();
        engine.tick().unwrap();
        assert_eq!(engine.on_input(InputSignal::Jump), Ok(InputOutcome::Jumped));

        assert_eq!(engine.state().bird.velocity, -8.0);
        let last = events.lock().last().cloned();
        assert_eq!(
            last,
            Some(GameEvent::Jump {
                bird_y: 200.5,
                bird_velocity: -8.0
            })
        );
    }

    #[test]
    fn test_running_ticks_follow_recurrence() {
        let (mut engine, _) = recording_engine(Tuning::default());
        engine.on_input(InputSignal::Jump).unwrap();
        engine.on_input(InputSignal::Jump).unwrap();

        for _ in 0..25 {
            let (v0, y0) = (engine.state().bird.velocity, engine.state().bird.y);
            assert_eq!(engine.tick(), Ok(TickOutcome::Advanced));
            let bird = engine.state().bird;
            assert_eq!(bird.velocity, v0 + 0.5);
            assert_eq!(bird.y, y0 + bird.velocity);
        }
    }

    #[test]
    fn test_out_of_bounds_ends_run_with_pre_collision_score() {
        let (mut engine, events) = recording_engine(Tuning::default());
        engine.on_input(InputSignal::Jump).unwrap();
        engine.state.score = 3;
        engine.state.bird.y = 0.0;
        engine.state.bird.velocity = -1.0;

        let outcome = engine.tick().unwrap();

        assert_eq!(outcome, TickOutcome::GameOver(CollisionCause::Bounds));
        assert_eq!(engine.state().bird.velocity, -0.5);
        assert_eq!(engine.state().bird.y, -0.5);
        assert_eq!(engine.phase(), GamePhase::GameOver);
        assert_eq!(
            events.lock().last().cloned(),
            Some(GameEvent::GameOver {
                final_score: 3,
                high_score: 3,
                pipes_passed: 3,
                cause: CollisionCause::Bounds,
            })
        );
    }

    #[test]
    fn test_pipe_collision_ends_run() {
        let (mut engine, events) = recording_engine(weightless());
        engine.on_input(InputSignal::Jump).unwrap();
        let id = engine.state.next_pipe_id();
        // Gap far below the bird; overlapping in x after one scroll
        engine.state.pipes.push(Pipe::new(id, 110.0, 300.0, 150.0));

        assert_eq!(
            engine.tick(),
            Ok(TickOutcome::GameOver(CollisionCause::Pipe))
        );
        assert_eq!(names(&events).last(), Some(&"game_over"));
        // Further ticks do nothing
        assert_eq!(engine.tick(), Ok(TickOutcome::Idle));
    }

    #[test]
    fn test_pipe_scores_exactly_once() {
        let (mut engine, events) = recording_engine(Tuning::default());
        engine.on_input(InputSignal::Jump).unwrap();
        let id = engine.state.next_pipe_id();
        // Wide gap around the bird; trailing edge 102 crosses bird.x=100 next tick
        engine.state.pipes.push(Pipe::new(id, 42.0, 10.0, 500.0));

        for _ in 0..20 {
            assert_eq!(engine.tick(), Ok(TickOutcome::Advanced));
        }

        let scores: Vec<GameEvent> = events
            .lock()
            .iter()
            .filter(|e| matches!(e, GameEvent::Score { .. }))
            .cloned()
            .collect();
        assert_eq!(scores, vec![GameEvent::Score { score: 1, pipe_id: id }]);
        assert_eq!(engine.score(), 1);
    }

    #[test]
    fn test_position_samples_and_spawn_cadence() {
        let (mut engine, events) = recording_engine(weightless());
        engine.on_input(InputSignal::Jump).unwrap();

        for _ in 0..120 {
            engine.tick().unwrap();
        }

        let samples: Vec<GameEvent> = events
            .lock()
            .iter()
            .filter(|e| matches!(e, GameEvent::Position { .. }))
            .cloned()
            .collect();
        assert_eq!(samples.len(), 4);
        assert_eq!(
            samples[0],
            GameEvent::Position {
                x: 100,
                y: 200,
                level: "level1".to_string()
            }
        );

        // One pipe spawned at frame 90 at the right edge, scrolled 31 times since
        assert_eq!(engine.state().pipes.len(), 1);
        assert_eq!(engine.state().pipes[0].x, 800.0 - 3.0 * 31.0);
    }

    #[test]
    fn test_zero_intervals_disable_sampling_and_spawning() {
        let (mut engine, events) = recording_engine(Tuning {
            sample_interval: 0,
            spawn_interval: 0,
            ..weightless()
        });
        engine.on_input(InputSignal::Jump).unwrap();

        for _ in 0..200 {
            engine.tick().unwrap();
        }

        assert!(!events
            .lock()
            .iter()
            .any(|e| matches!(e, GameEvent::Position { .. })));
        assert!(engine.state().pipes.is_empty());
    }

    #[test]
    fn test_game_over_requires_acknowledge_before_restart() {
        let (mut engine, events) = recording_engine(Tuning::default());
        engine.on_input(InputSignal::Jump).unwrap();
        engine.state.bird.y = -10.0;
        engine.tick().unwrap();
        assert_eq!(engine.phase(), GamePhase::GameOver);
        assert!(!engine.is_input_armed());

        // The press that killed the bird must not also restart it
        assert_eq!(engine.on_input(InputSignal::Jump), Ok(InputOutcome::Ignored));
        assert_eq!(engine.phase(), GamePhase::GameOver);

        assert!(engine.acknowledge_game_over());
        assert!(!engine.acknowledge_game_over());
        assert_eq!(engine.on_input(InputSignal::Jump), Ok(InputOutcome::Restarted));

        assert_eq!(engine.phase(), GamePhase::Running);
        assert_eq!(engine.score(), 0);
        assert_eq!(engine.state().bird.y, 200.0);
        assert_eq!(engine.state().runs, 2);
        assert_eq!(
            events.lock().last().cloned(),
            Some(GameEvent::GameStart { run: 2 })
        );
    }

    #[test]
    fn test_acknowledge_outside_game_over_is_ignored() {
        let (mut engine, _) = recording_engine(Tuning::default());
        assert_eq!(
            engine.on_input(InputSignal::Acknowledge),
            Ok(InputOutcome::Ignored)
        );
        engine.on_input(InputSignal::Jump).unwrap();
        assert_eq!(
            engine.on_input(InputSignal::Acknowledge),
            Ok(InputOutcome::Ignored)
        );
    }

    #[test]
    fn test_high_score_survives_restart() {
        let (mut engine, _) = recording_engine(Tuning::default());
        engine.on_input(InputSignal::Jump).unwrap();
        engine.state.score = 5;
        engine.state.bird.y = 700.0;
        engine.tick().unwrap();
        assert_eq!(engine.high_score(), 5);

        engine.acknowledge_game_over();
        engine.on_input(InputSignal::Jump).unwrap();
        engine.state.score = 2;
        engine.state.bird.y = 700.0;
        engine.tick().unwrap();

        assert_eq!(engine.score(), 2);
        assert_eq!(engine.high_score(), 5);
    }

    #[test]
    fn test_diverging_physics_is_an_error() {
        let tuning = Tuning {
            gravity: f32::INFINITY,
            ..Tuning::default()
        };
        let (mut engine, _) = recording_engine(tuning);
        engine.on_input(InputSignal::Jump).unwrap();

        assert_eq!(engine.tick(), Err(EngineError::Diverged { frame: 0 }));
        assert_eq!(engine.phase(), GamePhase::GameOver);
    }

    #[test]
    fn test_destroy_is_idempotent_and_detaches_listener() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        let mut engine = Engine::new(Tuning::default(), 3)
            .with_listener(move |event: &GameEvent| sink.lock().push(event.clone()));
        engine.initialize(800.0, 600.0).unwrap();
        assert_eq!(Arc::strong_count(&events), 2);

        engine.destroy();
        engine.destroy();

        assert!(engine.is_destroyed());
        assert_eq!(Arc::strong_count(&events), 1);
        assert_eq!(engine.on_input(InputSignal::Jump), Ok(InputOutcome::Ignored));
        assert_eq!(engine.tick(), Ok(TickOutcome::Idle));
        assert!(events.lock().is_empty());
    }

    #[test]
    fn test_same_seed_same_run() {
        let run = || {
            let (mut engine, events) = recording_engine(Tuning::default());
            engine.on_input(InputSignal::Jump).unwrap();
            for frame in 0..400u32 {
                if frame % 14 == 0 {
                    engine.on_input(InputSignal::Jump).unwrap();
                }
                if engine.tick().unwrap() != TickOutcome::Advanced {
                    break;
                }
            }
            let pipes: Vec<f32> = engine.state().pipes.iter().map(|p| p.top_height).collect();
            let log = events.lock().clone();
            (pipes, log)
        };
        assert_eq!(run(), run());
    }
}
