pub mod autopilot;
pub mod constants;
pub mod engine;
pub mod events;
pub mod game_loop;
pub mod input_buffer;
pub mod state;
pub mod systems;
