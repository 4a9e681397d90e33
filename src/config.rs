use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use uuid::Uuid;

use crate::game::constants::{playfield, sampling};
use crate::telemetry::queue::{QueueConfig, DEFAULT_BATCH_SIZE, DEFAULT_BATCH_TIMEOUT};
use crate::telemetry::session::SessionConfig;

/// Player id file used when `USER_ID_FILE` is unset
pub const DEFAULT_USER_ID_FILE: &str = ".flappy_user_id";

/// Collector connection and batching
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Base URL of the collector service
    pub collector_url: String,
    /// Bearer token, if the collector requires one
    pub auth_token: Option<String>,
    pub batch_size: usize,
    pub batch_timeout: Duration,
    pub request_timeout: Duration,
    pub platform: String,
    pub game_version: String,
    /// Player identity from the environment; wins over `user_id_file`
    pub user_id: Option<Uuid>,
    /// Where the generated player id is kept between runs
    pub user_id_file: PathBuf,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            collector_url: "http://localhost:8000".to_string(),
            auth_token: None,
            batch_size: DEFAULT_BATCH_SIZE,
            batch_timeout: DEFAULT_BATCH_TIMEOUT,
            request_timeout: Duration::from_millis(5000),
            platform: "native".to_string(),
            game_version: env!("CARGO_PKG_VERSION").to_string(),
            user_id: None,
            user_id_file: PathBuf::from(DEFAULT_USER_ID_FILE),
        }
    }
}

impl TelemetryConfig {
    /// Player identity for this run
    ///
    /// `USER_ID` if given, otherwise the id persisted in `user_id_file`,
    /// created on first launch so the same player is reported every run.
    pub fn resolve_user_id(&self) -> io::Result<Uuid> {
        match self.user_id {
            Some(id) => Ok(id),
            None => load_or_create_user_id(&self.user_id_file),
        }
    }

    pub fn queue_config(&self) -> QueueConfig {
        QueueConfig {
            batch_size: self.batch_size,
            batch_timeout: self.batch_timeout,
        }
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            platform: self.platform.clone(),
            game_version: self.game_version.clone(),
            ..SessionConfig::default()
        }
    }
}

/// Simulation setup
#[derive(Debug, Clone)]
pub struct GameConfig {
    pub level: String,
    pub playfield_width: f32,
    pub playfield_height: f32,
    /// Pipe placement seed; random when unset
    pub seed: Option<u64>,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            level: sampling::DEFAULT_LEVEL.to_string(),
            playfield_width: playfield::WIDTH,
            playfield_height: playfield::HEIGHT,
            seed: None,
        }
    }
}

/// Headless host settings
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub frame_rate: u32,
    /// Stop after this many frames (0 = until Ctrl+C)
    pub sim_frames: u64,
    /// Chance per intended flap that the autopilot misses
    pub autopilot_miss_rate: f64,
    /// Serve Prometheus metrics on this port when set
    pub metrics_port: Option<u16>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            frame_rate: playfield::FRAME_RATE,
            sim_frames: 0,
            autopilot_miss_rate: 0.02,
            metrics_port: None,
        }
    }
}

/// Application configuration
#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    pub telemetry: TelemetryConfig,
    pub game: GameConfig,
    pub runtime: RuntimeConfig,
}

impl AppConfig {
    /// Load config from environment or use defaults
    pub fn load_or_default() -> Self {
        Self::load_from(|key| std::env::var(key).ok())
    }

    /// Load config from an arbitrary variable source
    pub fn load_from(get: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        let telemetry = &mut config.telemetry;

        if let Some(url) = get("COLLECTOR_URL") {
            if url.starts_with("http://") || url.starts_with("https://") {
                telemetry.collector_url = url;
            } else {
                tracing::warn!("Invalid COLLECTOR_URL '{}', using default", url);
            }
        }

        if let Some(token) = get("AUTH_TOKEN") {
            if !token.is_empty() {
                telemetry.auth_token = Some(token);
            }
        }

        if let Some(size) = parse::<usize>(&get, "TELEMETRY_BATCH_SIZE") {
            if (1..=1000).contains(&size) {
                telemetry.batch_size = size;
            } else {
                tracing::warn!("TELEMETRY_BATCH_SIZE must be 1-1000, using default");
            }
        }

        if let Some(ms) = parse::<u64>(&get, "TELEMETRY_BATCH_TIMEOUT_MS") {
            if ms > 0 {
                telemetry.batch_timeout = Duration::from_millis(ms);
            } else {
                tracing::warn!("TELEMETRY_BATCH_TIMEOUT_MS must be > 0, using default");
            }
        }

        if let Some(ms) = parse::<u64>(&get, "TELEMETRY_REQUEST_TIMEOUT_MS") {
            if ms > 0 {
                telemetry.request_timeout = Duration::from_millis(ms);
            } else {
                tracing::warn!("TELEMETRY_REQUEST_TIMEOUT_MS must be > 0, using default");
            }
        }

        if let Some(platform) = get("PLATFORM") {
            telemetry.platform = platform;
        }

        if let Some(version) = get("GAME_VERSION") {
            telemetry.game_version = version;
        }

        if let Some(user_id) = parse::<Uuid>(&get, "USER_ID") {
            telemetry.user_id = Some(user_id);
        }

        if let Some(path) = get("USER_ID_FILE") {
            if !path.trim().is_empty() {
                telemetry.user_id_file = PathBuf::from(path);
            }
        }

        let game = &mut config.game;

        if let Some(level) = get("LEVEL") {
            game.level = level;
        }

        if let Some(width) = parse::<f32>(&get, "PLAYFIELD_WIDTH") {
            game.playfield_width = width;
        }

        if let Some(height) = parse::<f32>(&get, "PLAYFIELD_HEIGHT") {
            game.playfield_height = height;
        }

        if let Some(seed) = parse::<u64>(&get, "SEED") {
            game.seed = Some(seed);
        }

        let runtime = &mut config.runtime;

        if let Some(rate) = parse::<u32>(&get, "FRAME_RATE") {
            if (1..=240).contains(&rate) {
                runtime.frame_rate = rate;
            } else {
                tracing::warn!("FRAME_RATE must be 1-240, using default");
            }
        }

        if let Some(frames) = parse::<u64>(&get, "SIM_FRAMES") {
            runtime.sim_frames = frames;
        }

        if let Some(rate) = parse::<f64>(&get, "AUTOPILOT_MISS_RATE") {
            if (0.0..=1.0).contains(&rate) {
                runtime.autopilot_miss_rate = rate;
            } else {
                tracing::warn!("AUTOPILOT_MISS_RATE must be 0-1, using default");
            }
        }

        if let Some(port) = parse::<u16>(&get, "METRICS_PORT") {
            if port > 0 {
                runtime.metrics_port = Some(port);
            } else {
                tracing::warn!("METRICS_PORT must be > 0, metrics server disabled");
            }
        }

        config
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), String> {
        if self.telemetry.batch_size == 0 {
            return Err("batch_size must be at least 1".to_string());
        }
        if self.telemetry.batch_timeout.is_zero() {
            return Err("batch_timeout cannot be 0".to_string());
        }
        let (width, height) = (self.game.playfield_width, self.game.playfield_height);
        if !(width.is_finite() && height.is_finite() && width > 0.0 && height > 0.0) {
            return Err(format!("Playfield {}x{} is not usable", width, height));
        }
        if self.runtime.frame_rate == 0 {
            return Err("frame_rate must be at least 1".to_string());
        }
        if !(0.0..=1.0).contains(&self.runtime.autopilot_miss_rate) {
            return Err("autopilot_miss_rate must be within 0-1".to_string());
        }
        Ok(())
    }
}

/// Read the persisted player id, creating the file on first run
///
/// A malformed file is replaced with a fresh id.
pub fn load_or_create_user_id(path: &Path) -> io::Result<Uuid> {
    match std::fs::read_to_string(path) {
        Ok(raw) => match raw.trim().parse() {
            Ok(id) => return Ok(id),
            Err(_) => tracing::warn!("Malformed player id in {}, replacing it", path.display()),
        },
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }

    let id = Uuid::new_v4();
    std::fs::write(path, format!("{id}\n"))?;
    tracing::info!("New player id {} saved to {}", id, path.display());
    Ok(id)
}

/// Read and parse one variable, warning on garbage
fn parse<T: FromStr>(get: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = get(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!("Invalid {} '{}', using default", key, raw);
            None
        }
    }
}
