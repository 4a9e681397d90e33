use std::sync::Arc;

use anyhow::Context;
use serde_json::{json, Map};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use flappy_telemetry::config::AppConfig;
use flappy_telemetry::game::autopilot::Autopilot;
use flappy_telemetry::game::constants::Tuning;
use flappy_telemetry::game::engine::Engine;
use flappy_telemetry::game::game_loop::{GameLoop, IntervalClock};
use flappy_telemetry::metrics::{self, TelemetryMetrics};
use flappy_telemetry::telemetry::{EventQueue, HttpCollector, SessionManager};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    info!("Flappy Telemetry v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = AppConfig::load_or_default();
    config.validate().map_err(anyhow::Error::msg).context("invalid configuration")?;
    let user_id = config.telemetry.resolve_user_id().unwrap_or_else(|e| {
        warn!(
            "Cannot persist player id in {}: {}",
            config.telemetry.user_id_file.display(),
            e
        );
        Uuid::new_v4()
    });
    info!(
        "Configuration loaded: collector={}, batch_size={}, batch_timeout={:?}, user={}",
        config.telemetry.collector_url,
        config.telemetry.batch_size,
        config.telemetry.batch_timeout,
        user_id
    );

    let metrics = Arc::new(TelemetryMetrics::new());
    if let Some(port) = config.runtime.metrics_port {
        let metrics_clone = metrics.clone();
        tokio::spawn(async move {
            if let Err(e) = metrics::start_metrics_server(metrics_clone, port).await {
                error!("Metrics server error: {}", e);
            }
        });
    }

    // Telemetry pipeline
    let collector = Arc::new(
        HttpCollector::new(&config.telemetry.collector_url, config.telemetry.request_timeout)?
            .with_token(config.telemetry.auth_token.clone()),
    );
    let queue = EventQueue::new(
        collector.clone(),
        config.telemetry.queue_config(),
        metrics.clone(),
    );
    queue.set_user_id(user_id);
    let sessions = SessionManager::new(
        collector.clone(),
        queue.clone(),
        config.telemetry.session_config(),
    );

    // Simulation
    let seed = config.game.seed.unwrap_or_else(rand::random);
    info!("Pipe seed: {}", seed);
    let mut engine = Engine::new(Tuning::default(), seed)
        .with_level(config.game.level.clone())
        .with_listener(queue.clone());
    engine.initialize(config.game.playfield_width, config.game.playfield_height)?;

    let mut game = GameLoop::new(engine).with_autopilot(Autopilot::new(
        seed.wrapping_add(1),
        config.runtime.autopilot_miss_rate,
    ));

    let mut device_info = Map::new();
    device_info.insert("game_name".to_string(), json!(env!("CARGO_PKG_NAME")));
    device_info.insert("screen_width".to_string(), json!(config.game.playfield_width));
    device_info.insert("screen_height".to_string(), json!(config.game.playfield_height));
    if let Err(e) = sessions.start_session(device_info).await {
        warn!("Playing without a telemetry session: {}", e);
    }

    let mut clock =
        IntervalClock::new(config.runtime.frame_rate).with_limit(config.runtime.sim_frames);

    // Shutdown signal handler
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Shutdown signal received");
    };

    tokio::select! {
        result = game.run(&mut clock) => {
            if let Err(e) = result {
                error!("Simulation error: {}", e);
            }
        }
        _ = shutdown => {
            info!("Shutting down...");
        }
    }

    let report = game.report().clone();
    let final_score = game.engine().score();
    game.shutdown();

    // Cleanup
    if sessions.active_session().is_some() {
        if let Some(summary) = sessions.end_session(final_score).await? {
            info!(
                "Session summary: {} events over {}s",
                summary.event_count.unwrap_or_default(),
                summary.duration_seconds.unwrap_or_default()
            );
        }
    }
    queue.shutdown();
    if let Err(e) = queue.flush().await {
        warn!("Final telemetry flush failed: {}", e);
    }

    if metrics.take_auth_rejection() {
        warn!("Collector rejected our credentials, clearing token");
        collector.clear_token();
    }

    info!(
        "Played {} frames, {} games, best score {}",
        report.frames, report.games_finished, report.best_score
    );
    info!("Telemetry: {}", metrics.to_json());
    Ok(())
}
