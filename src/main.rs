//! rovlinkd - rovlink vehicle daemon.
//!
//! Runs the vehicle role: camera capture plus the telemetry and video servers
//! a console connects to.

use rovlink_relay::{CaptureWorker, Config, SharedState, SyntheticCamera, VehicleRelay};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration (from file if ROVLINK_CONFIG is set, then env overrides)
    let config = match Config::load() {
        Ok(c) => {
            if let Ok(path) = std::env::var("ROVLINK_CONFIG") {
                tracing::info!("Loaded config from {}", path);
            }
            c
        }
        Err(e) => {
            // If a config file was explicitly specified, fail on error
            if std::env::var("ROVLINK_CONFIG").is_ok() {
                tracing::error!("Failed to load config: {}", e);
                return Err(e.into());
            }
            // Otherwise fall back to defaults
            tracing::info!("Using default configuration");
            Config::default()
        }
    };

    tracing::info!("Starting rovlink vehicle");
    tracing::info!("  Telemetry address: {}", config.network.telemetry_addr);
    tracing::info!("  Video address: {}", config.network.video_addr);
    tracing::info!(
        "  Camera: {} synthetic device(s), {}x{}, scaled to width {}",
        config.capture.device_count,
        config.capture.frame_width,
        config.capture.frame_height,
        config.video.target_width
    );

    let state = Arc::new(SharedState::new());

    // The capture worker feeds the batches the video stream answers with
    let workers_running = Arc::new(AtomicBool::new(true));
    let camera = SyntheticCamera::new(
        config.capture.device_count,
        config.capture.frame_width,
        config.capture.frame_height,
    );
    let capture = CaptureWorker::spawn(
        camera,
        state.clone(),
        config.capture.capture_interval(),
        config.video.target_width,
        workers_running.clone(),
    )?;

    let relay = Arc::new(VehicleRelay::bind(config, state).await?);

    // Spawn shutdown signal handler
    let shutdown_relay = relay.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        tracing::info!("Received shutdown signal, stopping vehicle...");
        shutdown_relay.shutdown();
    });

    // Run the relay (blocks until shutdown)
    relay.run().await?;

    // Stop the capture worker
    workers_running.store(false, Ordering::Relaxed);
    if capture.join().is_err() {
        tracing::error!("Capture thread panicked during shutdown");
    }

    tracing::info!("Vehicle stopped");
    Ok(())
}
