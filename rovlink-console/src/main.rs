//! rovlink-console - Operator console for rovlink
//!
//! Provides both a REPL and one-shot command execution. Both modes dial a
//! vehicle and keep the relay streams alive on a background thread while
//! the foreground edits the shared command state.

mod commands;
mod repl;

use clap::{Parser, Subcommand};
use colored::Colorize;
use rovlink_protocol::{DEFAULT_TELEMETRY_PORT, DEFAULT_VIDEO_PORT};
use rovlink_relay::{Config, ConsoleRelay, RenderWorker, SharedState, TraceSink};
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// How often the render worker looks for newly received frames.
const RENDER_POLL: Duration = Duration::from_millis(50);

#[derive(Parser)]
#[command(name = "rovlink-console")]
#[command(about = "Operator console for rovlink vehicles")]
#[command(version)]
struct Cli {
    /// Vehicle host
    #[arg(short = 'H', long, default_value = "127.0.0.1", env = "ROVLINK_HOST")]
    host: IpAddr,

    /// Telemetry port
    #[arg(long, default_value_t = DEFAULT_TELEMETRY_PORT)]
    telemetry_port: u16,

    /// Video port
    #[arg(long, default_value_t = DEFAULT_VIDEO_PORT)]
    video_port: u16,

    /// Config file path (otherwise ROVLINK_CONFIG, then defaults)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start interactive REPL
    Repl,

    /// Print link, command, and sensor status
    Status,

    /// Enable thrusters
    Enable,

    /// Disable thrusters
    Disable,

    /// Set the four horizontal thruster setpoints
    #[command(allow_negative_numbers = true)]
    Thrust {
        /// Front-left setpoint (-1.0..=1.0)
        fl: f32,

        /// Front-right setpoint (-1.0..=1.0)
        fr: f32,

        /// Rear-left setpoint (-1.0..=1.0)
        rl: f32,

        /// Rear-right setpoint (-1.0..=1.0)
        rr: f32,
    },

    /// Set the two vertical thruster setpoints
    #[command(allow_negative_numbers = true)]
    Vertical {
        /// Front setpoint (-1.0..=1.0)
        front: f32,

        /// Rear setpoint (-1.0..=1.0)
        rear: f32,
    },

    /// Stream sensor readings
    Watch {
        /// Seconds to stream for
        #[arg(default_value_t = 5)]
        seconds: u64,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging; keep the default quiet so the REPL stays readable
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    // The connect address always comes from the command line; the config
    // file contributes pacing, timeouts, and video settings.
    let mut config = match cli.config {
        Some(ref path) => Config::from_file(path)?,
        None => Config::load()?,
    };
    config.network.telemetry_addr = SocketAddr::new(cli.host, cli.telemetry_port);
    config.network.video_addr = SocketAddr::new(cli.host, cli.video_port);
    config.validate()?;

    // How long a one-shot waits for both streams to come up
    let link_deadline = config.network.connect_timeout() + Duration::from_secs(2);

    let state = Arc::new(SharedState::new());

    // State-changing one-shots land before the relay dials, so the first
    // telemetry frame already carries them
    if let Some(ref command) = cli.command {
        if let Err(e) = commands::apply(command, &state) {
            eprintln!("{}: {}", "Error".red(), e);
            std::process::exit(1);
        }
    }

    let relay = Arc::new(ConsoleRelay::new(config, state.clone()));
    let stats = relay.stats();

    // Render worker consumes batches the relay records
    let workers_running = Arc::new(AtomicBool::new(true));
    let render = RenderWorker::spawn(
        TraceSink,
        state.clone(),
        RENDER_POLL,
        workers_running.clone(),
    )?;

    // The relay gets its own single-threaded runtime so the blocking REPL
    // never starves socket I/O
    let relay_thread = {
        let relay = relay.clone();
        std::thread::Builder::new().name("relay".into()).spawn(move || {
            let rt = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(rt) => rt,
                Err(e) => {
                    tracing::error!("Failed to start relay runtime: {}", e);
                    return;
                }
            };
            if let Err(e) = rt.block_on(relay.run()) {
                tracing::error!("Relay stopped with error: {}", e);
            }
        })?
    };

    // Handle commands
    match cli.command {
        Some(Commands::Repl) | None => {
            println!(
                "Connecting to {} (telemetry {}, video {})...",
                cli.host, cli.telemetry_port, cli.video_port
            );
            repl::run(&state, &stats)?;
        }
        Some(Commands::Watch { seconds }) => {
            // Watch streams lines, so it runs here instead of through execute
            if let Err(e) = commands::wait_for_link(&stats, link_deadline) {
                eprintln!("{}: {}", "Error".red(), e);
                std::process::exit(1);
            }
            for _ in 0..seconds.saturating_mul(2) {
                let sensors = state.sensors();
                let snap = stats.snapshot();
                println!(
                    "IMU [{:+.3} {:+.3} {:+.3}]  streams {}  frames in/out {}/{}",
                    sensors.imu[0],
                    sensors.imu[1],
                    sensors.imu[2],
                    snap.connections_active,
                    snap.frames_in_total,
                    snap.frames_out_total
                );
                std::thread::sleep(Duration::from_millis(500));
            }
        }
        Some(command) => match commands::execute(command, &state, &stats, link_deadline) {
            Ok(output) => println!("{}", output),
            Err(e) => {
                eprintln!("{}: {}", "Error".red(), e);
                std::process::exit(1);
            }
        },
    }

    // Wind everything down
    relay.shutdown();
    workers_running.store(false, Ordering::Relaxed);
    let _ = relay_thread.join();
    if render.join().is_err() {
        tracing::error!("Render thread panicked during shutdown");
    }

    Ok(())
}
