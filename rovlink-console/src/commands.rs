//! Command execution.

use crate::Commands;
use colored::Colorize;
use rovlink_relay::{RelayStats, SharedState};
use std::time::{Duration, Instant};

/// Applies a state-changing command to the shared state.
///
/// Called before the relay dials, so the first telemetry frame already
/// carries the requested setpoints. Non-mutating commands are a no-op.
pub fn apply(command: &Commands, state: &SharedState) -> Result<(), Box<dyn std::error::Error>> {
    match *command {
        Commands::Enable => state.update_command(|c| c.enabled = true),
        Commands::Disable => state.update_command(|c| c.enabled = false),
        Commands::Thrust { fl, fr, rl, rr } => {
            for value in [fl, fr, rl, rr] {
                check_setpoint(value)?;
            }
            state.update_command(|c| c.horizontal = [fl, fr, rl, rr]);
        }
        Commands::Vertical { front, rear } => {
            check_setpoint(front)?;
            check_setpoint(rear)?;
            state.update_command(|c| c.vertical = [front, rear]);
        }
        Commands::Repl | Commands::Status | Commands::Watch { .. } => {}
    }
    Ok(())
}

/// Executes a command and returns the formatted output.
pub fn execute(
    command: Commands,
    state: &SharedState,
    stats: &RelayStats,
    link_deadline: Duration,
) -> Result<String, Box<dyn std::error::Error>> {
    match command {
        Commands::Repl | Commands::Watch { .. } => unreachable!(),

        Commands::Enable => {
            wait_for_link(stats, link_deadline)?;
            Ok("Thrusters enabled".green().to_string())
        }

        Commands::Disable => {
            wait_for_link(stats, link_deadline)?;
            Ok("Thrusters disabled".yellow().to_string())
        }

        Commands::Thrust { fl, fr, rl, rr } => {
            wait_for_link(stats, link_deadline)?;
            Ok(format!(
                "Horizontal setpoints {}",
                format!("[{:+.2} {:+.2} {:+.2} {:+.2}]", fl, fr, rl, rr).cyan()
            ))
        }

        Commands::Vertical { front, rear } => {
            wait_for_link(stats, link_deadline)?;
            Ok(format!(
                "Vertical setpoints {}",
                format!("[{:+.2} {:+.2}]", front, rear).cyan()
            ))
        }

        Commands::Status => {
            wait_for_link(stats, link_deadline)?;
            Ok(format_status(state, stats))
        }
    }
}

/// Blocks until both relay streams are up and the vehicle has replied
/// on each, or the deadline passes.
pub fn wait_for_link(
    stats: &RelayStats,
    deadline: Duration,
) -> Result<(), Box<dyn std::error::Error>> {
    let started = Instant::now();
    loop {
        let snap = stats.snapshot();
        if snap.connections_active == 2 && snap.frames_in_total >= 2 {
            return Ok(());
        }
        if started.elapsed() >= deadline {
            return Err(format!("no reply from vehicle within {:?}", deadline).into());
        }
        std::thread::sleep(Duration::from_millis(25));
    }
}

/// Formats the status summary shown by the `status` verb.
pub fn format_status(state: &SharedState, stats: &RelayStats) -> String {
    let command = state.command();
    let sensors = state.sensors();
    let snap = stats.snapshot();

    let enabled = if command.enabled {
        "enabled".green()
    } else {
        "disabled".red()
    };

    let mut out = String::new();
    out.push_str(&format!("{}\n", "Link".bold()));
    out.push_str(&format!("  Streams active: {}\n", snap.connections_active));
    out.push_str(&format!(
        "  Connections total: {}\n",
        snap.connections_total
    ));
    out.push_str(&format!(
        "  Frames in/out: {}/{}\n",
        snap.frames_in_total, snap.frames_out_total
    ));
    out.push_str(&format!("  Errors: {}\n", snap.errors_total));
    out.push_str(&format!("{}\n", "Command".bold()));
    out.push_str(&format!("  Thrusters: {}\n", enabled));
    out.push_str(&format!(
        "  Horizontal: [{:+.2} {:+.2} {:+.2} {:+.2}]\n",
        command.horizontal[0], command.horizontal[1], command.horizontal[2], command.horizontal[3]
    ));
    out.push_str(&format!(
        "  Vertical: [{:+.2} {:+.2}]\n",
        command.vertical[0], command.vertical[1]
    ));
    out.push_str(&format!("{}\n", "Sensors".bold()));
    out.push_str(&format!(
        "  IMU: [{:+.3} {:+.3} {:+.3}]\n",
        sensors.imu[0], sensors.imu[1], sensors.imu[2]
    ));
    out.push_str(&format!(
        "  Batches held: {}",
        state.received_batches().len()
    ));
    out
}

/// Checks one thruster setpoint against the valid range.
fn check_setpoint(value: f32) -> Result<(), Box<dyn std::error::Error>> {
    if !(-1.0..=1.0).contains(&value) {
        return Err(format!("setpoint {} out of range -1.0..=1.0", value).into());
    }
    Ok(())
}
