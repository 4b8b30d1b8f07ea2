//! Interactive REPL.

use colored::Colorize;
use rovlink_relay::{RelayStats, SharedState};
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::{Config, Editor};
use std::sync::Arc;
use std::time::Duration;

use crate::commands;

const HELP_TEXT: &str = r#"
Available commands:
  help                         Show this help
  status                       Link, command, and sensor summary

  enable                       Enable thrusters
  disable                      Disable thrusters
  thrust <fl> <fr> <rl> <rr>   Set the four horizontal setpoints (-1.0..=1.0)
  vertical <front> <rear>      Set the two vertical setpoints (-1.0..=1.0)

  watch [seconds]              Stream sensor readings (default 5s)

  quit, exit                   Exit the console
"#;

pub fn run(
    state: &Arc<SharedState>,
    stats: &Arc<RelayStats>,
) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", "rovlink console".bold().cyan());

    // Create readline editor
    let config = Config::builder()
        .history_ignore_space(true)
        .auto_add_history(true)
        .build();
    let mut rl: Editor<(), DefaultHistory> = Editor::with_config(config)?;

    // Load history
    let history_path = std::env::var("HOME")
        .map(|h| std::path::PathBuf::from(h).join(".rovlink_history"))
        .unwrap_or_else(|_| ".rovlink_history".into());
    let _ = rl.load_history(&history_path);

    println!("Type 'help' for available commands.\n");

    loop {
        let prompt = format!("{} ", "rovlink>".cyan());
        match rl.readline(&prompt) {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                // watch prints repeatedly, so it runs outside the dispatcher
                if let Some(arg) = watch_arg(line) {
                    watch(state, stats, arg);
                    continue;
                }

                match execute_repl_command(state, stats, line) {
                    Ok(Some(output)) => println!("{}\n", output),
                    Ok(None) => break, // Exit command
                    Err(e) => println!("{}: {}\n", "Error".red(), e),
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("^C");
                continue;
            }
            Err(ReadlineError::Eof) => {
                println!("^D");
                break;
            }
            Err(err) => {
                println!("{}: {:?}", "Error".red(), err);
                break;
            }
        }
    }

    // Save history
    let _ = rl.save_history(&history_path);

    println!("{}", "Disconnected.".dimmed());
    Ok(())
}

/// Executes a REPL command and returns the formatted output.
///
/// `Ok(None)` means the REPL should exit.
fn execute_repl_command(
    state: &SharedState,
    stats: &RelayStats,
    line: &str,
) -> Result<Option<String>, Box<dyn std::error::Error>> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.is_empty() {
        return Ok(Some(String::new()));
    }

    let cmd = parts[0].to_lowercase();
    let args = &parts[1..];

    match cmd.as_str() {
        "help" | "?" => Ok(Some(HELP_TEXT.to_string())),

        "quit" | "exit" | "q" => Ok(None),

        "enable" => {
            state.update_command(|c| c.enabled = true);
            Ok(Some("Thrusters enabled".green().to_string()))
        }

        "disable" => {
            state.update_command(|c| c.enabled = false);
            Ok(Some("Thrusters disabled".yellow().to_string()))
        }

        "thrust" | "t" => {
            if args.len() != 4 {
                return Ok(Some("Usage: thrust <fl> <fr> <rl> <rr>".to_string()));
            }
            let fl = parse_setpoint(args[0])?;
            let fr = parse_setpoint(args[1])?;
            let rl = parse_setpoint(args[2])?;
            let rr = parse_setpoint(args[3])?;
            state.update_command(|c| c.horizontal = [fl, fr, rl, rr]);
            Ok(Some(format!(
                "Horizontal setpoints {}",
                format!("[{:+.2} {:+.2} {:+.2} {:+.2}]", fl, fr, rl, rr).cyan()
            )))
        }

        "vertical" | "v" => {
            if args.len() != 2 {
                return Ok(Some("Usage: vertical <front> <rear>".to_string()));
            }
            let front = parse_setpoint(args[0])?;
            let rear = parse_setpoint(args[1])?;
            state.update_command(|c| c.vertical = [front, rear]);
            Ok(Some(format!(
                "Vertical setpoints {}",
                format!("[{:+.2} {:+.2}]", front, rear).cyan()
            )))
        }

        "status" | "s" => Ok(Some(commands::format_status(state, stats))),

        _ => Ok(Some(format!(
            "{}: unknown command '{}' (try 'help')",
            "Error".red(),
            cmd
        ))),
    }
}

/// Returns the argument of a `watch` invocation, or `None` for any other
/// command line.
fn watch_arg(line: &str) -> Option<&str> {
    let mut parts = line.splitn(2, char::is_whitespace);
    match parts.next() {
        Some("watch") | Some("w") => Some(parts.next().unwrap_or("").trim()),
        _ => None,
    }
}

/// Samples the sensor snapshot and link counters twice a second.
fn watch(state: &SharedState, stats: &RelayStats, arg: &str) {
    let seconds: u64 = if arg.is_empty() {
        5
    } else {
        match arg.parse() {
            Ok(s) => s,
            Err(_) => {
                println!("Usage: watch [seconds]\n");
                return;
            }
        }
    };

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
    println!();
}

/// Parses one thruster setpoint, enforcing the valid range.
fn parse_setpoint(arg: &str) -> Result<f32, Box<dyn std::error::Error>> {
    let value: f32 = arg.parse()?;
    if !(-1.0..=1.0).contains(&value) {
        return Err(format!("setpoint {} out of range -1.0..=1.0", arg).into());
    }
    Ok(value)
}
