//! `teleop` – teleoperation bridge command line.
//!
//! Wires an operator command source to the planning loop:
//!
//! 1. Loads `~/.teleop/config.toml` (or `--config`), then applies `TELEOP_*`
//!    environment overrides and command-line flags.
//! 2. Reads motion deltas from stdin, one per line (`dx dy dz` or a JSON
//!    object), and publishes them on the `pose` topic.
//! 3. Runs the planning loop against the simulated arm, which executes every
//!    trajectory published on the `joint_trajectory` topic.
//! 4. Intercepts **Ctrl-C** to stop the loop and exit cleanly.

mod config;

use std::io::BufRead;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use clap::Parser;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info, warn};

use teleop_core::{CommandAccumulator, PlanningCycleDriver};
use teleop_middleware::{
    BusTrajectorySink, EventBus, Topic, parse_motion_command, publish_motion_command,
    spawn_command_listener,
};
use teleop_sim::{SimArm, sim_collaborators};
use teleop_types::{EventPayload, TeleopError};

use crate::config::Config;

/// Event source tag for deltas read from stdin.
const STDIN_SOURCE: &str = "teleop-cli::stdin";
/// Event source tag for trajectories published by the planning loop.
const DRIVER_SOURCE: &str = "teleop-core::driver";

#[derive(Debug, Parser)]
#[command(name = "teleop", version, about = "Teleoperation bridge for a simulated arm")]
struct Cli {
    /// Config file to load instead of ~/.teleop/config.toml.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Write the default config to the config path and exit.
    #[arg(long)]
    init_config: bool,

    /// Override the delta scale factor.
    #[arg(long, value_name = "FACTOR")]
    scale: Option<f64>,

    /// Stop once stdin is exhausted instead of waiting for Ctrl-C.
    #[arg(long)]
    exit_on_eof: bool,
}

fn main() -> ExitCode {
    // ── Structured logging ────────────────────────────────────────────────
    // RUST_LOG selects the filter (defaults to "info").  Set
    // TELEOP_LOG_FORMAT=json for newline-delimited JSON logs.
    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level));

    if std::env::var("TELEOP_LOG_FORMAT").as_deref() == Ok("json") {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .compact()
            .init();
    }

    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "teleop bridge stopped");
            ExitCode::FAILURE
        }
    }
}

fn load_config(cli: &Cli) -> Result<Config, TeleopError> {
    let path = cli.config.clone().unwrap_or_else(config::config_path);
    let mut cfg = match config::load_from(&path)? {
        Some(cfg) => {
            info!(path = %path.display(), "config loaded");
            cfg
        }
        None => {
            if cli.config.is_some() {
                return Err(TeleopError::Io(format!(
                    "config file {} does not exist",
                    path.display()
                )));
            }
            debug!(path = %path.display(), "no config file; using defaults");
            Config::default()
        }
    };
    config::apply_env_overrides(&mut cfg);
    if let Some(scale) = cli.scale {
        cfg.scale = scale;
    }
    cfg.validate()?;
    Ok(cfg)
}

fn run(cli: Cli) -> Result<(), TeleopError> {
    if cli.init_config {
        let path = cli.config.clone().unwrap_or_else(config::config_path);
        config::save_to(&Config::default(), &path)?;
        println!("Wrote default config to {}", path.display());
        return Ok(());
    }

    let cfg = load_config(&cli)?;
    let driver_config = cfg.driver_config();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| TeleopError::Io(format!("failed to start async runtime: {e}")))?;
    let _guard = runtime.enter();

    // ── Shared shutdown flag ──────────────────────────────────────────────
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_ctrlc = shutdown.clone();
    ctrlc::set_handler(move || {
        info!("Ctrl-C received; stopping planning loop");
        shutdown_ctrlc.store(true, Ordering::SeqCst);
    })
    .map_err(|e| TeleopError::Io(format!("failed to install Ctrl-C handler: {e}")))?;

    let bus = EventBus::new(cfg.bus_capacity);
    let accumulator = Arc::new(CommandAccumulator::new(cfg.scale)?);
    let arm = SimArm::new();

    let _listener = spawn_command_listener(&bus, accumulator.clone());
    spawn_sim_executor(&bus, arm.clone());

    let sink = Box::new(BusTrajectorySink::new(bus.clone(), DRIVER_SOURCE));
    let collaborators = sim_collaborators(&arm, &driver_config.planning_group, cfg.planner, sink)?;
    let driver = PlanningCycleDriver::new(accumulator, collaborators, driver_config.clone())?;
    let handle = driver
        .spawn(shutdown.clone())
        .map_err(|e| TeleopError::Io(format!("failed to spawn planning loop: {e}")))?;

    spawn_stdin_reader(bus, shutdown, cli.exit_on_eof, driver_config.period * 2)?;

    info!(
        scale = cfg.scale,
        period_ms = driver_config.period.as_millis() as u64,
        group = %driver_config.planning_group,
        "teleop bridge running; enter deltas as `dx dy dz`"
    );

    let stats = handle
        .join()
        .map_err(|_| TeleopError::ServiceUnavailable {
            service: "planning loop".to_string(),
            details: "thread panicked".to_string(),
        })??;

    let pose = SimArm::forward(&arm.joints());
    info!(
        cycles = stats.cycles,
        suppressed = stats.suppressed,
        dispatched = stats.dispatched,
        rejected = stats.rejected,
        x = pose.x,
        y = pose.y,
        z = pose.z,
        "teleop bridge stopped"
    );
    Ok(())
}

/// Execute every trajectory on the bus against `arm`, waiting out each
/// trajectory's duration before applying it.
fn spawn_sim_executor(bus: &EventBus, arm: SimArm) {
    let mut rx = bus.subscribe_to(Topic::Trajectories);
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    let EventPayload::Trajectory(trajectory) = event.payload else {
                        continue;
                    };
                    tokio::time::sleep(trajectory.duration()).await;
                    match arm.execute(&trajectory) {
                        Ok(()) => debug!(waypoints = trajectory.len(), "trajectory executed"),
                        Err(e) => warn!(error = %e, "trajectory execution failed"),
                    }
                }
                Err(RecvError::Lagged(n)) => {
                    warn!(lagged_by = n, "sim executor lagged; trajectories dropped");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });
}

/// Read operator deltas from stdin on a dedicated thread.
fn spawn_stdin_reader(
    bus: EventBus,
    shutdown: Arc<AtomicBool>,
    exit_on_eof: bool,
    drain_delay: std::time::Duration,
) -> Result<(), TeleopError> {
    thread::Builder::new()
        .name("teleop-stdin".to_string())
        .spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                let line = match line {
                    Ok(line) => line,
                    Err(e) => {
                        warn!(error = %e, "failed to read stdin");
                        break;
                    }
                };
                if line.trim().is_empty() {
                    continue;
                }
                match parse_motion_command(&line) {
                    Ok(delta) => {
                        if let Err(e) = publish_motion_command(&bus, STDIN_SOURCE, delta) {
                            warn!(error = %e, "failed to publish motion command");
                        }
                    }
                    Err(e) => warn!(error = %e, "ignoring malformed command"),
                }
            }
            if exit_on_eof {
                // Give the loop time to pick up the last deltas.
                thread::sleep(drain_delay);
                shutdown.store(true, Ordering::SeqCst);
            } else {
                info!("stdin closed; press Ctrl-C to stop");
            }
        })
        .map(|_| ())
        .map_err(|e| TeleopError::Io(format!("failed to spawn stdin reader: {e}")))
}
