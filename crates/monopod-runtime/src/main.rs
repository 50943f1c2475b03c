//! `monopod-sine` – sine position tracking on a simulated monopod leg.
//!
//! Loads `monopod.toml` (or the file named by `MONOPOD_CONFIG`), drives the
//! hip and knee along a sine trajectory at 1 kHz and prints a safety report
//! every 200 ms until Ctrl-C.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use monopod_hal::SimBoard;
use monopod_hal::motor_joint_module::{DEFAULT_GEAR_RATIO, DEFAULT_MOTOR_CONSTANT};
use monopod_runtime::control_loop::{ControlLoop, ControlLoopConfig, PdTrackingController, SineTrajectory};
use monopod_runtime::telemetry::init_tracing;
use monopod_sdk::config::{self, MonopodConfig};
use monopod_sdk::{LimitSupervisor, Monopod};
use monopod_types::{MeasurementKind, Mode, Pid};
use tracing::{error, info, warn};

const REPORT_PERIOD: Duration = Duration::from_millis(200);
const PLANT_PERIOD: Duration = Duration::from_millis(1);
const DEFAULT_GAINS: Pid = Pid::new(5.0, 0.0, 0.1);

fn main() {
    let _telemetry = init_tracing("monopod-sine");

    let path = std::env::var("MONOPOD_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("monopod.toml"));
    let cfg = match config::load_from(&path) {
        Ok(Some(cfg)) => cfg,
        Ok(None) => {
            info!(path = %path.display(), "no config file; using defaults");
            let mut cfg = MonopodConfig::default();
            config::apply_env_overrides(&mut cfg);
            cfg
        }
        Err(e) => {
            error!(path = %path.display(), error = %e, "invalid config");
            std::process::exit(1);
        }
    };

    let board = Arc::new(SimBoard::builder().build());
    let monopod = Arc::new(Monopod::new(board.clone()));
    if let Err(e) = monopod.initialize_with_config(&cfg) {
        error!(error = %e, "initialization failed");
        std::process::exit(1);
    }
    if cfg.mode == Mode::EncoderBoard {
        error!("encoder_board mode has no controllable joint");
        std::process::exit(1);
    }

    let shutdown = Arc::new(AtomicBool::new(false));
    let on_signal = Arc::clone(&shutdown);
    if let Err(e) = ctrlc::set_handler(move || on_signal.store(true, Ordering::SeqCst)) {
        warn!(error = %e, "failed to install Ctrl-C handler");
    }

    let plant = {
        let board = Arc::clone(&board);
        let shutdown = Arc::clone(&shutdown);
        thread::Builder::new()
            .name("monopod-plant".to_string())
            .spawn(move || simulate_leg(&board, &shutdown))
    };

    let trajectory = SineTrajectory::default();
    let controller = match PdTrackingController::from_monopod(trajectory, &monopod) {
        Some(controller) if !controller_has_no_gains(&monopod) => controller,
        _ => PdTrackingController::new(trajectory, DEFAULT_GAINS, 2),
    };

    let handle = match ControlLoop::new(Arc::clone(&monopod), ControlLoopConfig::default()).spawn(controller) {
        Ok(handle) => handle,
        Err(e) => {
            error!(error = %e, "failed to start control loop");
            std::process::exit(1);
        }
    };

    let mut supervisor = LimitSupervisor::new(50);
    while !shutdown.load(Ordering::SeqCst) && !handle.is_finished() {
        thread::sleep(REPORT_PERIOD);
        match supervisor.check(&monopod) {
            Ok(report) => info!(
                safe = report.is_safe(),
                positions = ?monopod.get_positions(&[]).unwrap_or_default(),
                torques = ?monopod.get_torque_targets(&[]).unwrap_or_default(),
                "status"
            ),
            Err(e) => warn!(error = %e, "supervisor check failed"),
        }
    }

    shutdown.store(true, Ordering::SeqCst);
    let stats = handle.stop();
    match plant {
        Ok(plant) => {
            if plant.join().is_err() {
                error!("plant thread panicked");
            }
        }
        Err(e) => error!(error = %e, "failed to start plant thread"),
    }
    info!(?stats, "shut down");
}

/// `true` when every controllable joint still has all-zero PID gains.
fn controller_has_no_gains(monopod: &Monopod) -> bool {
    monopod
        .write_joint_indexing()
        .unwrap_or_default()
        .iter()
        .all(|&index| monopod.get_pid(index).is_none_or(|pid| pid == Pid::default()))
}

/// Unit-inertia, viscously damped joints driven by the commanded motor
/// currents.  Writes motor-side position and velocity samples, like the
/// real motor board.
fn simulate_leg(board: &SimBoard, shutdown: &AtomicBool) {
    const DAMPING: f64 = 0.5;
    let dt = PLANT_PERIOD.as_secs_f64();
    let mut state = [(0.0_f64, 0.0_f64); 2];

    while !shutdown.load(Ordering::SeqCst) {
        for (port, (position, velocity)) in state.iter_mut().enumerate() {
            let current = board.last_current_target(port).unwrap_or(0.0);
            let torque = current * DEFAULT_GEAR_RATIO * DEFAULT_MOTOR_CONSTANT;
            let acceleration = torque - DAMPING * *velocity;
            *velocity += acceleration * dt;
            *position += *velocity * dt;

            board.push_measurement(port, MeasurementKind::Position, *position * DEFAULT_GEAR_RATIO);
            board.push_measurement(port, MeasurementKind::Velocity, *velocity * DEFAULT_GEAR_RATIO);
            board.push_measurement(port, MeasurementKind::Acceleration, acceleration * DEFAULT_GEAR_RATIO);
        }
        thread::sleep(PLANT_PERIOD);
    }
}
