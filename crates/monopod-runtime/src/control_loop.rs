//! [`ControlLoop`] – fixed-period torque control of the monopod leg.
//!
//! Each tick reads the calibrated positions and velocities of the
//! controllable joints, asks a [`Controller`] for torque targets, writes them
//! to the board and checks the joint limits:
//!
//! ```text
//! read ──► compute ──► set_torque_targets + send_torque_targets ──► check limits ──► spin
//! ```
//!
//! The loop stops when its stop flag is raised (see
//! [`ControlLoop::stop_handle`]) or after `max_iterations` ticks.  The flag is
//! checked once per tick, so a tick that has started always completes.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//! use monopod_hal::SimBoard;
//! use monopod_runtime::control_loop::{ControlLoop, ControlLoopConfig, PdTrackingController, SineTrajectory};
//! use monopod_sdk::Monopod;
//! use monopod_types::{Mode, Pid};
//!
//! let monopod = Arc::new(Monopod::new(Arc::new(SimBoard::builder().build())));
//! monopod.initialize(Mode::Fixed).unwrap();
//!
//! let config = ControlLoopConfig { period: Duration::from_micros(100), max_iterations: Some(10) };
//! let mut controller = PdTrackingController::new(SineTrajectory::default(), Pid::new(5.0, 0.0, 0.1), 2);
//! let stats = ControlLoop::new(monopod, config).run(&mut controller);
//! assert_eq!(stats.iterations, 10);
//! ```

use std::f64::consts::TAU;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use monopod_hal::PidController;
use monopod_sdk::Monopod;
use monopod_types::Pid;
use tracing::{debug, error, info, warn};

// ─────────────────────────────────────────────────────────────────────────────
// Spinner
// ─────────────────────────────────────────────────────────────────────────────

/// Sleeps until the next multiple of a fixed period.
///
/// A tick that ends after its deadline is counted as an overrun and the
/// schedule is re-anchored at the current time instead of trying to catch up.
#[derive(Debug)]
pub struct Spinner {
    period: Duration,
    next_deadline: Instant,
    overruns: u64,
}

impl Spinner {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            next_deadline: Instant::now() + period,
            overruns: 0,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Block until the current period has elapsed.
    pub fn spin(&mut self) {
        let now = Instant::now();
        if now < self.next_deadline {
            thread::sleep(self.next_deadline - now);
            self.next_deadline += self.period;
        } else {
            self.overruns += 1;
            self.next_deadline = now + self.period;
        }
    }

    /// Number of ticks that missed their deadline.
    pub fn overruns(&self) -> u64 {
        self.overruns
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Controllers
// ─────────────────────────────────────────────────────────────────────────────

/// Computes torque targets (Nm) from the calibrated joint state.
///
/// `positions` and `velocities` are ordered like the monopod's
/// `write_joint_indexing`; the returned vector must have the same length.
/// A `NaN` entry means the joint has not reported a sample yet.
pub trait Controller: Send {
    fn compute(&mut self, time_s: f64, positions: &[f64], velocities: &[f64]) -> Vec<f64>;
}

/// Desired joint angle `amplitude · sin(2π · frequency_hz · t)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SineTrajectory {
    pub amplitude: f64,
    pub frequency_hz: f64,
}

impl Default for SineTrajectory {
    fn default() -> Self {
        Self {
            amplitude: 0.1,
            frequency_hz: 0.5,
        }
    }
}

impl SineTrajectory {
    pub fn position(&self, time_s: f64) -> f64 {
        self.amplitude * (TAU * self.frequency_hz * time_s).sin()
    }

    pub fn velocity(&self, time_s: f64) -> f64 {
        self.amplitude * TAU * self.frequency_hz * (TAU * self.frequency_hz * time_s).cos()
    }
}

/// Tracks a [`SineTrajectory`] on every joint.
///
/// The position error goes through a [`PidController`] per joint (P and I
/// terms); damping is applied on the measured velocity,
/// `d · (desired_velocity - velocity)`.
#[derive(Debug, Clone)]
pub struct PdTrackingController {
    trajectory: SineTrajectory,
    joints: Vec<JointTracker>,
    last_time_s: Option<f64>,
}

#[derive(Debug, Clone)]
struct JointTracker {
    pid: PidController,
    damping: f64,
}

impl JointTracker {
    fn new(gains: Pid) -> Self {
        Self {
            pid: PidController::new(Pid { d: 0.0, ..gains }),
            damping: gains.d,
        }
    }
}

impl PdTrackingController {
    /// Same gains on `joints` joints.
    pub fn new(trajectory: SineTrajectory, gains: Pid, joints: usize) -> Self {
        Self::with_gains(trajectory, &vec![gains; joints])
    }

    /// One set of gains per joint.
    pub fn with_gains(trajectory: SineTrajectory, gains: &[Pid]) -> Self {
        Self {
            trajectory,
            joints: gains.iter().copied().map(JointTracker::new).collect(),
            last_time_s: None,
        }
    }

    /// Use the PID gains stored on each controllable joint of `monopod`.
    /// Returns `None` before the monopod is initialized.
    pub fn from_monopod(trajectory: SineTrajectory, monopod: &Monopod) -> Option<Self> {
        let gains = monopod
            .write_joint_indexing()?
            .iter()
            .map(|&index| monopod.get_pid(index))
            .collect::<Option<Vec<_>>>()?;
        Some(Self::with_gains(trajectory, &gains))
    }

    pub fn trajectory(&self) -> SineTrajectory {
        self.trajectory
    }
}

impl Controller for PdTrackingController {
    fn compute(&mut self, time_s: f64, positions: &[f64], velocities: &[f64]) -> Vec<f64> {
        let dt = self.last_time_s.map_or(0.0, |last| time_s - last);
        self.last_time_s = Some(time_s);

        let desired_position = self.trajectory.position(time_s);
        let desired_velocity = self.trajectory.velocity(time_s);

        self.joints
            .iter_mut()
            .zip(positions.iter().zip(velocities))
            .map(|(joint, (&position, &velocity))| {
                if position.is_nan() {
                    return 0.0;
                }
                joint.pid.set_set_point(desired_position);
                let feedback = if dt > 0.0 {
                    joint.pid.update(position, dt)
                } else {
                    joint.pid.gains().p * (desired_position - position)
                };
                let damping = if velocity.is_nan() {
                    0.0
                } else {
                    joint.damping * (desired_velocity - velocity)
                };
                feedback + damping
            })
            .collect()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Control loop
// ─────────────────────────────────────────────────────────────────────────────

/// Configuration for [`ControlLoop`].
#[derive(Debug, Clone)]
pub struct ControlLoopConfig {
    /// Tick period.  Default: 1 ms.
    pub period: Duration,
    /// Stop after this many ticks.  Default: run until stopped.
    pub max_iterations: Option<u64>,
}

impl Default for ControlLoopConfig {
    fn default() -> Self {
        Self {
            period: Duration::from_millis(1),
            max_iterations: None,
        }
    }
}

/// Counters collected over one [`ControlLoop::run`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopStats {
    pub iterations: u64,
    /// Ticks whose joint state could not be read.
    pub read_failures: u64,
    /// Ticks whose torque targets were rejected.
    pub write_failures: u64,
    /// Ticks that ended with at least one joint outside its limits.
    pub limit_violations: u64,
    pub overruns: u64,
}

/// Periodic read/compute/write loop over a shared [`Monopod`].
pub struct ControlLoop {
    monopod: Arc<Monopod>,
    config: ControlLoopConfig,
    stop: Arc<AtomicBool>,
}

impl ControlLoop {
    pub fn new(monopod: Arc<Monopod>, config: ControlLoopConfig) -> Self {
        Self {
            monopod,
            config,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flag that stops the loop at the start of its next tick.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    /// Run on the calling thread until stopped.
    ///
    /// Returns immediately with zeroed stats when the monopod is not
    /// initialized or has no controllable joint.
    pub fn run<C>(&self, controller: &mut C) -> LoopStats
    where
        C: Controller + ?Sized,
    {
        let mut stats = LoopStats::default();
        let indexes = match self.monopod.write_joint_indexing() {
            Some(indexes) if !indexes.is_empty() => indexes.to_vec(),
            Some(_) => {
                warn!("control loop: no controllable joint in this mode");
                return stats;
            }
            None => {
                warn!("control loop: monopod is not initialized");
                return stats;
            }
        };

        let period_s = self.config.period.as_secs_f64();
        let mut spinner = Spinner::new(self.config.period);
        info!(joints = ?indexes, period_s, "control loop started");

        while !self.stop.load(Ordering::Acquire) {
            if self.config.max_iterations.is_some_and(|max| stats.iterations >= max) {
                break;
            }
            let time_s = stats.iterations as f64 * period_s;
            self.tick(controller, time_s, &indexes, &mut stats);
            stats.iterations += 1;
            spinner.spin();
        }

        stats.overruns = spinner.overruns();
        info!(?stats, "control loop stopped");
        stats
    }

    fn tick<C>(&self, controller: &mut C, time_s: f64, indexes: &[usize], stats: &mut LoopStats)
    where
        C: Controller + ?Sized,
    {
        let state = self
            .monopod
            .get_positions(indexes)
            .and_then(|positions| Ok((positions, self.monopod.get_velocities(indexes)?)));
        match state {
            Ok((positions, velocities)) => {
                let torques = controller.compute(time_s, &positions, &velocities);
                if !(self.monopod.set_torque_targets(&torques, indexes)
                    && self.monopod.send_torque_targets())
                {
                    stats.write_failures += 1;
                }
            }
            Err(error) => {
                debug!(%error, "control loop: read failed");
                stats.read_failures += 1;
            }
        }

        if self
            .monopod
            .joints_violating_limits()
            .is_ok_and(|violating| !violating.is_empty())
        {
            stats.limit_violations += 1;
        }
    }

    /// Run on a dedicated `monopod-control` thread.
    ///
    /// # Errors
    ///
    /// Propagates the OS error if the thread cannot be spawned.
    pub fn spawn<C>(self, mut controller: C) -> std::io::Result<ControlLoopHandle>
    where
        C: Controller + 'static,
    {
        let stop = self.stop_handle();
        let thread = thread::Builder::new()
            .name("monopod-control".to_string())
            .spawn(move || self.run(&mut controller))?;
        Ok(ControlLoopHandle { stop, thread })
    }
}

/// Handle to a loop started with [`ControlLoop::spawn`].
pub struct ControlLoopHandle {
    stop: Arc<AtomicBool>,
    thread: JoinHandle<LoopStats>,
}

impl ControlLoopHandle {
    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Raise the stop flag and wait for the in-flight tick to finish.
    pub fn stop(self) -> LoopStats {
        self.stop.store(true, Ordering::Release);
        self.thread.join().unwrap_or_else(|_| {
            error!("control loop thread panicked");
            LoopStats::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use monopod_hal::SimBoard;
    use monopod_types::{MeasurementKind, Mode};

    fn monopod(mode: Mode) -> (Arc<SimBoard>, Arc<Monopod>) {
        let board = Arc::new(SimBoard::builder().build());
        let monopod = Monopod::new(board.clone());
        monopod.initialize(mode).unwrap();
        (board, Arc::new(monopod))
    }

    fn fast(max_iterations: Option<u64>) -> ControlLoopConfig {
        ControlLoopConfig {
            period: Duration::from_micros(50),
            max_iterations,
        }
    }

    struct ConstantTorque(Vec<f64>);

    impl Controller for ConstantTorque {
        fn compute(&mut self, _time_s: f64, _positions: &[f64], _velocities: &[f64]) -> Vec<f64> {
            self.0.clone()
        }
    }

    #[test]
    fn spinner_counts_overruns() {
        let mut spinner = Spinner::new(Duration::from_millis(1));
        spinner.spin();
        assert_eq!(spinner.overruns(), 0);

        thread::sleep(Duration::from_millis(5));
        spinner.spin();
        assert_eq!(spinner.overruns(), 1);
    }

    #[test]
    fn sine_trajectory_shape() {
        let sine = SineTrajectory { amplitude: 2.0, frequency_hz: 0.25 };
        assert!(sine.position(0.0).abs() < 1e-12);
        assert!((sine.position(1.0) - 2.0).abs() < 1e-12);
        assert!((sine.velocity(0.0) - 2.0 * TAU * 0.25).abs() < 1e-12);
    }

    #[test]
    fn pd_controller_pushes_towards_trajectory() {
        let sine = SineTrajectory { amplitude: 1.0, frequency_hz: 0.25 };
        let mut pd = PdTrackingController::new(sine, Pid::new(10.0, 0.0, 0.0), 2);

        // At t = 1 s the target is +1 rad.
        let torques = pd.compute(1.0, &[0.0, 2.0], &[0.0, 0.0]);
        assert!(torques[0] > 0.0);
        assert!(torques[1] < 0.0);
    }

    #[test]
    fn pd_controller_ignores_joints_without_data() {
        let mut pd = PdTrackingController::new(SineTrajectory::default(), Pid::new(10.0, 0.0, 1.0), 2);
        let torques = pd.compute(0.3, &[f64::NAN, 0.0], &[f64::NAN, f64::NAN]);
        assert_eq!(torques[0], 0.0);
        assert!(torques[1].is_finite());
    }

    #[test]
    fn pd_controller_from_monopod_uses_joint_gains() {
        let (_board, monopod) = monopod(Mode::Fixed);
        assert!(monopod.set_pid(Pid::new(1.0, 0.0, 0.0), 0));
        assert!(monopod.set_pid(Pid::new(3.0, 0.0, 0.0), 1));

        let sine = SineTrajectory { amplitude: 1.0, frequency_hz: 0.25 };
        let mut pd = PdTrackingController::from_monopod(sine, &monopod).unwrap();
        let torques = pd.compute(1.0, &[0.0, 0.0], &[0.0, 0.0]);
        assert!((torques[0] - 1.0).abs() < 1e-9);
        assert!((torques[1] - 3.0).abs() < 1e-9);

        let uninitialized = Monopod::new(Arc::new(SimBoard::builder().build()));
        assert!(PdTrackingController::from_monopod(sine, &uninitialized).is_none());
    }

    #[test]
    fn run_writes_torques_and_honours_max_iterations() {
        let (board, monopod) = monopod(Mode::Fixed);
        board.push_measurement(0, MeasurementKind::Position, 0.0);
        board.push_measurement(1, MeasurementKind::Position, 0.0);

        let mut controller = ConstantTorque(vec![0.45, -0.45]);
        let stats = ControlLoop::new(Arc::clone(&monopod), fast(Some(5))).run(&mut controller);

        assert_eq!(stats.iterations, 5);
        assert_eq!(stats.write_failures, 0);
        assert_eq!(stats.read_failures, 0);
        assert_eq!(monopod.get_torque_targets(&[]).unwrap(), vec![0.45, -0.45]);
        assert!((board.last_current_target(0).unwrap() - 2.0).abs() < 1e-12);
        assert!((board.last_current_target(1).unwrap() + 2.0).abs() < 1e-12);
    }

    #[test]
    fn wrong_torque_count_is_a_write_failure() {
        let (_board, monopod) = monopod(Mode::Fixed);
        let mut controller = ConstantTorque(vec![1.0]);
        let stats = ControlLoop::new(monopod, fast(Some(3))).run(&mut controller);
        assert_eq!(stats.write_failures, 3);
    }

    #[test]
    fn counts_limit_violations() {
        let (board, monopod) = monopod(Mode::Fixed);
        assert!(monopod.set_joint_position_limit(0.1, -0.1, 0));
        board.push_measurement(0, MeasurementKind::Position, 9.0);

        let mut controller = ConstantTorque(vec![0.0, 0.0]);
        let stats = ControlLoop::new(monopod, fast(Some(4))).run(&mut controller);
        assert_eq!(stats.limit_violations, 4);
    }

    #[test]
    fn returns_immediately_without_controllable_joints() {
        let (_board, monopod) = monopod(Mode::EncoderBoard);
        let mut controller = ConstantTorque(vec![]);
        let stats = ControlLoop::new(monopod, fast(None)).run(&mut controller);
        assert_eq!(stats, LoopStats::default());
    }

    #[test]
    fn raised_flag_stops_before_first_tick() {
        let (_board, monopod) = monopod(Mode::Fixed);
        let control = ControlLoop::new(monopod, fast(None));
        control.stop_handle().store(true, Ordering::Release);
        let stats = control.run(&mut ConstantTorque(vec![0.0, 0.0]));
        assert_eq!(stats.iterations, 0);
    }

    #[test]
    fn spawned_loop_stops_on_request() {
        let (board, monopod) = monopod(Mode::Free);
        board.push_measurement(0, MeasurementKind::Position, 0.0);
        board.push_measurement(1, MeasurementKind::Position, 0.0);

        let controller = PdTrackingController::new(SineTrajectory::default(), Pid::new(5.0, 0.0, 0.1), 2);
        let handle = ControlLoop::new(Arc::clone(&monopod), fast(None)).spawn(controller).unwrap();
        thread::sleep(Duration::from_millis(20));
        assert!(!handle.is_finished());

        let stats = handle.stop();
        assert!(stats.iterations > 0);
        assert_eq!(stats.write_failures, 0);
        assert!(board.last_current_target(0).is_some());
    }
}
