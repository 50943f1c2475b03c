//! [`Monopod`] – joint registry and the public robot API.
//!
//! The registry owns one module per joint present in the task [`Mode`]:
//! a [`MotorJointModule`] for each controllable joint and an
//! [`EncoderJointModule`] for each joint that is only sensed.  Callers address
//! joints by their canonical index (see [`joint_names`]).
//!
//! # Access rules
//!
//! * Every operation fails fast before [`Monopod::initialize`]: single-joint
//!   calls return `false` / `None`, batch calls return
//!   [`AccessError::NotInitialized`].
//! * Batch operations validate every index before touching any joint, so a
//!   rejected batch leaves all joints unchanged.
//! * An empty index slice selects the canonical default order
//!   ([`read_joint_indexing`][Monopod::read_joint_indexing] for reads,
//!   [`write_joint_indexing`][Monopod::write_joint_indexing] for writes).
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use monopod_hal::SimBoard;
//! use monopod_sdk::Monopod;
//! use monopod_types::{MeasurementKind, Mode};
//!
//! let board = Arc::new(SimBoard::builder().build());
//! let monopod = Monopod::new(board.clone());
//! monopod.initialize(Mode::Fixed).unwrap();
//!
//! board.push_measurement(0, MeasurementKind::Position, 4.5);
//! assert_eq!(monopod.get_position(0), Some(0.5));
//! assert!(monopod.set_torque_targets(&[0.1, -0.1], &[]));
//! assert!(monopod.send_torque_targets());
//! ```

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use monopod_hal::motor_joint_module::{DEFAULT_GEAR_RATIO, DEFAULT_MOTOR_CONSTANT};
use monopod_hal::{ControlBoard, Encoder, EncoderJointModule, Motor, MotorJointModule, TimeIndex};
use monopod_types::{
    AccessError, JointId, JointLimit, MeasurementKind, Mode, MonopodError, Pid, joint_names,
};
use tracing::{debug, info, warn};

use crate::config::{JointConfig, MonopodConfig};
use crate::leg::Leg;

/// Gear ratio of the planarizer and boom encoders.
pub const DEFAULT_ENCODER_GEAR_RATIO: f64 = 1.0;

const MODEL_NAME: &str = "monopod";

enum JointSlot {
    Encoder(EncoderJointModule),
    Motor(Arc<MotorJointModule>),
}

impl JointSlot {
    fn sensor(&self) -> &EncoderJointModule {
        match self {
            JointSlot::Encoder(joint) => joint,
            JointSlot::Motor(joint) => joint.encoder(),
        }
    }

    fn motor(&self) -> Option<&Arc<MotorJointModule>> {
        match self {
            JointSlot::Encoder(_) => None,
            JointSlot::Motor(joint) => Some(joint),
        }
    }
}

/// Joint set built by `initialize`; immutable afterwards.
struct Joints {
    mode: Mode,
    slots: [Option<JointSlot>; JointId::ALL.len()],
    read_indexing: Vec<usize>,
    write_indexing: Vec<usize>,
    leg: Option<Leg>,
}

impl Joints {
    fn build(
        board: &Arc<dyn ControlBoard>,
        mode: Mode,
        settings: &BTreeMap<JointId, &JointConfig>,
    ) -> Result<Self, MonopodError> {
        let defaults = JointConfig::default();
        let mut slots: [Option<JointSlot>; JointId::ALL.len()] = std::array::from_fn(|_| None);

        for &joint in mode.read_joints() {
            let cfg = settings.get(&joint).copied().unwrap_or(&defaults);
            let slot = if mode.write_joints().contains(&joint) {
                let motor = Arc::new(Motor::new(board.clone(), joint.index()));
                let module = MotorJointModule::new(
                    joint,
                    motor,
                    DEFAULT_MOTOR_CONSTANT,
                    cfg.gear_ratio.unwrap_or(DEFAULT_GEAR_RATIO),
                    cfg.zero_angle,
                    cfg.reverse_polarity,
                )?;
                if let Some(max) = cfg.max_torque_target {
                    if !module.set_max_torque_target(max) {
                        return Err(MonopodError::InvalidMaxTorque {
                            joint,
                            max_torque_target: max,
                        });
                    }
                }
                if let Some(pid) = cfg.pid {
                    module.set_pid(pid);
                }
                JointSlot::Motor(Arc::new(module))
            } else {
                if cfg.max_torque_target.is_some() || cfg.pid.is_some() {
                    warn!(%joint, "joint has no motor; ignoring torque and pid settings");
                }
                let encoder = Arc::new(Encoder::new(board.clone(), joint.index()));
                JointSlot::Encoder(EncoderJointModule::new(
                    joint,
                    encoder,
                    cfg.gear_ratio.unwrap_or(DEFAULT_ENCODER_GEAR_RATIO),
                    cfg.zero_angle,
                    cfg.reverse_polarity,
                )?)
            };

            let sensor = slot.sensor();
            for (kind, limit) in [
                (MeasurementKind::Position, cfg.position_limit),
                (MeasurementKind::Velocity, cfg.velocity_limit),
                (MeasurementKind::Acceleration, cfg.acceleration_limit),
            ] {
                if let Some(limit) = limit {
                    sensor.set_limit(kind, limit);
                }
            }
            slots[joint.index()] = Some(slot);
        }

        for joint in settings.keys().filter(|j| !mode.read_joints().contains(*j)) {
            warn!(%joint, ?mode, "joint is not present in this mode; ignoring its settings");
        }

        let motor_of = |joint: JointId| slots[joint.index()].as_ref().and_then(JointSlot::motor).cloned();
        let leg = motor_of(JointId::HipJoint)
            .zip(motor_of(JointId::KneeJoint))
            .map(|(hip, knee)| Leg::new(hip, knee));

        Ok(Self {
            mode,
            slots,
            read_indexing: mode.read_joints().iter().map(|j| j.index()).collect(),
            write_indexing: mode.write_joints().iter().map(|j| j.index()).collect(),
            leg,
        })
    }

    fn sensor(&self, index: usize) -> Result<&EncoderJointModule, AccessError> {
        self.slots
            .get(index)
            .and_then(Option::as_ref)
            .map(JointSlot::sensor)
            .ok_or(AccessError::InvalidIndex(index))
    }

    fn motor(&self, index: usize) -> Result<&MotorJointModule, AccessError> {
        let slot = self
            .slots
            .get(index)
            .and_then(Option::as_ref)
            .ok_or(AccessError::InvalidIndex(index))?;
        slot.motor()
            .map(|motor| motor.as_ref())
            .ok_or(AccessError::NotControllable(index))
    }

    fn motors(&self) -> impl Iterator<Item = &MotorJointModule> {
        self.slots
            .iter()
            .filter_map(|slot| slot.as_ref().and_then(JointSlot::motor))
            .map(|motor| motor.as_ref())
    }

    fn read_order<'a>(&'a self, indexes: &'a [usize]) -> &'a [usize] {
        if indexes.is_empty() { &self.read_indexing } else { indexes }
    }

    fn write_order<'a>(&'a self, indexes: &'a [usize]) -> &'a [usize] {
        if indexes.is_empty() { &self.write_indexing } else { indexes }
    }
}

/// The monopod robot: joint registry over a shared control board.
///
/// All methods take `&self`; share the registry between the control loop and
/// supervisory threads with an `Arc<Monopod>`.
pub struct Monopod {
    board: Arc<dyn ControlBoard>,
    joints: OnceLock<Joints>,
    calibrated: AtomicBool,
}

impl Monopod {
    /// Create an uninitialized registry over `board`.
    pub fn new(board: Arc<dyn ControlBoard>) -> Self {
        Self {
            board,
            joints: OnceLock::new(),
            calibrated: AtomicBool::new(false),
        }
    }

    /// Build the joint modules for `mode` with default calibration.
    ///
    /// # Errors
    ///
    /// [`MonopodError::AlreadyInitialized`] on a second call.
    pub fn initialize(&self, mode: Mode) -> Result<(), MonopodError> {
        self.install(Joints::build(&self.board, mode, &BTreeMap::new())?)
    }

    /// Build the joint modules for `config.mode`, applying calibration,
    /// limits, PID gains and max torque from `config`.
    ///
    /// # Errors
    ///
    /// - [`MonopodError::Config`] – the config names an unknown joint.
    /// - [`MonopodError::InvalidGearRatio`] – a configured gear ratio is zero
    ///   or not finite.
    /// - [`MonopodError::InvalidMaxTorque`] – a configured max torque is `NaN`.
    /// - [`MonopodError::AlreadyInitialized`] – called twice.
    pub fn initialize_with_config(&self, config: &MonopodConfig) -> Result<(), MonopodError> {
        let settings = config
            .resolve_joints()
            .map_err(|e| MonopodError::Config(e.to_string()))?;
        self.install(Joints::build(&self.board, config.mode, &settings)?)
    }

    fn install(&self, joints: Joints) -> Result<(), MonopodError> {
        let mode = joints.mode;
        let readable = joints.read_indexing.len();
        let controllable = joints.write_indexing.len();
        self.joints
            .set(joints)
            .map_err(|_| MonopodError::AlreadyInitialized)?;
        info!(?mode, readable, controllable, "monopod initialized");
        Ok(())
    }

    fn joints(&self) -> Result<&Joints, AccessError> {
        self.joints.get().ok_or(AccessError::NotInitialized)
    }

    // ── introspection ────────────────────────────────────────────────────

    pub fn initialized(&self) -> bool {
        self.joints.get().is_some()
    }

    pub fn mode(&self) -> Option<Mode> {
        self.joints.get().map(|j| j.mode)
    }

    pub fn get_model_name(&self) -> &'static str {
        MODEL_NAME
    }

    /// Name → index of every readable joint.
    pub fn get_joint_names(&self) -> Option<BTreeMap<&'static str, usize>> {
        let joints = self.joints.get()?;
        Some(
            joint_names()
                .into_iter()
                .filter(|(_, index)| joints.read_indexing.contains(index))
                .collect(),
        )
    }

    /// Indexes of the readable joints, in canonical order.
    pub fn read_joint_indexing(&self) -> Option<&[usize]> {
        self.joints.get().map(|j| j.read_indexing.as_slice())
    }

    /// Indexes of the controllable joints, in canonical order.
    pub fn write_joint_indexing(&self) -> Option<&[usize]> {
        self.joints.get().map(|j| j.write_indexing.as_slice())
    }

    pub fn is_joint_controllable(&self, index: usize) -> bool {
        self.joints().and_then(|j| j.motor(index)).is_ok()
    }

    // ── torque commands ──────────────────────────────────────────────────

    /// Store a torque target for one controllable joint.
    pub fn set_torque_target(&self, torque_target: f64, index: usize) -> bool {
        match self.joints().and_then(|j| j.motor(index)) {
            Ok(motor) => {
                motor.set_torque_target(torque_target);
                true
            }
            Err(_) => false,
        }
    }

    /// Store torque targets for several joints; all-or-nothing.
    pub fn set_torque_targets(&self, torque_targets: &[f64], indexes: &[usize]) -> bool {
        match self.try_set_torque_targets(torque_targets, indexes) {
            Ok(()) => true,
            Err(error) => {
                warn!(%error, "torque target batch rejected");
                false
            }
        }
    }

    /// Store torque targets for several joints.
    ///
    /// # Errors
    ///
    /// The first failure found while validating; no target is written.
    pub fn try_set_torque_targets(&self, torque_targets: &[f64], indexes: &[usize]) -> Result<(), AccessError> {
        let joints = self.joints()?;
        let indexes = joints.write_order(indexes);
        if torque_targets.len() != indexes.len() {
            return Err(AccessError::LengthMismatch {
                values: torque_targets.len(),
                indexes: indexes.len(),
            });
        }
        let motors = indexes
            .iter()
            .map(|&index| joints.motor(index))
            .collect::<Result<Vec<_>, _>>()?;
        for (motor, &torque_target) in motors.into_iter().zip(torque_targets) {
            motor.set_torque_target(torque_target);
        }
        Ok(())
    }

    /// Write every controllable joint's torque target to the board.
    pub fn send_torque_targets(&self) -> bool {
        match self.joints() {
            Ok(joints) => {
                joints.motors().for_each(MotorJointModule::send_torque);
                true
            }
            Err(_) => false,
        }
    }

    pub fn get_torque_target(&self, index: usize) -> Option<f64> {
        self.joints().and_then(|j| j.motor(index)).ok().map(|m| m.get_torque_target())
    }

    pub fn get_torque_targets(&self, indexes: &[usize]) -> Result<Vec<f64>, AccessError> {
        let joints = self.joints()?;
        joints
            .write_order(indexes)
            .iter()
            .map(|&index| joints.motor(index).map(|m| m.get_torque_target()))
            .collect()
    }

    // ── measurements ─────────────────────────────────────────────────────

    /// Calibrated position of a readable joint; `NaN` until the board has
    /// reported a sample.
    pub fn get_position(&self, index: usize) -> Option<f64> {
        self.read_one(index, MeasurementKind::Position)
    }

    pub fn get_velocity(&self, index: usize) -> Option<f64> {
        self.read_one(index, MeasurementKind::Velocity)
    }

    pub fn get_acceleration(&self, index: usize) -> Option<f64> {
        self.read_one(index, MeasurementKind::Acceleration)
    }

    /// Calibrated positions of `indexes`; fails as a whole on any invalid
    /// index.
    pub fn get_positions(&self, indexes: &[usize]) -> Result<Vec<f64>, AccessError> {
        self.read_many(indexes, MeasurementKind::Position)
    }

    pub fn get_velocities(&self, indexes: &[usize]) -> Result<Vec<f64>, AccessError> {
        self.read_many(indexes, MeasurementKind::Velocity)
    }

    pub fn get_accelerations(&self, indexes: &[usize]) -> Result<Vec<f64>, AccessError> {
        self.read_many(indexes, MeasurementKind::Acceleration)
    }

    /// Time index of the newest `kind` sample of a joint (`-1` when none).
    pub fn get_measurement_index(&self, kind: MeasurementKind, index: usize) -> Option<TimeIndex> {
        self.joints()
            .and_then(|j| j.sensor(index))
            .ok()
            .map(|joint| joint.get_joint_measurement_index(kind))
    }

    fn read_one(&self, index: usize, kind: MeasurementKind) -> Option<f64> {
        self.joints().and_then(|j| j.sensor(index)).ok().map(|joint| joint.get_measured(kind))
    }

    fn read_many(&self, indexes: &[usize], kind: MeasurementKind) -> Result<Vec<f64>, AccessError> {
        let joints = self.joints()?;
        joints
            .read_order(indexes)
            .iter()
            .map(|&index| joints.sensor(index).map(|joint| joint.get_measured(kind)))
            .collect()
    }

    // ── controller settings ──────────────────────────────────────────────

    pub fn set_pid(&self, pid: Pid, index: usize) -> bool {
        self.joints()
            .and_then(|j| j.motor(index))
            .map(|m| m.set_pid(pid))
            .is_ok()
    }

    pub fn get_pid(&self, index: usize) -> Option<Pid> {
        self.joints().and_then(|j| j.motor(index)).ok().map(|m| m.get_pid())
    }

    pub fn set_max_torque_target(&self, max_torque_target: f64, index: usize) -> bool {
        self.joints()
            .and_then(|j| j.motor(index))
            .is_ok_and(|m| m.set_max_torque_target(max_torque_target))
    }

    pub fn get_max_torque_target(&self, index: usize) -> Option<f64> {
        self.joints().and_then(|j| j.motor(index)).ok().map(|m| m.get_max_torque_target())
    }

    // ── safety limits ────────────────────────────────────────────────────

    pub fn set_joint_position_limit(&self, max: f64, min: f64, index: usize) -> bool {
        self.set_limit(MeasurementKind::Position, max, min, index)
    }

    pub fn set_joint_velocity_limit(&self, max: f64, min: f64, index: usize) -> bool {
        self.set_limit(MeasurementKind::Velocity, max, min, index)
    }

    pub fn set_joint_acceleration_limit(&self, max: f64, min: f64, index: usize) -> bool {
        self.set_limit(MeasurementKind::Acceleration, max, min, index)
    }

    pub fn get_joint_position_limit(&self, index: usize) -> Option<JointLimit> {
        self.get_limit(MeasurementKind::Position, index)
    }

    pub fn get_joint_velocity_limit(&self, index: usize) -> Option<JointLimit> {
        self.get_limit(MeasurementKind::Velocity, index)
    }

    pub fn get_joint_acceleration_limit(&self, index: usize) -> Option<JointLimit> {
        self.get_limit(MeasurementKind::Acceleration, index)
    }

    fn set_limit(&self, kind: MeasurementKind, max: f64, min: f64, index: usize) -> bool {
        match self.joints().and_then(|j| j.sensor(index)) {
            Ok(joint) => {
                joint.set_limit(kind, JointLimit::new(min, max));
                debug!(joint = %joint.joint_id(), ?kind, min, max, "joint limit updated");
                true
            }
            Err(_) => false,
        }
    }

    fn get_limit(&self, kind: MeasurementKind, index: usize) -> Option<JointLimit> {
        self.joints().and_then(|j| j.sensor(index)).ok().map(|joint| joint.get_limit(kind))
    }

    /// `Some(true)` when every configured limit of the joint holds.
    pub fn check_limits(&self, index: usize) -> Option<bool> {
        self.joints().and_then(|j| j.sensor(index)).ok().map(EncoderJointModule::check_limits)
    }

    /// Readable joints currently outside one of their limits, in canonical
    /// order.
    pub fn joints_violating_limits(&self) -> Result<Vec<usize>, AccessError> {
        let joints = self.joints()?;
        let mut violating = Vec::new();
        for &index in &joints.read_indexing {
            if !joints.sensor(index)?.check_limits() {
                violating.push(index);
            }
        }
        Ok(violating)
    }

    // ── calibration ──────────────────────────────────────────────────────

    /// Home the leg on its encoder indexes.  Each joint reads minus its
    /// offset at the index.  Returns `false` when the leg is not
    /// controllable in this mode or an index has not been seen yet.
    pub fn calibrate(&self, hip_home_offset_rad: f64, knee_home_offset_rad: f64) -> bool {
        let Some(leg) = self.joints.get().and_then(|j| j.leg.as_ref()) else {
            warn!("calibrate: leg is not controllable");
            return false;
        };
        match leg.calibrate(hip_home_offset_rad, knee_home_offset_rad) {
            Ok(()) => {
                self.calibrated.store(true, Ordering::Release);
                true
            }
            Err(error) => {
                warn!(%error, "calibration failed");
                false
            }
        }
    }

    pub fn is_calibrated(&self) -> bool {
        self.calibrated.load(Ordering::Acquire)
    }
}
