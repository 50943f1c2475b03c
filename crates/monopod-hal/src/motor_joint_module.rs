//! [`MotorJointModule`] – a sensed joint that can also be actuated.
//!
//! Adds a command slot to an [`EncoderJointModule`]: the torque target, the
//! maximum torque target it is clamped to, and the PID gains used by the
//! control loop.  [`send_torque`][MotorJointModule::send_torque] converts the
//! torque target into a motor current and writes it to the board.
//!
//! All sensor and limit operations of the wrapped [`EncoderJointModule`] are
//! available directly through `Deref`.

use std::fmt;
use std::ops::Deref;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use monopod_types::{JointId, MonopodError, Pid};
use tracing::{debug, warn};

use crate::board::{EncoderInterface, MotorInterface};
use crate::encoder_joint_module::EncoderJointModule;

/// Torque constant of the monopod motors (Nm/A).
pub const DEFAULT_MOTOR_CONSTANT: f64 = 0.025;

/// Gear ratio between motor and joint on the monopod leg.
pub const DEFAULT_GEAR_RATIO: f64 = 9.0;

#[derive(Debug, Clone, Copy)]
struct CommandSlot {
    torque_target: f64,
    max_torque_target: f64,
    pid: Pid,
}

/// Encoder joint plus motor command state.
pub struct MotorJointModule {
    joint: EncoderJointModule,
    motor: Arc<dyn MotorInterface>,
    motor_constant: f64,
    command: Mutex<CommandSlot>,
}

impl MotorJointModule {
    /// Create a motor joint over `motor`.
    ///
    /// # Errors
    ///
    /// - [`MonopodError::InvalidGearRatio`] – `gear_ratio` is zero or not finite.
    /// - [`MonopodError::InvalidMotorConstant`] – `motor_constant` is not a
    ///   finite positive number.
    pub fn new<M>(
        joint_id: JointId,
        motor: Arc<M>,
        motor_constant: f64,
        gear_ratio: f64,
        zero_angle: f64,
        reverse_polarity: bool,
    ) -> Result<Self, MonopodError>
    where
        M: MotorInterface + 'static,
    {
        if !(motor_constant.is_finite() && motor_constant > 0.0) {
            return Err(MonopodError::InvalidMotorConstant {
                joint: joint_id,
                motor_constant,
            });
        }
        let encoder: Arc<dyn EncoderInterface> = motor.clone();
        let motor: Arc<dyn MotorInterface> = motor;
        let joint =
            EncoderJointModule::new(joint_id, encoder, gear_ratio, zero_angle, reverse_polarity)?;
        Ok(Self {
            joint,
            motor,
            motor_constant,
            command: Mutex::new(CommandSlot {
                torque_target: 0.0,
                max_torque_target: f64::MAX,
                pid: Pid::default(),
            }),
        })
    }

    /// The wrapped sensor module.
    pub fn encoder(&self) -> &EncoderJointModule {
        &self.joint
    }

    /// Store a torque target (Nm), clamped to `±max_torque_target`.
    /// Nothing is written to the bus until [`send_torque`][Self::send_torque].
    pub fn set_torque_target(&self, torque_target: f64) {
        let mut slot = self.lock();
        let max = slot.max_torque_target;
        slot.torque_target = torque_target.clamp(-max, max);
    }

    pub fn get_torque_target(&self) -> f64 {
        self.lock().torque_target
    }

    /// Set the torque magnitude the target is clamped to.  The current target
    /// is re-clamped immediately.
    ///
    /// Returns `false` and keeps the previous bound when `max_torque_target`
    /// is `NaN`.
    pub fn set_max_torque_target(&self, max_torque_target: f64) -> bool {
        if max_torque_target.is_nan() {
            warn!(joint = %self.joint.joint_id(), "rejecting NaN max torque target");
            return false;
        }
        let max = max_torque_target.abs();
        let mut slot = self.lock();
        slot.max_torque_target = max;
        slot.torque_target = slot.torque_target.clamp(-max, max);
        debug!(joint = %self.joint.joint_id(), max, "max torque target updated");
        true
    }

    pub fn get_max_torque_target(&self) -> f64 {
        self.lock().max_torque_target
    }

    pub fn set_pid(&self, pid: Pid) {
        self.lock().pid = pid;
        debug!(joint = %self.joint.joint_id(), ?pid, "pid gains updated");
    }

    pub fn get_pid(&self) -> Pid {
        self.lock().pid
    }

    /// Motor current (A) corresponding to the stored torque target.
    pub fn current_target(&self) -> f64 {
        self.get_torque_target() / (self.joint.gear_ratio() * self.motor_constant)
    }

    /// Write the stored torque target to the motor as a current command.
    pub fn send_torque(&self) {
        let current = self.current_target();
        self.motor.send_current_target(current);
    }

    fn lock(&self) -> MutexGuard<'_, CommandSlot> {
        self.command.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Deref for MotorJointModule {
    type Target = EncoderJointModule;

    fn deref(&self) -> &Self::Target {
        &self.joint
    }
}

impl fmt::Debug for MotorJointModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MotorJointModule")
            .field("joint", &self.joint)
            .field("motor_constant", &self.motor_constant)
            .field("command", &*self.lock())
            .finish()
    }
}
