//! Discrete PID controller producing joint torque targets.
//!
//! The controller is hardware-agnostic: the caller feeds the calibrated
//! measurement and the elapsed time, and applies the returned output as a
//! torque target on a [`MotorJointModule`][crate::motor_joint_module::MotorJointModule].
//!
//! # Example
//!
//! ```rust
//! use monopod_hal::pid::PidController;
//! use monopod_types::Pid;
//!
//! let mut pid = PidController::new(Pid::new(10.0, 0.0, 0.1));
//! pid.set_set_point(0.3); // rad
//!
//! let torque = pid.update(0.0, 0.001); // measured 0 rad, dt = 1 ms
//! assert!(torque > 0.0);
//! ```

use monopod_types::Pid;

/// PID controller with optional symmetric output clamping and integral
/// anti-windup.
#[derive(Debug, Clone)]
pub struct PidController {
    gains: Pid,
    set_point: f64,
    integral: f64,
    last_error: Option<f64>,
    output_min: f64,
    output_max: f64,
}

impl PidController {
    /// Create a controller with the given gains and an unclamped output.
    pub fn new(gains: Pid) -> Self {
        Self {
            gains,
            set_point: 0.0,
            integral: 0.0,
            last_error: None,
            output_min: f64::NEG_INFINITY,
            output_max: f64::INFINITY,
        }
    }

    pub fn set_gains(&mut self, gains: Pid) {
        self.gains = gains;
    }

    pub fn gains(&self) -> Pid {
        self.gains
    }

    pub fn set_set_point(&mut self, set_point: f64) {
        self.set_point = set_point;
    }

    pub fn set_point(&self) -> f64 {
        self.set_point
    }

    /// Clamp the output (and the integral contribution) to `[min, max]`.
    ///
    /// Returns `false` and keeps the previous limits when either bound is
    /// `NaN` or `min > max`.
    pub fn set_output_limits(&mut self, min: f64, max: f64) -> bool {
        if min.is_nan() || max.is_nan() || min > max {
            return false;
        }
        self.output_min = min;
        self.output_max = max;
        true
    }

    /// Compute the next output for `measurement` after `dt` seconds.
    ///
    /// Returns `0.0` without touching the controller state when `dt` is not
    /// positive or `measurement` is `NaN` (no sample yet).
    pub fn update(&mut self, measurement: f64, dt: f64) -> f64 {
        if dt <= 0.0 || measurement.is_nan() {
            return 0.0;
        }

        let error = self.set_point - measurement;
        let p = self.gains.p * error;

        self.integral += error * dt;
        let i = (self.gains.i * self.integral).clamp(self.output_min, self.output_max);
        if self.gains.i.abs() > f64::EPSILON {
            self.integral = i / self.gains.i;
        }

        let d = match self.last_error {
            Some(prev) => self.gains.d * (error - prev) / dt,
            None => 0.0,
        };
        self.last_error = Some(error);

        (p + i + d).clamp(self.output_min, self.output_max)
    }

    /// Forget the integral and derivative memory.
    pub fn reset(&mut self) {
        self.integral = 0.0;
        self.last_error = None;
    }
}
