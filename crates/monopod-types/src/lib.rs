use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Logical joints of the monopod.  The discriminant is the stable joint index
/// used as the key for all per-joint state and as the board port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JointId {
    HipJoint = 0,
    KneeJoint = 1,
    BoomConnectorJoint = 2,
    PlanarizerYawJoint = 3,
    PlanarizerPitchJoint = 4,
}

impl JointId {
    /// Every joint, in index order.
    pub const ALL: [JointId; 5] = [
        JointId::HipJoint,
        JointId::KneeJoint,
        JointId::BoomConnectorJoint,
        JointId::PlanarizerYawJoint,
        JointId::PlanarizerPitchJoint,
    ];

    /// Stable integer index of the joint.
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Human-readable joint name, e.g. `"hip_joint"`.
    pub const fn name(self) -> &'static str {
        match self {
            JointId::HipJoint => "hip_joint",
            JointId::KneeJoint => "knee_joint",
            JointId::BoomConnectorJoint => "boom_connector_joint",
            JointId::PlanarizerYawJoint => "planarizer_yaw_joint",
            JointId::PlanarizerPitchJoint => "planarizer_pitch_joint",
        }
    }
}

impl TryFrom<usize> for JointId {
    type Error = AccessError;

    fn try_from(index: usize) -> Result<Self, Self::Error> {
        JointId::ALL
            .get(index)
            .copied()
            .ok_or(AccessError::InvalidIndex(index))
    }
}

impl std::fmt::Display for JointId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Read-only mapping from joint name to joint index for every known joint.
pub fn joint_names() -> BTreeMap<&'static str, usize> {
    JointId::ALL.iter().map(|j| (j.name(), j.index())).collect()
}

/// Physical channel of a joint sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeasurementKind {
    Position,
    Velocity,
    Acceleration,
    EncoderIndex,
}

impl MeasurementKind {
    /// Number of measurement channels.
    pub const COUNT: usize = 4;

    /// Every channel, in [`index`][Self::index] order.
    pub const ALL: [MeasurementKind; Self::COUNT] = [
        MeasurementKind::Position,
        MeasurementKind::Velocity,
        MeasurementKind::Acceleration,
        MeasurementKind::EncoderIndex,
    ];

    /// Dense slot of the channel, `0..COUNT`.
    pub const fn index(self) -> usize {
        match self {
            MeasurementKind::Position => 0,
            MeasurementKind::Velocity => 1,
            MeasurementKind::Acceleration => 2,
            MeasurementKind::EncoderIndex => 3,
        }
    }
}

/// Safety bound `[min, max)` on one measurement of one joint.
///
/// The default limit spans the whole `f64` range, i.e. it is unconstrained.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct JointLimit {
    pub min: f64,
    pub max: f64,
}

impl JointLimit {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Half-open range test: `min <= value < max`.  `NaN` is never contained.
    pub fn contains(&self, value: f64) -> bool {
        self.min <= value && value < self.max
    }
}

impl Default for JointLimit {
    fn default() -> Self {
        Self {
            min: f64::MIN,
            max: f64::MAX,
        }
    }
}

/// PID gains of a controllable joint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Pid {
    pub p: f64,
    pub i: f64,
    pub d: f64,
}

impl Pid {
    pub const fn new(p: f64, i: f64, d: f64) -> Self {
        Self { p, i, d }
    }
}

/// Task mode of the monopod: selects which joints are present and which of
/// them carry a motor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Leg on the boom, every encoder and both motors.
    #[default]
    Free,
    /// Boom connector locked: planarizer encoders and both motors.
    FixedConnector,
    /// Leg clamped to a fixed base: hip and knee only.
    Fixed,
    /// Only the motor board is attached.
    MotorBoard,
    /// Only the planarizer encoder board is attached.
    EncoderBoard,
}

impl Mode {
    /// Joints that can be read in this mode, in canonical order.
    pub fn read_joints(self) -> &'static [JointId] {
        use JointId::*;
        match self {
            Mode::Free => &[
                HipJoint,
                KneeJoint,
                BoomConnectorJoint,
                PlanarizerYawJoint,
                PlanarizerPitchJoint,
            ],
            Mode::FixedConnector => &[HipJoint, KneeJoint, PlanarizerYawJoint, PlanarizerPitchJoint],
            Mode::Fixed | Mode::MotorBoard => &[HipJoint, KneeJoint],
            Mode::EncoderBoard => &[BoomConnectorJoint, PlanarizerYawJoint, PlanarizerPitchJoint],
        }
    }

    /// Joints that can be commanded in this mode, in canonical order.
    /// Always a subset of [`read_joints`][Self::read_joints].
    pub fn write_joints(self) -> &'static [JointId] {
        match self {
            Mode::Free | Mode::FixedConnector | Mode::Fixed | Mode::MotorBoard => {
                &[JointId::HipJoint, JointId::KneeJoint]
            }
            Mode::EncoderBoard => &[],
        }
    }

    /// Parse the snake_case mode name used in configuration files.
    pub fn from_name(name: &str) -> Option<Mode> {
        match name {
            "free" => Some(Mode::Free),
            "fixed_connector" => Some(Mode::FixedConnector),
            "fixed" => Some(Mode::Fixed),
            "motor_board" => Some(Mode::MotorBoard),
            "encoder_board" => Some(Mode::EncoderBoard),
            _ => None,
        }
    }
}

/// Cheap, allocation-free failure of a registry access.  Batch operations
/// report the first offending index and leave every joint untouched.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessError {
    #[error("monopod is not initialized")]
    NotInitialized,

    #[error("joint index {0} is not readable in the current mode")]
    InvalidIndex(usize),

    #[error("joint index {0} is not controllable in the current mode")]
    NotControllable(usize),

    #[error("got {values} values for {indexes} joint indexes")]
    LengthMismatch { values: usize, indexes: usize },
}

/// Construction, configuration and calibration failures.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MonopodError {
    #[error("invalid gear ratio {gear_ratio} for {joint}: must be finite and nonzero")]
    InvalidGearRatio { joint: JointId, gear_ratio: f64 },

    #[error("invalid motor constant {motor_constant} for {joint}: must be finite and positive")]
    InvalidMotorConstant { joint: JointId, motor_constant: f64 },

    #[error("monopod is already initialized")]
    AlreadyInitialized,

    #[error("invalid max torque target {max_torque_target} for {joint}: must not be NaN")]
    InvalidMaxTorque { joint: JointId, max_torque_target: f64 },

    #[error("homing failed on {joint}: {details}")]
    HomingFailed { joint: JointId, details: String },

    #[error("configuration error: {0}")]
    Config(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joint_index_matches_discriminant() {
        for (i, joint) in JointId::ALL.iter().enumerate() {
            assert_eq!(joint.index(), i);
            assert_eq!(JointId::try_from(i), Ok(*joint));
        }
        assert_eq!(JointId::try_from(5), Err(AccessError::InvalidIndex(5)));
    }

    #[test]
    fn joint_names_map_name_to_index() {
        let names = joint_names();
        assert_eq!(names.len(), 5);
        assert_eq!(names["hip_joint"], 0);
        assert_eq!(names["knee_joint"], 1);
        assert_eq!(names["boom_connector_joint"], 2);
        assert_eq!(names["planarizer_yaw_joint"], 3);
        assert_eq!(names["planarizer_pitch_joint"], 4);
    }

    #[test]
    fn measurement_kind_slots_are_dense() {
        for (i, kind) in MeasurementKind::ALL.iter().enumerate() {
            assert_eq!(kind.index(), i);
        }
    }

    #[test]
    fn default_limit_is_unconstrained() {
        let limit = JointLimit::default();
        assert_eq!(limit.min, f64::MIN);
        assert_eq!(limit.max, f64::MAX);
        assert!(limit.contains(0.0));
        assert!(limit.contains(-1e300));
        assert!(limit.contains(1e300));
    }

    #[test]
    fn limit_upper_bound_is_exclusive() {
        let limit = JointLimit::new(-1.0, 1.0);
        assert!(limit.contains(-1.0));
        assert!(limit.contains(0.999));
        assert!(!limit.contains(1.0));
        assert!(!limit.contains(-1.001));

        let point = JointLimit::new(0.5, 0.5);
        assert!(!point.contains(0.5));
    }

    #[test]
    fn limit_never_contains_nan() {
        assert!(!JointLimit::default().contains(f64::NAN));
    }

    #[test]
    fn write_joints_are_subset_of_read_joints() {
        for mode in [
            Mode::Free,
            Mode::FixedConnector,
            Mode::Fixed,
            Mode::MotorBoard,
            Mode::EncoderBoard,
        ] {
            for joint in mode.write_joints() {
                assert!(mode.read_joints().contains(joint), "{mode:?} {joint}");
            }
        }
    }

    #[test]
    fn mode_from_name_matches_serde_name() {
        let mode: Mode = serde_json::from_str("\"fixed_connector\"").unwrap();
        assert_eq!(Mode::from_name("fixed_connector"), Some(mode));
        assert_eq!(Mode::from_name("sideways"), None);
    }

    #[test]
    fn joint_id_serializes_as_snake_case_name() {
        let json = serde_json::to_string(&JointId::PlanarizerYawJoint).unwrap();
        assert_eq!(json, "\"planarizer_yaw_joint\"");
    }

    #[test]
    fn access_error_display() {
        assert!(AccessError::InvalidIndex(7).to_string().contains('7'));
        let err = MonopodError::InvalidGearRatio {
            joint: JointId::KneeJoint,
            gear_ratio: 0.0,
        };
        assert!(err.to_string().contains("knee_joint"));
    }
}
