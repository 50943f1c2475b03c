//! [`EncoderJointModule`] – calibrated view of one joint's sensors.
//!
//! Raw samples are read from the newest entry of the joint's measurement
//! histories and converted to joint units:
//!
//! | Getter | Value |
//! |---|---|
//! | [`get_measured_angle`][EncoderJointModule::get_measured_angle] | `polarity * raw / gear_ratio - zero_angle` |
//! | [`get_measured_velocity`][EncoderJointModule::get_measured_velocity] | `polarity * raw / gear_ratio` |
//! | [`get_measured_acceleration`][EncoderJointModule::get_measured_acceleration] | `polarity * raw / gear_ratio` |
//! | [`get_measured_index_angle`][EncoderJointModule::get_measured_index_angle] | `polarity * raw / gear_ratio` |
//!
//! A channel without samples reads as `NaN` ("not ready", distinct from a
//! real zero) and its measurement index as `-1`.
//!
//! Safety limits live in a [`LimitTable`] and are evaluated by
//! [`check_limits`][EncoderJointModule::check_limits], which may run
//! concurrently with [`set_limit`][EncoderJointModule::set_limit].
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use monopod_hal::board::Encoder;
//! use monopod_hal::encoder_joint_module::EncoderJointModule;
//! use monopod_hal::sim::SimBoard;
//! use monopod_types::{JointId, MeasurementKind};
//!
//! let board = Arc::new(SimBoard::builder().ports(1).build());
//! let encoder = Arc::new(Encoder::new(board.clone(), 0));
//! let joint = EncoderJointModule::new(JointId::HipJoint, encoder, 1.0, 0.0, false).unwrap();
//!
//! assert!(joint.get_measured_angle().is_nan());
//! board.push_measurement(0, MeasurementKind::Position, 0.5);
//! assert_eq!(joint.get_measured_angle(), 0.5);
//! ```

use std::fmt;
use std::sync::Arc;

use monopod_types::{JointId, JointLimit, MeasurementKind, MonopodError};

use crate::atomic::AtomicF64;
use crate::board::EncoderInterface;
use crate::limits::LimitTable;
use crate::time_series::TimeIndex;

/// Sensor-only joint: calibration plus safety limits over one encoder.
pub struct EncoderJointModule {
    joint_id: JointId,
    encoder: Arc<dyn EncoderInterface>,
    gear_ratio: f64,
    zero_angle: AtomicF64,
    polarity: AtomicF64,
    limits: LimitTable,
}

impl EncoderJointModule {
    /// Create a module reading `encoder`.
    ///
    /// # Errors
    ///
    /// Returns [`MonopodError::InvalidGearRatio`] when `gear_ratio` is zero
    /// or not finite.
    pub fn new(
        joint_id: JointId,
        encoder: Arc<dyn EncoderInterface>,
        gear_ratio: f64,
        zero_angle: f64,
        reverse_polarity: bool,
    ) -> Result<Self, MonopodError> {
        if gear_ratio == 0.0 || !gear_ratio.is_finite() {
            return Err(MonopodError::InvalidGearRatio {
                joint: joint_id,
                gear_ratio,
            });
        }
        Ok(Self {
            joint_id,
            encoder,
            gear_ratio,
            zero_angle: AtomicF64::new(zero_angle),
            polarity: AtomicF64::new(polarity_of(reverse_polarity)),
            limits: LimitTable::new(),
        })
    }

    pub fn joint_id(&self) -> JointId {
        self.joint_id
    }

    pub fn gear_ratio(&self) -> f64 {
        self.gear_ratio
    }

    // ── calibration ──────────────────────────────────────────────────────

    /// Set the angle (joint units) that reads as zero.
    ///
    /// Single writer: serialize with other calibration updates.
    pub fn set_zero_angle(&self, zero_angle: f64) {
        self.zero_angle.store(zero_angle);
    }

    pub fn get_zero_angle(&self) -> f64 {
        self.zero_angle.load()
    }

    /// Flip the sign convention of every channel.
    pub fn set_joint_polarity(&self, reverse_polarity: bool) {
        self.polarity.store(polarity_of(reverse_polarity));
    }

    /// `1.0` for normal polarity, `-1.0` when reversed.
    pub fn get_joint_polarity(&self) -> f64 {
        self.polarity.load()
    }

    // ── measurements ─────────────────────────────────────────────────────

    pub fn get_measured_angle(&self) -> f64 {
        self.get_joint_measurement(MeasurementKind::Position) / self.gear_ratio
            - self.zero_angle.load()
    }

    pub fn get_measured_velocity(&self) -> f64 {
        self.get_joint_measurement(MeasurementKind::Velocity) / self.gear_ratio
    }

    pub fn get_measured_acceleration(&self) -> f64 {
        self.get_joint_measurement(MeasurementKind::Acceleration) / self.gear_ratio
    }

    pub fn get_measured_index_angle(&self) -> f64 {
        self.get_joint_measurement(MeasurementKind::EncoderIndex) / self.gear_ratio
    }

    /// Calibrated value of channel `kind`.
    pub fn get_measured(&self, kind: MeasurementKind) -> f64 {
        match kind {
            MeasurementKind::Position => self.get_measured_angle(),
            MeasurementKind::Velocity => self.get_measured_velocity(),
            MeasurementKind::Acceleration => self.get_measured_acceleration(),
            MeasurementKind::EncoderIndex => self.get_measured_index_angle(),
        }
    }

    /// Newest raw sample of `kind` with polarity applied (motor side, before
    /// the gear ratio), or `NaN` when the channel has no samples.
    pub fn get_joint_measurement(&self, kind: MeasurementKind) -> f64 {
        match self.encoder.measurement(kind).newest_element() {
            Some(raw) => self.polarity.load() * raw,
            None => f64::NAN,
        }
    }

    /// Newest time index of channel `kind`, or `-1` when it has no samples.
    pub fn get_joint_measurement_index(&self, kind: MeasurementKind) -> TimeIndex {
        self.encoder
            .measurement(kind)
            .newest_timeindex()
            .unwrap_or(-1)
    }

    // ── limits ───────────────────────────────────────────────────────────

    pub fn set_limit(&self, kind: MeasurementKind, limit: JointLimit) {
        self.limits.set(kind, limit);
    }

    /// Limit of `kind`, or the unconstrained default when none is set.
    pub fn get_limit(&self, kind: MeasurementKind) -> JointLimit {
        self.limits.get(kind)
    }

    pub fn clear_limit(&self, kind: MeasurementKind) {
        self.limits.clear(kind);
    }

    /// `true` when every configured limit holds (`min <= value < max`).
    ///
    /// An acceleration reading of `NaN` is skipped: missing acceleration data
    /// is not an out-of-range fault.  Any other `NaN` reading fails its limit.
    pub fn check_limits(&self) -> bool {
        let snapshot = self.limits.snapshot();
        MeasurementKind::ALL.iter().all(|&kind| match snapshot[kind.index()] {
            Some(limit) => self.within(kind, &limit),
            None => true,
        })
    }

    /// Channels whose configured limit is currently violated.
    pub fn violated_limits(&self) -> Vec<MeasurementKind> {
        let snapshot = self.limits.snapshot();
        MeasurementKind::ALL
            .into_iter()
            .filter(|&kind| {
                snapshot[kind.index()].is_some_and(|limit| !self.within(kind, &limit))
            })
            .collect()
    }

    fn within(&self, kind: MeasurementKind, limit: &JointLimit) -> bool {
        let value = self.get_measured(kind);
        if value.is_nan() && kind == MeasurementKind::Acceleration {
            return true;
        }
        limit.contains(value)
    }
}

impl fmt::Debug for EncoderJointModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncoderJointModule")
            .field("joint_id", &self.joint_id)
            .field("gear_ratio", &self.gear_ratio)
            .field("zero_angle", &self.get_zero_angle())
            .field("polarity", &self.get_joint_polarity())
            .field("limits", &self.limits)
            .finish()
    }
}

fn polarity_of(reverse_polarity: bool) -> f64 {
    if reverse_polarity { -1.0 } else { 1.0 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time_series::{MeasurementHistory, TimeSeries};
    use std::thread;

    // ------------------------------------------------------------------
    // Test doubles
    // ------------------------------------------------------------------

    /// One history per channel, written directly by the tests.
    struct FakeEncoder {
        channels: [TimeSeries; MeasurementKind::COUNT],
    }

    impl FakeEncoder {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                channels: std::array::from_fn(|_| TimeSeries::new(16)),
            })
        }

        fn push(&self, kind: MeasurementKind, value: f64) {
            self.channels[kind.index()].push(value);
        }
    }

    impl EncoderInterface for FakeEncoder {
        fn measurement(&self, kind: MeasurementKind) -> &dyn MeasurementHistory {
            &self.channels[kind.index()]
        }
    }

    fn joint(
        encoder: &Arc<FakeEncoder>,
        gear_ratio: f64,
        zero_angle: f64,
        reverse: bool,
    ) -> EncoderJointModule {
        EncoderJointModule::new(JointId::HipJoint, encoder.clone(), gear_ratio, zero_angle, reverse)
            .unwrap()
    }

    // ------------------------------------------------------------------
    // Construction
    // ------------------------------------------------------------------

    #[test]
    fn zero_gear_ratio_is_rejected() {
        let enc = FakeEncoder::new();
        let result = EncoderJointModule::new(JointId::KneeJoint, enc.clone(), 0.0, 0.0, false);
        assert!(matches!(
            result,
            Err(MonopodError::InvalidGearRatio { joint: JointId::KneeJoint, .. })
        ));
        assert!(EncoderJointModule::new(JointId::KneeJoint, enc, f64::NAN, 0.0, false).is_err());
    }

    // ------------------------------------------------------------------
    // Measurements
    // ------------------------------------------------------------------

    #[test]
    fn empty_history_reads_nan_and_minus_one() {
        let enc = FakeEncoder::new();
        let j = joint(&enc, 1.0, 0.0, false);
        assert!(j.get_measured_angle().is_nan());
        assert!(j.get_measured_velocity().is_nan());
        assert!(j.get_measured_acceleration().is_nan());
        assert!(j.get_measured_index_angle().is_nan());
        for kind in MeasurementKind::ALL {
            assert_eq!(j.get_joint_measurement_index(kind), -1);
        }
    }

    #[test]
    fn angle_then_zero_offset() {
        let enc = FakeEncoder::new();
        let j = joint(&enc, 1.0, 0.0, false);
        enc.push(MeasurementKind::Position, 0.5);
        assert_eq!(j.get_measured_angle(), 0.5);
        assert_eq!(j.get_joint_measurement_index(MeasurementKind::Position), 0);

        j.set_zero_angle(0.2);
        assert_eq!(j.get_measured_angle(), 0.5 - 0.2);
    }

    #[test]
    fn calibration_formula_is_exact() {
        let enc = FakeEncoder::new();
        let gear_ratio = 9.0;
        let zero_angle = 0.125;
        let raw = 3.7;
        enc.push(MeasurementKind::Position, raw);
        enc.push(MeasurementKind::Velocity, raw);
        enc.push(MeasurementKind::Acceleration, raw);
        enc.push(MeasurementKind::EncoderIndex, raw);

        for (reverse, polarity) in [(false, 1.0), (true, -1.0)] {
            let j = joint(&enc, gear_ratio, zero_angle, reverse);
            assert_eq!(j.get_measured_angle(), polarity * raw / gear_ratio - zero_angle);
            assert_eq!(j.get_measured_velocity(), polarity * raw / gear_ratio);
            assert_eq!(j.get_measured_acceleration(), polarity * raw / gear_ratio);
            assert_eq!(j.get_measured_index_angle(), polarity * raw / gear_ratio);
        }
    }

    #[test]
    fn polarity_can_be_flipped_after_construction() {
        let enc = FakeEncoder::new();
        let j = joint(&enc, 2.0, 0.0, false);
        enc.push(MeasurementKind::Velocity, 4.0);
        assert_eq!(j.get_measured_velocity(), 2.0);
        j.set_joint_polarity(true);
        assert_eq!(j.get_joint_polarity(), -1.0);
        assert_eq!(j.get_measured_velocity(), -2.0);
    }

    #[test]
    fn measurement_follows_newest_sample() {
        let enc = FakeEncoder::new();
        let j = joint(&enc, 1.0, 0.0, false);
        enc.push(MeasurementKind::Velocity, 1.0);
        enc.push(MeasurementKind::Velocity, 2.0);
        assert_eq!(j.get_measured_velocity(), 2.0);
        assert_eq!(j.get_joint_measurement_index(MeasurementKind::Velocity), 1);
    }

    // ------------------------------------------------------------------
    // Limits
    // ------------------------------------------------------------------

    #[test]
    fn get_limit_on_unset_kind_is_unconstrained() {
        let enc = FakeEncoder::new();
        let j = joint(&enc, 1.0, 0.0, false);
        assert_eq!(j.get_limit(MeasurementKind::Acceleration), JointLimit::default());
    }

    #[test]
    fn no_limits_configured_always_passes() {
        let enc = FakeEncoder::new();
        let j = joint(&enc, 1.0, 0.0, false);
        assert!(j.check_limits());
    }

    #[test]
    fn limit_check_is_half_open() {
        let enc = FakeEncoder::new();
        let j = joint(&enc, 1.0, 0.0, false);
        enc.push(MeasurementKind::Position, 0.5);

        j.set_limit(MeasurementKind::Position, JointLimit::new(0.5, 1.0));
        assert!(j.check_limits(), "min is inclusive");

        j.set_limit(MeasurementKind::Position, JointLimit::new(0.0, 0.5));
        assert!(!j.check_limits(), "max is exclusive");

        j.set_limit(MeasurementKind::Position, JointLimit::new(0.5, 0.5));
        assert!(!j.check_limits(), "min == max == value fails");
        assert_eq!(j.violated_limits(), vec![MeasurementKind::Position]);
    }

    #[test]
    fn missing_acceleration_is_not_a_violation() {
        let enc = FakeEncoder::new();
        let j = joint(&enc, 1.0, 0.0, false);
        j.set_limit(MeasurementKind::Acceleration, JointLimit::new(-1.0, 1.0));
        assert!(j.check_limits());

        enc.push(MeasurementKind::Acceleration, 5.0);
        assert!(!j.check_limits());
    }

    #[test]
    fn missing_position_with_a_limit_fails() {
        let enc = FakeEncoder::new();
        let j = joint(&enc, 1.0, 0.0, false);
        j.set_limit(MeasurementKind::Position, JointLimit::new(-1.0, 1.0));
        assert!(!j.check_limits());
    }

    #[test]
    fn every_configured_limit_must_hold() {
        let enc = FakeEncoder::new();
        let j = joint(&enc, 1.0, 0.0, false);
        enc.push(MeasurementKind::Position, 0.0);
        enc.push(MeasurementKind::Velocity, 3.0);
        j.set_limit(MeasurementKind::Position, JointLimit::new(-1.0, 1.0));
        j.set_limit(MeasurementKind::Velocity, JointLimit::new(-2.0, 2.0));
        assert!(!j.check_limits());
        assert_eq!(j.violated_limits(), vec![MeasurementKind::Velocity]);

        j.clear_limit(MeasurementKind::Velocity);
        assert!(j.check_limits());
    }

    #[test]
    fn index_angle_limit_uses_index_channel() {
        let enc = FakeEncoder::new();
        let j = joint(&enc, 2.0, 0.0, false);
        enc.push(MeasurementKind::EncoderIndex, 4.0);
        j.set_limit(MeasurementKind::EncoderIndex, JointLimit::new(0.0, 2.0));
        assert!(!j.check_limits());
        j.set_limit(MeasurementKind::EncoderIndex, JointLimit::new(0.0, 2.5));
        assert!(j.check_limits());
    }

    #[test]
    fn concurrent_set_limit_and_check_limits() {
        let enc = FakeEncoder::new();
        enc.push(MeasurementKind::Position, 0.0);
        let j = Arc::new(joint(&enc, 1.0, 0.0, false));

        let writer = {
            let j = Arc::clone(&j);
            thread::spawn(move || {
                for i in 0..5_000 {
                    // Alternate between a passing and a failing limit.
                    let limit = if i % 2 == 0 {
                        JointLimit::new(-1.0, 1.0)
                    } else {
                        JointLimit::new(1.0, 2.0)
                    };
                    j.set_limit(MeasurementKind::Position, limit);
                }
            })
        };

        for _ in 0..5_000 {
            let limit = j.get_limit(MeasurementKind::Position);
            assert!(
                limit == JointLimit::default()
                    || limit == JointLimit::new(-1.0, 1.0)
                    || limit == JointLimit::new(1.0, 2.0),
                "torn limit {limit:?}"
            );
            let _ = j.check_limits();
        }
        writer.join().unwrap();
    }
}
