//! [`Leg`] – coupled hip/knee operations: index homing.
//!
//! Homing relies on the encoder index pulse: once the board has reported an
//! index for a joint, the zero angle is placed `home_offset` away from it so
//! that the joint reads `-home_offset` at the index.

use std::sync::Arc;

use monopod_hal::MotorJointModule;
use monopod_types::MonopodError;
use tracing::info;

/// The two actuated joints of the monopod leg.
pub struct Leg {
    hip: Arc<MotorJointModule>,
    knee: Arc<MotorJointModule>,
}

impl Leg {
    pub fn new(hip: Arc<MotorJointModule>, knee: Arc<MotorJointModule>) -> Self {
        Self { hip, knee }
    }

    /// Home both joints on their encoder index.
    ///
    /// Both index angles are read before any zero angle is written, so a
    /// failure leaves the calibration of both joints untouched.
    ///
    /// # Errors
    ///
    /// Returns [`MonopodError::HomingFailed`] when a joint has not reported
    /// an index yet.
    pub fn calibrate(&self, hip_home_offset_rad: f64, knee_home_offset_rad: f64) -> Result<(), MonopodError> {
        let hip_index = index_angle(&self.hip)?;
        let knee_index = index_angle(&self.knee)?;

        self.hip.set_zero_angle(hip_index + hip_home_offset_rad);
        self.knee.set_zero_angle(knee_index + knee_home_offset_rad);

        info!(
            hip_zero = self.hip.get_zero_angle(),
            knee_zero = self.knee.get_zero_angle(),
            "leg homed on encoder index"
        );
        Ok(())
    }
}

fn index_angle(joint: &MotorJointModule) -> Result<f64, MonopodError> {
    let index = joint.get_measured_index_angle();
    if index.is_nan() {
        return Err(MonopodError::HomingFailed {
            joint: joint.joint_id(),
            details: "encoder index not found".to_string(),
        });
    }
    Ok(index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use monopod_hal::motor_joint_module::{DEFAULT_GEAR_RATIO, DEFAULT_MOTOR_CONSTANT};
    use monopod_hal::{Motor, SimBoard};
    use monopod_types::{JointId, MeasurementKind};

    fn leg() -> (Arc<SimBoard>, Leg) {
        let board = Arc::new(SimBoard::builder().ports(2).build());
        let joint = |id: JointId| {
            let motor = Arc::new(Motor::new(board.clone(), id.index()));
            Arc::new(
                MotorJointModule::new(id, motor, DEFAULT_MOTOR_CONSTANT, DEFAULT_GEAR_RATIO, 0.0, false)
                    .unwrap(),
            )
        };
        let leg = Leg::new(joint(JointId::HipJoint), joint(JointId::KneeJoint));
        (board, leg)
    }

    #[test]
    fn calibrate_places_zero_at_index_plus_offset() {
        let (board, leg) = leg();
        board.push_measurement(0, MeasurementKind::EncoderIndex, 0.9);
        board.push_measurement(1, MeasurementKind::EncoderIndex, -1.8);
        board.push_measurement(0, MeasurementKind::Position, 0.9);

        leg.calibrate(0.1, 0.2).unwrap();

        assert!((leg.hip.get_zero_angle() - (0.1 + 0.1)).abs() < 1e-12);
        assert!((leg.knee.get_zero_angle() - (-0.2 + 0.2)).abs() < 1e-12);
        // At the index the hip reads -offset.
        assert!((leg.hip.get_measured_angle() + 0.1).abs() < 1e-12);
    }

    #[test]
    fn calibrate_without_index_fails_and_changes_nothing() {
        let (board, leg) = leg();
        board.push_measurement(0, MeasurementKind::EncoderIndex, 0.9);

        let err = leg.calibrate(0.0, 0.0).unwrap_err();
        assert!(matches!(err, MonopodError::HomingFailed { joint: JointId::KneeJoint, .. }));
        assert_eq!(leg.hip.get_zero_angle(), 0.0);
    }
}
