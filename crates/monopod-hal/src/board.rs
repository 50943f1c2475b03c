//! Control-board abstraction and per-port channel handles.
//!
//! A [`ControlBoard`] owns the bus connection to one physical board and
//! exposes a measurement history per (port, channel) plus a best-effort
//! current command per port.  Several joints usually live on the same board,
//! so boards are shared through an `Arc` and every joint gets a lightweight
//! [`Encoder`] or [`Motor`] handle bound to its port.

use std::sync::Arc;

use monopod_types::MeasurementKind;

use crate::time_series::MeasurementHistory;

/// A hardware board reachable over the bus (encoder board or motor board).
pub trait ControlBoard: Send + Sync {
    /// History of channel `kind` on `port`.
    ///
    /// Ports the board does not have must return an empty history.
    fn measurement(&self, port: usize, kind: MeasurementKind) -> &dyn MeasurementHistory;

    /// Queue a motor current command (amperes) for `port`.
    ///
    /// Non-blocking and best-effort; writes to ports without a motor are
    /// dropped by the board.
    fn send_current_target(&self, port: usize, current_a: f64);
}

/// Sensor side of a joint: access to the histories of one board port.
pub trait EncoderInterface: Send + Sync {
    fn measurement(&self, kind: MeasurementKind) -> &dyn MeasurementHistory;
}

/// Actuated joint: a sensor that also accepts current commands.
pub trait MotorInterface: EncoderInterface {
    fn send_current_target(&self, current_a: f64);
}

/// Encoder bound to one port of a shared board.
#[derive(Clone)]
pub struct Encoder {
    board: Arc<dyn ControlBoard>,
    port: usize,
}

impl Encoder {
    pub fn new(board: Arc<dyn ControlBoard>, port: usize) -> Self {
        Self { board, port }
    }
}

impl EncoderInterface for Encoder {
    fn measurement(&self, kind: MeasurementKind) -> &dyn MeasurementHistory {
        self.board.measurement(self.port, kind)
    }
}

/// Motor (with its encoder) bound to one port of a shared board.
#[derive(Clone)]
pub struct Motor {
    board: Arc<dyn ControlBoard>,
    port: usize,
}

impl Motor {
    pub fn new(board: Arc<dyn ControlBoard>, port: usize) -> Self {
        Self { board, port }
    }
}

impl EncoderInterface for Motor {
    fn measurement(&self, kind: MeasurementKind) -> &dyn MeasurementHistory {
        self.board.measurement(self.port, kind)
    }
}

impl MotorInterface for Motor {
    fn send_current_target(&self, current_a: f64) {
        self.board.send_current_target(self.port, current_a);
    }
}
