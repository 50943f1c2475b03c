//! [`SimBoard`] – in-process control board for tests and CI.
//!
//! Stands in for the CAN encoder and motor boards so the full joint stack can
//! run without a physical robot.  Tests (or a simulator thread) push samples
//! with [`SimBoard::push_measurement`]; current commands written by motor
//! joints are recorded and can be read back with
//! [`SimBoard::last_current_target`].
//!
//! # Example
//!
//! ```rust
//! use monopod_hal::board::ControlBoard;
//! use monopod_hal::sim::SimBoard;
//! use monopod_types::MeasurementKind;
//!
//! let board = SimBoard::builder().ports(2).history_capacity(100).build();
//! board.push_measurement(1, MeasurementKind::Position, 0.3);
//! board.send_current_target(1, 0.5);
//!
//! assert_eq!(board.measurement(1, MeasurementKind::Position).newest_element(), Some(0.3));
//! assert_eq!(board.last_current_target(1), Some(0.5));
//! ```

use std::sync::{Mutex, PoisonError};

use monopod_types::{JointId, MeasurementKind};

use crate::board::ControlBoard;
use crate::time_series::{MeasurementHistory, TimeIndex, TimeSeries};

/// Default number of samples retained per channel.
pub const DEFAULT_HISTORY_CAPACITY: usize = 1000;

/// Simulated board: one [`TimeSeries`] per (port, channel).
pub struct SimBoard {
    channels: Vec<[TimeSeries; MeasurementKind::COUNT]>,
    empty: TimeSeries,
    currents: Mutex<Vec<Option<f64>>>,
}

impl SimBoard {
    /// Start building a board.  Defaults to one port per [`JointId`] and
    /// [`DEFAULT_HISTORY_CAPACITY`] samples per channel.
    pub fn builder() -> SimBoardBuilder {
        SimBoardBuilder::default()
    }

    /// Number of ports on the board.
    pub fn ports(&self) -> usize {
        self.channels.len()
    }

    /// Record a sample on `port`.  Returns its time index, or `None` when
    /// the port does not exist.
    pub fn push_measurement(&self, port: usize, kind: MeasurementKind, value: f64) -> Option<TimeIndex> {
        self.channels
            .get(port)
            .map(|channels| channels[kind.index()].push(value))
    }

    /// Last current command written to `port`, if any.
    pub fn last_current_target(&self, port: usize) -> Option<f64> {
        self.currents
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(port)
            .copied()
            .flatten()
    }
}

impl ControlBoard for SimBoard {
    fn measurement(&self, port: usize, kind: MeasurementKind) -> &dyn MeasurementHistory {
        match self.channels.get(port) {
            Some(channels) => &channels[kind.index()],
            None => &self.empty,
        }
    }

    fn send_current_target(&self, port: usize, current_a: f64) {
        let mut currents = self.currents.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(slot) = currents.get_mut(port) {
            *slot = Some(current_a);
        }
    }
}

/// Builder for [`SimBoard`].
pub struct SimBoardBuilder {
    ports: usize,
    history_capacity: usize,
}

impl Default for SimBoardBuilder {
    fn default() -> Self {
        Self {
            ports: JointId::ALL.len(),
            history_capacity: DEFAULT_HISTORY_CAPACITY,
        }
    }
}

impl SimBoardBuilder {
    pub fn ports(mut self, ports: usize) -> Self {
        self.ports = ports;
        self
    }

    pub fn history_capacity(mut self, capacity: usize) -> Self {
        self.history_capacity = capacity;
        self
    }

    pub fn build(self) -> SimBoard {
        let capacity = self.history_capacity;
        SimBoard {
            channels: (0..self.ports)
                .map(|_| std::array::from_fn(|_| TimeSeries::new(capacity)))
                .collect(),
            empty: TimeSeries::new(1),
            currents: Mutex::new(vec![None; self.ports]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_board_has_a_port_per_joint() {
        let board = SimBoard::builder().build();
        assert_eq!(board.ports(), 5);
        for joint in JointId::ALL {
            assert!(board.measurement(joint.index(), MeasurementKind::Position).is_empty());
        }
    }

    #[test]
    fn channels_are_independent() {
        let board = SimBoard::builder().ports(1).build();
        board.push_measurement(0, MeasurementKind::Position, 1.0);
        board.push_measurement(0, MeasurementKind::Velocity, 2.0);
        assert_eq!(board.measurement(0, MeasurementKind::Position).newest_element(), Some(1.0));
        assert_eq!(board.measurement(0, MeasurementKind::Velocity).newest_element(), Some(2.0));
        assert!(board.measurement(0, MeasurementKind::Acceleration).is_empty());
    }

    #[test]
    fn history_capacity_is_applied() {
        let board = SimBoard::builder().ports(1).history_capacity(2).build();
        for v in 0..4 {
            board.push_measurement(0, MeasurementKind::Position, v as f64);
        }
        let history = board.measurement(0, MeasurementKind::Position);
        assert_eq!(history.length(), 2);
        assert_eq!(history.newest_timeindex(), Some(3));
    }

    #[test]
    fn unknown_port_is_ignored() {
        let board = SimBoard::builder().ports(1).build();
        assert_eq!(board.push_measurement(3, MeasurementKind::Position, 1.0), None);
        board.send_current_target(3, 1.0);
        assert_eq!(board.last_current_target(3), None);
        assert!(board.measurement(3, MeasurementKind::Position).is_empty());
    }

    #[test]
    fn records_last_current_per_port() {
        let board = SimBoard::builder().ports(2).build();
        assert_eq!(board.last_current_target(0), None);
        board.send_current_target(0, 1.0);
        board.send_current_target(0, -1.0);
        assert_eq!(board.last_current_target(0), Some(-1.0));
        assert_eq!(board.last_current_target(1), None);
    }
}
