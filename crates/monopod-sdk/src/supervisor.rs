//! [`LimitSupervisor`] – advisory safety monitor for a [`Monopod`].
//!
//! Call [`LimitSupervisor::check`] from a supervisory thread (or once per
//! control tick).  Each check reports
//!
//! * joints outside one of their configured limits, and
//! * joints whose position stream has stopped: no sample yet, or the newest
//!   time index has not advanced for `stale_after` consecutive checks.
//!
//! The supervisor never halts actuation itself; acting on a
//! [`SafetyReport`] is the caller's decision.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use monopod_hal::TimeIndex;
use monopod_types::{AccessError, JointId, MeasurementKind};
use serde::Serialize;
use tracing::warn;

use crate::monopod::Monopod;

/// Outcome of one [`LimitSupervisor::check`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SafetyReport {
    /// Joints with at least one violated limit, in canonical order.
    pub violations: Vec<JointId>,
    /// Joints whose position data is missing or no longer advancing.
    pub stale: Vec<JointId>,
    pub checked_at: DateTime<Utc>,
}

impl SafetyReport {
    pub fn is_safe(&self) -> bool {
        self.violations.is_empty() && self.stale.is_empty()
    }
}

struct StreamEntry {
    last_index: TimeIndex,
    unchanged_checks: u32,
}

/// Tracks limit violations and stalled measurement streams.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use monopod_hal::SimBoard;
/// use monopod_sdk::{LimitSupervisor, Monopod};
/// use monopod_types::{MeasurementKind, Mode};
///
/// let board = Arc::new(SimBoard::builder().build());
/// let monopod = Monopod::new(board.clone());
/// monopod.initialize(Mode::Fixed).unwrap();
/// board.push_measurement(0, MeasurementKind::Position, 0.0);
/// board.push_measurement(1, MeasurementKind::Position, 0.0);
///
/// let mut supervisor = LimitSupervisor::new(3);
/// assert!(supervisor.check(&monopod).unwrap().is_safe());
/// ```
pub struct LimitSupervisor {
    stale_after: u32,
    streams: HashMap<JointId, StreamEntry>,
}

impl LimitSupervisor {
    /// A joint is reported stale once its newest position index has stayed
    /// the same for `stale_after` consecutive checks.
    pub fn new(stale_after: u32) -> Self {
        Self {
            stale_after,
            streams: HashMap::new(),
        }
    }

    /// Inspect every readable joint of `monopod`.
    ///
    /// # Errors
    ///
    /// [`AccessError::NotInitialized`] before the monopod is initialized.
    pub fn check(&mut self, monopod: &Monopod) -> Result<SafetyReport, AccessError> {
        let violations: Vec<JointId> = monopod
            .joints_violating_limits()?
            .into_iter()
            .filter_map(|index| JointId::try_from(index).ok())
            .collect();

        let readable = monopod.read_joint_indexing().ok_or(AccessError::NotInitialized)?;
        let mut stale = Vec::new();
        for &index in readable {
            let (Ok(joint), Some(newest)) = (
                JointId::try_from(index),
                monopod.get_measurement_index(MeasurementKind::Position, index),
            ) else {
                continue;
            };
            if self.observe(joint, newest) {
                stale.push(joint);
            }
        }

        for joint in &violations {
            warn!(%joint, "joint limit violated");
        }
        for joint in &stale {
            warn!(%joint, "joint position stream is stale");
        }

        Ok(SafetyReport {
            violations,
            stale,
            checked_at: Utc::now(),
        })
    }

    /// Forget stream history, e.g. after the board was restarted.
    pub fn reset(&mut self) {
        self.streams.clear();
    }

    fn observe(&mut self, joint: JointId, newest: TimeIndex) -> bool {
        let unchanged_checks = match self.streams.get_mut(&joint) {
            Some(entry) if entry.last_index == newest => {
                entry.unchanged_checks = entry.unchanged_checks.saturating_add(1);
                entry.unchanged_checks
            }
            Some(entry) => {
                entry.last_index = newest;
                entry.unchanged_checks = 0;
                0
            }
            None => {
                self.streams.insert(
                    joint,
                    StreamEntry {
                        last_index: newest,
                        unchanged_checks: 0,
                    },
                );
                0
            }
        };
        newest < 0 || unchanged_checks > self.stale_after
    }
}
