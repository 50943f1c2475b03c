//! [`LimitTable`] – per-joint safety limits shared between threads.
//!
//! Configuration threads write limits while the control loop reads them at
//! up to kHz rates.  Every operation takes the lock, copies or stores a
//! [`JointLimit`], and releases it before returning; callers evaluate
//! measurements against a [`snapshot`][LimitTable::snapshot], never while
//! holding the lock.

use std::sync::{Mutex, MutexGuard, PoisonError};

use monopod_types::{JointLimit, MeasurementKind};

/// Configured limits, one optional slot per [`MeasurementKind`].
pub type LimitSnapshot = [Option<JointLimit>; MeasurementKind::COUNT];

/// Mapping from [`MeasurementKind`] to [`JointLimit`] behind one mutex.
#[derive(Debug, Default)]
pub struct LimitTable {
    slots: Mutex<LimitSnapshot>,
}

impl LimitTable {
    /// Create a table with no configured limits.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configure (or replace) the limit of `kind`.
    pub fn set(&self, kind: MeasurementKind, limit: JointLimit) {
        self.lock()[kind.index()] = Some(limit);
    }

    /// Limit of `kind`.  Unset kinds return the unconstrained
    /// [`JointLimit::default`].
    pub fn get(&self, kind: MeasurementKind) -> JointLimit {
        self.lock()[kind.index()].unwrap_or_default()
    }

    /// Remove the limit of `kind`; it no longer takes part in limit checks.
    pub fn clear(&self, kind: MeasurementKind) {
        self.lock()[kind.index()] = None;
    }

    /// Copy of every configured slot, taken under a single lock.
    pub fn snapshot(&self) -> LimitSnapshot {
        *self.lock()
    }

    // The slots are plain `Copy` values written in one assignment, so a
    // panic in another holder cannot leave them half-updated.
    fn lock(&self) -> MutexGuard<'_, LimitSnapshot> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
