//! Lock-free `f64` cell for rarely written, frequently read calibration values.

use std::sync::atomic::{AtomicU64, Ordering};

/// An `f64` stored as its bit pattern in an [`AtomicU64`].
///
/// Loads and stores are whole-word, so readers never observe a torn value.
#[derive(Debug)]
pub struct AtomicF64(AtomicU64);

impl AtomicF64 {
    pub fn new(value: f64) -> Self {
        Self(AtomicU64::new(value.to_bits()))
    }

    pub fn load(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Acquire))
    }

    pub fn store(&self, value: f64) {
        self.0.store(value.to_bits(), Ordering::Release);
    }
}
