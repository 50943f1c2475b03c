//! Time-indexed measurement history.
//!
//! Every physical channel of a board (position, velocity, …) is recorded as
//! an append-only, fixed-capacity sequence of samples.  Each sample gets a
//! monotonically increasing [`TimeIndex`]; once the capacity is reached the
//! oldest samples are evicted.
//!
//! Joint modules only ever consume the [`MeasurementHistory`] trait.
//! [`TimeSeries`] is the in-process implementation used by
//! [`SimBoard`][crate::sim::SimBoard] and by tests.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

/// Logical time index of a sample.  The first sample pushed has index `0`.
pub type TimeIndex = i64;

/// Read access to the history of one measurement channel.
pub trait MeasurementHistory: Send + Sync {
    /// Number of samples currently retained.
    fn length(&self) -> usize;

    /// Index of the newest sample, or `None` when no sample was ever pushed.
    fn newest_timeindex(&self) -> Option<TimeIndex>;

    /// Value of the newest sample, or `None` when no sample was ever pushed.
    fn newest_element(&self) -> Option<f64>;

    /// Sample at `index`, together with the index actually served.
    ///
    /// When `index` has already been evicted, the oldest retained sample is
    /// returned instead.  Returns `None` when the history is empty or when
    /// `index` is newer than the newest sample.
    fn element(&self, index: TimeIndex) -> Option<(TimeIndex, f64)>;

    /// Index of the oldest retained sample.
    fn oldest_timeindex(&self) -> Option<TimeIndex> {
        let newest = self.newest_timeindex()?;
        Some(newest - self.length() as TimeIndex + 1)
    }

    fn is_empty(&self) -> bool {
        self.length() == 0
    }
}

struct Inner {
    samples: VecDeque<f64>,
    /// Index of `samples[0]`.
    oldest: TimeIndex,
}

/// Fixed-capacity ring buffer of `f64` samples.
///
/// Writers call [`push`][TimeSeries::push] from the bus thread while readers
/// query it through [`MeasurementHistory`] from the control loop.
pub struct TimeSeries {
    capacity: usize,
    inner: Mutex<Inner>,
}

impl TimeSeries {
    /// Create an empty history retaining at most `capacity` samples
    /// (a capacity of `0` is treated as `1`).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            inner: Mutex::new(Inner {
                samples: VecDeque::with_capacity(capacity),
                oldest: 0,
            }),
        }
    }

    /// Maximum number of retained samples.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append `value` and return the index it was stored at.
    pub fn push(&self, value: f64) -> TimeIndex {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if inner.samples.len() == self.capacity {
            inner.samples.pop_front();
            inner.oldest += 1;
        }
        inner.samples.push_back(value);
        inner.oldest + inner.samples.len() as TimeIndex - 1
    }
}

impl MeasurementHistory for TimeSeries {
    fn length(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .samples
            .len()
    }

    fn newest_timeindex(&self) -> Option<TimeIndex> {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if inner.samples.is_empty() {
            return None;
        }
        Some(inner.oldest + inner.samples.len() as TimeIndex - 1)
    }

    fn newest_element(&self) -> Option<f64> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .samples
            .back()
            .copied()
    }

    fn oldest_timeindex(&self) -> Option<TimeIndex> {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        (!inner.samples.is_empty()).then_some(inner.oldest)
    }

    fn element(&self, index: TimeIndex) -> Option<(TimeIndex, f64)> {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let served = index.max(inner.oldest);
        let offset = usize::try_from(served - inner.oldest).ok()?;
        inner.samples.get(offset).map(|v| (served, *v))
    }
}
