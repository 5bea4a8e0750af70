use std::sync::atomic::{AtomicU64, Ordering};

use super::atomic_f64::AtomicF64;
use super::{clamp_value, AggregationKernel, KernelSnapshot};

/// Summary-statistics kernel: count, sum, min, max and a running sum of
/// squares used to derive the population standard deviation on snapshot.
///
/// Reset to its identity state at every cycle boundary by
/// [`crate::series::Series`] — it never resets itself.
pub(crate) struct MeasurementKernel {
    count: AtomicU64,
    sum: AtomicF64,
    sum_of_squares: AtomicF64,
    min: AtomicF64,
    max: AtomicF64,
}

impl MeasurementKernel {
    pub(crate) fn new() -> Self {
        MeasurementKernel {
            count: AtomicU64::new(0),
            sum: AtomicF64::new(0.0),
            sum_of_squares: AtomicF64::new(0.0),
            min: AtomicF64::new(f64::INFINITY),
            max: AtomicF64::new(f64::NEG_INFINITY),
        }
    }
}

impl AggregationKernel for MeasurementKernel {
    fn track(&self, value: f64) {
        let value = clamp_value(value);
        self.count.fetch_add(1, Ordering::Relaxed);
        self.sum.add(value);
        self.sum_of_squares.add(value * value);
        self.min.fetch_min(value);
        self.max.fetch_max(value);
    }

    fn snapshot(&self) -> KernelSnapshot {
        let count = self.count.load(Ordering::Relaxed);
        if count == 0 {
            return KernelSnapshot {
                count: 0,
                sum: 0.0,
                min: 0.0,
                max: 0.0,
                stddev: 0.0,
            };
        }
        let sum = self.sum.load();
        let sum_of_squares = self.sum_of_squares.load();
        let mean = sum / count as f64;
        let variance = (sum_of_squares / count as f64 - mean * mean).max(0.0);
        KernelSnapshot {
            count,
            sum,
            min: self.min.load(),
            max: self.max.load(),
            stddev: variance.sqrt(),
        }
    }

    fn reset(&self) {
        self.count.store(0, Ordering::Relaxed);
        self.sum.store(0.0);
        self.sum_of_squares.store(0.0);
        self.min.store(f64::INFINITY);
        self.max.store(f64::NEG_INFINITY);
    }
}
