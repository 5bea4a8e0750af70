use std::sync::atomic::{AtomicU64, Ordering};

use super::atomic_f64::AtomicF64;
use super::{clamp_value, AggregationKernel, KernelSnapshot};

/// Running-total kernel: sum, min, max, count. Unlike
/// [`MeasurementKernel`](super::MeasurementKernel), it is never reset on a
/// cycle boundary — only an explicit `reset_aggregation` call on its series
/// returns it to identity. `snapshot` always reports `stddev == 0.0`: the
/// kernel keeps no second moment.
pub(crate) struct AccumulatorKernel {
    sum: AtomicF64,
    min: AtomicF64,
    max: AtomicF64,
    count: AtomicU64,
}

impl AccumulatorKernel {
    pub(crate) fn new() -> Self {
        AccumulatorKernel {
            sum: AtomicF64::new(0.0),
            min: AtomicF64::new(f64::INFINITY),
            max: AtomicF64::new(f64::NEG_INFINITY),
            count: AtomicU64::new(0),
        }
    }
}

impl AggregationKernel for AccumulatorKernel {
    fn track(&self, value: f64) {
        let value = clamp_value(value);
        self.sum.add(value);
        self.min.fetch_min(value);
        self.max.fetch_max(value);
        self.count.fetch_add(1, Ordering::Relaxed);
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
        KernelSnapshot {
            count,
            sum: self.sum.load(),
            min: self.min.load(),
            max: self.max.load(),
            stddev: 0.0,
        }
    }

    fn reset(&self) {
        self.sum.store(0.0);
        self.min.store(f64::INFINITY);
        self.max.store(f64::NEG_INFINITY);
        self.count.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_kernel_snapshots_to_zero() {
        let kernel = AccumulatorKernel::new();
        assert_eq!(kernel.snapshot(), KernelSnapshot {
            count: 0,
            sum: 0.0,
            min: 0.0,
            max: 0.0,
            stddev: 0.0,
        });
    }

    #[test]
    fn accumulates_across_repeated_snapshots() {
        let kernel = AccumulatorKernel::new();
        kernel.track(10.0);
        kernel.track(5.0);
        let first = kernel.snapshot();
        assert_eq!(first.sum, 15.0);
        assert_eq!(first.count, 2);

        kernel.track(1.0);
        let second = kernel.snapshot();
        assert_eq!(second.sum, 16.0);
        assert_eq!(second.count, 3);
        assert_eq!(second.min, 1.0);
        assert_eq!(second.max, 10.0);
    }

    #[test]
    fn stddev_is_always_zero() {
        let kernel = AccumulatorKernel::new();
        kernel.track(1.0);
        kernel.track(1000.0);
        assert_eq!(kernel.snapshot().stddev, 0.0);
    }

    #[test]
    fn reset_returns_the_kernel_to_its_identity_state() {
        let kernel = AccumulatorKernel::new();
        kernel.track(3.0);
        kernel.reset();
        assert_eq!(kernel.snapshot(), KernelSnapshot {
            count: 0,
            sum: 0.0,
            min: 0.0,
            max: 0.0,
            stddev: 0.0,
        });
    }
}
