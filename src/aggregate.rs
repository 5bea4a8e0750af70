use chrono::{DateTime, FixedOffset};
use std::time::Duration;

/// Which of the two built-in aggregation kernels produced an [`Aggregate`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AggregateKind {
    /// Summary-statistics kernel: count, sum, min, max, standard deviation.
    /// Reset every cycle.
    Measurement,
    /// Running-accumulator kernel: sum, min, max, count. Survives cycles
    /// until explicitly reset.
    Accumulator,
}

/// The typed payload of an [`Aggregate`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum AggregateData {
    /// Payload produced by the Measurement kernel.
    Measurement {
        /// Number of tracked values absorbed in the period.
        count: u64,
        /// Algebraic sum of the tracked values.
        sum: f64,
        /// Smallest tracked value, or 0 when `count == 0`.
        min: f64,
        /// Largest tracked value, or 0 when `count == 0`.
        max: f64,
        /// Population standard deviation, 0 when `count <= 1`.
        stddev: f64,
    },
    /// Payload produced by the Accumulator kernel.
    Accumulator {
        /// Algebraic sum of all tracked values since the last reset.
        sum: f64,
        /// Smallest tracked value since the last reset.
        min: f64,
        /// Largest tracked value since the last reset.
        max: f64,
        /// Number of `track` calls since the last reset.
        count: u64,
    },
}

/// Immutable snapshot produced by a kernel for a given period.
///
/// Produced by a kernel snap, consumed by the sink or by the caller of a
/// Custom/QuickPulse cycle, then dropped. The dimension map is ordered
/// positionally to match the metric's declared dimension names.
#[derive(Clone, Debug, PartialEq)]
pub struct Aggregate {
    /// The metric this aggregate belongs to.
    pub metric_id: String,
    /// Positional dimension name/value pairs, in declaration order.
    pub dimensions: Vec<(String, String)>,
    /// Start of the aggregation period, with its UTC offset preserved.
    pub period_start: DateTime<FixedOffset>,
    /// Length of the aggregation period.
    pub period_duration: Duration,
    /// Which kernel produced this aggregate.
    pub kind: AggregateKind,
    /// The typed payload.
    pub data: AggregateData,
}

impl Aggregate {
    /// Number of `track` calls this aggregate summarizes.
    pub fn count(&self) -> u64 {
        match self.data {
            AggregateData::Measurement { count, .. } => count,
            AggregateData::Accumulator { count, .. } => count,
        }
    }
}
