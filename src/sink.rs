//! The downstream consumer of emitted [`Aggregate`]s: a serialized wire
//! shape plus the trait the Manager pushes Default-cycle aggregates
//! through.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::aggregate::{Aggregate, AggregateData};

/// Dimension names beginning with this prefix are semantic pass-throughs:
/// their value belongs in the emitted telemetry's context fields, not in
/// the aggregation dimension map. This crate only exposes the prefix and
/// the classification function below; the actual context-field plumbing
/// is left to the host integration.
pub const TELEMETRY_CONTEXT_DIMENSION_PREFIX: &str = "TelemetryContext.";

/// Reserved property key carrying the aggregation period length, in whole
/// milliseconds, on every serialized [`MetricTelemetryItem`].
pub const AGGREGATION_INTERVAL_MS_KEY: &str = "_MS.AggregationIntervalMs";

/// Whether `dimension_name` is a `TelemetryContext.*` pass-through rather
/// than an ordinary aggregation dimension.
pub fn is_telemetry_context_dimension(dimension_name: &str) -> bool {
    dimension_name.starts_with(TELEMETRY_CONTEXT_DIMENSION_PREFIX)
}

/// The wire shape an [`Aggregate`] is serialized into before being handed
/// to a [`MetricSink`]. Accumulator aggregates are represented with the
/// same fields as Measurement, with `stddev` fixed at 0.
#[derive(Clone, Debug, PartialEq)]
pub struct MetricTelemetryItem {
    /// The metric id.
    pub name: String,
    /// Number of contributing `track` calls.
    pub count: u64,
    /// Algebraic sum of tracked values.
    pub sum: f64,
    /// Smallest tracked value.
    pub min: f64,
    /// Largest tracked value.
    pub max: f64,
    /// Population standard deviation; always 0 for Accumulator aggregates.
    pub stddev: f64,
    /// Dimension map plus the reserved aggregation-interval property.
    pub properties: HashMap<String, String>,
}

impl From<Aggregate> for MetricTelemetryItem {
    fn from(aggregate: Aggregate) -> Self {
        let (count, sum, min, max, stddev) = match aggregate.data {
            AggregateData::Measurement { count, sum, min, max, stddev } => (count, sum, min, max, stddev),
            AggregateData::Accumulator { sum, min, max, count } => (count, sum, min, max, 0.0),
        };

        let mut properties: HashMap<String, String> = aggregate.dimensions.into_iter().collect();
        properties.insert(
            AGGREGATION_INTERVAL_MS_KEY.to_string(),
            aggregate.period_duration.as_millis().to_string(),
        );

        MetricTelemetryItem {
            name: aggregate.metric_id,
            count,
            sum,
            min,
            max,
            stddev,
            properties,
        }
    }
}

/// Consumer of Default-cycle aggregates, pushed individually as the worker
/// thread produces them.
pub trait MetricSink: Send + Sync {
    /// Enqueue `aggregate` for downstream delivery.
    fn push(&self, aggregate: Aggregate);
}

/// A sink that discards everything, for callers who only use Custom or
/// QuickPulse cycles and read aggregates from the returned summary.
#[derive(Debug)]
pub struct NoopSink;

impl MetricSink for NoopSink {
    fn push(&self, _aggregate: Aggregate) {}
}

/// An in-memory sink for tests: retains every pushed aggregate in
/// insertion order.
#[derive(Default)]
pub struct InMemorySink {
    items: Mutex<Vec<Aggregate>>,
}

impl std::fmt::Debug for InMemorySink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let len = self.items.lock().unwrap().len();
        f.debug_struct("InMemorySink").field("len", &len).finish()
    }
}

impl InMemorySink {
    /// An empty in-memory sink.
    pub fn new() -> Self {
        InMemorySink::default()
    }

    /// All aggregates pushed so far, in the order they were pushed.
    pub fn drain(&self) -> Vec<Aggregate> {
        std::mem::take(&mut self.items.lock().unwrap())
    }

    /// All aggregates pushed so far, without clearing them.
    pub fn snapshot(&self) -> Vec<Aggregate> {
        self.items.lock().unwrap().clone()
    }
}

impl MetricSink for InMemorySink {
    fn push(&self, aggregate: Aggregate) {
        self.items.lock().unwrap().push(aggregate);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn telemetry_context_prefix_is_classified() {
        assert!(is_telemetry_context_dimension("TelemetryContext.OperationId"));
        assert!(!is_telemetry_context_dimension("Color"));
    }

    #[test]
    fn in_memory_sink_retains_pushed_aggregates_in_order() {
        let sink = InMemorySink::new();
        let a = sample_aggregate("first");
        let b = sample_aggregate("second");
        sink.push(a.clone());
        sink.push(b.clone());
        assert_eq!(sink.snapshot(), vec![a, b]);
    }

    #[test]
    fn drain_clears_the_sink() {
        let sink = InMemorySink::new();
        sink.push(sample_aggregate("only"));
        assert_eq!(sink.drain().len(), 1);
        assert!(sink.drain().is_empty());
    }

    #[test]
    fn accumulator_aggregates_serialize_with_zero_stddev() {
        let aggregate = Aggregate {
            metric_id: "Items".into(),
            dimensions: vec![],
            period_start: chrono::DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z").unwrap(),
            period_duration: std::time::Duration::from_secs(60),
            kind: crate::aggregate::AggregateKind::Accumulator,
            data: AggregateData::Accumulator { sum: 1.0, min: -1.0, max: 1.0, count: 3 },
        };
        let item: MetricTelemetryItem = aggregate.into();
        assert_eq!(item.stddev, 0.0);
        assert_eq!(item.count, 3);
        assert_eq!(item.properties.get(AGGREGATION_INTERVAL_MS_KEY), Some(&"60000".to_string()));
    }

    fn sample_aggregate(metric_id: &str) -> Aggregate {
        Aggregate {
            metric_id: metric_id.to_string(),
            dimensions: vec![],
            period_start: chrono::DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z").unwrap(),
            period_duration: std::time::Duration::from_secs(60),
            kind: crate::aggregate::AggregateKind::Measurement,
            data: AggregateData::Measurement { count: 1, sum: 1.0, min: 1.0, max: 1.0, stddev: 0.0 },
        }
    }
}
