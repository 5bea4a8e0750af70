//! A single aggregating data stream: one metric id plus one ordered
//! sequence of dimension values, with up to three live kernels — one per
//! concurrently-running cycle.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::{DateTime, FixedOffset};

use crate::aggregate::{Aggregate, AggregateData, AggregateKind};
use crate::config::{KernelKind, SeriesConfig};
use crate::cycle::ValueFilter;
use crate::kernel::{AccumulatorKernel, AggregationKernel, MeasurementKernel};
pub use crate::kernel::KernelSnapshot;
use crate::log_macros::agg_debug;

/// The three named aggregation pipelines a [`crate::manager::Manager`] runs.
/// Unifies what the distilled design described as three hand-written
/// fields into one small registry, see `DESIGN.md`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CycleId {
    /// Always-active cycle driven by the manager's worker thread.
    Default,
    /// Caller-driven cycle, accepts a virtual `now` for deterministic tests.
    Custom,
    /// Semantically identical to Custom; reserved for live-metrics use.
    QuickPulse,
}

impl CycleId {
    pub(crate) const ALL: [CycleId; 3] = [CycleId::Default, CycleId::Custom, CycleId::QuickPulse];

    pub(crate) fn index(self) -> usize {
        match self {
            CycleId::Default => 0,
            CycleId::Custom => 1,
            CycleId::QuickPulse => 2,
        }
    }
}

fn new_kernel(kind: KernelKind) -> Arc<dyn AggregationKernel> {
    match kind {
        KernelKind::Measurement => Arc::new(MeasurementKernel::new()),
        KernelKind::Accumulator => Arc::new(AccumulatorKernel::new()),
    }
}

/// A live kernel plus the value filter (if any) `CycleFilter::admits`
/// handed back for this series when the cycle last installed it.
struct SlotState {
    kernel: Arc<dyn AggregationKernel>,
    value_filter: Option<Arc<dyn ValueFilter>>,
}

/// The per-cycle kernel slot on a [`Series`]. `None` means the cycle is
/// inactive for this series — either the cycle itself is inactive, or an
/// activation-time filter did not admit this series. Kernel and value
/// filter live behind the same lock so a `track` call never observes one
/// without the other.
struct CycleSlot {
    state: RwLock<Option<SlotState>>,
}

impl CycleSlot {
    fn empty() -> Self {
        CycleSlot {
            state: RwLock::new(None),
        }
    }
}

/// One data stream: identity, frozen configuration, and one kernel slot
/// per [`CycleId`].
pub struct Series {
    metric_id: String,
    dimension_values: Vec<String>,
    config: Arc<SeriesConfig>,
    slots: [CycleSlot; 3],
}

impl std::fmt::Debug for Series {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Series")
            .field("metric_id", &self.metric_id)
            .field("dimension_values", &self.dimension_values)
            .finish_non_exhaustive()
    }
}

impl Series {
    pub(crate) fn new(metric_id: String, dimension_values: Vec<String>, config: Arc<SeriesConfig>) -> Self {
        Series {
            metric_id,
            dimension_values,
            config,
            slots: [CycleSlot::empty(), CycleSlot::empty(), CycleSlot::empty()],
        }
    }

    /// The metric id this series belongs to.
    pub fn metric_id(&self) -> &str {
        &self.metric_id
    }

    /// The ordered dimension values identifying this series.
    pub fn dimension_values(&self) -> &[String] {
        &self.dimension_values
    }

    /// The frozen configuration attached at first registration.
    pub fn config(&self) -> &SeriesConfig {
        &self.config
    }

    fn slot(&self, cycle: CycleId) -> &CycleSlot {
        &self.slots[cycle.index()]
    }

    /// Route a tracked value into every cycle for which this series
    /// currently has a live kernel, first consulting that cycle's value
    /// filter (if any) — a value a filter rejects is dropped for that
    /// cycle only, independently of every other active cycle. A cycle
    /// with no kernel installed silently drops the value too — this is
    /// the one explicit, specified drop path (see the crate's
    /// error-handling design).
    pub(crate) fn track(&self, value: f64) {
        let mut tracked = false;
        for cycle in CycleId::ALL {
            let guard = self.slot(cycle).state.read().unwrap();
            if let Some(slot) = guard.as_ref() {
                let allowed = slot.value_filter.as_ref().map_or(true, |f| f.allows(value));
                if allowed {
                    slot.kernel.track(value);
                    tracked = true;
                }
            }
        }
        if !tracked {
            agg_debug!(
                name: "MetricValueDropped",
                metric_id = self.metric_id.as_str(),
            );
        }
    }

    /// Install a fresh kernel for `cycle` on this series, used when a
    /// cycle activates or when a filter newly admits this series mid
    /// cycle. Overwrites any existing kernel and value filter for that
    /// cycle. `value_filter` is consulted on every subsequent `track`
    /// call for this cycle until the series is detached or reinstalled.
    pub(crate) fn install(&self, cycle: CycleId, value_filter: Option<Arc<dyn ValueFilter>>) {
        let kernel = new_kernel(self.config.kernel_kind);
        *self.slot(cycle).state.write().unwrap() = Some(SlotState { kernel, value_filter });
    }

    /// Replace the value filter for `cycle` without disturbing the live
    /// kernel, used when a cycle re-admits an already-active series with a
    /// possibly different filter. No-op if the cycle has no live kernel.
    pub(crate) fn set_value_filter(&self, cycle: CycleId, value_filter: Option<Arc<dyn ValueFilter>>) {
        if let Some(slot) = self.slot(cycle).state.write().unwrap().as_mut() {
            slot.value_filter = value_filter;
        }
    }

    /// Remove the kernel for `cycle`, making it inactive for this series.
    pub(crate) fn detach(&self, cycle: CycleId) {
        *self.slot(cycle).state.write().unwrap() = None;
    }

    /// Whether this series currently has a live kernel for `cycle`.
    pub(crate) fn is_active(&self, cycle: CycleId) -> bool {
        self.slot(cycle).state.read().unwrap().is_some()
    }

    /// Snap the kernel for `cycle` into an [`Aggregate`] covering
    /// `[period_start, period_start + period_duration)`.
    ///
    /// Measurement kernels are atomically swapped for a fresh one so that
    /// no `track` landing after this call can be attributed to the
    /// snapped period. Accumulator kernels are snapshotted in place and
    /// left running, since their state must survive across cycles.
    ///
    /// Returns `None` if the cycle has no kernel installed on this
    /// series, or — for Measurement — if the snapped kernel saw no
    /// tracked values, or — for Accumulator — if it is still in its
    /// identity state.
    pub(crate) fn snap_current(
        &self,
        cycle: CycleId,
        period_start: DateTime<FixedOffset>,
        period_duration: Duration,
    ) -> Option<Aggregate> {
        let kind = self.config.kernel_kind;
        let snapshot = match kind {
            KernelKind::Measurement => {
                let mut guard = self.slot(cycle).state.write().unwrap();
                let current = guard.as_ref()?;
                let fresh = SlotState {
                    kernel: new_kernel(kind),
                    value_filter: current.value_filter.clone(),
                };
                let displaced = guard.replace(fresh)?;
                drop(guard);
                displaced.kernel.snapshot()
            }
            KernelKind::Accumulator => {
                let guard = self.slot(cycle).state.read().unwrap();
                guard.as_ref()?.kernel.snapshot()
            }
        };

        if snapshot.count == 0 {
            return None;
        }

        Some(self.to_aggregate(kind, snapshot, period_start, period_duration))
    }

    /// Best-effort, lock-free-ish read of the current state of the
    /// `cycle` kernel, for introspection. Treat as statistical: a
    /// concurrent snap may race this call.
    pub fn get_current_unsafe(&self, cycle: CycleId) -> Option<KernelSnapshot> {
        self.slot(cycle).state.read().unwrap().as_ref().map(|s| s.kernel.snapshot())
    }

    /// Reset the Default-cycle kernel to its identity state. Semantically
    /// meaningful for Accumulator series; a Measurement series resets on
    /// every cycle boundary regardless.
    pub(crate) fn reset_aggregation(&self) {
        if let Some(slot) = self.slot(CycleId::Default).state.read().unwrap().as_ref() {
            slot.kernel.reset();
        }
    }

    fn to_aggregate(
        &self,
        kind: KernelKind,
        snapshot: KernelSnapshot,
        period_start: DateTime<FixedOffset>,
        period_duration: Duration,
    ) -> Aggregate {
        let dimensions = self
            .config
            .dimension_names
            .iter()
            .cloned()
            .zip(self.dimension_values.iter().cloned())
            .collect();

        let (kind_tag, data) = match kind {
            KernelKind::Measurement => (
                AggregateKind::Measurement,
                AggregateData::Measurement {
                    count: snapshot.count,
                    sum: snapshot.sum,
                    min: snapshot.min,
                    max: snapshot.max,
                    stddev: snapshot.stddev,
                },
            ),
            KernelKind::Accumulator => (
                AggregateKind::Accumulator,
                AggregateData::Accumulator {
                    sum: snapshot.sum,
                    min: snapshot.min,
                    max: snapshot.max,
                    count: snapshot.count,
                },
            ),
        };

        Aggregate {
            metric_id: self.metric_id.clone(),
            dimensions,
            period_start,
            period_duration,
            kind: kind_tag,
            data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn epoch() -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z").unwrap()
    }

    fn measurement_series() -> Series {
        let config = Arc::new(SeriesConfig::new(vec!["Color".into()], KernelKind::Measurement));
        Series::new("Ducks Sold".into(), vec!["Purple".into()], config)
    }

    #[test]
    fn track_with_no_active_cycle_is_silently_dropped() {
        let series = measurement_series();
        series.track(42.0);
        assert!(series.get_current_unsafe(CycleId::Default).is_none());
    }

    #[test]
    fn install_then_track_then_snap_produces_an_aggregate() {
        let series = measurement_series();
        series.install(CycleId::Default, None);
        series.track(42.0);
        let aggregate = series
            .snap_current(CycleId::Default, epoch(), Duration::from_secs(60))
            .unwrap();
        assert_eq!(aggregate.metric_id, "Ducks Sold");
        assert_eq!(aggregate.dimensions, vec![("Color".to_string(), "Purple".to_string())]);
        match aggregate.data {
            AggregateData::Measurement { count, sum, min, max, stddev } => {
                assert_eq!(count, 1);
                assert_eq!(sum, 42.0);
                assert_eq!(min, 42.0);
                assert_eq!(max, 42.0);
                assert_eq!(stddev, 0.0);
            }
            _ => panic!("expected a Measurement payload"),
        }
    }

    #[test]
    fn snap_with_no_tracked_values_returns_none_and_installs_a_fresh_kernel() {
        let series = measurement_series();
        series.install(CycleId::Default, None);
        assert!(series
            .snap_current(CycleId::Default, epoch(), Duration::from_secs(60))
            .is_none());
        series.track(1.0);
        assert!(series
            .snap_current(CycleId::Default, epoch(), Duration::from_secs(60))
            .is_some());
    }

    #[test]
    fn accumulator_kernel_survives_a_snap() {
        let config = Arc::new(SeriesConfig::new(vec![], KernelKind::Accumulator));
        let series = Series::new("Items".into(), vec![], config);
        series.install(CycleId::Default, None);
        series.track(1.0);
        series.track(1.0);
        series.track(-1.0);

        let first = series
            .snap_current(CycleId::Default, epoch(), Duration::from_secs(60))
            .unwrap();
        assert_eq!(first.count(), 3);

        let second = series
            .snap_current(CycleId::Default, epoch(), Duration::from_secs(60))
            .unwrap();
        assert_eq!(second.count(), 3);

        series.reset_aggregation();
        assert!(series
            .snap_current(CycleId::Default, epoch(), Duration::from_secs(60))
            .is_none());
    }

    #[test]
    fn detach_stops_routing_to_a_cycle() {
        let series = measurement_series();
        series.install(CycleId::Default, None);
        series.detach(CycleId::Default);
        series.track(1.0);
        assert!(series.get_current_unsafe(CycleId::Default).is_none());
    }
}
