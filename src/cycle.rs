//! The state machine for one named aggregation cycle: inactive, or active
//! since some start time with an admission filter.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::{DateTime, FixedOffset};

use crate::aggregate::Aggregate;
use crate::series::{CycleId, Series};

/// Per-series admission decision returned by a [`CycleFilter`] at
/// activation/cycling time: whether the series participates in the new
/// period, and an optional value filter consulted on every `track`.
pub trait CycleFilter: Send + Sync {
    /// Decide whether `series` participates in the period starting now,
    /// and optionally return a value filter to gate individual tracks.
    fn admits(&self, series: &Series) -> (bool, Option<Arc<dyn ValueFilter>>);
}

/// Consulted per `track` call for a series admitted with a value filter.
pub trait ValueFilter: Send + Sync {
    /// Whether `value` should be absorbed.
    fn allows(&self, value: f64) -> bool;
}

/// The default filter: every series is admitted, no value filter.
#[derive(Debug)]
pub struct AllowAll;

impl CycleFilter for AllowAll {
    fn admits(&self, _series: &Series) -> (bool, Option<Arc<dyn ValueFilter>>) {
        (true, None)
    }
}

/// The result of `start_or_cycle`/`stop`: aggregates produced for the
/// period that just ended.
#[derive(Default, Debug, Clone, PartialEq)]
pub struct AggregationSummary {
    /// One per (series, Measurement kernel) that absorbed at least one
    /// value during the period.
    pub non_persistent_aggregates: Vec<Aggregate>,
    /// One per (series, Accumulator kernel) with non-identity state,
    /// whether or not anything was tracked this period.
    pub persistent_aggregates: Vec<Aggregate>,
}

impl AggregationSummary {
    fn push(&mut self, aggregate: Aggregate) {
        match aggregate.kind {
            crate::aggregate::AggregateKind::Measurement => self.non_persistent_aggregates.push(aggregate),
            crate::aggregate::AggregateKind::Accumulator => self.persistent_aggregates.push(aggregate),
        }
    }
}

enum State {
    Inactive,
    Active {
        start: DateTime<FixedOffset>,
        filter: Arc<dyn CycleFilter>,
    },
}

/// One of the Manager's three named cycles (see [`CycleId`]).
pub struct AggregationCycle {
    id: CycleId,
    state: RwLock<State>,
}

impl std::fmt::Debug for AggregationCycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AggregationCycle")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}

impl AggregationCycle {
    pub(crate) fn new(id: CycleId) -> Self {
        AggregationCycle {
            id,
            state: RwLock::new(State::Inactive),
        }
    }

    /// Whether this cycle is currently active.
    pub fn is_active(&self) -> bool {
        matches!(*self.state.read().unwrap(), State::Active { .. })
    }

    /// Activate the cycle if inactive, snapshotting and re-activating if
    /// already active. Every series for which `filter.admits` returns true
    /// gets (or keeps) a live kernel for this cycle; series no longer
    /// admitted are detached.
    pub(crate) fn start_or_cycle(
        &self,
        now: DateTime<FixedOffset>,
        filter: Arc<dyn CycleFilter>,
        series: &[Arc<Series>],
    ) -> AggregationSummary {
        let mut state = self.state.write().unwrap();
        let mut summary = AggregationSummary::default();

        let previous_start = match &*state {
            State::Inactive => None,
            State::Active { start, .. } => Some(*start),
        };

        if let Some(start) = previous_start {
            let duration = wall_duration(start, now);
            for s in series {
                if s.is_active(self.id) {
                    if let Some(aggregate) = s.snap_current(self.id, start, duration) {
                        summary.push(aggregate);
                    }
                }
            }
        }

        for s in series {
            let (admitted, value_filter) = filter.admits(s);
            if admitted {
                if s.is_active(self.id) {
                    // Already has a live kernel (untouched, or just
                    // freshly swapped above for a Measurement series) —
                    // only the value filter may have changed this cycle.
                    s.set_value_filter(self.id, value_filter);
                } else {
                    s.install(self.id, value_filter);
                }
            } else if s.is_active(self.id) {
                s.detach(self.id);
            }
        }

        *state = State::Active { start: now, filter };
        summary
    }

    /// If this cycle is active, evaluate `series` against the
    /// currently-active filter and install a kernel if admitted. Used when
    /// a brand-new series is created mid-period, so it isn't silently
    /// excluded from the remainder of an already-running cycle.
    pub(crate) fn admit_if_active(&self, series: &Series) {
        if let State::Active { filter, .. } = &*self.state.read().unwrap() {
            let (admitted, value_filter) = filter.admits(series);
            if admitted {
                series.install(self.id, value_filter);
            }
        }
    }

    /// Snapshot all active kernels over `[start, now)` and deactivate the
    /// cycle. No-op (empty summary) if already inactive.
    pub(crate) fn stop(&self, now: DateTime<FixedOffset>, series: &[Arc<Series>]) -> AggregationSummary {
        let mut state = self.state.write().unwrap();
        let mut summary = AggregationSummary::default();

        if let State::Active { start, .. } = &*state {
            let duration = wall_duration(*start, now);
            for s in series {
                if s.is_active(self.id) {
                    if let Some(aggregate) = s.snap_current(self.id, *start, duration) {
                        summary.push(aggregate);
                    }
                    s.detach(self.id);
                }
            }
        }

        *state = State::Inactive;
        summary
    }
}

fn wall_duration(start: DateTime<FixedOffset>, now: DateTime<FixedOffset>) -> Duration {
    (now - start).to_std().unwrap_or(Duration::ZERO)
}
