//! The top-level owner: directory, the three named cycles, the sink, and
//! the worker thread that drives the Default cycle.

use std::sync::mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use chrono::{DateTime, FixedOffset, Utc};

use crate::config::SeriesConfig;
use crate::cycle::{AggregationCycle, AggregationSummary, AllowAll, CycleFilter};
use crate::directory::SeriesDirectory;
use crate::error::{AggregationError, AggregationResult};
use crate::log_macros::agg_warn;
use crate::series::{CycleId, Series};
use crate::sink::{MetricSink, NoopSink};

const DEFAULT_PERIOD: Duration = Duration::from_secs(60);

fn wall_clock_now() -> DateTime<FixedOffset> {
    let utc_offset = FixedOffset::east_opt(0).expect("zero offset is always valid");
    DateTime::<FixedOffset>::from_naive_utc_and_offset(Utc::now().naive_utc(), utc_offset)
}

/// Builds a [`Manager`], mirroring the teacher's provider-builder pattern:
/// sane defaults, a handful of setters, `build()` assembles and spawns the
/// worker thread.
pub struct ManagerBuilder {
    sink: Arc<dyn MetricSink>,
    default_period: Duration,
}

impl std::fmt::Debug for ManagerBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagerBuilder")
            .field("default_period", &self.default_period)
            .finish_non_exhaustive()
    }
}

impl Default for ManagerBuilder {
    fn default() -> Self {
        ManagerBuilder {
            sink: Arc::new(NoopSink),
            default_period: DEFAULT_PERIOD,
        }
    }
}

impl ManagerBuilder {
    /// Start from the crate's defaults: a [`NoopSink`] and a 60 second
    /// Default-cycle period.
    pub fn new() -> Self {
        ManagerBuilder::default()
    }

    /// The sink that Default-cycle aggregates are pushed to.
    pub fn with_sink(mut self, sink: Arc<dyn MetricSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Override the Default cycle's fixed period. Nominally 60 seconds.
    pub fn with_default_period(mut self, period: Duration) -> Self {
        self.default_period = period;
        self
    }

    /// Assemble the [`Manager`] and spawn its worker thread.
    pub fn build(self) -> Arc<Manager> {
        let manager = Arc::new(Manager {
            directory: SeriesDirectory::new(),
            cycles: [
                AggregationCycle::new(CycleId::Default),
                AggregationCycle::new(CycleId::Custom),
                AggregationCycle::new(CycleId::QuickPulse),
            ],
            sink: self.sink,
            default_period: self.default_period,
            worker: std::sync::Mutex::new(None),
        });

        // The Default cycle is active for the Manager's entire lifetime (see
        // `AggregationCycle` state machine), so it must be started here
        // rather than waiting for the worker thread's first tick.
        manager.cycle(CycleId::Default).start_or_cycle(wall_clock_now(), Arc::new(AllowAll), &[]);

        let worker_manager = manager.clone();
        let (shutdown_tx, shutdown_rx) = mpsc::channel();
        let period = manager.default_period;
        let thread = std::thread::spawn(move || loop {
            match shutdown_rx.recv_timeout(period) {
                Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => break,
                Err(mpsc::RecvTimeoutError::Timeout) => {
                    worker_manager.tick_default_cycle(wall_clock_now());
                }
            }
        });

        *manager.worker.lock().unwrap() = Some(WorkerHandle { shutdown_tx, thread });
        manager
    }
}

struct WorkerHandle {
    shutdown_tx: mpsc::Sender<()>,
    thread: JoinHandle<()>,
}

/// Owns the series directory, the three named cycles, the sink handle, and
/// the Default cycle's worker thread.
pub struct Manager {
    directory: SeriesDirectory,
    cycles: [AggregationCycle; 3],
    sink: Arc<dyn MetricSink>,
    default_period: Duration,
    worker: std::sync::Mutex<Option<WorkerHandle>>,
}

impl std::fmt::Debug for Manager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Manager")
            .field("default_period", &self.default_period)
            .finish_non_exhaustive()
    }
}

impl Manager {
    /// Start building a Manager with the crate's defaults.
    pub fn builder() -> ManagerBuilder {
        ManagerBuilder::new()
    }

    fn cycle(&self, id: CycleId) -> &AggregationCycle {
        &self.cycles[id.index()]
    }

    /// Look up or lazily create the series for `(metric_id,
    /// dimension_values)`. A brand-new series is immediately evaluated
    /// against every currently-active cycle's filter so it participates in
    /// the remainder of any in-progress period.
    pub fn get_or_create_series(
        &self,
        metric_id: &str,
        dimension_values: &[String],
        config: Option<SeriesConfig>,
    ) -> AggregationResult<Arc<Series>> {
        let (series, is_new) =
            self.directory.get_or_create_reporting_new(metric_id, dimension_values, config)?;
        if is_new {
            for id in CycleId::ALL {
                self.cycle(id).admit_if_active(&series);
            }
        }
        Ok(series)
    }

    /// Look up or create the series, then route `value` into it. Raises
    /// any [`crate::error::AggregationError`] from `get_or_create_series`,
    /// including `CapacityExceeded` — see [`Self::try_track`] for the
    /// capacity-tolerant entry point (spec.md §7).
    pub fn track(&self, metric_id: &str, dimension_values: &[String], value: f64) -> AggregationResult<()> {
        let series = self.get_or_create_series(metric_id, dimension_values, None)?;
        series.track(value);
        Ok(())
    }

    /// As [`Self::track`], but reports `CapacityExceeded` as `false`
    /// instead of raising, matching the spec's `try_` naming convention
    /// for capacity-gated operations (spec.md §7, §8 Scenario 3). Every
    /// other `AggregationError` variant indicates caller misuse
    /// (malformed identity, wrong dimension arity) rather than an
    /// expected runtime condition; this entry point has no channel to
    /// raise those through, so it logs them via the crate's internal
    /// diagnostics and also reports `false`.
    pub fn try_track(&self, metric_id: &str, dimension_values: &[String], value: f64) -> bool {
        match self.get_or_create_series(metric_id, dimension_values, None) {
            Ok(series) => {
                series.track(value);
                true
            }
            Err(AggregationError::CapacityExceeded { .. }) => false,
            Err(err) => {
                agg_warn!(name: "TryTrackRejected", metric_id = metric_id, error = err.to_string());
                false
            }
        }
    }

    /// Activate `cycle` if inactive, or snapshot-and-recycle it if already
    /// active, using `filter` to decide which series participate going
    /// forward.
    pub fn start_or_cycle(
        &self,
        cycle: CycleId,
        now: DateTime<FixedOffset>,
        filter: Arc<dyn CycleFilter>,
    ) -> AggregationSummary {
        let series = self.directory.all_series_everywhere();
        self.cycle(cycle).start_or_cycle(now, filter, &series)
    }

    /// Snapshot and deactivate `cycle`. No-op if already inactive.
    pub fn stop(&self, cycle: CycleId, now: DateTime<FixedOffset>) -> AggregationSummary {
        let series = self.directory.all_series_everywhere();
        self.cycle(cycle).stop(now, &series)
    }

    /// Force a Default-cycle boundary at `now` and push the resulting
    /// aggregates to the sink individually. Does not affect Custom or
    /// QuickPulse.
    pub fn flush(&self, now: DateTime<FixedOffset>) {
        self.tick_default_cycle(now);
    }

    fn tick_default_cycle(&self, now: DateTime<FixedOffset>) {
        let series = self.directory.all_series_everywhere();
        let summary = self.cycle(CycleId::Default).start_or_cycle(now, Arc::new(AllowAll), &series);
        for aggregate in summary.non_persistent_aggregates {
            self.sink.push(aggregate);
        }
        for aggregate in summary.persistent_aggregates {
            self.sink.push(aggregate);
        }
    }

    /// Number of distinct values observed so far at `position` for
    /// `metric_id`.
    pub fn dimension_value_count(&self, metric_id: &str, position: usize) -> usize {
        self.directory.dimension_value_count(metric_id, position)
    }

    /// Stop the Default cycle's worker thread and wait for it to exit.
    /// Safe to call more than once; later calls are no-ops.
    pub fn shutdown(&self) {
        if let Some(worker) = self.worker.lock().unwrap().take() {
            let _ = worker.shutdown_tx.send(());
            let _ = worker.thread.join();
        }
    }
}

impl Drop for Manager {
    fn drop(&mut self) {
        self.shutdown();
    }
}
