//! Series configuration and the process-wide default overrides.

use std::sync::{Arc, OnceLock, RwLock};

/// Which aggregation kernel a series uses.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum KernelKind {
    /// Summary-statistics kernel, reset every cycle.
    Measurement,
    /// Running-total kernel, persists across cycles.
    Accumulator,
}

/// Configuration attached to a metric at first registration, frozen
/// thereafter (see [`crate::directory::SeriesDirectory::get_or_create`]).
#[derive(Clone, Debug, PartialEq)]
pub struct SeriesConfig {
    /// Positional dimension names, in declaration order. Length equals the
    /// metric's declared dimension count.
    pub dimension_names: Vec<String>,
    /// Max total series this metric id may have.
    pub series_count_limit: usize,
    /// Max distinct values observed at any one dimension position.
    pub values_per_dimension_limit: usize,
    /// Which kernel this metric's series use.
    pub kernel_kind: KernelKind,
    /// Advisory only: preserved for the sink, does not affect storage.
    pub restrict_to_nonnegative_integers: bool,
}

impl SeriesConfig {
    /// Start building a configuration for `dimension_names`, with the
    /// crate's compiled-in defaults for everything else.
    pub fn new(dimension_names: Vec<String>, kernel_kind: KernelKind) -> Self {
        SeriesConfig {
            dimension_names,
            series_count_limit: 1000,
            values_per_dimension_limit: 100,
            kernel_kind,
            restrict_to_nonnegative_integers: false,
        }
    }

    /// Number of declared dimensions.
    pub fn dimension_count(&self) -> usize {
        self.dimension_names.len()
    }

    /// Builder-style override of `series_count_limit`.
    pub fn with_series_count_limit(mut self, limit: usize) -> Self {
        self.series_count_limit = limit;
        self
    }

    /// Builder-style override of `values_per_dimension_limit`.
    pub fn with_values_per_dimension_limit(mut self, limit: usize) -> Self {
        self.values_per_dimension_limit = limit;
        self
    }

    /// Builder-style override of `restrict_to_nonnegative_integers`.
    pub fn with_restrict_to_nonnegative_integers(mut self, restrict: bool) -> Self {
        self.restrict_to_nonnegative_integers = restrict;
        self
    }

    /// Whether two configurations are compatible enough for the same
    /// metric id: dimension count, kernel kind, both limits, and the
    /// nonnegative-integer hint must all match (spec.md §4.3 step 1). A
    /// caller re-requesting an existing metric with a different limit is a
    /// `ConfigurationMismatch`, the same as requesting a different kernel
    /// kind — the frozen schema config is never silently widened or
    /// narrowed to match a later request.
    pub(crate) fn compatible_with(&self, other: &SeriesConfig) -> bool {
        self.dimension_count() == other.dimension_count()
            && self.kernel_kind == other.kernel_kind
            && self.series_count_limit == other.series_count_limit
            && self.values_per_dimension_limit == other.values_per_dimension_limit
            && self.restrict_to_nonnegative_integers == other.restrict_to_nonnegative_integers
    }
}

fn default_measurement_slot() -> &'static RwLock<Arc<SeriesConfig>> {
    static SLOT: OnceLock<RwLock<Arc<SeriesConfig>>> = OnceLock::new();
    SLOT.get_or_init(|| {
        RwLock::new(Arc::new(SeriesConfig::new(Vec::new(), KernelKind::Measurement)))
    })
}

fn default_accumulator_slot() -> &'static RwLock<Arc<SeriesConfig>> {
    static SLOT: OnceLock<RwLock<Arc<SeriesConfig>>> = OnceLock::new();
    SLOT.get_or_init(|| {
        RwLock::new(Arc::new(SeriesConfig::new(Vec::new(), KernelKind::Accumulator)))
    })
}

/// Process-wide default configuration used when a metric is first
/// registered with `config: None`. Only the limits and the
/// nonnegative-integer hint are taken from the default; `dimension_names`
/// and `kernel_kind` are always supplied by the caller's request.
pub(crate) fn default_config_for(kernel_kind: KernelKind) -> Arc<SeriesConfig> {
    match kernel_kind {
        KernelKind::Measurement => default_measurement_slot().read().unwrap().clone(),
        KernelKind::Accumulator => default_accumulator_slot().read().unwrap().clone(),
    }
}

/// Override the process-wide default configuration applied to
/// newly-registered Measurement metrics. Does not affect metrics already
/// registered.
pub fn set_default_measurement_config(config: SeriesConfig) {
    *default_measurement_slot().write().unwrap() = Arc::new(config);
}

/// Override the process-wide default configuration applied to
/// newly-registered Accumulator metrics. Does not affect metrics already
/// registered.
pub fn set_default_accumulator_config(config: SeriesConfig) {
    *default_accumulator_slot().write().unwrap() = Arc::new(config);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_config_carries_compiled_in_defaults() {
        let config = SeriesConfig::new(vec!["Color".into()], KernelKind::Measurement);
        assert_eq!(config.series_count_limit, 1000);
        assert_eq!(config.values_per_dimension_limit, 100);
        assert_eq!(config.dimension_count(), 1);
    }

    #[test]
    fn compatible_with_rejects_a_different_series_count_limit() {
        let a = SeriesConfig::new(vec!["Color".into()], KernelKind::Measurement)
            .with_series_count_limit(5);
        let b = SeriesConfig::new(vec!["Color".into()], KernelKind::Measurement)
            .with_series_count_limit(50);
        assert!(!a.compatible_with(&b));
    }

    #[test]
    fn compatible_with_rejects_a_different_values_per_dimension_limit() {
        let a = SeriesConfig::new(vec!["Color".into()], KernelKind::Measurement)
            .with_values_per_dimension_limit(10);
        let b = SeriesConfig::new(vec!["Color".into()], KernelKind::Measurement)
            .with_values_per_dimension_limit(20);
        assert!(!a.compatible_with(&b));
    }

    #[test]
    fn compatible_with_rejects_a_different_nonnegative_integer_hint() {
        let a = SeriesConfig::new(vec!["Color".into()], KernelKind::Measurement)
            .with_restrict_to_nonnegative_integers(true);
        let b = SeriesConfig::new(vec!["Color".into()], KernelKind::Measurement)
            .with_restrict_to_nonnegative_integers(false);
        assert!(!a.compatible_with(&b));
    }

    #[test]
    fn compatible_with_accepts_identical_configs() {
        let a = SeriesConfig::new(vec!["Color".into()], KernelKind::Measurement).with_series_count_limit(5);
        let b = SeriesConfig::new(vec!["Color".into()], KernelKind::Measurement).with_series_count_limit(5);
        assert!(a.compatible_with(&b));
    }

    #[test]
    fn compatible_with_rejects_kernel_kind_mismatch() {
        let a = SeriesConfig::new(vec![], KernelKind::Measurement);
        let b = SeriesConfig::new(vec![], KernelKind::Accumulator);
        assert!(!a.compatible_with(&b));
    }

    #[test]
    fn compatible_with_rejects_dimension_count_mismatch() {
        let a = SeriesConfig::new(vec!["Color".into()], KernelKind::Measurement);
        let b = SeriesConfig::new(vec![], KernelKind::Measurement);
        assert!(!a.compatible_with(&b));
    }
}
