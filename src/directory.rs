//! The concurrent, capacity-bounded registry mapping `(metric id, ordered
//! dimension values)` to a single canonical [`Series`].

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use crate::config::SeriesConfig;
use crate::error::{AggregationError, AggregationResult};
use crate::log_macros::agg_warn;
use crate::series::Series;

struct SchemaState {
    series: HashMap<Vec<String>, Arc<Series>>,
    distinct_values: Vec<HashSet<String>>,
}

/// The frozen configuration and live series set for one metric id.
struct MetricSchema {
    config: Arc<SeriesConfig>,
    state: RwLock<SchemaState>,
}

impl MetricSchema {
    fn new(config: Arc<SeriesConfig>) -> Self {
        let dimension_count = config.dimension_count();
        MetricSchema {
            config,
            state: RwLock::new(SchemaState {
                series: HashMap::new(),
                distinct_values: vec![HashSet::new(); dimension_count],
            }),
        }
    }

    fn get_or_create(&self, metric_id: &str, dimension_values: &[String]) -> AggregationResult<(Arc<Series>, bool)> {
        {
            let state = self.state.read().unwrap();
            if let Some(series) = state.series.get(dimension_values) {
                return Ok((series.clone(), false));
            }
        }

        let mut state = self.state.write().unwrap();
        if let Some(series) = state.series.get(dimension_values) {
            return Ok((series.clone(), false));
        }

        if state.series.len() >= self.config.series_count_limit {
            agg_warn!(name: "SeriesCountLimitReached", metric_id = metric_id);
            return Err(AggregationError::CapacityExceeded {
                metric_id: metric_id.to_string(),
            });
        }
        for (position, value) in dimension_values.iter().enumerate() {
            let distinct = &state.distinct_values[position];
            if !distinct.contains(value) && distinct.len() >= self.config.values_per_dimension_limit {
                agg_warn!(
                    name: "ValuesPerDimensionLimitReached",
                    metric_id = metric_id,
                    position = position,
                );
                return Err(AggregationError::CapacityExceeded {
                    metric_id: metric_id.to_string(),
                });
            }
        }

        let series = Arc::new(Series::new(
            metric_id.to_string(),
            dimension_values.to_vec(),
            self.config.clone(),
        ));
        for (position, value) in dimension_values.iter().enumerate() {
            state.distinct_values[position].insert(value.clone());
        }
        state.series.insert(dimension_values.to_vec(), series.clone());
        Ok((series, true))
    }
}

/// Per-manager registry of series. Guarantees a single canonical [`Series`]
/// per `(metric id, dimension values)` fingerprint and enforces the
/// series-count and per-dimension-value caps declared in each metric's
/// [`SeriesConfig`].
#[derive(Default)]
pub struct SeriesDirectory {
    schemas: RwLock<HashMap<String, Arc<MetricSchema>>>,
}

impl std::fmt::Debug for SeriesDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self.schemas.read().unwrap().len();
        f.debug_struct("SeriesDirectory").field("metric_count", &count).finish()
    }
}

impl SeriesDirectory {
    /// Create an empty directory.
    pub fn new() -> Self {
        SeriesDirectory {
            schemas: RwLock::new(HashMap::new()),
        }
    }

    /// Look up or lazily create the series for `(metric_id,
    /// dimension_values)`. `config` is consulted only the first time a
    /// metric id is seen; `None` falls back to the process-wide default for
    /// the requested kernel kind (see [`crate::config`]). A mismatched
    /// explicit `config` on a subsequent call fails with
    /// [`AggregationError::ConfigurationMismatch`].
    pub fn get_or_create(
        &self,
        metric_id: &str,
        dimension_values: &[String],
        config: Option<SeriesConfig>,
    ) -> AggregationResult<Arc<Series>> {
        self.get_or_create_reporting_new(metric_id, dimension_values, config)
            .map(|(series, _is_new)| series)
    }

    /// As [`Self::get_or_create`], but also reports whether the series was
    /// just created. Used by [`crate::manager::Manager`] to immediately
    /// evaluate a brand-new series against every currently-active cycle's
    /// filter, so it does not miss the remainder of an in-progress period.
    pub(crate) fn get_or_create_reporting_new(
        &self,
        metric_id: &str,
        dimension_values: &[String],
        config: Option<SeriesConfig>,
    ) -> AggregationResult<(Arc<Series>, bool)> {
        if metric_id.is_empty() {
            return Err(AggregationError::NullArgument("metric_id"));
        }
        if dimension_values.iter().any(|v| v.is_empty()) {
            return Err(AggregationError::NullArgument("dimension value"));
        }

        let schema = self.schema_for(metric_id, dimension_values, config.as_ref())?;

        if dimension_values.len() != schema.config.dimension_count() {
            return Err(AggregationError::DimensionArityMismatch {
                metric_id: metric_id.to_string(),
                expected: schema.config.dimension_count(),
                actual: dimension_values.len(),
            });
        }
        if let Some(requested) = &config {
            if !requested.compatible_with(&schema.config) {
                return Err(AggregationError::ConfigurationMismatch {
                    metric_id: metric_id.to_string(),
                });
            }
        }

        schema.get_or_create(metric_id, dimension_values)
    }

    fn schema_for(
        &self,
        metric_id: &str,
        dimension_values: &[String],
        config: Option<&SeriesConfig>,
    ) -> AggregationResult<Arc<MetricSchema>> {
        {
            let schemas = self.schemas.read().unwrap();
            if let Some(schema) = schemas.get(metric_id) {
                return Ok(schema.clone());
            }
        }

        let mut schemas = self.schemas.write().unwrap();
        if let Some(schema) = schemas.get(metric_id) {
            return Ok(schema.clone());
        }

        let effective_config = match config {
            Some(config) => Arc::new(config.clone()),
            None => {
                let defaults = crate::config::default_config_for(crate::config::KernelKind::Measurement);
                Arc::new(SeriesConfig {
                    dimension_names: positional_names(dimension_values.len()),
                    ..(*defaults).clone()
                })
            }
        };

        let schema = Arc::new(MetricSchema::new(effective_config));
        schemas.insert(metric_id.to_string(), schema.clone());
        Ok(schema)
    }

    /// All series currently registered for `metric_id`, in unspecified
    /// order.
    pub fn all_series(&self, metric_id: &str) -> Vec<Arc<Series>> {
        let schemas = self.schemas.read().unwrap();
        match schemas.get(metric_id) {
            Some(schema) => schema.state.read().unwrap().series.values().cloned().collect(),
            None => Vec::new(),
        }
    }

    /// Every series across every metric id, in unspecified order. Used by
    /// the Manager to enumerate cycle participants at a cycle boundary.
    pub(crate) fn all_series_everywhere(&self) -> Vec<Arc<Series>> {
        let schemas = self.schemas.read().unwrap();
        schemas
            .values()
            .flat_map(|schema| schema.state.read().unwrap().series.values().cloned().collect::<Vec<_>>())
            .collect()
    }

    /// Number of distinct values observed so far at `position` for
    /// `metric_id`, or 0 if the metric or position is unknown.
    pub fn dimension_value_count(&self, metric_id: &str, position: usize) -> usize {
        let schemas = self.schemas.read().unwrap();
        schemas
            .get(metric_id)
            .and_then(|schema| {
                let state = schema.state.read().unwrap();
                state.distinct_values.get(position).map(|set| set.len())
            })
            .unwrap_or(0)
    }
}

fn positional_names(count: usize) -> Vec<String> {
    (0..count).map(|i| format!("dimension{i}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::KernelKind;

    #[test]
    fn repeated_lookups_return_the_same_series() {
        let directory = SeriesDirectory::new();
        let config = SeriesConfig::new(vec!["Color".into()], KernelKind::Measurement);
        let a = directory
            .get_or_create("Ducks Sold", &["Purple".to_string()], Some(config.clone()))
            .unwrap();
        let b = directory
            .get_or_create("Ducks Sold", &["Purple".to_string()], Some(config))
            .unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn none_config_matches_an_existing_schema() {
        let directory = SeriesDirectory::new();
        let config = SeriesConfig::new(vec!["Color".into()], KernelKind::Accumulator);
        directory
            .get_or_create("X", &["a".to_string()], Some(config))
            .unwrap();
        let looked_up = directory.get_or_create("X", &["a".to_string()], None).unwrap();
        assert_eq!(looked_up.config().kernel_kind, KernelKind::Accumulator);
    }

    #[test]
    fn mismatched_explicit_config_is_rejected() {
        let directory = SeriesDirectory::new();
        directory
            .get_or_create(
                "X",
                &["a".to_string()],
                Some(SeriesConfig::new(vec!["Color".into()], KernelKind::Accumulator)),
            )
            .unwrap();
        let err = directory
            .get_or_create(
                "X",
                &["a".to_string()],
                Some(SeriesConfig::new(vec!["Color".into()], KernelKind::Measurement)),
            )
            .unwrap_err();
        assert_eq!(err, AggregationError::ConfigurationMismatch { metric_id: "X".into() });
    }

    #[test]
    fn series_count_limit_is_enforced() {
        let directory = SeriesDirectory::new();
        let config = SeriesConfig::new(vec!["k".into()], KernelKind::Measurement).with_series_count_limit(2);
        directory.get_or_create("M", &["a".to_string()], Some(config.clone())).unwrap();
        directory.get_or_create("M", &["b".to_string()], Some(config.clone())).unwrap();
        let err = directory.get_or_create("M", &["c".to_string()], Some(config)).unwrap_err();
        assert_eq!(err, AggregationError::CapacityExceeded { metric_id: "M".into() });
        assert!(directory.all_series("M").iter().all(|s| s.dimension_values() != ["c".to_string()]));
    }

    #[test]
    fn values_per_dimension_limit_is_enforced() {
        let directory = SeriesDirectory::new();
        let config = SeriesConfig::new(vec!["k".into()], KernelKind::Measurement)
            .with_values_per_dimension_limit(1)
            .with_series_count_limit(10);
        directory.get_or_create("M", &["a".to_string()], Some(config.clone())).unwrap();
        let err = directory.get_or_create("M", &["b".to_string()], Some(config)).unwrap_err();
        assert_eq!(err, AggregationError::CapacityExceeded { metric_id: "M".into() });
    }

    #[test]
    fn dimension_arity_mismatch_is_rejected() {
        let directory = SeriesDirectory::new();
        directory
            .get_or_create(
                "M",
                &["a".to_string()],
                Some(SeriesConfig::new(vec!["k".into()], KernelKind::Measurement)),
            )
            .unwrap();
        let err = directory.get_or_create("M", &[], None).unwrap_err();
        assert!(matches!(err, AggregationError::DimensionArityMismatch { .. }));
    }

    #[test]
    fn empty_metric_id_is_rejected() {
        let directory = SeriesDirectory::new();
        let err = directory.get_or_create("", &[], None).unwrap_err();
        assert_eq!(err, AggregationError::NullArgument("metric_id"));
    }
}
