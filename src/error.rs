use thiserror::Error;

/// A specialized `Result` type for aggregation-core operations.
pub type AggregationResult<T> = Result<T, AggregationError>;

/// Errors returned by the series directory, the aggregation cycles and the
/// context bridge.
///
/// `Series::track` never returns an error: a value that cannot be absorbed
/// (for example because its series has been filtered out of the active
/// cycle) is silently dropped, see [`crate::cycle`].
#[derive(Error, Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum AggregationError {
    /// A required identity (metric id or dimension value) was null or empty.
    #[error("argument must not be null or empty: {0}")]
    NullArgument(&'static str),

    /// `get_or_create` was called with a different number of dimension
    /// values than the metric's declared dimension count.
    #[error("metric {metric_id} expects {expected} dimension value(s), got {actual}")]
    DimensionArityMismatch {
        /// The metric id involved.
        metric_id: String,
        /// The declared dimension count.
        expected: usize,
        /// The dimension count actually supplied.
        actual: usize,
    },

    /// The metric already exists with a dimension count, kernel kind or
    /// explicit configuration that differs from the one supplied.
    #[error("metric {metric_id} is already registered with an incompatible configuration")]
    ConfigurationMismatch {
        /// The metric id involved.
        metric_id: String,
    },

    /// `series_count_limit` or `values_per_dimension_limit` has been
    /// reached for this metric.
    #[error("capacity exceeded for metric {metric_id}")]
    CapacityExceeded {
        /// The metric id involved.
        metric_id: String,
    },

    /// The operation is not valid for the current state of a cycle, e.g.
    /// reading a kernel that has already been detached.
    #[error("invalid cycle state: {0}")]
    InvalidState(&'static str),

    /// The `ContextCopier` could not bind to the host's context primitive.
    #[error("internal integrity error: {0}")]
    InternalIntegrity(String),
}
