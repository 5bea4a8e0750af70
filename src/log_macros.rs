//! Internal diagnostic macros.
//!
//! These wrap `tracing` the same way this codebase's own `otel_warn!` /
//! `otel_debug!` family does: a no-op when the `internal-logs` feature is
//! disabled, a `tracing` event at the matching level otherwise. They exist
//! for the crate's own diagnostics (capacity exhaustion, clamped values,
//! configuration mismatches) and are not meant for general application
//! logging.

#![allow(unused_macros)]

macro_rules! agg_warn {
    (name: $name:expr, $($key:ident = $value:expr),+ $(,)?) => {
        #[cfg(feature = "internal-logs")]
        {
            tracing::warn!(name: $name, target: env!("CARGO_PKG_NAME"), $($key = $value),+, "");
        }
        #[cfg(not(feature = "internal-logs"))]
        {
            let _ = ($name, $($value),+);
        }
    };
}

macro_rules! agg_debug {
    (name: $name:expr, $($key:ident = $value:expr),+ $(,)?) => {
        #[cfg(feature = "internal-logs")]
        {
            tracing::debug!(name: $name, target: env!("CARGO_PKG_NAME"), $($key = $value),+, "");
        }
        #[cfg(not(feature = "internal-logs"))]
        {
            let _ = ($name, $($value),+);
        }
    };
}

pub(crate) use agg_debug;
pub(crate) use agg_warn;
