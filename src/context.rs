//! Copying tags and properties from one ambient telemetry context into
//! another, without requiring a public way to enumerate or set the
//! source's internal tag structure.

use std::collections::HashMap;
use std::sync::OnceLock;

use crate::error::{AggregationError, AggregationResult};

/// A host telemetry context: a set of internal tags plus a public
/// key/value property map. The aggregation core only ever copies these,
/// never interprets them.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TelemetryContext {
    /// Internal tags, opaque to this crate.
    pub tags: HashMap<String, String>,
    /// Public properties, exposed to application code.
    pub properties: HashMap<String, String>,
}

/// How to reach into a host's context implementation to copy its tags.
/// The in-process [`TelemetryContext`] needs no special access, but a host
/// integration whose context type keeps its tag structure private can
/// implement this using whatever facility it has available (a friend
/// accessor, a private constructor, reflection) behind this stable
/// interface.
pub trait ContextBridge: Send + Sync {
    /// Copy `src`'s internal tags into `dst`, overwriting any tags `dst`
    /// already carries with the same key.
    fn copy_tags(&self, src: &TelemetryContext, dst: &mut TelemetryContext) -> AggregationResult<()>;
}

/// The bridge used when no host integration has registered its own: a
/// plain field copy, since [`TelemetryContext`]'s tags are already public
/// within this crate.
#[derive(Debug)]
pub struct DefaultContextBridge;

impl ContextBridge for DefaultContextBridge {
    fn copy_tags(&self, src: &TelemetryContext, dst: &mut TelemetryContext) -> AggregationResult<()> {
        for (key, value) in &src.tags {
            dst.tags.insert(key.clone(), value.clone());
        }
        Ok(())
    }
}

static BRIDGE: OnceLock<Box<dyn ContextBridge>> = OnceLock::new();

/// Register the bridge used by [`copy_context`]. Only the first call takes
/// effect; later calls are no-ops, matching the once-per-process selection
/// described for the Manager's other process-wide state.
pub fn set_context_bridge(bridge: Box<dyn ContextBridge>) {
    let _ = BRIDGE.set(bridge);
}

fn bridge() -> &'static dyn ContextBridge {
    BRIDGE.get_or_init(|| Box::new(DefaultContextBridge)).as_ref()
}

/// Copy `src`'s tags into `dst` via the registered [`ContextBridge`], then
/// copy `src`'s properties into `dst` for keys `dst` does not already
/// have. Empty or whitespace-only source keys are skipped.
pub fn copy_context(src: &TelemetryContext, dst: &mut TelemetryContext) -> AggregationResult<()> {
    bridge()
        .copy_tags(src, dst)
        .map_err(|err| AggregationError::InternalIntegrity(err.to_string()))?;

    for (key, value) in &src.properties {
        if key.trim().is_empty() {
            continue;
        }
        dst.properties.entry(key.clone()).or_insert_with(|| value.clone());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context_with(tags: &[(&str, &str)], properties: &[(&str, &str)]) -> TelemetryContext {
        TelemetryContext {
            tags: tags.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
            properties: properties.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
        }
    }

    #[test]
    fn target_keys_present_before_the_copy_retain_their_values() {
        let src = context_with(&[], &[("color", "blue")]);
        let mut dst = context_with(&[], &[("color", "red")]);
        copy_context(&src, &mut dst).unwrap();
        assert_eq!(dst.properties.get("color"), Some(&"red".to_string()));
    }

    #[test]
    fn target_keys_absent_before_the_copy_take_source_values() {
        let src = context_with(&[], &[("shape", "round")]);
        let mut dst = context_with(&[], &[]);
        copy_context(&src, &mut dst).unwrap();
        assert_eq!(dst.properties.get("shape"), Some(&"round".to_string()));
    }

    #[test]
    fn empty_source_keys_are_ignored() {
        let src = context_with(&[], &[("", "x"), ("  ", "y"), ("ok", "z")]);
        let mut dst = context_with(&[], &[]);
        copy_context(&src, &mut dst).unwrap();
        assert_eq!(dst.properties.len(), 1);
        assert_eq!(dst.properties.get("ok"), Some(&"z".to_string()));
    }

    #[test]
    fn tags_are_copied_and_overwrite_existing_destination_tags() {
        let src = context_with(&[("role", "worker")], &[]);
        let mut dst = context_with(&[("role", "stale")], &[]);
        copy_context(&src, &mut dst).unwrap();
        assert_eq!(dst.tags.get("role"), Some(&"worker".to_string()));
    }
}
