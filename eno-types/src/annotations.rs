//! Eno-reserved annotation keys (spec.md §6).
//!
//! These are plain Kubernetes annotations on `Composition`/emitted-object
//! metadata rather than typed spec fields, matching the real object's
//! "policy via annotation" convention so that annotating an object does not
//! require bumping its `spec` schema.

/// Overrides interpreted by the (out-of-scope) reconciliation driver.
pub const OVERRIDES: &str = "eno.azure.io/overrides";
/// Force a full overwrite instead of a merge patch.
pub const REPLACE: &str = "eno.azure.io/replace";
/// Per-object drift-check cadence, parsed with [`crate::duration::KubeDuration`].
pub const RECONCILE_INTERVAL: &str = "eno.azure.io/reconcile-interval";
/// `orphan` disables cascading delete of objects owned by a Composition.
pub const DELETION_STRATEGY: &str = "eno.azure.io/deletion-strategy";
/// A Composition carrying `true` here is skipped by the rollout coordinator.
pub const IGNORE_SIDE_EFFECTS: &str = "eno.azure.io/ignore-side-effects";

/// Value of [`DELETION_STRATEGY`] that disables cascading deletes.
pub const DELETION_STRATEGY_ORPHAN: &str = "orphan";

/// Reads a boolean-valued annotation, defaulting to `false` when absent or unparsable.
pub fn is_true(annotations: &std::collections::BTreeMap<String, String>, key: &str) -> bool {
    annotations.get(key).map(|v| v == "true").unwrap_or(false)
}

/// Reads [`DELETION_STRATEGY`] and reports whether it requests orphaning.
pub fn is_orphan_deletion(annotations: &std::collections::BTreeMap<String, String>) -> bool {
    annotations
        .get(DELETION_STRATEGY)
        .map(|v| v == DELETION_STRATEGY_ORPHAN)
        .unwrap_or(false)
}
