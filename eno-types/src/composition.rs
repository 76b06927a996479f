use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::refs::ObjectRef;
use crate::status::SimplifiedStatus;

/// Maps a `Synthesizer.refs[].key` to the concrete object a `Composition`
/// binds it to (spec.md §3).
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
pub struct Binding {
    pub key: String,
    pub resource: ObjectRef,
}

/// One entry per input key, recording the `ResourceVersion`-derived
/// revision observed when a synthesis started. All entries sharing a single
/// integer is the *lockstep* invariant (spec.md §3 invariant 3).
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq, Default, JsonSchema)]
pub struct InputRevision {
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<i64>,
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
pub struct Result {
    pub message: String,
    pub severity: Severity,
}

/// One execution of a Synthesizer for a Composition (spec.md §3, glossary).
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Default, JsonSchema)]
pub struct Synthesis {
    /// String-encoded UUID identifying this execution (spec.md glossary).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
    #[serde(default)]
    pub observed_composition_generation: i64,
    #[serde(default)]
    pub observed_synthesizer_generation: i64,
    /// Names of the `ResourceSlice`s this synthesis produced, in emission order.
    #[serde(default)]
    pub resource_slices: Vec<String>,
    #[serde(default)]
    pub results: Vec<Result>,
    #[serde(default)]
    pub input_revisions: Vec<InputRevision>,
    #[serde(default)]
    pub attempts: u32,
    /// Set to `true` iff this synthesis was initiated by the rollout
    /// coordinator rather than a direct spec/synthesizer-generation change.
    #[serde(default)]
    pub deferred: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub synthesized: Option<Time>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reconciled: Option<Time>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ready: Option<Time>,
}

impl Synthesis {
    pub fn is_in_lockstep(&self) -> bool {
        crate::composition::lockstep(&self.input_revisions)
    }
}

/// True iff every entry shares one revision integer (nulls only allowed when
/// *every* entry is null) — spec.md §3 invariant 3.
pub fn lockstep(revisions: &[InputRevision]) -> bool {
    let mut seen: Option<Option<i64>> = None;
    for r in revisions {
        match &seen {
            None => seen = Some(r.revision),
            Some(first) => {
                if *first != r.revision {
                    return false;
                }
            }
        }
    }
    true
}

#[derive(CustomResource, Serialize, Deserialize, Default, Debug, PartialEq, Clone, JsonSchema)]
#[kube(
    group = "eno.azure.io",
    version = "v1",
    kind = "Composition",
    plural = "compositions",
    status = "CompositionStatus",
    derive = "PartialEq",
    derive = "Default",
    namespaced
)]
#[kube(
    printcolumn = "{\"jsonPath\": \".status.simplifiedStatus\", \"name\": \"Status\", \"type\": \"string\"}"
)]
pub struct CompositionSpec {
    pub synthesizer: ObjectRef,
    #[serde(default)]
    pub bindings: Vec<Binding>,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Default, JsonSchema)]
pub struct CompositionStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_flight_synthesis: Option<Synthesis>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_synthesis: Option<Synthesis>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_synthesis: Option<Synthesis>,
    /// Written by the rollout coordinator; consumed by the synthesis driver
    /// (spec.md §4.2, §9 "Pending bits as hand-offs").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_resynthesis: Option<Time>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub simplified_status: Option<SimplifiedStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lockstep_requires_equal_revisions() {
        let revs = vec![
            InputRevision { key: "foo".into(), revision: Some(1) },
            InputRevision { key: "bar".into(), revision: Some(1) },
        ];
        assert!(lockstep(&revs));

        let mismatched = vec![
            InputRevision { key: "foo".into(), revision: Some(1) },
            InputRevision { key: "bar".into(), revision: Some(2) },
        ];
        assert!(!lockstep(&mismatched));
    }

    #[test]
    fn lockstep_allows_all_null() {
        let revs = vec![
            InputRevision { key: "foo".into(), revision: None },
            InputRevision { key: "bar".into(), revision: None },
        ];
        assert!(lockstep(&revs));
    }

    #[test]
    fn lockstep_rejects_mixed_null_and_set() {
        let revs = vec![
            InputRevision { key: "foo".into(), revision: None },
            InputRevision { key: "bar".into(), revision: Some(1) },
        ];
        assert!(!lockstep(&revs));
    }

    #[test]
    fn empty_input_revisions_is_vacuously_in_lockstep() {
        assert!(lockstep(&[]));
    }
}
