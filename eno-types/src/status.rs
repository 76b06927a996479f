use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Human-readable summary of a Composition's state (spec.md §3, §4.4).
///
/// Derivation lives in `eno-controller::aggregator::composition` — this type
/// is purely the persisted/observable shape.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "PascalCase")]
pub enum SimplifiedStatus {
    PendingSynthesis,
    Synthesizing,
    Reconciling,
    NotReady,
    Ready,
    Deleting,
    MissingInputs,
    MismatchedInputs,
    WaitingForCooldown,
}

impl std::fmt::Display for SimplifiedStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::PendingSynthesis => "PendingSynthesis",
            Self::Synthesizing => "Synthesizing",
            Self::Reconciling => "Reconciling",
            Self::NotReady => "NotReady",
            Self::Ready => "Ready",
            Self::Deleting => "Deleting",
            Self::MissingInputs => "MissingInputs",
            Self::MismatchedInputs => "MismatchedInputs",
            Self::WaitingForCooldown => "WaitingForCooldown",
        };
        f.write_str(s)
    }
}
