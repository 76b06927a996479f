use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::duration::KubeDuration;

/// One input a `Synthesizer` expects a binding for (spec.md §3 "input refs").
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
pub struct InputRef {
    /// Logical name the synthesizer uses to look up this input.
    pub key: String,
    /// `kind` (or `group/version, kind`) the bound object must match.
    pub resource: String,
    /// When `true`, a missing binding does not block synthesis.
    #[serde(default)]
    pub optional: bool,
}

/// A reusable recipe: an image + input contract that `Composition`s bind to.
///
/// Immutable once a generation is observed downstream — mutating any field
/// here bumps `metadata.generation`, which is the rollout coordinator's and
/// synthesis driver's sole trigger (spec.md §3).
#[derive(CustomResource, Serialize, Deserialize, Default, Debug, PartialEq, Clone, JsonSchema)]
#[kube(
    group = "eno.azure.io",
    version = "v1",
    kind = "Synthesizer",
    plural = "synthesizers",
    derive = "PartialEq",
    derive = "Default"
)]
pub struct SynthesizerSpec {
    /// Container image reference for the synthesizer-execution subsystem.
    pub image: String,
    /// Arguments passed to the image's entrypoint.
    #[serde(default)]
    pub command: Vec<String>,
    /// Inputs this synthesizer consumes, one per `Composition.bindings` entry.
    #[serde(default)]
    pub refs: Vec<InputRef>,
    /// Minimum interval between successive rollouts across bound Compositions,
    /// formatted like `"1h"` / `"90s"`; parsed with [`KubeDuration::parse`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rollout_cooldown: Option<String>,
    /// Extra environment passed to the executor; changing this forces
    /// resynthesis the same as a spec-generation bump (spec.md §4.1).
    #[serde(default)]
    pub synthesis_env: Vec<EnvVar>,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
pub struct EnvVar {
    pub name: String,
    pub value: String,
}

impl Synthesizer {
    /// Cooldown used by the rollout coordinator, defaulting to zero (no
    /// pacing) when unset or unparsable.
    pub fn rollout_cooldown(&self) -> std::time::Duration {
        self.spec
            .rollout_cooldown
            .as_deref()
            .and_then(|s| KubeDuration::parse(s).ok())
            .map(KubeDuration::as_duration)
            .unwrap_or_default()
    }
}
