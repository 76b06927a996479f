use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::composition::Binding;

/// One fan-out member: Eno materialises one child Composition per Variation.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
pub struct Variation {
    pub name: String,
    pub synthesizer: String,
}

/// Groups multiple Synthesizer variations behind one parent object
/// (spec.md §3, §4.5).
#[derive(CustomResource, Serialize, Deserialize, Default, Debug, PartialEq, Clone, JsonSchema)]
#[kube(
    group = "eno.azure.io",
    version = "v1",
    kind = "Symphony",
    plural = "symphonies",
    status = "SymphonyStatus",
    derive = "PartialEq",
    derive = "Default",
    namespaced
)]
pub struct SymphonySpec {
    #[serde(default)]
    pub variations: Vec<Variation>,
    /// Bindings applied identically to every materialised child Composition
    /// (spec.md §3 "Eno materialises one child Composition per Variation" —
    /// the distillation doesn't say how a Variation acquires its bindings;
    /// resolved here as "shared across all Variations", matching a Symphony's
    /// purpose of running one input set through several Synthesizer variants).
    #[serde(default)]
    pub bindings: Vec<Binding>,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Default, JsonSchema)]
pub struct SymphonyStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub synthesized: Option<Time>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reconciled: Option<Time>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ready: Option<Time>,
    #[serde(default)]
    pub observed_generation: i64,
}
