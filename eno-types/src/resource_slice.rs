use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// One rendered resource, opaque except for identity (spec.md §9 "Tagged
/// unions over dynamic typing"). `manifest` holds the object verbatim as
/// produced by the executor, modulo Eno-reserved annotation stripping done
/// by the (out-of-scope) reconciliation driver.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, JsonSchema)]
pub struct SliceResource {
    pub api_version: String,
    pub kind: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    pub manifest: serde_json::Value,
}

/// An owned child of a Composition holding up to N rendered resources and
/// their observed state (spec.md §3).
#[derive(CustomResource, Serialize, Deserialize, Default, Debug, PartialEq, Clone, JsonSchema)]
#[kube(
    group = "eno.azure.io",
    version = "v1",
    kind = "ResourceSlice",
    plural = "resourceslices",
    status = "ResourceSliceStatus",
    derive = "PartialEq",
    derive = "Default",
    namespaced
)]
pub struct ResourceSliceSpec {
    #[serde(default)]
    pub resources: Vec<SliceResource>,
}

/// Per-resource observed state, written by the (out-of-scope) reconciliation
/// driver and read by the slice status aggregator (spec.md §4.3).
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Default, JsonSchema)]
pub struct ResourceState {
    #[serde(default)]
    pub reconciled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ready: Option<Time>,
    #[serde(default)]
    pub deleted: bool,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Default, JsonSchema)]
pub struct ResourceSliceStatus {
    #[serde(default)]
    pub resources: Vec<ResourceState>,
}
