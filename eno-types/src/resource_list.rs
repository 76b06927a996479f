//! The JSON contract exchanged with the (out-of-scope) synthesizer-execution
//! subsystem on its stdout (spec.md §6).

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::composition::{Result as SynthesisResult, Severity};

pub const API_VERSION: &str = "config.kubernetes.io/v1";
pub const KIND: &str = "ResourceList";

/// A single opaque item, identified only by apiVersion/kind/metadata before
/// being split across `ResourceSlice`s.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, JsonSchema)]
pub struct ResourceListItem {
    #[serde(rename = "apiVersion")]
    pub api_version: String,
    pub kind: String,
    pub metadata: ItemMetadata,
    #[serde(flatten)]
    pub raw: serde_json::Value,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Default, JsonSchema)]
pub struct ItemMetadata {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, flatten)]
    pub rest: serde_json::Map<String, serde_json::Value>,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Default, JsonSchema)]
pub struct ResourceList {
    #[serde(rename = "apiVersion")]
    pub api_version: String,
    pub kind: String,
    #[serde(default)]
    pub items: Vec<ResourceListItem>,
    #[serde(default)]
    pub results: Vec<SynthesisResult>,
}

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("executor output is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("executor output has apiVersion {got:?}, expected {API_VERSION:?}")]
    WrongApiVersion { got: String },
    #[error("executor output has kind {got:?}, expected {KIND:?}")]
    WrongKind { got: String },
}

impl ResourceList {
    pub fn parse(stdout: &[u8]) -> Result<Self, ParseError> {
        let list: ResourceList = serde_json::from_slice(stdout)?;
        if list.api_version != API_VERSION {
            return Err(ParseError::WrongApiVersion { got: list.api_version });
        }
        if list.kind != KIND {
            return Err(ParseError::WrongKind { got: list.kind });
        }
        Ok(list)
    }

    pub fn has_errors(&self) -> bool {
        self.results.iter().any(|r| matches!(r.severity, Severity::Error))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_resource_list() {
        let raw = br#"{
            "apiVersion": "config.kubernetes.io/v1",
            "kind": "ResourceList",
            "items": [
                {"apiVersion": "v1", "kind": "ConfigMap", "metadata": {"name": "cm-1"}, "data": {"foo": "v1"}}
            ],
            "results": [{"message": "ok", "severity": "info"}]
        }"#;
        let parsed = ResourceList::parse(raw).unwrap();
        assert_eq!(parsed.items.len(), 1);
        assert_eq!(parsed.items[0].metadata.name, "cm-1");
        assert!(!parsed.has_errors());
    }

    #[test]
    fn rejects_wrong_kind() {
        let raw = br#"{"apiVersion": "config.kubernetes.io/v1", "kind": "List", "items": [], "results": []}"#;
        assert!(matches!(ResourceList::parse(raw), Err(ParseError::WrongKind { .. })));
    }

    #[test]
    fn detects_error_results() {
        let raw = br#"{
            "apiVersion": "config.kubernetes.io/v1",
            "kind": "ResourceList",
            "items": [],
            "results": [{"message": "bad", "severity": "error"}]
        }"#;
        assert!(ResourceList::parse(raw).unwrap().has_errors());
    }
}
