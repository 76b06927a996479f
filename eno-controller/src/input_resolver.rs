//! Resolves `Composition.bindings` against the cluster, producing the
//! `(Key, Revision, object)` triples the Synthesis Driver needs (spec.md
//! §4.1 "Input selection") — one per `Synthesizer.refs[]` entry.

use async_trait::async_trait;
use eno_types::{Composition, Synthesizer};
use kube::core::GroupVersionKind;
use kube::{discovery, Api, Client, ResourceExt};

use crate::executor::{InputResolver, ResolveError, ResolvedInput};

#[derive(Clone)]
pub struct DynamicInputResolver {
    client: Client,
}

impl DynamicInputResolver {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl InputResolver for DynamicInputResolver {
    async fn resolve(
        &self,
        synthesizer: &Synthesizer,
        composition: &Composition,
    ) -> Result<Vec<ResolvedInput>, ResolveError> {
        let mut resolved = Vec::with_capacity(synthesizer.spec.refs.len());

        for input_ref in &synthesizer.spec.refs {
            let binding = composition.spec.bindings.iter().find(|b| b.key == input_ref.key);
            let Some(binding) = binding else {
                if input_ref.optional {
                    continue;
                }
                return Err(ResolveError::MissingBinding { key: input_ref.key.clone() });
            };

            let namespace = binding
                .resource
                .namespace
                .clone()
                .or_else(|| composition.namespace())
                .unwrap_or_default();

            let gvk = parse_gvk(&binding.resource.api_version, &binding.resource.kind);
            let (api_resource, _caps) = discovery::pinned_kind(&self.client, &gvk)
                .await
                .map_err(ResolveError::Kube)?;
            let api: Api<kube::core::DynamicObject> =
                Api::namespaced_with(self.client.clone(), &namespace, &api_resource);

            let object = api
                .get_opt(&binding.resource.name)
                .await
                .map_err(ResolveError::Kube)?
                .ok_or_else(|| ResolveError::ObjectNotFound { key: input_ref.key.clone() })?;

            let revision = object
                .resource_version()
                .and_then(|rv| rv.parse::<i64>().ok())
                .unwrap_or(0);

            resolved.push(ResolvedInput {
                key: input_ref.key.clone(),
                revision,
                object: serde_json::to_value(&object).unwrap_or(serde_json::Value::Null),
            });
        }

        Ok(resolved)
    }
}

/// Splits an `ObjectRef.api_version` (`"v1"` or `"group/version"`) plus
/// `kind` into a [`GroupVersionKind`].
fn parse_gvk(api_version: &str, kind: &str) -> GroupVersionKind {
    match api_version.split_once('/') {
        Some((group, version)) => GroupVersionKind::gvk(group, version, kind),
        None => GroupVersionKind::gvk("", api_version, kind),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_core_api_version_with_empty_group() {
        let gvk = parse_gvk("v1", "ConfigMap");
        assert_eq!(gvk.group, "");
        assert_eq!(gvk.version, "v1");
        assert_eq!(gvk.kind, "ConfigMap");
    }

    #[test]
    fn parses_grouped_api_version() {
        let gvk = parse_gvk("apps/v1", "Deployment");
        assert_eq!(gvk.group, "apps");
        assert_eq!(gvk.version, "v1");
        assert_eq!(gvk.kind, "Deployment");
    }
}
