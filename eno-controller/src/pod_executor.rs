//! A concrete [`Executor`] that launches the synthesizer-execution
//! subsystem as a Kubernetes `Pod` (spec.md §1(a) "the core only launches
//! it and consumes its output"). Polling rather than blocking on pod
//! completion keeps every call a single short, synchronous store read —
//! the driver's reconcile requeues and checks again (spec.md §5
//! "Reconciles are short, synchronous, and idempotent").

use std::collections::BTreeMap;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{
    Container, EnvVar, Pod, PodSpec, PodStatus, ResourceRequirements,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use kube::api::{ObjectMeta, PostParams};
use kube::{Api, Client};

use crate::executor::{ExecutionRequest, Executor, ExecutorOutcome};
use eno_types::ResourceList;

/// Label applied to every executor Pod so they can be listed/cleaned up
/// independently of the Composition that spawned them.
pub const MANAGED_BY_LABEL: &str = "eno.azure.io/synthesis-uuid";

#[derive(Clone)]
pub struct PodExecutor {
    client: Client,
    /// CPU/memory ceiling applied to every executor Pod (spec.md §5
    /// "executor concurrency limit" is enforced by the caller via a
    /// semaphore; this is the per-pod ceiling, not the fleet-wide one).
    resource_limits: ResourceRequirements,
}

impl PodExecutor {
    pub fn new(client: Client) -> Self {
        let mut limits = BTreeMap::new();
        limits.insert("cpu".to_string(), Quantity("500m".to_string()));
        limits.insert("memory".to_string(), Quantity("256Mi".to_string()));
        Self {
            client,
            resource_limits: ResourceRequirements {
                limits: Some(limits),
                ..Default::default()
            },
        }
    }

    fn pod_name(uuid: uuid::Uuid) -> String {
        format!("eno-synthesis-{uuid}")
    }

    fn build_pod(&self, name: &str, request: &ExecutionRequest) -> Pod {
        let env = request
            .env
            .iter()
            .map(|(name, value)| EnvVar { name: name.clone(), value: Some(value.clone()), ..Default::default() })
            .chain(request.inputs.iter().filter_map(|(key, value)| {
                Some(EnvVar {
                    name: format!("ENO_INPUT_{}", key.to_uppercase()),
                    value: Some(serde_json::to_string(value).ok()?),
                    ..Default::default()
                })
            }))
            .collect();

        Pod {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(request.composition_namespace.clone()),
                labels: Some(BTreeMap::from([
                    (MANAGED_BY_LABEL.to_string(), request.synthesis_uuid.to_string()),
                    ("eno.azure.io/composition".to_string(), request.composition_name.clone()),
                ])),
                ..Default::default()
            },
            spec: Some(PodSpec {
                restart_policy: Some("Never".to_string()),
                containers: vec![Container {
                    name: "synthesizer".to_string(),
                    image: Some(request.image.clone()),
                    args: Some(request.command.clone()),
                    env: Some(env),
                    resources: Some(self.resource_limits.clone()),
                    ..Default::default()
                }],
                ..Default::default()
            }),
            status: None,
        }
    }
}

#[async_trait]
impl Executor for PodExecutor {
    async fn run(&self, request: ExecutionRequest) -> ExecutorOutcome {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), &request.composition_namespace);
        let name = Self::pod_name(request.synthesis_uuid);

        let existing = match pods.get_opt(&name).await {
            Ok(existing) => existing,
            Err(e) => return ExecutorOutcome::Failed(format!("failed to query executor pod {name}: {e}")),
        };

        let Some(pod) = existing else {
            let manifest = self.build_pod(&name, &request);
            return match pods.create(&PostParams::default(), &manifest).await {
                Ok(_) => ExecutorOutcome::Pending,
                Err(kube::Error::Api(resp)) if resp.code == 409 => ExecutorOutcome::Pending,
                Err(e) => ExecutorOutcome::Failed(format!("failed to launch executor pod {name}: {e}")),
            };
        };

        match phase_of(&pod) {
            Phase::Succeeded => self.collect_output(&pods, &name).await,
            Phase::Failed => ExecutorOutcome::Failed(format!("executor pod {name} failed")),
            Phase::Pending | Phase::Running | Phase::Unknown => ExecutorOutcome::Pending,
        }
    }
}

impl PodExecutor {
    async fn collect_output(&self, pods: &Api<Pod>, name: &str) -> ExecutorOutcome {
        let logs = match pods.logs(name, &Default::default()).await {
            Ok(logs) => logs,
            Err(e) => return ExecutorOutcome::Failed(format!("failed to fetch executor logs for {name}: {e}")),
        };
        match ResourceList::parse(logs.as_bytes()) {
            Ok(list) => ExecutorOutcome::Succeeded(list),
            Err(e) => ExecutorOutcome::Failed(format!("executor output for {name} could not be parsed: {e}")),
        }
    }
}

enum Phase {
    Pending,
    Running,
    Succeeded,
    Failed,
    Unknown,
}

fn phase_of(pod: &Pod) -> Phase {
    let phase = pod.status.as_ref().and_then(|s: &PodStatus| s.phase.as_deref());
    match phase {
        Some("Succeeded") => Phase::Succeeded,
        Some("Failed") => Phase::Failed,
        Some("Running") => Phase::Running,
        Some("Pending") => Phase::Pending,
        _ => Phase::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_of_maps_known_phases() {
        let succeeded = Pod {
            status: Some(PodStatus { phase: Some("Succeeded".into()), ..Default::default() }),
            ..Default::default()
        };
        assert!(matches!(phase_of(&succeeded), Phase::Succeeded));

        let unset = Pod::default();
        assert!(matches!(phase_of(&unset), Phase::Unknown));
    }
}
