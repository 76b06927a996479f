//! The boundary with the synthesizer-execution subsystem (spec.md §1(a)):
//! "a pod/process that runs a user image and returns a resource list — the
//! core only launches it and consumes its output." This module defines only
//! that boundary; the pod/process lifecycle itself is out of scope.

use async_trait::async_trait;
use eno_types::{Composition, ResourceList, Synthesizer};

/// Everything the Synthesis Driver needs to launch one execution.
#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    pub composition_namespace: String,
    pub composition_name: String,
    pub synthesis_uuid: uuid::Uuid,
    pub image: String,
    pub command: Vec<String>,
    pub env: Vec<(String, String)>,
    /// Rendered input objects, keyed by the `Synthesizer.refs[].key` they bind.
    pub inputs: Vec<(String, serde_json::Value)>,
}

/// Launches a synthesis and returns its eventual result. Implementations own
/// the process/pod lifecycle, concurrency limiting (spec.md §5 "executor
/// concurrency limit"), and timeout handling; the driver only needs the
/// three outcomes below.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn run(&self, request: ExecutionRequest) -> ExecutorOutcome;
}

pub enum ExecutorOutcome {
    Succeeded(ResourceList),
    /// Non-zero exit or unparsable output (spec.md §7).
    Failed(String),
    /// The execution is still running; the driver should not start another
    /// for the same UUID but also has nothing new to promote yet.
    Pending,
}

/// Builds the (key, input-object) pairs and `InputRevisions` for a synthesis
/// from a Composition's bindings, given a resolver over the cluster.
#[async_trait]
pub trait InputResolver: Send + Sync {
    /// Resolves one binding to its current object and a revision derived
    /// from its `ResourceVersion` (spec.md §4.1 "Input selection").
    async fn resolve(
        &self,
        synthesizer: &Synthesizer,
        composition: &Composition,
    ) -> Result<Vec<ResolvedInput>, ResolveError>;
}

pub struct ResolvedInput {
    pub key: String,
    pub revision: i64,
    pub object: serde_json::Value,
}

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("binding for input key {key:?} is missing")]
    MissingBinding { key: String },
    #[error("bound object for input key {key:?} was not found")]
    ObjectNotFound { key: String },
    #[error(transparent)]
    Kube(#[from] kube::Error),
}
