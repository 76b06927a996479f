//! The boundary with the downstream apply/reconcile subsystem (spec.md
//! §1(b)): "the core owns the intent and reads back observed state only."
//!
//! The core never calls this trait itself — it is documented here because
//! `ResourceSlice.status.resources[].{reconciled,ready,deleted}` (consumed
//! by [`crate::aggregators::slice`]) is exactly the state this subsystem is
//! contracted to write back. Kept as a trait so integration tests can supply
//! a fake without depending on a real apply engine.

use async_trait::async_trait;
use eno_types::ResourceSliceStatus;

#[async_trait]
pub trait ReconciliationDriver: Send + Sync {
    /// Applies every resource in the named slice to the cluster and returns
    /// the per-resource state the slice status aggregator will read back.
    async fn apply_slice(
        &self,
        namespace: &str,
        slice_name: &str,
    ) -> Result<ResourceSliceStatus, kube::Error>;
}
