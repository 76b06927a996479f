//! Generic "mutate a clone's status, diff against the original, patch only
//! if something changed" helper shared by every reconciler.
//!
//! Grounded on `eosin-storage-operator`'s `util::patch::patch_status`
//! (`storage-operator/src/util/patch.rs`), generalized with an explicit
//! empty-diff short-circuit so repeated reconciles with unchanged observed
//! state never write to the store — spec.md §8 testable property 6
//! ("Idempotence: running any reconcile twice with unchanged inputs produces
//! zero store writes on the second run") and §5's conflict-avoidance via
//! optimistic concurrency both depend on this.

use kube::api::{Patch, PatchParams};
use kube::core::NamespaceResourceScope;
use kube::{Api, Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;

pub const FIELD_MANAGER: &str = "eno-controller";

/// Applies `mutate` to a clone of `instance`'s status; if the JSON diff is
/// non-empty, server-side-applies a JSON patch against the `status`
/// subresource and returns the updated object. Returns `None` when nothing
/// changed, so callers can skip the requeue-because-we-just-wrote dance.
pub async fn patch_status_if_changed<T>(
    client: &Client,
    instance: &T,
    mutate: impl FnOnce(&mut T),
) -> kube::Result<Option<T>>
where
    T: Clone + Resource<Scope = NamespaceResourceScope> + Serialize + DeserializeOwned + Debug,
    T::DynamicType: Default,
{
    let mut modified = instance.clone();
    mutate(&mut modified);

    let before = serde_json::to_value(instance).expect("Composition-family types always serialize");
    let after = serde_json::to_value(&modified).expect("Composition-family types always serialize");
    let diff = json_patch::diff(&before, &after);
    if diff.0.is_empty() {
        return Ok(None);
    }

    let name = instance.name_any();
    let namespace = instance
        .namespace()
        .expect("Composition-family objects are namespaced");
    let api: Api<T> = Api::namespaced(client.clone(), &namespace);
    let patched = api
        .patch_status(&name, &PatchParams::apply(FIELD_MANAGER), &Patch::Json::<T>(diff))
        .await?;
    Ok(Some(patched))
}
