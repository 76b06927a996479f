//! Async reconcile wrapper around [`crate::aggregators::symphony`]'s pure
//! reduction: materialises one child `Composition` per `Variation` (spec.md
//! §3 "Eno materialises one child Composition per Variation"), lists the
//! owned children back, derives the aggregate, and patches the Symphony's
//! status if it changed.

use std::sync::Arc;
use std::time::Duration;

use eno_types::{Composition, CompositionSpec, ObjectRef, Symphony, SymphonyStatus};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{OwnerReference, Time};
use kube::api::{ListParams, Patch, PatchParams};
use kube::runtime::controller::Action;
use kube::{Api, Client, Resource, ResourceExt};

use crate::aggregators::symphony::{aggregate, ChildObservation};
use crate::error::Error;
use crate::status_patch::{patch_status_if_changed, FIELD_MANAGER};

pub struct Context {
    pub client: Client,
}

/// Child `Composition` name for a given Variation: `<symphony>-<variation>`.
/// [`reconcile`]'s variation-name lookup below strips this same prefix back
/// off to recover grouping for the aggregator.
fn child_name(symphony: &str, variation: &str) -> String {
    format!("{symphony}-{variation}")
}

fn owner_ref(symphony: &Symphony) -> Result<OwnerReference, Error> {
    Ok(OwnerReference {
        api_version: Symphony::api_version(&()).to_string(),
        kind: Symphony::kind(&()).to_string(),
        name: symphony.meta().name.clone().ok_or(Error::UnnamedObject)?,
        uid: symphony
            .meta()
            .uid
            .clone()
            .ok_or_else(|| Error::InvariantViolation("Symphony has no uid".into()))?,
        controller: Some(true),
        block_owner_deletion: Some(true),
        ..Default::default()
    })
}

/// Server-side-applies one child Composition per Variation, owned by
/// `symphony`. Idempotent: re-applying an unchanged Composition is a no-op
/// at the store (spec.md §8 testable property 6).
async fn ensure_children(
    symphony: &Symphony,
    ns: &str,
    compositions_api: &Api<Composition>,
) -> Result<(), Error> {
    let owner = owner_ref(symphony)?;
    for variation in &symphony.spec.variations {
        let name = child_name(&symphony.name_any(), &variation.name);
        let mut child = Composition::new(
            &name,
            CompositionSpec {
                synthesizer: ObjectRef {
                    api_version: "eno.azure.io/v1".to_string(),
                    kind: "Synthesizer".to_string(),
                    name: variation.synthesizer.clone(),
                    namespace: None,
                },
                bindings: symphony.spec.bindings.clone(),
            },
        );
        child.metadata.namespace = Some(ns.to_string());
        child.metadata.owner_references = Some(vec![owner.clone()]);

        compositions_api
            .patch(
                &name,
                &PatchParams::apply(FIELD_MANAGER).force(),
                &Patch::Apply(&child),
            )
            .await?;
    }
    Ok(())
}

pub async fn reconcile(symphony: Arc<Symphony>, ctx: Arc<Context>) -> Result<Action, Error> {
    let ns = symphony.namespace().ok_or(Error::UnnamespacedObject)?;
    let _span = tracing::info_span!("symphony", symphony = %symphony.name_any(), namespace = %ns).entered();

    let compositions_api: Api<Composition> = Api::namespaced(ctx.client.clone(), &ns);
    let owner_uid = symphony
        .meta()
        .uid
        .as_deref()
        .ok_or_else(|| Error::InvariantViolation("Symphony has no uid".into()))?;

    if symphony.meta().deletion_timestamp.is_none() {
        ensure_children(&symphony, &ns, &compositions_api).await?;
    }

    let children = compositions_api.list(&ListParams::default()).await?;
    let owned: Vec<&Composition> = children
        .items
        .iter()
        .filter(|c| {
            c.meta()
                .owner_references
                .as_ref()
                .map(|refs| refs.iter().any(|r| r.uid == owner_uid))
                .unwrap_or(false)
        })
        .collect();

    // Map each owned child back to the Symphony variation that produced it
    // via its name suffix (`<symphony>-<variation>`, spec.md §3 "fan-out").
    let prefix = format!("{}-", symphony.name_any());
    let named: Vec<(String, &eno_types::CompositionStatus)> = owned
        .iter()
        .filter_map(|c| {
            let variation_name = c.name_any().strip_prefix(&prefix)?.to_string();
            let status = c.status.as_ref()?;
            Some((variation_name, status))
        })
        .collect();

    let observations: Vec<ChildObservation<'_>> = named
        .iter()
        .map(|(name, status)| ChildObservation {
            variation_name: name.as_str(),
            status,
        })
        .collect();

    let variation_names: Vec<&str> = symphony
        .spec
        .variations
        .iter()
        .map(|v| v.name.as_str())
        .collect();

    let Some(agg) = aggregate(&variation_names, &observations) else {
        return Ok(Action::requeue(Duration::from_secs(10)));
    };

    let observed_generation = symphony.meta().generation.unwrap_or(0);
    patch_status_if_changed(&ctx.client, symphony.as_ref(), |s| {
        s.status = Some(SymphonyStatus {
            synthesized: agg.synthesized.map(Time),
            reconciled: agg.reconciled.map(Time),
            ready: agg.ready.map(Time),
            observed_generation,
        });
    })
    .await?;

    Ok(Action::requeue(Duration::from_secs(15)))
}

pub fn error_policy(_symphony: Arc<Symphony>, error: &Error, _ctx: Arc<Context>) -> Action {
    if error.is_transient() {
        Action::requeue(Duration::from_secs(1))
    } else {
        Action::requeue(Duration::from_secs(30))
    }
}
