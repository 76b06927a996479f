//! Status controller: the async glue around the two pure aggregator
//! functions in [`crate::aggregators`]. Reconciles one Composition by
//! fetching the `ResourceSlice`s its current synthesis produced, deriving
//! `Reconciled`/`Ready` (spec.md §4.3), then deriving `SimplifiedStatus`
//! (spec.md §4.4) from the result, and writing both in a single status
//! patch if either changed.

use std::sync::Arc;
use std::time::Duration;

use eno_types::{Composition, ResourceSlice};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::runtime::controller::Action;
use kube::{Api, Client, ResourceExt};

use crate::aggregators::composition::simplified_status;
use crate::aggregators::slice::{self, SliceObservation};
use crate::error::Error;
use crate::status_patch::patch_status_if_changed;

pub struct Context {
    pub client: Client,
}

pub async fn reconcile(composition: Arc<Composition>, ctx: Arc<Context>) -> Result<Action, Error> {
    let ns = composition.namespace().ok_or(Error::UnnamespacedObject)?;
    let name = composition.name_any();
    let _span = tracing::info_span!("status", composition = %name, namespace = %ns).entered();

    let is_deleting = composition.meta().deletion_timestamp.is_some();
    let orphan = composition
        .meta()
        .annotations
        .as_ref()
        .map(eno_types::annotations::is_orphan_deletion)
        .unwrap_or(false);

    if let Some(status) = composition.status.as_ref() {
        if let Some(current) = status.current_synthesis.as_ref() {
            let needs_aggregation = current.synthesized.is_some()
                && (current.ready.is_none() || current.reconciled.is_none());
            if needs_aggregation {
                let slices_api: Api<ResourceSlice> = Api::namespaced(ctx.client.clone(), &ns);
                let mut observations = Vec::with_capacity(current.resource_slices.len());
                for slice_name in &current.resource_slices {
                    let found = slices_api.get_opt(slice_name).await?;
                    observations.push(match found {
                        Some(s) => SliceObservation {
                            spec_resource_count: s.spec.resources.len(),
                            status: s.status,
                        },
                        None => SliceObservation { spec_resource_count: 0, status: None },
                    });
                }

                let (agg, ready_ts) = slice::aggregate(&observations, is_deleting, orphan);

                patch_status_if_changed(&ctx.client, composition.as_ref(), |c| {
                    let Some(status) = c.status.as_mut() else { return };
                    let Some(current) = status.current_synthesis.as_mut() else { return };
                    current.ready = ready_ts.map(Time);
                    current.reconciled = if agg.reconciled { Some(Time(chrono::Utc::now())) } else { None };
                })
                .await?;
            }
        }
    }

    // Re-fetch rather than reuse the aggregation's return value: the slice
    // aggregation patch above is skipped entirely when no aggregation was
    // needed, so this is the only path guaranteed to reflect the latest
    // `status.current_synthesis.{ready,reconciled}`.
    let refreshed = Api::<Composition>::namespaced(ctx.client.clone(), &ns)
        .get(&name)
        .await?;
    let refs = resolve_synthesizer_refs(&refreshed, &ctx.client).await?;
    let status = refreshed.status.clone().unwrap_or_default();
    let (simplified, error) = simplified_status(
        &status,
        refreshed.meta().deletion_timestamp.is_some(),
        &refs,
        &refreshed.spec.bindings,
    );

    patch_status_if_changed(&ctx.client, &refreshed, |c| {
        let status = c.status.get_or_insert_with(Default::default);
        status.simplified_status = Some(simplified);
        status.error = error.clone();
    })
    .await?;

    Ok(Action::requeue(Duration::from_secs(30)))
}

/// `SimplifiedStatus`'s `MissingInputs` row needs the Synthesizer's declared
/// `refs`; a get-not-found here (Synthesizer deleted out from under a
/// Composition) degrades to an empty ref list rather than failing the
/// reconcile (spec.md §7 "Not-found on owned child").
async fn resolve_synthesizer_refs(
    composition: &Composition,
    client: &Client,
) -> Result<Vec<eno_types::InputRef>, Error> {
    let synthesizers: Api<eno_types::Synthesizer> = Api::all(client.clone());
    match synthesizers.get_opt(&composition.spec.synthesizer.name).await? {
        Some(s) => Ok(s.spec.refs),
        None => Ok(Vec::new()),
    }
}

pub fn error_policy(_composition: Arc<Composition>, error: &Error, _ctx: Arc<Context>) -> Action {
    if error.is_transient() {
        Action::requeue(Duration::from_secs(1))
    } else {
        Action::requeue(Duration::from_secs(30))
    }
}
