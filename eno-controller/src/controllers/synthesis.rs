//! Synthesis Driver (spec.md §4.1): owns each Composition's synthesis
//! lifecycle — selecting inputs, launching an executor, ingesting its
//! output into `ResourceSlice`s, and transitioning the three-slot synthesis
//! pointer (`InFlight`/`Current`/`Previous`).

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use eno_types::{
    annotations, Composition, CompositionStatus, InputRevision, ResourceSlice, ResourceSliceSpec,
    SliceResource, Synthesis, Synthesizer,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{OwnerReference, Time};
use kube::api::{Patch, PatchParams};
use kube::runtime::controller::Action;
use kube::{Api, Client, Resource, ResourceExt};
use tracing::{info, warn};

use crate::error::Error;
use crate::executor::{ExecutionRequest, Executor, ExecutorOutcome, InputResolver};
use crate::status_patch::{patch_status_if_changed, FIELD_MANAGER};

/// Guards a Composition from being removed from the store before its
/// `PreviousSynthesis`'s slices are confirmed gone (spec.md §3 lifecycle,
/// scenario S5). Added on first reconcile, removed once
/// [`reconcile_deletion`] observes every referenced slice is gone.
pub const FINALIZER: &str = "eno.azure.io/composition";

/// Phases of the per-Composition state machine (spec.md §4.1 table). Derived
/// on every reconcile, never persisted directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    NeedsSynthesis,
    Synthesizing,
    Applying,
    Ready,
    Deleting,
}

/// Maximum attempts before the backoff stops growing (spec.md §7 "retry with
/// exponential backoff up to a cap").
const MAX_BACKOFF: Duration = Duration::from_secs(300);
const BASE_BACKOFF: Duration = Duration::from_secs(2);

pub fn phase_for(status: &CompositionStatus, spec_generation: i64, is_deleting: bool) -> Phase {
    if is_deleting {
        return Phase::Deleting;
    }
    if status.in_flight_synthesis.is_some() {
        return Phase::Synthesizing;
    }
    let needs = match &status.current_synthesis {
        None => true,
        Some(current) => {
            current.observed_composition_generation < spec_generation || status.pending_resynthesis.is_some()
        }
    };
    if needs {
        return Phase::NeedsSynthesis;
    }
    let Some(current) = &status.current_synthesis else {
        return Phase::NeedsSynthesis;
    };
    if current.synthesized.is_some() && current.reconciled.is_none() {
        return Phase::Applying;
    }
    if current.ready.is_some() && current.reconciled.is_some() {
        return Phase::Ready;
    }
    Phase::Idle
}

/// Exponential backoff as a pure function of the attempt count, so retries
/// stay replay-safe (spec.md §5 "Any reconcile logic MUST be a pure function
/// of observed state").
pub fn backoff_for_attempt(attempts: u32) -> Duration {
    let scaled = BASE_BACKOFF.saturating_mul(1u32.checked_shl(attempts).unwrap_or(u32::MAX));
    scaled.min(MAX_BACKOFF)
}

/// `swapStates`: moves the current synthesis to `PreviousSynthesis` (if it
/// completed) and installs a fresh `InFlightSynthesis` (spec.md §4.1).
///
/// `deferred` always reflects *this* trigger, clearing any stale bit left
/// over from a prior rollout-initiated attempt (spec.md §9, third open
/// question, resolved in DESIGN.md).
pub fn stage_new_synthesis(
    status: &mut CompositionStatus,
    spec_generation: i64,
    synthesizer_generation: i64,
    deferred: bool,
    new_uuid: String,
) {
    if let Some(current) = status.current_synthesis.take() {
        if current.synthesized.is_some() {
            status.previous_synthesis = Some(current);
        }
    }
    status.in_flight_synthesis = Some(Synthesis {
        uuid: Some(new_uuid),
        observed_composition_generation: spec_generation,
        observed_synthesizer_generation: synthesizer_generation,
        attempts: 0,
        deferred,
        ..Default::default()
    });
    status.pending_resynthesis = None;
}

/// Records a failed execution: increments `Attempts`, appends an error
/// `Result`, and leaves `InFlightSynthesis` set for retry (spec.md §7).
pub fn record_failure(status: &mut CompositionStatus, message: String) {
    if let Some(in_flight) = status.in_flight_synthesis.as_mut() {
        in_flight.attempts += 1;
        in_flight.results.push(eno_types::SynthesisResult {
            message,
            severity: eno_types::Severity::Error,
        });
    }
}

/// Promotes `InFlightSynthesis` to `CurrentSynthesis` on executor success
/// (spec.md §4.1). Warnings never block promotion.
pub fn promote_on_success(status: &mut CompositionStatus, slice_names: Vec<String>, now: Time) {
    let Some(mut synthesis) = status.in_flight_synthesis.take() else { return };
    synthesis.resource_slices = slice_names;
    synthesis.synthesized = Some(now);
    status.current_synthesis = Some(synthesis);
}

/// Adds [`FINALIZER`] if absent. A plain merge patch rather than
/// `kube_runtime::finalizer`'s `Event`-wrapped combinator, since deletion
/// handling here is already folded into [`phase_for`]'s state machine.
async fn ensure_finalizer<E, R>(composition: &Composition, ctx: &Context<E, R>) -> Result<(), Error> {
    if composition.finalizers().iter().any(|f| f == FINALIZER) {
        return Ok(());
    }
    let ns = composition.namespace().ok_or(Error::UnnamespacedObject)?;
    let api: Api<Composition> = Api::namespaced(ctx.client.clone(), &ns);
    let mut finalizers = composition.finalizers().to_vec();
    finalizers.push(FINALIZER.to_string());
    let patch = serde_json::json!({ "metadata": { "finalizers": finalizers } });
    api.patch(
        &composition.name_any(),
        &PatchParams::apply(FIELD_MANAGER).force(),
        &Patch::Merge(patch),
    )
    .await?;
    Ok(())
}

/// Removes [`FINALIZER`], allowing the store to complete the delete. No-op
/// if already absent.
async fn remove_finalizer<E, R>(composition: &Composition, ctx: &Context<E, R>) -> Result<(), Error> {
    let remaining: Vec<String> = composition
        .finalizers()
        .iter()
        .filter(|f| *f != FINALIZER)
        .cloned()
        .collect();
    if remaining.len() == composition.finalizers().len() {
        return Ok(());
    }
    let ns = composition.namespace().ok_or(Error::UnnamespacedObject)?;
    let api: Api<Composition> = Api::namespaced(ctx.client.clone(), &ns);
    let patch = serde_json::json!({ "metadata": { "finalizers": remaining } });
    api.patch(
        &composition.name_any(),
        &PatchParams::apply(FIELD_MANAGER).force(),
        &Patch::Merge(patch),
    )
    .await?;
    Ok(())
}

fn owner_ref(owner: &Composition) -> Result<OwnerReference, Error> {
    Ok(OwnerReference {
        api_version: Composition::api_version(&()).to_string(),
        kind: Composition::kind(&()).to_string(),
        name: owner.meta().name.clone().ok_or(Error::UnnamedObject)?,
        uid: owner
            .meta()
            .uid
            .clone()
            .ok_or_else(|| Error::InvariantViolation("owner Composition has no uid".into()))?,
        controller: Some(true),
        block_owner_deletion: Some(true),
        ..Default::default()
    })
}

pub struct Context<E, R> {
    pub client: Client,
    pub executor: Arc<E>,
    pub input_resolver: Arc<R>,
    pub max_slice_resources: usize,
}

/// Reconciles one Composition's synthesis lifecycle.
pub async fn reconcile<E, R>(
    composition: Arc<Composition>,
    ctx: Arc<Context<E, R>>,
) -> Result<Action, Error>
where
    E: Executor,
    R: InputResolver,
{
    let ns = composition.namespace().ok_or(Error::UnnamespacedObject)?;
    let name = composition.name_any();
    let _span = tracing::info_span!("synthesis", composition = %name, namespace = %ns).entered();

    let is_deleting = composition.meta().deletion_timestamp.is_some();
    let spec_generation = composition.meta().generation.unwrap_or(0);
    let status = composition.status.clone().unwrap_or_default();

    if !is_deleting {
        ensure_finalizer(&composition, &ctx).await?;
    }

    match phase_for(&status, spec_generation, is_deleting) {
        Phase::Deleting => reconcile_deletion(&composition, &ctx).await,
        Phase::NeedsSynthesis => start_synthesis(&composition, &status, spec_generation, &ctx).await,
        Phase::Synthesizing => drive_in_flight(&composition, &status, &ctx).await,
        Phase::Applying | Phase::Ready | Phase::Idle => Ok(Action::requeue(Duration::from_secs(300))),
    }
}

async fn start_synthesis<E: Executor, R: InputResolver>(
    composition: &Composition,
    status: &CompositionStatus,
    spec_generation: i64,
    ctx: &Context<E, R>,
) -> Result<Action, Error> {
    let synthesizers: Api<Synthesizer> = Api::all(ctx.client.clone());
    let synthesizer = synthesizers.get(&composition.spec.synthesizer.name).await?;

    let inputs = match ctx.input_resolver.resolve(&synthesizer, composition).await {
        Ok(inputs) => inputs,
        Err(crate::executor::ResolveError::MissingBinding { key })
        | Err(crate::executor::ResolveError::ObjectNotFound { key }) => {
            info!(key, "missing input; waiting for binding");
            return Ok(Action::requeue(Duration::from_secs(15)));
        }
        Err(crate::executor::ResolveError::Kube(e)) => return Err(Error::Kube(e)),
    };

    let deferred = status.pending_resynthesis.is_some();
    let new_uuid = uuid::Uuid::new_v4().to_string();

    let mut input_revisions: Vec<InputRevision> = inputs
        .iter()
        .map(|i| InputRevision { key: i.key.clone(), revision: Some(i.revision) })
        .collect();
    input_revisions.sort_by(|a, b| a.key.cmp(&b.key));

    let synthesizer_generation = synthesizer.meta().generation.unwrap_or(0);
    let updated = patch_status_if_changed(&ctx.client, composition, |c| {
        let status = c.status.get_or_insert_with(Default::default);
        stage_new_synthesis(status, spec_generation, synthesizer_generation, deferred, new_uuid.clone());
        if let Some(in_flight) = status.in_flight_synthesis.as_mut() {
            in_flight.input_revisions = input_revisions.clone();
        }
    })
    .await?;

    if updated.is_none() {
        return Err(Error::InvariantViolation(
            "start_synthesis computed no status change".into(),
        ));
    }

    Ok(Action::requeue(Duration::from_secs(1)))
}

/// Re-resolves bound inputs to hand their current object values to the
/// executor (spec.md §6 ResourceList consumption starts from these).
/// `InFlightSynthesis.InputRevisions` already pinned the revisions at
/// staging time; a binding disappearing between staging and execution is
/// surfaced as a retryable failure rather than silently starting the
/// executor with a missing input.
async fn resolve_inputs_for_execution<E: Executor, R: InputResolver>(
    composition: &Composition,
    synthesizer: &Synthesizer,
    ctx: &Context<E, R>,
) -> Result<Vec<(String, serde_json::Value)>, Error> {
    match ctx.input_resolver.resolve(synthesizer, composition).await {
        Ok(inputs) => Ok(inputs.into_iter().map(|i| (i.key, i.object)).collect()),
        Err(crate::executor::ResolveError::MissingBinding { key })
        | Err(crate::executor::ResolveError::ObjectNotFound { key }) => {
            Err(Error::MissingInput { key })
        }
        Err(crate::executor::ResolveError::Kube(e)) => Err(Error::Kube(e)),
    }
}

async fn drive_in_flight<E: Executor, R: InputResolver>(
    composition: &Composition,
    status: &CompositionStatus,
    ctx: &Context<E, R>,
) -> Result<Action, Error> {
    let in_flight = status.in_flight_synthesis.as_ref().expect("Phase::Synthesizing implies InFlight");
    let synthesis_uuid = in_flight
        .uuid
        .as_deref()
        .and_then(|s| uuid::Uuid::parse_str(s).ok())
        .ok_or_else(|| Error::InvariantViolation("InFlightSynthesis missing uuid".into()))?;

    let ns = composition.namespace().unwrap();
    let synthesizers: Api<Synthesizer> = Api::all(ctx.client.clone());
    let synthesizer = synthesizers.get(&composition.spec.synthesizer.name).await?;

    let request = ExecutionRequest {
        composition_namespace: ns.clone(),
        composition_name: composition.name_any(),
        synthesis_uuid,
        image: synthesizer.spec.image.clone(),
        command: synthesizer.spec.command.clone(),
        env: synthesizer
            .spec
            .synthesis_env
            .iter()
            .map(|e| (e.name.clone(), e.value.clone()))
            .collect(),
        inputs: resolve_inputs_for_execution(composition, &synthesizer, ctx).await?,
    };

    match ctx.executor.run(request).await {
        ExecutorOutcome::Pending => Ok(Action::requeue(Duration::from_secs(2))),
        ExecutorOutcome::Failed(message) => {
            warn!(message, "synthesis execution failed");
            let attempts_before = in_flight.attempts;
            patch_status_if_changed(&ctx.client, composition, |c| {
                if let Some(status) = c.status.as_mut() {
                    record_failure(status, message.clone());
                }
            })
            .await?;
            metrics::counter!("eno_synthesis_attempts_total", "result" => "failure").increment(1);
            Ok(Action::requeue(backoff_for_attempt(attempts_before)))
        }
        ExecutorOutcome::Succeeded(list) => {
            if list.has_errors() {
                let attempts_before = in_flight.attempts;
                let message = list
                    .results
                    .iter()
                    .find(|r| matches!(r.severity, eno_types::Severity::Error))
                    .map(|r| r.message.clone())
                    .unwrap_or_else(|| "executor reported an error result".into());
                patch_status_if_changed(&ctx.client, composition, |c| {
                    if let Some(status) = c.status.as_mut() {
                        record_failure(status, message.clone());
                    }
                })
                .await?;
                return Ok(Action::requeue(backoff_for_attempt(attempts_before)));
            }

            let slice_names = write_slices(composition, &list, ctx).await?;
            patch_status_if_changed(&ctx.client, composition, |c| {
                if let Some(status) = c.status.as_mut() {
                    promote_on_success(status, slice_names.clone(), Time(Utc::now()));
                }
            })
            .await?;
            metrics::counter!("eno_synthesis_attempts_total", "result" => "success").increment(1);
            Ok(Action::requeue(Duration::from_secs(5)))
        }
    }
}

/// Splits executor output into ResourceSlices of at most
/// `max_slice_resources` items each and creates them, owned by `composition`.
async fn write_slices<E: Executor, R: InputResolver>(
    composition: &Composition,
    list: &eno_types::ResourceList,
    ctx: &Context<E, R>,
) -> Result<Vec<String>, Error> {
    let ns = composition.namespace().unwrap();
    let slices_api: Api<ResourceSlice> = Api::namespaced(ctx.client.clone(), &ns);
    let owner = owner_ref(composition)?;

    let chunk_size = ctx.max_slice_resources.max(1);
    let mut names = Vec::new();
    for (i, chunk) in list.items.chunks(chunk_size).enumerate() {
        let slice_name = format!("{}-{}", composition.name_any(), i);
        let resources = chunk
            .iter()
            .map(|item| SliceResource {
                api_version: item.api_version.clone(),
                kind: item.kind.clone(),
                name: item.metadata.name.clone(),
                namespace: item.metadata.namespace.clone(),
                manifest: serde_json::to_value(item).unwrap_or(serde_json::Value::Null),
            })
            .collect();

        let mut slice = ResourceSlice::new(&slice_name, ResourceSliceSpec { resources });
        slice.metadata.namespace = Some(ns.clone());
        slice.metadata.owner_references = Some(vec![owner.clone()]);

        slices_api
            .patch(
                &slice_name,
                &PatchParams::apply(crate::status_patch::FIELD_MANAGER).force(),
                &Patch::Apply(&slice),
            )
            .await
            .or_else(|e| match e {
                kube::Error::Api(resp) if resp.code == 404 => Err(e),
                other => Err(other),
            })?;
        names.push(slice_name);
    }

    Ok(names)
}

/// Deleting a Composition with `eno.azure.io/deletion-strategy: orphan`
/// leaves its `ResourceSlice`s (and the resources they describe) behind —
/// the finalizer is released immediately rather than waiting for the
/// (out-of-scope) reconciliation driver to delete them (spec.md §6).
async fn reconcile_deletion<E: Executor, R: InputResolver>(
    composition: &Composition,
    ctx: &Context<E, R>,
) -> Result<Action, Error> {
    let orphan = composition
        .meta()
        .annotations
        .as_ref()
        .map(annotations::is_orphan_deletion)
        .unwrap_or(false);
    if orphan {
        remove_finalizer(composition, ctx).await?;
        return Ok(Action::await_change());
    }

    let ns = composition.namespace().unwrap();
    let slices_api: Api<ResourceSlice> = Api::namespaced(ctx.client.clone(), &ns);

    let referenced: Vec<&str> = composition
        .status
        .as_ref()
        .and_then(|s| s.previous_synthesis.as_ref().or(s.current_synthesis.as_ref()))
        .map(|s| s.resource_slices.iter().map(String::as_str).collect())
        .unwrap_or_default();

    let mut all_gone = true;
    for name in &referenced {
        if slices_api.get_opt(name).await?.is_some() {
            all_gone = false;
        }
    }

    if all_gone {
        remove_finalizer(composition, ctx).await?;
        Ok(Action::await_change())
    } else {
        Ok(Action::requeue(Duration::from_secs(5)))
    }
}

pub fn error_policy<E, R>(_composition: Arc<Composition>, error: &Error, _ctx: Arc<Context<E, R>>) -> Action {
    if error.is_transient() {
        Action::requeue(Duration::from_secs(1))
    } else {
        Action::requeue(Duration::from_secs(30))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eno_types::Synthesis;

    #[test]
    fn needs_synthesis_when_no_current() {
        let status = CompositionStatus::default();
        assert_eq!(phase_for(&status, 1, false), Phase::NeedsSynthesis);
    }

    #[test]
    fn needs_synthesis_on_stale_observed_generation() {
        let status = CompositionStatus {
            current_synthesis: Some(Synthesis {
                observed_composition_generation: 1,
                synthesized: Some(Time(Utc::now())),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert_eq!(phase_for(&status, 2, false), Phase::NeedsSynthesis);
    }

    #[test]
    fn needs_synthesis_on_pending_resynthesis() {
        let status = CompositionStatus {
            current_synthesis: Some(Synthesis {
                observed_composition_generation: 1,
                synthesized: Some(Time(Utc::now())),
                ready: Some(Time(Utc::now())),
                reconciled: Some(Time(Utc::now())),
                ..Default::default()
            }),
            pending_resynthesis: Some(Time(Utc::now())),
            ..Default::default()
        };
        assert_eq!(phase_for(&status, 1, false), Phase::NeedsSynthesis);
    }

    #[test]
    fn synthesizing_while_in_flight() {
        let status = CompositionStatus {
            in_flight_synthesis: Some(Synthesis::default()),
            ..Default::default()
        };
        assert_eq!(phase_for(&status, 1, false), Phase::Synthesizing);
    }

    #[test]
    fn applying_after_synthesized_before_reconciled() {
        let status = CompositionStatus {
            current_synthesis: Some(Synthesis {
                observed_composition_generation: 1,
                synthesized: Some(Time(Utc::now())),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert_eq!(phase_for(&status, 1, false), Phase::Applying);
    }

    #[test]
    fn ready_once_reconciled_and_ready() {
        let status = CompositionStatus {
            current_synthesis: Some(Synthesis {
                observed_composition_generation: 1,
                synthesized: Some(Time(Utc::now())),
                reconciled: Some(Time(Utc::now())),
                ready: Some(Time(Utc::now())),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert_eq!(phase_for(&status, 1, false), Phase::Ready);
    }

    #[test]
    fn deleting_wins_regardless_of_synthesis_state() {
        let status = CompositionStatus::default();
        assert_eq!(phase_for(&status, 1, true), Phase::Deleting);
    }

    #[test]
    fn stage_new_synthesis_moves_completed_current_to_previous() {
        let mut status = CompositionStatus {
            current_synthesis: Some(Synthesis {
                synthesized: Some(Time(Utc::now())),
                ..Default::default()
            }),
            ..Default::default()
        };
        stage_new_synthesis(&mut status, 2, 1, false, "u1".into());
        assert!(status.previous_synthesis.is_some());
        assert!(status.current_synthesis.is_none());
        assert_eq!(status.in_flight_synthesis.as_ref().unwrap().uuid.as_deref(), Some("u1"));
        assert_eq!(status.in_flight_synthesis.as_ref().unwrap().attempts, 0);
        assert_eq!(status.in_flight_synthesis.as_ref().unwrap().observed_synthesizer_generation, 1);
    }

    #[test]
    fn stage_new_synthesis_drops_unsynthesized_current_without_previous() {
        let mut status = CompositionStatus {
            current_synthesis: Some(Synthesis::default()),
            ..Default::default()
        };
        stage_new_synthesis(&mut status, 2, 1, false, "u1".into());
        assert!(status.previous_synthesis.is_none());
    }

    #[test]
    fn stage_new_synthesis_always_sets_deferred_from_trigger() {
        let mut status = CompositionStatus {
            in_flight_synthesis: Some(Synthesis { deferred: true, ..Default::default() }),
            ..Default::default()
        };
        // A non-rollout path (deferred=false) staging a new synthesis must
        // clear the stale bit rather than inherit it (spec.md §9).
        stage_new_synthesis(&mut status, 2, 1, false, "u2".into());
        assert!(!status.in_flight_synthesis.unwrap().deferred);
    }

    #[test]
    fn record_failure_increments_attempts_and_appends_error_result() {
        let mut status = CompositionStatus {
            in_flight_synthesis: Some(Synthesis::default()),
            ..Default::default()
        };
        record_failure(&mut status, "boom".into());
        let in_flight = status.in_flight_synthesis.unwrap();
        assert_eq!(in_flight.attempts, 1);
        assert_eq!(in_flight.results.len(), 1);
    }

    #[test]
    fn promote_on_success_clears_in_flight_and_sets_current() {
        let mut status = CompositionStatus {
            in_flight_synthesis: Some(Synthesis::default()),
            ..Default::default()
        };
        promote_on_success(&mut status, vec!["slice-0".into()], Time(Utc::now()));
        assert!(status.in_flight_synthesis.is_none());
        let current = status.current_synthesis.unwrap();
        assert_eq!(current.resource_slices, vec!["slice-0".to_string()]);
        assert!(current.synthesized.is_some());
    }

    #[test]
    fn backoff_grows_exponentially_and_is_capped() {
        assert_eq!(backoff_for_attempt(0), BASE_BACKOFF);
        assert_eq!(backoff_for_attempt(1), BASE_BACKOFF * 2);
        assert_eq!(backoff_for_attempt(10), MAX_BACKOFF);
    }
}
