//! Rollout Coordinator (spec.md §4.2): paces resynthesis of Compositions
//! bound to the same `Synthesizer` so that a generation bump doesn't
//! resynthesize every bound Composition at once.
//!
//! Kept as a pure selection function plus a thin reconcile wrapper, the same
//! split used by the other aggregators — only the hand-off write
//! (`PendingResynthesis`) touches the API server.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use eno_types::{annotations, Composition, CompositionStatus, Synthesizer};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::runtime::controller::Action;
use kube::{Api, Client, ResourceExt};
use rand::seq::SliceRandom;
use tracing::info;

use crate::error::Error;
use crate::status_patch::patch_status_if_changed;

/// One Composition as seen by the coordinator, with only the fields the
/// eligibility predicate needs.
pub struct Candidate {
    pub name: String,
    pub namespace: String,
    pub status: CompositionStatus,
    pub ignore_side_effects: bool,
}

/// `latestRollout = max(Synthesized timestamp of any Composition whose
/// PreviousSynthesis != nil)` (spec.md §4.2) — the most recent time any
/// bound Composition actually rolled over, used as the cooldown anchor.
pub fn latest_rollout(candidates: &[Candidate]) -> Option<DateTime<Utc>> {
    candidates
        .iter()
        .filter(|c| c.status.previous_synthesis.is_some())
        .filter_map(|c| c.status.current_synthesis.as_ref())
        .filter_map(|s| s.synthesized.as_ref())
        .map(|Time(ts)| *ts)
        .max()
}

/// True iff `candidate` may be resynthesized right now: it has completed at
/// least one synthesis, isn't deleting, isn't already staged for
/// resynthesis, isn't opted out, its `CurrentSynthesis` has not yet observed
/// `synthesizer_generation`, and its bound inputs are in lockstep (spec.md
/// §4.2 "not already in sync, inputs in lockstep (§3 inv.3)"). These are two
/// independent conditions — a Composition that is merely out of lockstep but
/// already on the latest synthesizer generation is not eligible, and vice
/// versa.
pub fn is_eligible(candidate: &Candidate, is_deleting: bool, synthesizer_generation: i64) -> bool {
    if is_deleting || candidate.ignore_side_effects {
        return false;
    }
    if candidate.status.pending_resynthesis.is_some() {
        return false;
    }
    let Some(current) = &candidate.status.current_synthesis else {
        return false;
    };
    if current.synthesized.is_none() {
        return false;
    }
    if current.observed_synthesizer_generation >= synthesizer_generation {
        return false;
    }
    current.is_in_lockstep()
}

/// Picks at most one eligible candidate to resynthesize, per cooldown tick.
/// Shuffled so that repeatedly-ineligible candidates at the front of a
/// stable ordering don't starve the rest (spec.md §4.2 "shuffle, then pick
/// the first eligible entry").
pub fn pick_next<'a>(
    eligible: &'a [&'a Candidate],
    rng: &mut impl rand::Rng,
) -> Option<&'a Candidate> {
    let mut shuffled: Vec<&Candidate> = eligible.to_vec();
    shuffled.shuffle(rng);
    shuffled.into_iter().next()
}

pub struct Context {
    pub client: Client,
}

/// Reconciles one `Synthesizer`: computes its cooldown window from bound
/// Compositions' rollout history and, once elapsed, stages exactly one
/// eligible Composition for resynthesis by setting `PendingResynthesis`.
pub async fn reconcile(synthesizer: Arc<Synthesizer>, ctx: Arc<Context>) -> Result<Action, Error> {
    let _span = tracing::info_span!("rollout", synthesizer = %synthesizer.name_any()).entered();

    let cooldown = synthesizer.rollout_cooldown();

    // `Synthesizer` is cluster-scoped (spec.md §3 "reusable across
    // namespaces"), so its bound `Composition`s may live anywhere.
    let compositions_api: Api<Composition> = Api::all(ctx.client.clone());
    let compositions = compositions_api.list(&Default::default()).await?;

    let candidates: Vec<Candidate> = compositions
        .items
        .iter()
        .filter(|c| c.spec.synthesizer.name == synthesizer.name_any())
        .map(|c| Candidate {
            name: c.name_any(),
            namespace: c.namespace().unwrap_or_default(),
            status: c.status.clone().unwrap_or_default(),
            ignore_side_effects: c
                .meta()
                .annotations
                .as_ref()
                .map(|a| annotations::is_true(a, annotations::IGNORE_SIDE_EFFECTS))
                .unwrap_or(false),
        })
        .collect();

    // `latest_rollout` returns `None` until some bound Composition has
    // completed its first resynthesis — there is no prior rollout to pace
    // against yet, so the very first one proceeds without waiting.
    if let Some(last) = latest_rollout(&candidates) {
        let elapsed = (Utc::now() - last).to_std().unwrap_or(Duration::ZERO);
        if elapsed < cooldown {
            return Ok(Action::requeue(cooldown - elapsed));
        }
    }

    let synthesizer_generation = synthesizer.meta().generation.unwrap_or(0);
    let eligible: Vec<&Candidate> = candidates
        .iter()
        .filter(|c| is_eligible(c, false, synthesizer_generation))
        .collect();

    let mut rng = rand::rng();
    let Some(chosen) = pick_next(&eligible, &mut rng) else {
        return Ok(Action::requeue(Duration::from_secs(30)));
    };

    let chosen_api: Api<Composition> = Api::namespaced(ctx.client.clone(), &chosen.namespace);
    let composition = chosen_api.get(&chosen.name).await?;
    let updated = patch_status_if_changed(&ctx.client, &composition, |c| {
        let status = c.status.get_or_insert_with(Default::default);
        status.pending_resynthesis = Some(Time(Utc::now()));
    })
    .await?;

    if updated.is_some() {
        info!(composition = %chosen.name, "staged for resynthesis");
        metrics::counter!("eno_rollout_advances_total").increment(1);
    }

    Ok(Action::requeue(Duration::from_secs(5)))
}

pub fn error_policy(_synthesizer: Arc<Synthesizer>, error: &Error, _ctx: Arc<Context>) -> Action {
    if error.is_transient() {
        Action::requeue(Duration::from_secs(1))
    } else {
        Action::requeue(Duration::from_secs(30))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eno_types::{InputRevision, Synthesis};
    use rand::SeedableRng;

    /// `observed_synthesizer_generation` defaults to `0`, so a candidate is
    /// "not already in sync" against any `synthesizer_generation >= 1`
    /// unless the test overrides it via [`candidate_at_generation`].
    fn candidate_with(
        previous: bool,
        synthesized_at: Option<DateTime<Utc>>,
        pending: bool,
        lockstep: bool,
    ) -> Candidate {
        candidate_at_generation(previous, synthesized_at, pending, lockstep, 0)
    }

    fn candidate_at_generation(
        previous: bool,
        synthesized_at: Option<DateTime<Utc>>,
        pending: bool,
        lockstep: bool,
        observed_synthesizer_generation: i64,
    ) -> Candidate {
        let current = Synthesis {
            synthesized: synthesized_at.map(Time),
            observed_synthesizer_generation,
            input_revisions: if lockstep {
                vec![InputRevision { key: "a".into(), revision: Some(1) }]
            } else {
                vec![
                    InputRevision { key: "a".into(), revision: Some(1) },
                    InputRevision { key: "b".into(), revision: Some(2) },
                ]
            },
            ..Default::default()
        };
        Candidate {
            name: "c".into(),
            namespace: "ns".into(),
            status: CompositionStatus {
                current_synthesis: Some(current),
                previous_synthesis: previous.then(Synthesis::default),
                pending_resynthesis: pending.then(|| Time(Utc::now())),
                ..Default::default()
            },
            ignore_side_effects: false,
        }
    }

    #[test]
    fn latest_rollout_ignores_candidates_without_previous_synthesis() {
        let t = Utc::now();
        let candidates = vec![candidate_with(false, Some(t), false, true)];
        assert_eq!(latest_rollout(&candidates), None);
    }

    #[test]
    fn latest_rollout_takes_the_max_timestamp() {
        let t1 = Utc::now();
        let t2 = t1 + chrono::Duration::seconds(60);
        let candidates = vec![
            candidate_with(true, Some(t1), false, true),
            candidate_with(true, Some(t2), false, true),
        ];
        assert_eq!(latest_rollout(&candidates), Some(t2));
    }

    #[test]
    fn ineligible_when_pending_resynthesis_already_set() {
        let c = candidate_with(true, Some(Utc::now()), true, true);
        assert!(!is_eligible(&c, false, 1));
    }

    #[test]
    fn ineligible_when_already_on_latest_synthesizer_generation() {
        // Lockstep, but already observed generation 1 — nothing new to roll out.
        let c = candidate_at_generation(true, Some(Utc::now()), false, true, 1);
        assert!(!is_eligible(&c, false, 1));
    }

    #[test]
    fn ineligible_when_out_of_lockstep_even_if_behind_generation() {
        // Behind on generation, but inputs disagree — skipped until they converge.
        let c = candidate_at_generation(true, Some(Utc::now()), false, false, 0);
        assert!(!is_eligible(&c, false, 1));
    }

    #[test]
    fn eligible_when_behind_generation_and_in_lockstep() {
        let c = candidate_at_generation(true, Some(Utc::now()), false, true, 0);
        assert!(is_eligible(&c, false, 1));
    }

    #[test]
    fn ineligible_while_deleting() {
        let c = candidate_with(true, Some(Utc::now()), false, true);
        assert!(!is_eligible(&c, true, 1));
    }

    #[test]
    fn ineligible_when_never_synthesized() {
        let c = candidate_with(true, None, false, true);
        assert!(!is_eligible(&c, false, 1));
    }

    #[test]
    fn ineligible_when_opted_out_via_annotation() {
        let mut c = candidate_with(true, Some(Utc::now()), false, true);
        c.ignore_side_effects = true;
        assert!(!is_eligible(&c, false, 1));
    }

    #[test]
    fn pick_next_is_deterministic_for_a_fixed_seed() {
        let a = candidate_with(true, Some(Utc::now()), false, true);
        let b = candidate_with(true, Some(Utc::now()), false, true);
        let refs = vec![&a, &b];
        let mut rng1 = rand::rngs::StdRng::seed_from_u64(7);
        let mut rng2 = rand::rngs::StdRng::seed_from_u64(7);
        let p1 = pick_next(&refs, &mut rng1).map(|c| c as *const Candidate);
        let p2 = pick_next(&refs, &mut rng2).map(|c| c as *const Candidate);
        assert_eq!(p1, p2);
    }

    #[test]
    fn pick_next_on_empty_slice_returns_none() {
        let mut rng = rand::rng();
        let empty: Vec<&Candidate> = vec![];
        assert!(pick_next(&empty, &mut rng).is_none());
    }
}
