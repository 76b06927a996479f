//! Composition Status Aggregator (spec.md §4.4): a pure function of
//! `(CurrentSynthesis, InFlightSynthesis, DeletionTimestamp, PendingResynthesis,
//! Bindings vs. Synthesizer.Refs, Results)` that derives `SimplifiedStatus`.

use eno_types::{Binding, CompositionStatus, InputRef, Severity, SimplifiedStatus};

/// Row-by-row translation of the spec.md §4.4 decision table. First match wins.
pub fn simplified_status(
    status: &CompositionStatus,
    is_deleting: bool,
    refs: &[InputRef],
    bindings: &[Binding],
) -> (SimplifiedStatus, Option<String>) {
    let error = derive_error(status);

    if is_deleting {
        return (SimplifiedStatus::Deleting, error);
    }

    let current_ready = status.current_synthesis.as_ref().and_then(|s| s.ready.as_ref());
    if status.pending_resynthesis.is_some() && current_ready.is_some() {
        return (SimplifiedStatus::WaitingForCooldown, error);
    }

    if status.in_flight_synthesis.is_none() && missing_required_bindings(refs, bindings) {
        return (SimplifiedStatus::MissingInputs, error);
    }

    if status.in_flight_synthesis.is_some() {
        return (SimplifiedStatus::Synthesizing, error);
    }

    let Some(current) = status.current_synthesis.as_ref() else {
        return (SimplifiedStatus::PendingSynthesis, error);
    };

    if current.synthesized.is_none() {
        return (SimplifiedStatus::Synthesizing, error);
    }

    if !current.is_in_lockstep() {
        return (SimplifiedStatus::MismatchedInputs, error);
    }

    if current.ready.is_some() {
        return (SimplifiedStatus::Ready, error);
    }

    if current.reconciled.is_some() {
        return (SimplifiedStatus::NotReady, error);
    }

    (SimplifiedStatus::Reconciling, error)
}

fn missing_required_bindings(refs: &[InputRef], bindings: &[Binding]) -> bool {
    refs.iter().any(|r| {
        !r.optional && !bindings.iter().any(|b| b.key == r.key)
    })
}

/// First error-severity result wins; otherwise the first warning; otherwise
/// empty. Prefers the in-flight synthesis's results (the most recent
/// execution) and falls back to the current synthesis's.
fn derive_error(status: &CompositionStatus) -> Option<String> {
    let results = status
        .in_flight_synthesis
        .as_ref()
        .map(|s| s.results.as_slice())
        .or_else(|| status.current_synthesis.as_ref().map(|s| s.results.as_slice()))
        .unwrap_or(&[]);

    results
        .iter()
        .find(|r| matches!(r.severity, Severity::Error))
        .or_else(|| results.iter().find(|r| matches!(r.severity, Severity::Warning)))
        .map(|r| r.message.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use eno_types::{InputRevision, Result as SynthResult, Synthesis};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;

    fn ref_(key: &str, optional: bool) -> InputRef {
        InputRef { key: key.into(), resource: "ConfigMap".into(), optional }
    }

    fn binding(key: &str) -> Binding {
        Binding {
            key: key.into(),
            resource: eno_types::ObjectRef {
                api_version: "v1".into(),
                kind: "ConfigMap".into(),
                name: "x".into(),
                namespace: None,
            },
        }
    }

    #[test]
    fn pending_synthesis_when_no_current() {
        let status = CompositionStatus::default();
        let (s, _) = simplified_status(&status, false, &[], &[]);
        assert_eq!(s, SimplifiedStatus::PendingSynthesis);
    }

    #[test]
    fn missing_inputs_blocks_before_pending_synthesis() {
        let status = CompositionStatus::default();
        let refs = vec![ref_("foo", false)];
        let (s, _) = simplified_status(&status, false, &refs, &[]);
        assert_eq!(s, SimplifiedStatus::MissingInputs);
    }

    #[test]
    fn optional_ref_without_binding_is_not_missing_inputs() {
        let status = CompositionStatus::default();
        let refs = vec![ref_("foo", true)];
        let (s, _) = simplified_status(&status, false, &refs, &[]);
        assert_eq!(s, SimplifiedStatus::PendingSynthesis);
    }

    #[test]
    fn deleting_wins_over_everything() {
        let mut status = CompositionStatus::default();
        status.in_flight_synthesis = Some(Synthesis::default());
        let (s, _) = simplified_status(&status, true, &[], &[]);
        assert_eq!(s, SimplifiedStatus::Deleting);
    }

    #[test]
    fn in_flight_is_synthesizing() {
        let mut status = CompositionStatus::default();
        status.in_flight_synthesis = Some(Synthesis::default());
        let (s, _) = simplified_status(&status, false, &[], &[]);
        assert_eq!(s, SimplifiedStatus::Synthesizing);
    }

    #[test]
    fn unsynthesized_current_is_synthesizing() {
        let mut status = CompositionStatus::default();
        status.current_synthesis = Some(Synthesis::default());
        let (s, _) = simplified_status(&status, false, &[], &[]);
        assert_eq!(s, SimplifiedStatus::Synthesizing);
    }

    #[test]
    fn mismatched_inputs_when_not_lockstep() {
        let mut current = Synthesis {
            synthesized: Some(Time(chrono::Utc::now())),
            ..Default::default()
        };
        current.input_revisions = vec![
            InputRevision { key: "a".into(), revision: Some(1) },
            InputRevision { key: "b".into(), revision: Some(2) },
        ];
        let mut status = CompositionStatus::default();
        status.current_synthesis = Some(current);
        let (s, _) = simplified_status(&status, false, &[], &[]);
        assert_eq!(s, SimplifiedStatus::MismatchedInputs);
    }

    #[test]
    fn ready_when_current_ready_set() {
        let current = Synthesis {
            synthesized: Some(Time(chrono::Utc::now())),
            ready: Some(Time(chrono::Utc::now())),
            ..Default::default()
        };
        let mut status = CompositionStatus::default();
        status.current_synthesis = Some(current);
        let (s, _) = simplified_status(&status, false, &[], &[]);
        assert_eq!(s, SimplifiedStatus::Ready);
    }

    #[test]
    fn not_ready_when_reconciled_but_not_ready() {
        let current = Synthesis {
            synthesized: Some(Time(chrono::Utc::now())),
            reconciled: Some(Time(chrono::Utc::now())),
            ..Default::default()
        };
        let mut status = CompositionStatus::default();
        status.current_synthesis = Some(current);
        let (s, _) = simplified_status(&status, false, &[], &[]);
        assert_eq!(s, SimplifiedStatus::NotReady);
    }

    #[test]
    fn reconciling_when_neither_ready_nor_reconciled() {
        let current = Synthesis {
            synthesized: Some(Time(chrono::Utc::now())),
            ..Default::default()
        };
        let mut status = CompositionStatus::default();
        status.current_synthesis = Some(current);
        let (s, _) = simplified_status(&status, false, &[], &[]);
        assert_eq!(s, SimplifiedStatus::Reconciling);
    }

    #[test]
    fn waiting_for_cooldown_requires_ready_current() {
        let current = Synthesis {
            synthesized: Some(Time(chrono::Utc::now())),
            ready: Some(Time(chrono::Utc::now())),
            ..Default::default()
        };
        let mut status = CompositionStatus::default();
        status.current_synthesis = Some(current);
        status.pending_resynthesis = Some(Time(chrono::Utc::now()));
        let (s, _) = simplified_status(&status, false, &[], &[]);
        assert_eq!(s, SimplifiedStatus::WaitingForCooldown);
    }

    #[test]
    fn pending_resynthesis_without_ready_current_does_not_wait() {
        let current = Synthesis {
            synthesized: Some(Time(chrono::Utc::now())),
            reconciled: Some(Time(chrono::Utc::now())),
            ..Default::default()
        };
        let mut status = CompositionStatus::default();
        status.current_synthesis = Some(current);
        status.pending_resynthesis = Some(Time(chrono::Utc::now()));
        let (s, _) = simplified_status(&status, false, &[], &[]);
        assert_eq!(s, SimplifiedStatus::NotReady);
    }

    #[test]
    fn error_result_wins_over_warning() {
        let mut current = Synthesis::default();
        current.results = vec![
            SynthResult { message: "warn".into(), severity: Severity::Warning },
            SynthResult { message: "boom".into(), severity: Severity::Error },
        ];
        let mut status = CompositionStatus::default();
        status.current_synthesis = Some(current);
        let (_, err) = simplified_status(&status, false, &[], &[]);
        assert_eq!(err.as_deref(), Some("boom"));
    }

    #[test]
    fn satisfied_required_binding_is_not_missing_inputs() {
        let status = CompositionStatus::default();
        let refs = vec![ref_("foo", false)];
        let bindings = vec![binding("foo")];
        let (s, _) = simplified_status(&status, false, &refs, &bindings);
        assert_eq!(s, SimplifiedStatus::PendingSynthesis);
    }
}
