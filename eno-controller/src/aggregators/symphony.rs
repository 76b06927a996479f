//! Symphony Aggregator (spec.md §4.5): reduces a Symphony's child
//! Compositions into one parent status.

use eno_types::CompositionStatus;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;

pub struct ChildObservation<'a> {
    pub variation_name: &'a str,
    pub status: &'a CompositionStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SymphonyAggregate {
    pub synthesized: Option<chrono::DateTime<chrono::Utc>>,
    pub reconciled: Option<chrono::DateTime<chrono::Utc>>,
    pub ready: Option<chrono::DateTime<chrono::Utc>>,
}

/// Returns `None` (a no-op reconcile) unless every named variation has at
/// least one owned child with a non-nil `CurrentSynthesis` (spec.md §4.5:
/// "avoiding transient incorrect aggregates"). Otherwise returns the
/// max-timestamp reduction across all children's current syntheses.
pub fn aggregate(variations: &[&str], children: &[ChildObservation<'_>]) -> Option<SymphonyAggregate> {
    for variation in variations {
        let has_current = children
            .iter()
            .filter(|c| c.variation_name == *variation)
            .any(|c| c.status.current_synthesis.is_some());
        if !has_current {
            return None;
        }
    }

    let mut result = SymphonyAggregate::default();
    for child in children {
        let Some(current) = &child.status.current_synthesis else { continue };
        max_into(&mut result.synthesized, &current.synthesized);
        max_into(&mut result.reconciled, &current.reconciled);
        max_into(&mut result.ready, &current.ready);
    }
    Some(result)
}

fn max_into(acc: &mut Option<chrono::DateTime<chrono::Utc>>, candidate: &Option<Time>) {
    let Some(Time(ts)) = candidate else { return };
    *acc = Some(acc.map_or(*ts, |cur| cur.max(*ts)));
}

#[cfg(test)]
mod tests {
    use super::*;
    use eno_types::Synthesis;

    fn status_with_current(ts: chrono::DateTime<chrono::Utc>) -> CompositionStatus {
        CompositionStatus {
            current_synthesis: Some(Synthesis {
                synthesized: Some(Time(ts)),
                reconciled: Some(Time(ts)),
                ready: Some(Time(ts)),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn no_op_until_every_variation_has_a_current_synthesis() {
        let s1 = status_with_current(chrono::Utc::now());
        let empty = CompositionStatus::default();
        let children = vec![
            ChildObservation { variation_name: "s1", status: &s1 },
            ChildObservation { variation_name: "s2", status: &empty },
        ];
        assert!(aggregate(&["s1", "s2"], &children).is_none());
    }

    #[test]
    fn aggregates_once_all_variations_present() {
        let t1 = chrono::Utc::now();
        let t2 = t1 + chrono::Duration::seconds(10);
        let s1 = status_with_current(t1);
        let s2 = status_with_current(t2);
        let children = vec![
            ChildObservation { variation_name: "s1", status: &s1 },
            ChildObservation { variation_name: "s2", status: &s2 },
        ];
        let agg = aggregate(&["s1", "s2"], &children).unwrap();
        assert_eq!(agg.ready, Some(t2));
        assert_eq!(agg.synthesized, Some(t2));
    }

    #[test]
    fn multiple_children_per_variation_still_satisfies_gate() {
        let t1 = chrono::Utc::now();
        let s1a = CompositionStatus::default();
        let s1b = status_with_current(t1);
        let children = vec![
            ChildObservation { variation_name: "s1", status: &s1a },
            ChildObservation { variation_name: "s1", status: &s1b },
        ];
        assert!(aggregate(&["s1"], &children).is_some());
    }
}
