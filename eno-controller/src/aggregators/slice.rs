//! Slice Status Aggregator (spec.md §4.3): maintains
//! `CurrentSynthesis.{Reconciled,Ready}` as a monotone function of the
//! per-resource state in the referenced `ResourceSlice`s.

use eno_types::ResourceSliceStatus;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;

/// One referenced slice's observed state, or `None` if the slice object
/// itself was not found (spec.md §4.3 "If the slice is missing...").
pub struct SliceObservation {
    pub status: Option<ResourceSliceStatus>,
    /// Number of resources declared in the slice's *spec* — used to detect
    /// "resources in spec but an empty status list" (status lag).
    pub spec_resource_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Aggregate {
    pub reconciled: bool,
    pub ready: bool,
}

/// Pure reduction over every slice a synthesis produced.
///
/// `is_deleting` / `orphan_deletion` implement the spec.md §4.3 exception:
/// while a Composition is deleting and not orphaning, a resource only counts
/// as reconciled once it is also reported `deleted`.
pub fn aggregate(
    slices: &[SliceObservation],
    is_deleting: bool,
    orphan_deletion: bool,
) -> (Aggregate, Option<chrono::DateTime<chrono::Utc>>) {
    let mut reconciled = true;
    let mut ready = true;
    let mut max_ready: Option<chrono::DateTime<chrono::Utc>> = None;

    for slice in slices {
        let Some(status) = &slice.status else {
            if is_deleting {
                // Gone slice while deleting counts as reconciled-gone; it
                // contributes no readiness information either way.
                continue;
            }
            reconciled = false;
            ready = false;
            continue;
        };

        if slice.spec_resource_count > 0 && status.resources.is_empty() {
            // Status lag: spec has resources but status hasn't caught up.
            reconciled = false;
            ready = false;
            continue;
        }

        for resource in &status.resources {
            let resource_reconciled = if is_deleting && !orphan_deletion {
                resource.reconciled && resource.deleted
            } else {
                resource.reconciled
            };
            if !resource_reconciled {
                reconciled = false;
            }

            match &resource.ready {
                Some(Time(ts)) => {
                    max_ready = Some(max_ready.map_or(*ts, |cur| cur.max(*ts)));
                }
                None => ready = false,
            }
        }
    }

    (Aggregate { reconciled, ready }, if ready { max_ready } else { None })
}

#[cfg(test)]
mod tests {
    use super::*;
    use eno_types::ResourceState;

    fn slice_with(states: Vec<ResourceState>) -> SliceObservation {
        SliceObservation {
            spec_resource_count: states.len(),
            status: Some(ResourceSliceStatus { resources: states }),
        }
    }

    #[test]
    fn all_resources_ready_and_reconciled() {
        let now = Time(chrono::Utc::now());
        let slices = vec![slice_with(vec![ResourceState {
            reconciled: true,
            ready: Some(now.clone()),
            deleted: false,
        }])];
        let (agg, ready_ts) = aggregate(&slices, false, false);
        assert!(agg.reconciled);
        assert!(agg.ready);
        assert!(ready_ts.is_some());
    }

    #[test]
    fn one_unready_resource_clears_aggregate_ready() {
        let slices = vec![slice_with(vec![
            ResourceState { reconciled: true, ready: Some(Time(chrono::Utc::now())), deleted: false },
            ResourceState { reconciled: true, ready: None, deleted: false },
        ])];
        let (agg, ready_ts) = aggregate(&slices, false, false);
        assert!(!agg.ready);
        assert!(ready_ts.is_none());
    }

    #[test]
    fn status_lag_with_empty_status_but_nonempty_spec() {
        let slices = vec![SliceObservation {
            spec_resource_count: 2,
            status: Some(ResourceSliceStatus { resources: vec![] }),
        }];
        let (agg, _) = aggregate(&slices, false, false);
        assert!(!agg.reconciled);
        assert!(!agg.ready);
    }

    #[test]
    fn deleting_without_orphan_requires_deleted_flag() {
        let slices = vec![slice_with(vec![ResourceState {
            reconciled: true,
            ready: None,
            deleted: false,
        }])];
        let (agg, _) = aggregate(&slices, true, false);
        assert!(!agg.reconciled);

        let slices = vec![slice_with(vec![ResourceState {
            reconciled: true,
            ready: None,
            deleted: true,
        }])];
        let (agg, _) = aggregate(&slices, true, false);
        assert!(agg.reconciled);
    }

    #[test]
    fn deleting_with_orphan_does_not_require_deleted_flag() {
        let slices = vec![slice_with(vec![ResourceState {
            reconciled: true,
            ready: None,
            deleted: false,
        }])];
        let (agg, _) = aggregate(&slices, true, true);
        assert!(agg.reconciled);
    }

    #[test]
    fn missing_slice_while_deleting_is_treated_as_reconciled_gone() {
        let slices = vec![SliceObservation { status: None, spec_resource_count: 1 }];
        let (agg, _) = aggregate(&slices, true, false);
        assert!(agg.reconciled);
    }

    #[test]
    fn missing_slice_while_not_deleting_blocks_aggregate() {
        let slices = vec![SliceObservation { status: None, spec_resource_count: 1 }];
        let (agg, _) = aggregate(&slices, false, false);
        assert!(!agg.reconciled);
        assert!(!agg.ready);
    }

    #[test]
    fn idempotent_on_repeated_identical_input() {
        let slices = vec![slice_with(vec![ResourceState {
            reconciled: true,
            ready: Some(Time(chrono::Utc::now())),
            deleted: false,
        }])];
        let (a, _) = aggregate(&slices, false, false);
        let (b, _) = aggregate(&slices, false, false);
        assert_eq!(a, b);
    }
}
