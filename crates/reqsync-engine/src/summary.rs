//! Summary computation over an enriched index

use indexmap::IndexMap;
use reqsync_model::{EvidenceBundle, Index, LiveStatus, Summary, TargetStatus, TargetSummary};

const UNSET: &str = "unset";

/// Totals over canonical requirements
///
/// Grouping requirements count toward `total` and `grouping` only. Pass
/// rate is `passed / (total - grouping)`. A duplicated ID counts once,
/// through its first declaration.
#[must_use]
pub fn summarize(index: &Index, evidence: &EvidenceBundle) -> Summary {
    let mut summary = Summary {
        modules: index.modules.len(),
        phases: evidence.phases().clone(),
        ..Summary::default()
    };

    for (_, requirement) in index.canonical() {
        summary.total += 1;
        if requirement.is_grouping() {
            summary.grouping += 1;
            continue;
        }
        let live = requirement.live_status.unwrap_or(LiveStatus::Unknown);
        match live {
            LiveStatus::Passed => summary.passed += 1,
            LiveStatus::Failed => summary.failed += 1,
            _ => {}
        }

        let declared = requirement
            .declared_status
            .as_ref()
            .map_or(UNSET, |s| s.as_str());
        *summary.by_declared.entry(declared.to_string()).or_default() += 1;
        *summary.by_live.entry(live.as_str().to_string()).or_default() += 1;

        let criticality = requirement
            .criticality
            .as_ref()
            .map_or(UNSET, |c| c.as_str());
        let tally = summary
            .by_criticality
            .entry(criticality.to_string())
            .or_default();
        tally.total += 1;
        match live {
            LiveStatus::Passed => tally.passed += 1,
            LiveStatus::Failed => tally.failed += 1,
            _ => {}
        }

        summary.validations.merge(&requirement.validation_summary);
    }

    summary.counted = summary.total - summary.grouping;
    #[allow(clippy::cast_precision_loss)]
    let pass_rate = if summary.counted > 0 {
        summary.passed as f64 / summary.counted as f64
    } else {
        0.0
    };
    summary.pass_rate = pass_rate;
    summary.targets = targets(index);
    summary
}

/// Operational-target aggregation
///
/// A target passes when any member requirement passed. Non-grouping P0/P1
/// requirements without a target are each their own target.
#[must_use]
pub fn targets(index: &Index) -> TargetSummary {
    let mut explicit: IndexMap<String, TargetStatus> = IndexMap::new();
    let mut implicit: Vec<TargetStatus> = Vec::new();

    for (_, requirement) in index.canonical() {
        let passed = requirement.live_status == Some(LiveStatus::Passed);
        match requirement.operational_target_id.as_deref().map(str::trim) {
            Some(target) if !target.is_empty() => {
                let entry = explicit
                    .entry(target.to_string())
                    .or_insert_with(|| TargetStatus {
                        id: target.to_string(),
                        passing: false,
                        requirements: Vec::new(),
                    });
                entry.passing |= passed;
                entry.requirements.push(requirement.id.clone());
            }
            _ => {
                let high = requirement
                    .criticality
                    .as_ref()
                    .is_some_and(|c| c.is_high_priority());
                if high && !requirement.is_grouping() {
                    implicit.push(TargetStatus {
                        id: requirement.id.clone(),
                        passing: passed,
                        requirements: vec![requirement.id.clone()],
                    });
                }
            }
        }
    }

    let targets: Vec<TargetStatus> = explicit.into_values().chain(implicit).collect();
    let passing = targets.iter().filter(|t| t.passing).count();
    TargetSummary {
        total: targets.len(),
        passing,
        failing: targets.len() - passing,
        targets,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use reqsync_model::{Criticality, Module, Requirement, RequirementStatus};

    fn with_live(requirement: Requirement, live: LiveStatus) -> Requirement {
        let mut requirement = requirement;
        requirement.live_status = Some(live);
        requirement
    }

    fn index_of(requirements: Vec<Requirement>) -> Index {
        let module = requirements
            .into_iter()
            .fold(Module::new("/s/requirements/m.json"), Module::with_requirement);
        let mut index = Index::new();
        index.push_module(module);
        index
    }

    #[test]
    fn any_passing_member_passes_the_target() {
        let index = index_of(vec![
            with_live(Requirement::new("R1").with_target("OT-1"), LiveStatus::Passed),
            with_live(Requirement::new("R2").with_target("OT-1"), LiveStatus::Unknown),
            with_live(Requirement::new("R3").with_target("OT-1"), LiveStatus::Passed),
        ]);
        let targets = targets(&index);
        assert_eq!(targets.total, 1);
        assert_eq!(targets.passing, 1);
        assert_eq!(targets.targets[0].requirements, vec!["R1", "R2", "R3"]);
    }

    #[test]
    fn untargeted_high_priority_requirements_are_own_targets() {
        let index = index_of(vec![
            with_live(Requirement::new("P0").with_criticality(Criticality::P0), LiveStatus::Failed),
            with_live(Requirement::new("P2").with_criticality(Criticality::P2), LiveStatus::Passed),
        ]);
        let targets = targets(&index);
        assert_eq!(targets.total, 1);
        assert_eq!(targets.failing, 1);
        assert_eq!(targets.targets[0].id, "P0");
    }

    #[test]
    fn grouping_is_excluded_from_pass_rate() {
        let index = index_of(vec![
            with_live(Requirement::new("G").with_children(["A", "B"]), LiveStatus::Passed),
            with_live(
                Requirement::new("A").with_status(RequirementStatus::Complete),
                LiveStatus::Passed,
            ),
            with_live(Requirement::new("B"), LiveStatus::Failed),
        ]);
        let summary = summarize(&index, &EvidenceBundle::new());
        assert_eq!(summary.total, 3);
        assert_eq!(summary.grouping, 1);
        assert_eq!(summary.counted, 2);
        assert!((summary.pass_rate - 0.5).abs() < f64::EPSILON);
        assert_eq!(summary.by_declared["complete"], 1);
        assert_eq!(summary.by_declared["unset"], 1);
        assert_eq!(summary.by_live["failed"], 1);
        assert_eq!(summary.by_criticality["unset"].total, 2);
    }

    #[test]
    fn empty_index_has_zero_rate() {
        let summary = summarize(&Index::new(), &EvidenceBundle::new());
        assert_eq!(summary.counted, 0);
        assert!(summary.pass_rate.abs() < f64::EPSILON);
    }

    fn live_strategy() -> impl Strategy<Value = LiveStatus> {
        proptest::sample::select(LiveStatus::ALL.to_vec())
    }

    proptest! {
        #[test]
        fn prop_grouping_never_in_denominator(
            leaves in proptest::collection::vec(live_strategy(), 1..8),
            groups in 0usize..4,
        ) {
            let mut requirements: Vec<Requirement> = leaves
                .iter()
                .enumerate()
                .map(|(i, s)| with_live(Requirement::new(format!("L{i}")), *s))
                .collect();
            for g in 0..groups {
                requirements.push(with_live(
                    Requirement::new(format!("G{g}")).with_children(["L0"]),
                    LiveStatus::Passed,
                ));
            }
            let summary = summarize(&index_of(requirements), &EvidenceBundle::new());
            prop_assert_eq!(summary.counted, leaves.len());
            let passed = leaves.iter().filter(|s| **s == LiveStatus::Passed).count();
            prop_assert_eq!(summary.passed, passed);
        }

        #[test]
        fn prop_target_with_passing_member_passes(
            members in proptest::collection::vec(live_strategy(), 1..6),
        ) {
            let requirements: Vec<Requirement> = members
                .iter()
                .enumerate()
                .map(|(i, s)| with_live(Requirement::new(format!("R{i}")).with_target("OT"), *s))
                .collect();
            let targets = targets(&index_of(requirements));
            let any = members.contains(&LiveStatus::Passed);
            prop_assert_eq!(targets.total, 1);
            prop_assert_eq!(targets.targets[0].passing, any);
        }
    }
}
