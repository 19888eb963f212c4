//! Live-status enrichment
//!
//! Projects evidence onto the index. No I/O happens here; reference
//! existence arrives pre-resolved in a [`RefIndex`], so the same inputs
//! always produce the same derived fields.

use crate::graph::{cyclic_ids, find_cycles};
use crate::refs::RefIndex;
use reqsync_model::{
    EvidenceBundle, EvidenceKey, EvidenceRecord, Index, LiveStatus, ModuleStatus, Requirement,
    RequirementLocation, SyncOverride, Validation, ValidationStatus, ValidationSummary,
};
use std::collections::{BTreeSet, HashMap, HashSet};

/// Everything a rule may look at for one validation
#[derive(Debug)]
pub struct RuleInput<'a> {
    /// Sync override of the owning requirement
    pub sync_override: Option<&'a SyncOverride>,
    /// Applicable evidence, newest record per phase
    pub evidence: Vec<&'a EvidenceRecord>,
    /// Whether the reference exists; `None` when there is no reference
    pub ref_exists: Option<bool>,
    /// Declared validation status
    pub declared: Option<&'a ValidationStatus>,
}

/// One row of the precedence table
#[derive(Debug, Clone, Copy)]
pub struct ValidationRule {
    /// Short name, used in trace output
    pub name: &'static str,
    /// `Some` when the rule decides
    pub apply: fn(&RuleInput<'_>) -> Option<LiveStatus>,
}

/// Live-status precedence for a validation; first match wins
pub const VALIDATION_RULES: [ValidationRule; 6] = [
    ValidationRule {
        name: "sync_override_passing",
        apply: |input| {
            input
                .sync_override
                .is_some_and(SyncOverride::is_passing)
                .then_some(LiveStatus::Passed)
        },
    },
    ValidationRule {
        name: "evidence_failed",
        apply: |input| {
            input
                .evidence
                .iter()
                .any(|r| r.status == LiveStatus::Failed)
                .then_some(LiveStatus::Failed)
        },
    },
    ValidationRule {
        name: "evidence_passed",
        apply: |input| {
            input
                .evidence
                .iter()
                .any(|r| r.status == LiveStatus::Passed)
                .then_some(LiveStatus::Passed)
        },
    },
    ValidationRule {
        name: "ref_exists",
        apply: |input| (input.ref_exists == Some(true)).then_some(LiveStatus::NotRun),
    },
    ValidationRule {
        name: "no_ref_not_implemented",
        apply: |input| {
            let absent = input.ref_exists.is_none();
            let unimplemented = matches!(
                input.declared,
                Some(ValidationStatus::NotImplemented | ValidationStatus::Planned)
            );
            (absent && unimplemented).then_some(LiveStatus::NotRun)
        },
    },
    ValidationRule {
        name: "fallback",
        apply: |_| Some(LiveStatus::Unknown),
    },
];

/// Evaluate the rule table
#[must_use]
pub fn validation_status(input: &RuleInput<'_>) -> LiveStatus {
    for rule in &VALIDATION_RULES {
        if let Some(status) = (rule.apply)(input) {
            tracing::trace!(rule = rule.name, %status, "validation rule matched");
            return status;
        }
    }
    LiveStatus::Unknown
}

/// Evidence that applies to validation `position` of `requirement`
///
/// Validation-scoped and matching requirement-scoped records come first;
/// phase-scoped records are used only when there are none. The result keeps
/// the newest record per phase.
#[must_use]
pub fn applicable_evidence<'a>(
    evidence: &'a EvidenceBundle,
    requirement: &str,
    position: usize,
    validation: &Validation,
) -> Vec<&'a EvidenceRecord> {
    let phase = validation.effective_phase();
    let reference = validation.ref_key();
    let phase_matches =
        |record: &EvidenceRecord| phase.as_deref().map_or(true, |p| record.phase == p);
    let ref_matches = |record: &EvidenceRecord| {
        record
            .reference
            .as_deref()
            .map_or(true, |r| reference.as_deref() == Some(r))
    };

    let mut specific: Vec<&EvidenceRecord> = evidence
        .get(&EvidenceKey::Validation(requirement.to_string(), position))
        .iter()
        .collect();
    specific.extend(
        evidence
            .get(&EvidenceKey::Requirement(requirement.to_string()))
            .iter()
            .filter(|r| phase_matches(r) && ref_matches(r)),
    );
    if specific.is_empty() {
        if let Some(p) = &phase {
            specific.extend(evidence.get(&EvidenceKey::Phase(p.clone())).iter());
        }
    }

    specific.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    let mut seen = HashSet::new();
    specific.retain(|r| seen.insert(r.phase.clone()));
    specific
}

/// Requirement-scoped records for a requirement, newest per phase
#[must_use]
pub fn requirement_evidence<'a>(evidence: &'a EvidenceBundle, id: &str) -> Vec<&'a EvidenceRecord> {
    let mut seen = HashSet::new();
    evidence
        .get(&EvidenceKey::Requirement(id.to_string()))
        .iter()
        .filter(|r| seen.insert(r.phase.clone()))
        .collect()
}

/// Requirement status from its own validations, ignoring children
///
/// A requirement without validations is judged by its sync override, then
/// by evidence filed directly under its ID.
#[must_use]
pub fn own_status(
    requirement: &Requirement,
    sync_override: Option<&SyncOverride>,
    direct: &[&EvidenceRecord],
) -> LiveStatus {
    let statuses: Vec<LiveStatus> = requirement
        .validations
        .iter()
        .map(|v| v.live_status.unwrap_or(LiveStatus::Unknown))
        .collect();
    if statuses.is_empty() {
        return match sync_override {
            Some(o) if o.is_passing() => LiveStatus::Passed,
            _ if direct.iter().any(|r| r.status == LiveStatus::Failed) => LiveStatus::Failed,
            _ if direct.iter().any(|r| r.status == LiveStatus::Passed) => LiveStatus::Passed,
            Some(o) if LiveStatus::parse(&o.status) == Some(LiveStatus::Failed) => LiveStatus::Failed,
            _ => LiveStatus::Unknown,
        };
    }
    if statuses.contains(&LiveStatus::Failed) {
        LiveStatus::Failed
    } else if statuses.iter().all(|s| *s == LiveStatus::Passed) {
        LiveStatus::Passed
    } else if statuses.contains(&LiveStatus::NotRun) {
        LiveStatus::NotRun
    } else {
        LiveStatus::Unknown
    }
}

/// Rollup of child statuses for a grouping requirement
#[must_use]
pub fn rollup(children: &[LiveStatus]) -> LiveStatus {
    if children.contains(&LiveStatus::Failed) {
        LiveStatus::Failed
    } else if !children.is_empty()
        && children
            .iter()
            .all(|s| matches!(s, LiveStatus::Passed | LiveStatus::Skipped))
    {
        LiveStatus::Passed
    } else {
        LiveStatus::Unknown
    }
}

/// Module status over its non-grouping requirements
#[must_use]
pub fn module_status<'a>(requirements: impl IntoIterator<Item = &'a Requirement>) -> ModuleStatus {
    let statuses: Vec<LiveStatus> = requirements
        .into_iter()
        .filter(|r| !r.is_grouping())
        .map(|r| r.live_status.unwrap_or(LiveStatus::Unknown))
        .collect();
    if statuses.contains(&LiveStatus::Failed) {
        ModuleStatus::Failed
    } else if statuses.iter().all(|s| *s == LiveStatus::Passed) {
        ModuleStatus::Passed
    } else {
        ModuleStatus::InProgress
    }
}

/// Populates derived fields on an index
#[derive(Debug, Clone, Copy)]
pub struct Enricher<'a> {
    evidence: &'a EvidenceBundle,
    refs: &'a RefIndex,
}

impl<'a> Enricher<'a> {
    /// Create enricher over evidence and resolved references
    #[inline]
    #[must_use]
    pub fn new(evidence: &'a EvidenceBundle, refs: &'a RefIndex) -> Self {
        Self { evidence, refs }
    }

    /// Fill validation, requirement, and module live statuses
    ///
    /// Requirements on a parent/child cycle keep their own status instead
    /// of a rollup.
    pub fn enrich(&self, index: &mut Index) {
        let mut own: HashMap<RequirementLocation, LiveStatus> = HashMap::new();
        let locations: Vec<RequirementLocation> = index.all().map(|(loc, _)| loc).collect();

        for loc in &locations {
            let requirement = &mut index.modules[loc.module].requirements[loc.position];
            let sync_override = self.evidence.override_for(&requirement.id);
            for position in 0..requirement.validations.len() {
                let validation = &requirement.validations[position];
                let evidence =
                    applicable_evidence(self.evidence, &requirement.id, position, validation);
                let input = RuleInput {
                    sync_override,
                    evidence,
                    ref_exists: validation
                        .ref_key()
                        .map(|r| self.refs.exists(&r).unwrap_or(false)),
                    declared: validation.declared_status.as_ref(),
                };
                let status = validation_status(&input);
                requirement.validations[position].live_status = Some(status);
            }
            requirement.validation_summary = ValidationSummary::tally(
                requirement
                    .validations
                    .iter()
                    .map(|v| v.live_status.unwrap_or(LiveStatus::Unknown)),
            );
            let direct = requirement_evidence(self.evidence, &requirement.id);
            own.insert(*loc, own_status(requirement, sync_override, &direct));
        }

        let cyclic = cyclic_ids(&find_cycles(index));
        let mut memo: HashMap<String, LiveStatus> = HashMap::new();
        let mut finals = Vec::with_capacity(locations.len());
        for loc in &locations {
            let requirement = &index.modules[loc.module].requirements[loc.position];
            let status = if requirement.is_grouping() && !cyclic.contains(&requirement.id) {
                let children: Vec<LiveStatus> = requirement
                    .children
                    .iter()
                    .map(|c| resolve(index, c, &own, &cyclic, &mut memo))
                    .collect();
                rollup(&children)
            } else {
                own.get(loc).copied().unwrap_or(LiveStatus::Unknown)
            };
            finals.push((*loc, status));
        }
        for (loc, status) in finals {
            index.modules[loc.module].requirements[loc.position].live_status = Some(status);
        }
        for module in &mut index.modules {
            module.live_status = Some(module_status(&module.requirements));
        }

        tracing::debug!(
            requirements = locations.len(),
            cyclic = cyclic.len(),
            "enrichment complete"
        );
    }
}

/// Final status of a canonical requirement by ID; missing IDs are unknown
///
/// Post-order walk on an explicit stack. Cycle members are leaves here, so
/// every grouping's children are settled before the grouping itself.
fn resolve(
    index: &Index,
    id: &str,
    own: &HashMap<RequirementLocation, LiveStatus>,
    cyclic: &BTreeSet<String>,
    memo: &mut HashMap<String, LiveStatus>,
) -> LiveStatus {
    let mut pending: Vec<(&str, bool)> = vec![(id, false)];
    while let Some((current, expanded)) = pending.pop() {
        if memo.contains_key(current) {
            continue;
        }
        let (Some(loc), Some(requirement)) = (index.location(current), index.get(current)) else {
            memo.insert(current.to_string(), LiveStatus::Unknown);
            continue;
        };
        if !requirement.is_grouping() || cyclic.contains(current) {
            let status = own.get(&loc).copied().unwrap_or(LiveStatus::Unknown);
            memo.insert(current.to_string(), status);
        } else if expanded {
            let children: Vec<LiveStatus> = requirement
                .children
                .iter()
                .map(|c| memo.get(c.as_str()).copied().unwrap_or(LiveStatus::Unknown))
                .collect();
            memo.insert(current.to_string(), rollup(&children));
        } else {
            pending.push((current, true));
            pending.extend(requirement.children.iter().map(|c| (c.as_str(), false)));
        }
    }
    memo.get(id).copied().unwrap_or(LiveStatus::Unknown)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use reqsync_model::{Module, ValidationType};

    fn index_of(requirements: Vec<Requirement>) -> Index {
        let module = requirements
            .into_iter()
            .fold(Module::new("/s/requirements/m.json"), Module::with_requirement);
        let mut index = Index::new();
        index.push_module(module);
        index
    }

    fn test_ref(reference: &str) -> Validation {
        Validation::new(ValidationType::Test).with_ref(reference)
    }

    fn live(index: &Index, id: &str) -> LiveStatus {
        index.get(id).unwrap().live_status.unwrap()
    }

    #[test]
    fn rule_table_precedence() {
        let passing = SyncOverride {
            status: "passed".into(),
            last_run: None,
        };
        let failed = EvidenceRecord::new("unit", LiveStatus::Failed);
        let passed = EvidenceRecord::new("unit", LiveStatus::Passed);
        let base = || RuleInput {
            sync_override: None,
            evidence: Vec::new(),
            ref_exists: None,
            declared: None,
        };

        let mut input = base();
        input.sync_override = Some(&passing);
        input.evidence = vec![&failed];
        assert_eq!(validation_status(&input), LiveStatus::Passed);

        let mut input = base();
        input.evidence = vec![&passed, &failed];
        assert_eq!(validation_status(&input), LiveStatus::Failed);

        let mut input = base();
        input.evidence = vec![&passed];
        assert_eq!(validation_status(&input), LiveStatus::Passed);

        let mut input = base();
        input.ref_exists = Some(true);
        assert_eq!(validation_status(&input), LiveStatus::NotRun);

        let mut input = base();
        input.declared = Some(&ValidationStatus::Planned);
        assert_eq!(validation_status(&input), LiveStatus::NotRun);

        let mut input = base();
        input.ref_exists = Some(false);
        input.declared = Some(&ValidationStatus::NotImplemented);
        assert_eq!(validation_status(&input), LiveStatus::Unknown);

        let mut input = base();
        input.ref_exists = Some(false);
        input.declared = Some(&ValidationStatus::Implemented);
        assert_eq!(validation_status(&input), LiveStatus::Unknown);
    }

    #[test]
    fn requirement_evidence_respects_phase_and_ref() {
        let mut bundle = EvidenceBundle::new();
        let key = EvidenceKey::Requirement("R".into());
        bundle.insert(&key, EvidenceRecord::new("business", LiveStatus::Failed));
        bundle.insert(&key, EvidenceRecord::new("unit", LiveStatus::Passed).for_ref("test/other.ts"));

        let unit = test_ref("test/phases/test-unit.sh");
        assert!(applicable_evidence(&bundle, "R", 0, &unit).is_empty());

        let untagged = test_ref("test/other.ts");
        let records = applicable_evidence(&bundle, "R", 0, &untagged);
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn newest_record_per_phase_wins() {
        let mut bundle = EvidenceBundle::new();
        let key = EvidenceKey::Requirement("R".into());
        let t = |h| Utc.with_ymd_and_hms(2026, 1, 1, h, 0, 0).unwrap();
        bundle.insert(&key, EvidenceRecord::new("unit", LiveStatus::Failed).at(t(1)));
        bundle.insert(&key, EvidenceRecord::new("unit", LiveStatus::Passed).at(t(2)));

        let records = applicable_evidence(&bundle, "R", 0, &test_ref("test/phases/test-unit.sh"));
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, LiveStatus::Passed);
    }

    #[test]
    fn phase_scoped_evidence_is_a_fallback() {
        let mut bundle = EvidenceBundle::new();
        bundle.insert(
            &EvidenceKey::Phase("unit".into()),
            EvidenceRecord::new("unit", LiveStatus::Failed),
        );
        let unit = test_ref("test/phases/test-unit.sh");
        assert_eq!(applicable_evidence(&bundle, "R", 0, &unit).len(), 1);

        bundle.insert(
            &EvidenceKey::Validation("R".into(), 0),
            EvidenceRecord::new("unit", LiveStatus::Passed),
        );
        let records = applicable_evidence(&bundle, "R", 0, &unit);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, LiveStatus::Passed);
    }

    #[test]
    fn grouping_rolls_up_children() {
        let mut bundle = EvidenceBundle::new();
        bundle.insert(
            &EvidenceKey::Requirement("A".into()),
            EvidenceRecord::new("unit", LiveStatus::Passed),
        );
        bundle.insert(
            &EvidenceKey::Requirement("B".into()),
            EvidenceRecord::new("unit", LiveStatus::Skipped),
        );
        let mut index = index_of(vec![
            Requirement::new("G").with_children(["A", "B"]),
            Requirement::new("A").with_validation(test_ref("t/a")),
            Requirement::new("B").with_validation(test_ref("t/b")),
            Requirement::new("TOP").with_children(["G", "MISSING"]),
        ]);
        Enricher::new(&bundle, &RefIndex::new()).enrich(&mut index);

        assert_eq!(live(&index, "A"), LiveStatus::Passed);
        assert_eq!(live(&index, "B"), LiveStatus::Unknown);
        assert_eq!(live(&index, "G"), LiveStatus::Unknown);
        assert_eq!(live(&index, "TOP"), LiveStatus::Unknown);
        assert_eq!(rollup(&[LiveStatus::Passed, LiveStatus::Skipped]), LiveStatus::Passed);
        assert_eq!(rollup(&[LiveStatus::Passed, LiveStatus::Failed]), LiveStatus::Failed);
    }

    #[test]
    fn deep_grouping_chain_rolls_up() {
        const DEPTH: usize = 100_000;
        let mut bundle = EvidenceBundle::new();
        bundle.insert(
            &EvidenceKey::Requirement("LEAF".into()),
            EvidenceRecord::new("unit", LiveStatus::Passed),
        );
        let mut requirements: Vec<Requirement> = (0..DEPTH)
            .map(|i| {
                let child = if i + 1 == DEPTH {
                    "LEAF".to_string()
                } else {
                    format!("G{}", i + 1)
                };
                Requirement::new(format!("G{i}")).with_children([child])
            })
            .collect();
        requirements.push(Requirement::new("LEAF").with_validation(test_ref("t/leaf")));
        let mut index = index_of(requirements);

        Enricher::new(&bundle, &RefIndex::new()).enrich(&mut index);
        assert_eq!(live(&index, "G0"), LiveStatus::Passed);
        assert_eq!(live(&index, "G99999"), LiveStatus::Passed);
    }

    #[test]
    fn cycle_members_keep_own_status() {
        let mut bundle = EvidenceBundle::new();
        bundle.set_override(
            "REQ-A",
            SyncOverride {
                status: "complete".into(),
                last_run: None,
            },
        );
        let mut index = index_of(vec![
            Requirement::new("REQ-A").with_children(["REQ-B"]),
            Requirement::new("REQ-B").with_children(["REQ-A"]),
        ]);
        Enricher::new(&bundle, &RefIndex::new()).enrich(&mut index);
        assert_eq!(live(&index, "REQ-A"), LiveStatus::Passed);
        assert_eq!(live(&index, "REQ-B"), LiveStatus::Unknown);
    }

    #[test]
    fn module_status_ignores_grouping() {
        let mut bundle = EvidenceBundle::new();
        bundle.insert(
            &EvidenceKey::Requirement("A".into()),
            EvidenceRecord::new("unit", LiveStatus::Passed),
        );
        let mut index = index_of(vec![
            Requirement::new("G").with_children(["A", "NOPE"]),
            Requirement::new("A").with_validation(test_ref("t/a")),
        ]);
        Enricher::new(&bundle, &RefIndex::new()).enrich(&mut index);
        assert_eq!(index.modules[0].live_status, Some(ModuleStatus::Passed));
    }

    #[test]
    fn enrichment_is_repeatable() {
        let mut bundle = EvidenceBundle::new();
        bundle.insert(
            &EvidenceKey::Requirement("A".into()),
            EvidenceRecord::new("unit", LiveStatus::Failed),
        );
        let refs = RefIndex::from_entries([("t/b", true)]);
        let mut index = index_of(vec![
            Requirement::new("G").with_children(["A", "B"]),
            Requirement::new("A").with_validation(test_ref("t/a")),
            Requirement::new("B").with_validation(test_ref("t/b")),
        ]);
        let enricher = Enricher::new(&bundle, &refs);
        enricher.enrich(&mut index);
        let first = index.modules.clone();
        enricher.enrich(&mut index);
        assert_eq!(index.modules, first);
        assert_eq!(live(&index, "G"), LiveStatus::Failed);
        assert_eq!(live(&index, "B"), LiveStatus::NotRun);
    }

    #[test]
    fn requirement_without_validations_uses_direct_evidence() {
        let t = |h| Utc.with_ymd_and_hms(2026, 1, 1, h, 0, 0).unwrap();
        let mut bundle = EvidenceBundle::new();
        let key = EvidenceKey::Requirement("R".into());
        bundle.insert(&key, EvidenceRecord::new("unit", LiveStatus::Failed).at(t(1)));
        bundle.insert(&key, EvidenceRecord::new("unit", LiveStatus::Passed).at(t(2)));
        let mut index = index_of(vec![Requirement::new("R"), Requirement::new("QUIET")]);
        Enricher::new(&bundle, &RefIndex::new()).enrich(&mut index);
        assert_eq!(live(&index, "R"), LiveStatus::Passed);
        assert_eq!(live(&index, "QUIET"), LiveStatus::Unknown);
    }
}
