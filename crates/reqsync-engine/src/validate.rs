//! Structural checks
//!
//! The validator reads the index and never mutates it. Each check is a
//! function over the index that appends issues, run in a fixed order.

use crate::graph::find_cycles;
use crate::refs::RefIndex;
use reqsync_model::{
    phase_from_ref, Index, IssueCode, Module, Requirement, ValidationIssue, ValidationResult,
    ValidationType,
};
use std::collections::BTreeMap;
use std::path::PathBuf;

type Check = fn(&Index, &RefIndex, &mut ValidationResult);

const CHECKS: [(&str, Check); 6] = [
    ("unique_ids", check_unique_ids),
    ("cycles", check_cycles),
    ("children", check_children),
    ("references", check_references),
    ("grouping", check_grouping),
    ("phases", check_phases),
];

/// Run every check against an index with resolved references
#[must_use]
pub fn validate_with(index: &Index, refs: &RefIndex) -> ValidationResult {
    let mut result = ValidationResult::new();
    for (name, check) in CHECKS {
        let before = result.issues.len();
        check(index, refs, &mut result);
        tracing::trace!(check = name, issues = result.issues.len() - before, "check done");
    }
    result
}

fn located(index: &Index) -> impl Iterator<Item = (&Module, &Requirement)> {
    index
        .all()
        .map(move |(loc, req)| (&index.modules[loc.module], req))
}

fn check_unique_ids(index: &Index, _: &RefIndex, result: &mut ValidationResult) {
    let mut seen: BTreeMap<&str, Vec<PathBuf>> = BTreeMap::new();
    for (module, requirement) in located(index) {
        seen.entry(requirement.id.as_str())
            .or_default()
            .push(module.source_path.clone());
    }
    for (id, paths) in seen.into_iter().filter(|(_, p)| p.len() > 1) {
        result.push(ValidationIssue::duplicate_id(id, &paths));
    }
}

fn check_cycles(index: &Index, _: &RefIndex, result: &mut ValidationResult) {
    for cycle in find_cycles(index) {
        let mut issue = ValidationIssue::error(IssueCode::CycleDetected, cycle.to_string());
        if let Some(first) = cycle.path.first() {
            issue = issue.for_requirement(first.clone());
            if let Some(loc) = index.location(first) {
                issue = issue.at_path(index.modules[loc.module].source_path.clone());
            }
        }
        result.cycles.push(cycle.path);
        result.push(issue);
    }
}

fn check_children(index: &Index, _: &RefIndex, result: &mut ValidationResult) {
    for (module, requirement) in located(index) {
        for child in &requirement.children {
            if index.get(child).is_none() {
                result.push(
                    ValidationIssue::error(
                        IssueCode::MissingChild,
                        format!("{} lists unknown child {child}", requirement.id),
                    )
                    .for_requirement(&requirement.id)
                    .at_path(&module.source_path),
                );
            }
        }
    }
}

fn check_references(index: &Index, refs: &RefIndex, result: &mut ValidationResult) {
    for (module, requirement) in located(index) {
        for (i, validation) in requirement.validations.iter().enumerate() {
            match (&validation.kind, validation.ref_key()) {
                (ValidationType::Test, Some(reference)) if refs.exists(&reference) != Some(true) => {
                    result.push(
                        ValidationIssue::warning(
                            IssueCode::MissingReference,
                            format!("validation {i} references missing file {reference}"),
                        )
                        .for_requirement(&requirement.id)
                        .at_path(&module.source_path),
                    );
                }
                (ValidationType::Automation, None) if validation.workflow().is_none() => {
                    result.push(
                        ValidationIssue::warning(
                            IssueCode::MissingAutomationTarget,
                            format!("automation validation {i} has neither ref nor workflow_id"),
                        )
                        .for_requirement(&requirement.id)
                        .at_path(&module.source_path),
                    );
                }
                _ => {}
            }
        }
    }
}

fn check_grouping(index: &Index, _: &RefIndex, result: &mut ValidationResult) {
    for (module, requirement) in located(index) {
        if requirement.is_ambiguous_grouping() {
            result.push(
                ValidationIssue::warning(
                    IssueCode::AmbiguousGrouping,
                    format!(
                        "{} has both a status and children; it is counted as a leaf",
                        requirement.id
                    ),
                )
                .for_requirement(&requirement.id)
                .at_path(&module.source_path),
            );
        }
    }
}

fn check_phases(index: &Index, _: &RefIndex, result: &mut ValidationResult) {
    for (module, requirement) in located(index) {
        for (i, validation) in requirement.validations.iter().enumerate() {
            let (Some(tagged), Some(inferred)) = (
                validation.phase_tag(),
                validation.ref_key().as_deref().and_then(phase_from_ref),
            ) else {
                continue;
            };
            if tagged != inferred {
                result.push(
                    ValidationIssue::warning(
                        IssueCode::PhaseMismatch,
                        format!("validation {i} is tagged {tagged} but runs the {inferred} phase"),
                    )
                    .for_requirement(&requirement.id)
                    .at_path(&module.source_path),
                );
            }
        }
    }
}
