//! Requirements and their validations
//!
//! Typed fields hold what the engine reasons about. Everything else found in
//! the manifest lives in an ordered carry map so write-back keeps it verbatim
//! and in its original position relative to other unknown keys.

use crate::phase::{normalize_phase, normalize_ref, phase_from_ref};
use crate::status::{Criticality, LiveStatus, RequirementStatus, ValidationStatus, ValidationType};
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;

/// Keys the canonical form gives a fixed position on a requirement
pub const REQUIREMENT_KEYS: [&str; 10] = [
    "id",
    "title",
    "description",
    "criticality",
    "status",
    "operational_target_id",
    "children",
    "validation",
    "notes",
    "metadata",
];

/// Keys the canonical form gives a fixed position on a validation
pub const VALIDATION_KEYS: [&str; 6] = ["type", "ref", "workflow_id", "phase", "status", "metadata"];

/// A single verifiable claim attached to a requirement
#[derive(Debug, Clone, PartialEq)]
pub struct Validation {
    /// Kind of claim
    pub kind: ValidationType,
    /// File or workflow reference as written
    pub reference: Option<String>,
    /// Automation workflow identifier as written
    pub workflow_id: Option<String>,
    /// Hand-authored status
    pub declared_status: Option<ValidationStatus>,
    /// Explicit phase tag as written
    pub phase: Option<String>,
    /// Opaque metadata
    pub metadata: Option<Value>,
    /// Unknown keys in original order
    pub extra: IndexMap<String, Value>,
    /// Derived by enrichment
    pub live_status: Option<LiveStatus>,
}

impl Validation {
    /// Create validation of the given kind
    #[inline]
    #[must_use]
    pub fn new(kind: ValidationType) -> Self {
        Self {
            kind,
            reference: None,
            workflow_id: None,
            declared_status: None,
            phase: None,
            metadata: None,
            extra: IndexMap::new(),
            live_status: None,
        }
    }

    /// With reference
    #[inline]
    #[must_use]
    pub fn with_ref(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    /// With declared status
    #[inline]
    #[must_use]
    pub fn with_status(mut self, status: ValidationStatus) -> Self {
        self.declared_status = Some(status);
        self
    }

    /// With explicit phase
    #[inline]
    #[must_use]
    pub fn with_phase(mut self, phase: impl Into<String>) -> Self {
        self.phase = Some(phase.into());
        self
    }

    /// Slash-normalized reference; `None` when absent or blank
    #[must_use]
    pub fn ref_key(&self) -> Option<String> {
        self.reference
            .as_deref()
            .map(normalize_ref)
            .filter(|r| !r.is_empty())
    }

    /// Trimmed workflow identifier; `None` when absent or blank
    #[must_use]
    pub fn workflow(&self) -> Option<&str> {
        self.workflow_id.as_deref().map(str::trim).filter(|w| !w.is_empty())
    }

    /// Normalized explicit phase tag
    #[must_use]
    pub fn phase_tag(&self) -> Option<String> {
        self.phase
            .as_deref()
            .map(normalize_phase)
            .filter(|p| !p.is_empty())
    }

    /// Explicit phase, else the phase implied by a runner-script reference
    #[must_use]
    pub fn effective_phase(&self) -> Option<String> {
        self.phase_tag()
            .or_else(|| self.ref_key().as_deref().and_then(phase_from_ref))
    }
}

/// Per-requirement tally of validation live statuses
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ValidationSummary {
    /// Validations attached
    pub total: usize,
    /// Passed
    pub passed: usize,
    /// Failed
    pub failed: usize,
    /// Skipped
    pub skipped: usize,
    /// Not run
    pub not_run: usize,
    /// Unknown
    pub unknown: usize,
}

impl ValidationSummary {
    /// Tally a set of live statuses
    #[must_use]
    pub fn tally(statuses: impl IntoIterator<Item = LiveStatus>) -> Self {
        let mut summary = Self::default();
        for status in statuses {
            summary.record(status);
        }
        summary
    }

    /// Record one status
    pub fn record(&mut self, status: LiveStatus) {
        self.total += 1;
        match status {
            LiveStatus::Passed => self.passed += 1,
            LiveStatus::Failed => self.failed += 1,
            LiveStatus::Skipped => self.skipped += 1,
            LiveStatus::NotRun => self.not_run += 1,
            LiveStatus::Unknown => self.unknown += 1,
        }
    }

    /// Fold another tally into this one
    pub fn merge(&mut self, other: &Self) {
        self.total += other.total;
        self.passed += other.passed;
        self.failed += other.failed;
        self.skipped += other.skipped;
        self.not_run += other.not_run;
        self.unknown += other.unknown;
    }
}

/// The unit of tracked work
#[derive(Debug, Clone, PartialEq)]
pub struct Requirement {
    /// Stable, scenario-unique identifier
    pub id: String,
    /// Short title
    pub title: Option<String>,
    /// Longer description
    pub description: Option<String>,
    /// Priority
    pub criticality: Option<Criticality>,
    /// Hand-authored status
    pub declared_status: Option<RequirementStatus>,
    /// Ordered child IDs
    pub children: Vec<String>,
    /// Grouping key for target aggregation
    pub operational_target_id: Option<String>,
    /// Ordered validations
    pub validations: Vec<Validation>,
    /// Free-form notes
    pub notes: Option<Value>,
    /// Opaque metadata
    pub metadata: Option<Value>,
    /// Unknown keys in original order
    pub extra: IndexMap<String, Value>,
    /// Derived by enrichment
    pub live_status: Option<LiveStatus>,
    /// Derived by enrichment
    pub validation_summary: ValidationSummary,
}

impl Requirement {
    /// Create requirement with only an ID
    #[inline]
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: None,
            description: None,
            criticality: None,
            declared_status: None,
            children: Vec::new(),
            operational_target_id: None,
            validations: Vec::new(),
            notes: None,
            metadata: None,
            extra: IndexMap::new(),
            live_status: None,
            validation_summary: ValidationSummary::default(),
        }
    }

    /// With title
    #[inline]
    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// With criticality
    #[inline]
    #[must_use]
    pub fn with_criticality(mut self, criticality: Criticality) -> Self {
        self.criticality = Some(criticality);
        self
    }

    /// With declared status
    #[inline]
    #[must_use]
    pub fn with_status(mut self, status: RequirementStatus) -> Self {
        self.declared_status = Some(status);
        self
    }

    /// With children
    #[inline]
    #[must_use]
    pub fn with_children<I, S>(mut self, children: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.children = children.into_iter().map(Into::into).collect();
        self
    }

    /// With operational target
    #[inline]
    #[must_use]
    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.operational_target_id = Some(target.into());
        self
    }

    /// With validation appended
    #[inline]
    #[must_use]
    pub fn with_validation(mut self, validation: Validation) -> Self {
        self.validations.push(validation);
        self
    }

    /// Grouping requirements have children and no declared status
    ///
    /// They are excluded from pass/fail counts; their live status is a
    /// rollup of their children.
    #[inline]
    #[must_use]
    pub fn is_grouping(&self) -> bool {
        self.declared_status.is_none() && !self.children.is_empty()
    }

    /// Both a declared status and children: counted, but flagged
    #[inline]
    #[must_use]
    pub fn is_ambiguous_grouping(&self) -> bool {
        self.declared_status.is_some() && !self.children.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grouping_requires_children_and_no_status() {
        let group = Requirement::new("G").with_children(["A", "B"]);
        assert!(group.is_grouping());
        assert!(!group.is_ambiguous_grouping());

        let declared = Requirement::new("G")
            .with_children(["A"])
            .with_status(RequirementStatus::Pending);
        assert!(!declared.is_grouping());
        assert!(declared.is_ambiguous_grouping());

        let leaf = Requirement::new("L");
        assert!(!leaf.is_grouping());
    }

    #[test]
    fn effective_phase_prefers_explicit_tag() {
        let inferred = Validation::new(ValidationType::Test).with_ref("test/phases/test-unit.sh");
        assert_eq!(inferred.effective_phase(), Some("unit".to_string()));

        let explicit = inferred.clone().with_phase("business");
        assert_eq!(explicit.effective_phase(), Some("business".to_string()));

        let none = Validation::new(ValidationType::Test).with_ref("test/a.test.ts");
        assert_eq!(none.effective_phase(), None);

        let aliased = none.with_phase(" E2E ");
        assert_eq!(aliased.phase.as_deref(), Some(" E2E "));
        assert_eq!(aliased.effective_phase(), Some("integration".to_string()));
    }

    #[test]
    fn blank_fields_read_as_absent() {
        let mut v = Validation::new(ValidationType::Automation)
            .with_ref(".\\test\\phases\\test-unit.sh");
        assert_eq!(v.ref_key().as_deref(), Some("test/phases/test-unit.sh"));
        assert_eq!(v.effective_phase().as_deref(), Some("unit"));

        v.reference = Some(String::new());
        v.workflow_id = Some("  ".to_string());
        v.phase = Some(String::new());
        assert_eq!(v.ref_key(), None);
        assert_eq!(v.workflow(), None);
        assert_eq!(v.effective_phase(), None);
    }

    #[test]
    fn validation_summary_tallies() {
        let summary = ValidationSummary::tally([
            LiveStatus::Passed,
            LiveStatus::Passed,
            LiveStatus::Failed,
            LiveStatus::NotRun,
        ]);
        assert_eq!(summary.total, 4);
        assert_eq!(summary.passed, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.not_run, 1);
        assert_eq!(summary.unknown, 0);
    }
}
