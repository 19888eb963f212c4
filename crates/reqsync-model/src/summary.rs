//! Summary numbers rendered by the reporter and persisted in snapshots

use crate::evidence::PhaseTally;
use crate::requirement::ValidationSummary;
use serde::Serialize;
use std::collections::BTreeMap;

/// Counts for one criticality bucket
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CriticalityTally {
    /// Counted requirements
    pub total: usize,
    /// Live passed
    pub passed: usize,
    /// Live failed
    pub failed: usize,
}

/// Verdict for one operational target
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TargetStatus {
    /// Target ID, or the requirement ID for implicit P0/P1 targets
    pub id: String,
    /// Whether any member requirement passed
    pub passing: bool,
    /// Member requirement IDs
    pub requirements: Vec<String>,
}

/// Operational target aggregation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TargetSummary {
    /// Number of targets
    pub total: usize,
    /// Targets with at least one passing requirement
    pub passing: usize,
    /// Remaining targets
    pub failing: usize,
    /// Per-target verdicts, explicit targets first in first-seen order
    pub targets: Vec<TargetStatus>,
}

/// Derived totals over an enriched index
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Summary {
    /// Module files
    pub modules: usize,
    /// Distinct requirements
    pub total: usize,
    /// Grouping requirements (excluded from pass/fail)
    pub grouping: usize,
    /// `total - grouping`
    pub counted: usize,
    /// Counted requirements with live status passed
    pub passed: usize,
    /// Counted requirements with live status failed
    pub failed: usize,
    /// `passed / counted`, 0 when nothing is counted
    pub pass_rate: f64,
    /// Counted requirements per declared status (`unset` when empty)
    pub by_declared: BTreeMap<String, usize>,
    /// Counted requirements per live status
    pub by_live: BTreeMap<String, usize>,
    /// Counted requirements per criticality (`unset` when empty)
    pub by_criticality: BTreeMap<String, CriticalityTally>,
    /// Operational targets
    pub targets: TargetSummary,
    /// Validation live statuses across counted requirements
    pub validations: ValidationSummary,
    /// Phase-scoped evidence tallies
    pub phases: BTreeMap<String, PhaseTally>,
}

impl Summary {
    /// Pass rate as a percentage rounded to one decimal
    #[must_use]
    pub fn pass_rate_percent(&self) -> f64 {
        (self.pass_rate * 1000.0).round() / 10.0
    }
}
