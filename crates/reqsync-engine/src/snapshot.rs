//! Derived-state documents
//!
//! The snapshot written to `coverage/requirements-sync/latest.json` and the
//! JSON report share these shapes.

use reqsync_io::{relative_to, to_slash};
use reqsync_model::{
    Index, LiveStatus, Module, ModuleStatus, Requirement, Summary, Validation, ValidationSummary,
};
use serde::Serialize;
use std::path::Path;

/// Derived view of one validation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationView {
    /// Validation type
    #[serde(rename = "type")]
    pub kind: String,
    /// Reference
    #[serde(rename = "ref", skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    /// Effective phase
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
    /// Declared status
    #[serde(skip_serializing_if = "Option::is_none")]
    pub declared_status: Option<String>,
    /// Live status
    pub live_status: LiveStatus,
}

/// Derived view of one requirement
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequirementView {
    /// Requirement ID
    pub id: String,
    /// Title
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Criticality
    #[serde(skip_serializing_if = "Option::is_none")]
    pub criticality: Option<String>,
    /// Declared status after sync
    #[serde(skip_serializing_if = "Option::is_none")]
    pub declared_status: Option<String>,
    /// Live status
    pub live_status: LiveStatus,
    /// Whether it is a grouping requirement
    pub grouping: bool,
    /// Child IDs
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<String>,
    /// Operational target
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operational_target_id: Option<String>,
    /// Validation tallies
    pub validation_summary: ValidationSummary,
    /// Per-validation views
    pub validations: Vec<ValidationView>,
}

/// Derived view of one module
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModuleView {
    /// Path relative to the scenario, forward slashes
    pub path: String,
    /// Module name
    pub name: String,
    /// Module status
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<ModuleStatus>,
    /// Requirements in declaration order
    pub requirements: Vec<RequirementView>,
}

/// `latest.json`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot<'a> {
    /// Run timestamp
    pub generated_at: String,
    /// Scenario name
    pub scenario: &'a str,
    /// Summary
    pub summary: &'a Summary,
    /// Modules
    pub modules: Vec<ModuleView>,
}

impl From<&Validation> for ValidationView {
    fn from(v: &Validation) -> Self {
        Self {
            kind: v.kind.as_str().to_string(),
            reference: v.ref_key(),
            phase: v.effective_phase(),
            declared_status: v.declared_status.as_ref().map(|s| s.as_str().to_string()),
            live_status: v.live_status.unwrap_or(LiveStatus::Unknown),
        }
    }
}

impl From<&Requirement> for RequirementView {
    fn from(r: &Requirement) -> Self {
        Self {
            id: r.id.clone(),
            title: r.title.clone(),
            criticality: r.criticality.as_ref().map(|c| c.as_str().to_string()),
            declared_status: r.declared_status.as_ref().map(|s| s.as_str().to_string()),
            live_status: r.live_status.unwrap_or(LiveStatus::Unknown),
            grouping: r.is_grouping(),
            children: r.children.clone(),
            operational_target_id: r.operational_target_id.clone(),
            validation_summary: r.validation_summary,
            validations: r.validations.iter().map(ValidationView::from).collect(),
        }
    }
}

impl ModuleView {
    /// View of `module` with its path relative to `scenario_dir`
    #[must_use]
    pub fn new(module: &Module, scenario_dir: &Path) -> Self {
        Self {
            path: to_slash(&relative_to(&module.source_path, scenario_dir)),
            name: module.name(),
            status: module.live_status,
            requirements: module.requirements.iter().map(RequirementView::from).collect(),
        }
    }
}

/// Views of every module in index order
#[must_use]
pub fn module_views(index: &Index, scenario_dir: &Path) -> Vec<ModuleView> {
    index
        .modules
        .iter()
        .map(|m| ModuleView::new(m, scenario_dir))
        .collect()
}
