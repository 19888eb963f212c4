//! Requirement Sync Model
//!
//! Typed data model for requirement manifests and test evidence.
//!
//! # Core Concepts
//!
//! - [`Requirement`]: tracked unit of work with a stable ID and optional children
//! - [`Validation`]: verifiable claim attached to a requirement
//! - [`Module`]: one manifest file on disk
//! - [`Index`]: parsed union of all modules with a by-ID lookup
//! - [`EvidenceBundle`]: observations keyed by requirement, validation, or phase
//! - [`ValidationIssue`]: diagnostic collected instead of aborting
//!
//! Declared statuses are hand-authored; live statuses are derived from
//! evidence and never persisted into manifests directly.
//!
//! # Example
//!
//! ```rust
//! use reqsync_model::{Index, Module, Requirement, RequirementStatus};
//!
//! let module = Module::new("/scenario/requirements/01-core/module.json")
//!     .with_requirement(Requirement::new("REQ-001").with_status(RequirementStatus::Pending));
//!
//! let mut index = Index::new();
//! index.push_module(module);
//! assert!(index.get("REQ-001").is_some());
//! ```


pub mod diagnostic;
pub mod evidence;
pub mod index;
pub mod module;
pub mod phase;
pub mod requirement;
pub mod status;
pub mod summary;

pub use diagnostic::{IssueCode, ParseError, Severity, ValidationIssue, ValidationResult};
pub use evidence::{
    EvidenceBundle, EvidenceKey, EvidenceRecord, PhaseResult, PhaseTally, SyncOverride,
};
pub use index::{Index, RequirementLocation};
pub use module::{Module, ModuleKind, ModuleMetadata};
pub use phase::{normalize_phase, normalize_ref, phase_from_ref};
pub use requirement::{Requirement, Validation, ValidationSummary};
pub use status::{
    Criticality, LiveStatus, ModuleStatus, RequirementStatus, ValidationStatus, ValidationType,
};
pub use summary::{CriticalityTally, Summary, TargetStatus, TargetSummary};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
