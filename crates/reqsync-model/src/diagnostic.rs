//! Diagnostics collected while processing a scenario
//!
//! Data problems never abort the pipeline. They are collected here and
//! surfaced to the caller alongside the results.

use serde::Serialize;
use std::fmt::{self, Display, Formatter};
use std::path::{Path, PathBuf};

/// Diagnostic severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Structural violation
    Error,
    /// Suspicious but tolerated
    Warning,
    /// Informational
    Info,
}

impl Severity {
    /// Canonical spelling
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warning => "warning",
            Self::Info => "info",
        }
    }
}

/// Machine-readable diagnostic code
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueCode {
    /// Same requirement ID declared more than once
    DuplicateId,
    /// Parent/child relation loops back on itself
    CycleDetected,
    /// Child ID does not resolve
    MissingChild,
    /// Test reference does not exist on disk
    MissingReference,
    /// Automation validation with neither ref nor workflow
    MissingAutomationTarget,
    /// Requirement with both a status and children
    AmbiguousGrouping,
    /// Phase tag disagrees with the runner script reference
    PhaseMismatch,
    /// Requirement entry without an `id`
    MissingId,
    /// Unrecognized enum spelling
    UnknownValue,
    /// Manifest could not be decoded
    ParseError,
    /// Import could not be resolved
    DiscoveryError,
    /// Evidence file could not be decoded
    EvidenceUnreadable,
    /// Manifest exceeds the configured size limit
    OversizedFile,
}

impl IssueCode {
    /// Canonical spelling
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::DuplicateId => "duplicate_id",
            Self::CycleDetected => "cycle_detected",
            Self::MissingChild => "missing_child",
            Self::MissingReference => "missing_reference",
            Self::MissingAutomationTarget => "missing_automation_target",
            Self::AmbiguousGrouping => "ambiguous_grouping",
            Self::PhaseMismatch => "phase_mismatch",
            Self::MissingId => "missing_id",
            Self::UnknownValue => "unknown_value",
            Self::ParseError => "parse_error",
            Self::DiscoveryError => "discovery_error",
            Self::EvidenceUnreadable => "evidence_unreadable",
            Self::OversizedFile => "oversized_file",
        }
    }
}

impl Display for IssueCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single structural or data diagnostic
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ValidationIssue {
    /// Severity
    pub severity: Severity,
    /// Diagnostic code
    pub code: IssueCode,
    /// Human-readable description
    pub message: String,
    /// Requirement the issue concerns
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requirement_id: Option<String>,
    /// File the issue concerns
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

impl ValidationIssue {
    /// Create issue
    #[inline]
    #[must_use]
    pub fn new(severity: Severity, code: IssueCode, message: impl Into<String>) -> Self {
        Self {
            severity,
            code,
            message: message.into(),
            requirement_id: None,
            path: None,
        }
    }

    /// Error-severity issue
    #[inline]
    #[must_use]
    pub fn error(code: IssueCode, message: impl Into<String>) -> Self {
        Self::new(Severity::Error, code, message)
    }

    /// Warning-severity issue
    #[inline]
    #[must_use]
    pub fn warning(code: IssueCode, message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, code, message)
    }

    /// Attach requirement ID
    #[inline]
    #[must_use]
    pub fn for_requirement(mut self, id: impl Into<String>) -> Self {
        self.requirement_id = Some(id.into());
        self
    }

    /// Attach file path
    #[inline]
    #[must_use]
    pub fn at_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Duplicate ID issue naming every declaring file
    #[must_use]
    pub fn duplicate_id(id: &str, paths: &[PathBuf]) -> Self {
        let listed: Vec<String> = paths.iter().map(|p| p.display().to_string()).collect();
        Self::error(
            IssueCode::DuplicateId,
            format!("requirement {id} is declared in {}", listed.join(", ")),
        )
        .for_requirement(id)
    }

    /// Whether this is an error
    #[inline]
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl Display for ValidationIssue {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.severity.as_str(), self.code, self.message)?;
        if let Some(path) = &self.path {
            write!(f, " ({})", path.display())?;
        }
        Ok(())
    }
}

/// JSON decode failure for a specific file
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize)]
#[error("{}: {message}", .path.display())]
pub struct ParseError {
    /// File that failed
    pub path: PathBuf,
    /// 1-based line, when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
    /// 1-based column, when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<usize>,
    /// Decoder message
    pub message: String,
}

impl ParseError {
    /// Create parse error without position
    #[inline]
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            line: None,
            column: None,
            message: message.into(),
        }
    }

    /// Create parse error from a serde_json failure
    #[must_use]
    pub fn from_json(path: &Path, err: &serde_json::Error) -> Self {
        Self {
            path: path.to_path_buf(),
            line: Some(err.line()).filter(|l| *l > 0),
            column: Some(err.column()).filter(|c| *c > 0),
            message: err.to_string(),
        }
    }

    /// Render as a diagnostic
    #[must_use]
    pub fn to_issue(&self) -> ValidationIssue {
        ValidationIssue::error(IssueCode::ParseError, self.message.clone()).at_path(&self.path)
    }
}

/// Diagnostics from a structural check
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ValidationResult {
    /// All issues, in discovery order
    pub issues: Vec<ValidationIssue>,
    /// Every parent/child cycle found, as closed ID paths
    pub cycles: Vec<Vec<String>>,
}

impl ValidationResult {
    /// Empty result
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add issue
    #[inline]
    pub fn push(&mut self, issue: ValidationIssue) {
        self.issues.push(issue);
    }

    /// Add issues that are not already present
    pub fn extend_unique(&mut self, issues: impl IntoIterator<Item = ValidationIssue>) {
        for issue in issues {
            if !self.issues.contains(&issue) {
                self.issues.push(issue);
            }
        }
    }

    /// Whether any error-severity issue is present
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.issues.iter().any(ValidationIssue::is_error)
    }

    /// Error-severity issues
    pub fn errors(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.issues.iter().filter(|i| i.severity == Severity::Error)
    }

    /// Warning-severity issues
    pub fn warnings(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.issues.iter().filter(|i| i.severity == Severity::Warning)
    }

    /// Issues with the given code
    pub fn with_code(&self, code: IssueCode) -> impl Iterator<Item = &ValidationIssue> {
        self.issues.iter().filter(move |i| i.code == code)
    }

    /// Whether the result is clean
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_issue_names_every_path() {
        let issue = ValidationIssue::duplicate_id(
            "REQ-001",
            &[PathBuf::from("/s/a.json"), PathBuf::from("/s/b.json")],
        );
        assert!(issue.is_error());
        assert_eq!(issue.code, IssueCode::DuplicateId);
        assert!(issue.message.contains("/s/a.json"));
        assert!(issue.message.contains("/s/b.json"));
        assert_eq!(issue.requirement_id.as_deref(), Some("REQ-001"));
    }

    #[test]
    fn parse_error_captures_position() {
        let err = serde_json::from_str::<serde_json::Value>("{\n  \"a\": }").unwrap_err();
        let parsed = ParseError::from_json(Path::new("/s/m.json"), &err);
        assert_eq!(parsed.line, Some(2));
        assert!(parsed.column.is_some());
        assert_eq!(parsed.to_issue().code, IssueCode::ParseError);
    }

    #[test]
    fn extend_unique_skips_repeats() {
        let issue = ValidationIssue::warning(IssueCode::AmbiguousGrouping, "x");
        let mut result = ValidationResult::new();
        result.extend_unique([issue.clone(), issue.clone()]);
        result.extend_unique([issue]);
        assert_eq!(result.issues.len(), 1);
        assert!(!result.has_errors());
        assert_eq!(result.warnings().count(), 1);
    }

    #[test]
    fn issue_display_includes_code_and_path() {
        let issue = ValidationIssue::warning(IssueCode::MissingReference, "test/a.sh missing")
            .at_path("/s/requirements/m.json");
        let text = issue.to_string();
        assert!(text.starts_with("[warning] missing_reference"));
        assert!(text.contains("/s/requirements/m.json"));
    }
}
