//! Status and classification enums
//!
//! Every enum here normalizes on ingress (case, separators) and renders a
//! fixed spelling on egress. Unrecognized spellings are kept in an `Other`
//! variant so nothing hand-authored is lost on write-back.

use serde::{Serialize, Serializer};
use std::fmt::{self, Display, Formatter};

/// Lowercase, trim, and fold `-`/space separators into `_`
#[must_use]
pub fn normalize_token(raw: &str) -> String {
    raw.trim()
        .chars()
        .map(|c| match c {
            '-' | ' ' => '_',
            c => c.to_ascii_lowercase(),
        })
        .collect()
}

/// Hand-authored status of a requirement
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RequirementStatus {
    /// Not yet started
    Pending,
    /// Scheduled
    Planned,
    /// Work underway
    InProgress,
    /// Done
    Complete,
    /// Explicitly not implemented
    NotImplemented,
    /// Unrecognized spelling, preserved normalized
    Other(String),
}

impl RequirementStatus {
    /// Parse a declared status; empty input means "no status"
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let token = normalize_token(raw);
        let status = match token.as_str() {
            "" => return None,
            "pending" => Self::Pending,
            "planned" => Self::Planned,
            "in_progress" | "inprogress" => Self::InProgress,
            "complete" | "completed" => Self::Complete,
            "not_implemented" => Self::NotImplemented,
            _ => Self::Other(token),
        };
        Some(status)
    }

    /// Canonical spelling
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Pending => "pending",
            Self::Planned => "planned",
            Self::InProgress => "in_progress",
            Self::Complete => "complete",
            Self::NotImplemented => "not_implemented",
            Self::Other(raw) => raw,
        }
    }

    /// Whether the spelling was recognized
    #[inline]
    #[must_use]
    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Other(_))
    }
}

/// Priority of a requirement
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Criticality {
    /// Must have
    P0,
    /// Should have
    P1,
    /// Nice to have
    P2,
    /// Unrecognized spelling, preserved uppercased
    Other(String),
}

impl Criticality {
    /// Parse a criticality; empty input means "unset"
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let token = raw.trim().to_ascii_uppercase();
        let criticality = match token.as_str() {
            "" => return None,
            "P0" => Self::P0,
            "P1" => Self::P1,
            "P2" => Self::P2,
            _ => Self::Other(token),
        };
        Some(criticality)
    }

    /// Canonical spelling
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::P0 => "P0",
            Self::P1 => "P1",
            Self::P2 => "P2",
            Self::Other(raw) => raw,
        }
    }

    /// Whether the spelling was recognized
    #[inline]
    #[must_use]
    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Other(_))
    }

    /// P0 and P1 requirements count as their own operational target
    #[inline]
    #[must_use]
    pub fn is_high_priority(&self) -> bool {
        matches!(self, Self::P0 | Self::P1)
    }
}

/// Kind of verifiable claim
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ValidationType {
    /// Automated test file
    Test,
    /// Browser/workflow automation
    Automation,
    /// Manual check
    Manual,
    /// Lighthouse audit
    Lighthouse,
    /// Unrecognized spelling, preserved normalized
    Other(String),
}

impl ValidationType {
    /// Parse a validation type; empty input is treated as `Other("")`
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let token = normalize_token(raw);
        match token.as_str() {
            "test" => Self::Test,
            "automation" => Self::Automation,
            "manual" => Self::Manual,
            "lighthouse" => Self::Lighthouse,
            _ => Self::Other(token),
        }
    }

    /// Canonical spelling
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Test => "test",
            Self::Automation => "automation",
            Self::Manual => "manual",
            Self::Lighthouse => "lighthouse",
            Self::Other(raw) => raw,
        }
    }

    /// Whether the spelling was recognized
    #[inline]
    #[must_use]
    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Other(_))
    }
}

/// Hand-authored status of a validation
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ValidationStatus {
    /// Not implemented yet
    NotImplemented,
    /// Scheduled
    Planned,
    /// Implemented
    Implemented,
    /// Known failing
    Failing,
    /// Unrecognized spelling, preserved normalized
    Other(String),
}

impl ValidationStatus {
    /// Parse a declared validation status; empty input means "no status"
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let token = normalize_token(raw);
        let status = match token.as_str() {
            "" => return None,
            "not_implemented" => Self::NotImplemented,
            "planned" => Self::Planned,
            "implemented" => Self::Implemented,
            "failing" => Self::Failing,
            _ => Self::Other(token),
        };
        Some(status)
    }

    /// Canonical spelling
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::NotImplemented => "not_implemented",
            Self::Planned => "planned",
            Self::Implemented => "implemented",
            Self::Failing => "failing",
            Self::Other(raw) => raw,
        }
    }

    /// Whether the spelling was recognized
    #[inline]
    #[must_use]
    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Other(_))
    }
}

/// Status observed from evidence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LiveStatus {
    /// Observed passing
    Passed,
    /// Observed failing
    Failed,
    /// Deliberately skipped
    Skipped,
    /// Exists but no run observed
    NotRun,
    /// Nothing can be said
    Unknown,
}

impl LiveStatus {
    /// All variants in rendering order
    pub const ALL: [Self; 5] = [
        Self::Passed,
        Self::Failed,
        Self::Skipped,
        Self::NotRun,
        Self::Unknown,
    ];

    /// Parse an observed status; `None` if the spelling is unrecognized
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let status = match normalize_token(raw).as_str() {
            "passed" | "pass" | "success" | "ok" => Self::Passed,
            "failed" | "fail" | "failure" | "error" => Self::Failed,
            "skipped" | "skip" => Self::Skipped,
            "not_run" | "notrun" => Self::NotRun,
            "unknown" => Self::Unknown,
            _ => return None,
        };
        Some(status)
    }

    /// Canonical spelling
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Passed => "passed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
            Self::NotRun => "not_run",
            Self::Unknown => "unknown",
        }
    }

    /// Only passed and failed records count toward totals
    #[inline]
    #[must_use]
    pub const fn is_counted(self) -> bool {
        matches!(self, Self::Passed | Self::Failed)
    }
}

/// Rolled-up status of a module file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModuleStatus {
    /// Every counted requirement passed
    Passed,
    /// At least one requirement failed
    Failed,
    /// Anything else
    InProgress,
}

impl ModuleStatus {
    /// Canonical spelling
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Passed => "passed",
            Self::Failed => "failed",
            Self::InProgress => "in_progress",
        }
    }
}

macro_rules! string_repr {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Display for $ty {
                fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
                    f.write_str(self.as_str())
                }
            }

            impl Serialize for $ty {
                fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                    serializer.serialize_str(self.as_str())
                }
            }
        )*
    };
}

string_repr!(
    RequirementStatus,
    Criticality,
    ValidationType,
    ValidationStatus,
    LiveStatus,
    ModuleStatus,
);
