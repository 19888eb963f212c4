//! Error types for the sync engine
//!
//! Two families of failure exist and are kept apart:
//! - Data problems (bad JSON, duplicate IDs, cycles) become
//!   [`ValidationIssue`](reqsync_model::ValidationIssue)s and never abort.
//! - Environmental failures (I/O, cancellation, config) are returned as
//!   [`EngineError`] or collected as [`SyncError`]s during write-back.

use serde::Serialize;
use std::fmt::{self, Display, Formatter};
use std::io;
use std::path::PathBuf;

/// Main engine error type
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Cancellation token fired between files
    #[error("operation cancelled during {stage}")]
    Cancelled {
        /// Pipeline stage that observed the cancellation
        stage: &'static str,
    },

    /// File system failure outside write-back
    #[error("i/o error at {}: {source}", .path.display())]
    Io {
        /// Path being accessed
        path: PathBuf,
        /// Underlying error
        #[source]
        source: io::Error,
    },

    /// Configuration could not be loaded
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Report rendering failed
    #[error("report error: {0}")]
    Report(#[from] ReportError),

    /// Invariant broken inside the engine
    #[error("internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Create I/O error for a path
    #[inline]
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Check if error came from the environment rather than the data
    #[inline]
    #[must_use]
    pub fn is_environmental(&self) -> bool {
        matches!(self, Self::Io { .. } | Self::Cancelled { .. })
    }
}

/// Discovery failures
#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    /// Scenario has no `requirements/` directory
    #[error("no requirements directory under {}", .0.display())]
    NoRequirementsDir(PathBuf),

    /// Requirements tree exists but could not be read
    #[error("cannot read {}: {source}", .path.display())]
    Io {
        /// Path being accessed
        path: PathBuf,
        /// Underlying error
        #[source]
        source: io::Error,
    },
}

impl DiscoveryError {
    /// Create I/O error for a path
    #[inline]
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Write-back stage a [`SyncError`] came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStage {
    /// Module rewrite
    Write,
    /// `latest.json` snapshot
    Snapshot,
    /// `requirements-sync.log` append
    Log,
}

impl Display for SyncStage {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Write => "write",
            Self::Snapshot => "snapshot",
            Self::Log => "log",
        })
    }
}

/// A write-back failure, collected rather than raised
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize)]
#[error("{stage} failed for {}: {message}", .path.display())]
pub struct SyncError {
    /// Stage that failed
    pub stage: SyncStage,
    /// Target path
    pub path: PathBuf,
    /// Underlying error text
    pub message: String,
}

impl SyncError {
    /// Create sync error from an I/O failure
    #[inline]
    pub fn new(stage: SyncStage, path: impl Into<PathBuf>, err: &io::Error) -> Self {
        Self {
            stage,
            path: path.into(),
            message: err.to_string(),
        }
    }
}

/// Report rendering errors
#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    /// Output sink failed
    #[error("write failed: {0}")]
    Io(#[from] io::Error),

    /// JSON encoding failed
    #[error("json encoding failed: {0}")]
    Json(#[from] serde_json::Error),
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config file unreadable
    #[error("cannot read {}: {source}", .path.display())]
    Read {
        /// Config path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: io::Error,
    },

    /// Config file is not valid TOML for [`EngineConfig`](crate::EngineConfig)
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Value out of range
    #[error("invalid value for {field}: {reason}")]
    Invalid {
        /// Offending field
        field: &'static str,
        /// What is wrong with it
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn environmental_classification() {
        let io_err = EngineError::io("/s/x", io::Error::from(io::ErrorKind::PermissionDenied));
        assert!(io_err.is_environmental());
        assert!(EngineError::Cancelled { stage: "parse" }.is_environmental());
        assert!(!EngineError::Internal("boom".into()).is_environmental());
    }

    #[test]
    fn sync_error_display_names_stage_and_path() {
        let err = SyncError::new(
            SyncStage::Write,
            "/s/requirements/01-core/module.json",
            &io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        );
        let text = err.to_string();
        assert!(text.starts_with("write failed for /s/requirements/01-core/module.json"));
        assert!(text.ends_with("denied"));
    }
}
