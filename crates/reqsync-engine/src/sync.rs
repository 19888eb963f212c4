//! Write-back
//!
//! Applies the status policy, rewrites changed modules atomically, appends
//! the sync log and writes the snapshot, in that order. Write failures are
//! collected per file; nothing here aborts on one bad path.

use crate::cancel::CancellationToken;
use crate::canonical::render_module;
use crate::config::EngineConfig;
use crate::error::{EngineError, SyncError, SyncStage};
use crate::snapshot::Snapshot;
use reqsync_io::{normalize_path, Reader, Writer};
use reqsync_model::{Index, LiveStatus, RequirementStatus};
use serde::Serialize;
use std::collections::BTreeSet;
use std::io;
use std::path::{Path, PathBuf};
use ulid::Ulid;

/// `coverage/requirements-sync.log`
pub const LOG_FILE: &str = "coverage/requirements-sync.log";
/// `coverage/requirements-sync/latest.json`
pub const SNAPSHOT_FILE: &str = "coverage/requirements-sync/latest.json";

/// A declared status rewritten from evidence
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusTransition {
    /// Requirement ID
    pub requirement_id: String,
    /// Module file holding it
    pub module: PathBuf,
    /// Declared status before
    pub from: Option<String>,
    /// Declared status after
    pub to: String,
}

/// Result of applying the status policy
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PolicyOutcome {
    /// Every rewrite, in index order
    pub transitions: Vec<StatusTransition>,
    /// Positions of modules that changed
    pub dirty: BTreeSet<usize>,
}

/// Declared status the policy wants for a live status, if any
#[must_use]
pub fn target_status(live: LiveStatus) -> Option<RequirementStatus> {
    match live {
        LiveStatus::Passed => Some(RequirementStatus::Complete),
        LiveStatus::Failed => Some(RequirementStatus::InProgress),
        _ => None,
    }
}

/// Rewrite declared statuses that contradict live ones
///
/// Grouping requirements and duplicated IDs are left alone, as is
/// everything when `update_statuses` is off. Changed modules are stamped
/// with `timestamp`.
pub fn apply_status_policy(
    index: &mut Index,
    config: &EngineConfig,
    timestamp: &str,
) -> PolicyOutcome {
    let mut outcome = PolicyOutcome::default();
    if !config.update_statuses {
        return outcome;
    }

    let candidates: Vec<_> = index
        .canonical()
        .filter(|(_, r)| !r.is_grouping() && !index.is_duplicated(&r.id))
        .map(|(loc, _)| loc)
        .collect();

    for loc in candidates {
        let module = &mut index.modules[loc.module];
        let path = module.source_path.clone();
        let requirement = &mut module.requirements[loc.position];
        let Some(target) = requirement.live_status.and_then(target_status) else {
            continue;
        };
        if requirement.declared_status.as_ref() == Some(&target) {
            continue;
        }
        if config.sticky_complete
            && requirement.declared_status == Some(RequirementStatus::Complete)
            && target == RequirementStatus::InProgress
        {
            tracing::debug!(id = %requirement.id, "complete is sticky, not demoting");
            continue;
        }
        let from = requirement
            .declared_status
            .replace(target.clone())
            .map(|s| s.as_str().to_string());
        tracing::info!(id = %requirement.id, from = ?from, to = %target, "declared status updated");
        outcome.transitions.push(StatusTransition {
            requirement_id: requirement.id.clone(),
            module: path,
            from,
            to: target.as_str().to_string(),
        });
        outcome.dirty.insert(loc.module);
    }

    for &position in &outcome.dirty {
        index.modules[position].touch(timestamp);
    }
    outcome
}

/// Counts of collected diagnostics, as logged
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DiagnosticCounts {
    /// Error-severity issues
    pub errors: usize,
    /// Warning-severity issues
    pub warnings: usize,
}

/// One line of `requirements-sync.log`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncLogRecord {
    /// Unique run ID
    pub run_id: Ulid,
    /// Run timestamp
    pub timestamp: String,
    /// Scenario name
    pub scenario: String,
    /// Rewritten modules, relative to the scenario
    pub files_updated: Vec<String>,
    /// Declared status rewrites
    pub transitions: Vec<StatusTransition>,
    /// Diagnostic counts
    pub diagnostics: DiagnosticCounts,
    /// Command history supplied by the caller
    pub commands: Vec<String>,
}

/// Files written and failures collected by [`Syncer::write_modules`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteBack {
    /// Modules whose bytes changed
    pub files_updated: Vec<PathBuf>,
    /// Per-file failures
    pub errors: Vec<SyncError>,
}

/// Performs the write side of a sync through a file system seam
#[derive(Debug)]
pub struct Syncer<'a, F: Reader + Writer + ?Sized> {
    fs: &'a F,
    config: &'a EngineConfig,
}

impl<'a, F: Reader + Writer + ?Sized> Syncer<'a, F> {
    /// Create syncer
    #[inline]
    #[must_use]
    pub fn new(fs: &'a F, config: &'a EngineConfig) -> Self {
        Self { fs, config }
    }

    /// Rewrite dirty modules (every module when canonicalizing)
    ///
    /// A module is written only if its canonical bytes differ from disk.
    ///
    /// # Errors
    /// [`EngineError::Cancelled`] between writes; files already written stay.
    pub async fn write_modules(
        &self,
        index: &Index,
        dirty: &BTreeSet<usize>,
        cancel: &CancellationToken,
    ) -> Result<WriteBack, EngineError> {
        let mut out = WriteBack::default();
        for (position, module) in index.modules.iter().enumerate() {
            if !self.config.canonicalize && !dirty.contains(&position) {
                continue;
            }
            if let Err(err) = cancel.check("write") {
                tracing::warn!(written = out.files_updated.len(), "write-back interrupted");
                return Err(err);
            }
            let path = &module.source_path;
            let rendered = render_module(module).map_err(|e| {
                EngineError::Internal(format!("cannot render {}: {e}", path.display()))
            })?;
            match self.write_if_changed(path, rendered.as_bytes()).await {
                Ok(true) => {
                    tracing::debug!(path = %path.display(), "module rewritten");
                    out.files_updated.push(path.clone());
                }
                Ok(false) => tracing::trace!(path = %path.display(), "module unchanged"),
                Err(err) => {
                    tracing::error!(path = %path.display(), error = %err, "module write failed");
                    out.errors.push(SyncError::new(SyncStage::Write, path, &err));
                }
            }
        }
        Ok(out)
    }

    /// Append one JSON line to the sync log
    ///
    /// # Errors
    /// [`SyncError`] with stage `log`.
    pub async fn append_log(
        &self,
        scenario_dir: &Path,
        record: &SyncLogRecord,
    ) -> Result<PathBuf, SyncError> {
        let path = normalize_path(&scenario_dir.join(LOG_FILE));
        let mut line = serde_json::to_string(record)
            .map_err(|e| SyncError::new(SyncStage::Log, &path, &io::Error::other(e)))?;
        line.push('\n');
        self.ensure_parent(&path)
            .await
            .map_err(|e| SyncError::new(SyncStage::Log, &path, &e))?;
        self.fs
            .append_file(&path, line.as_bytes())
            .await
            .map_err(|e| {
                tracing::error!(path = %path.display(), error = %e, "sync log append failed");
                SyncError::new(SyncStage::Log, &path, &e)
            })?;
        Ok(path)
    }

    /// Write `latest.json`
    ///
    /// # Errors
    /// [`SyncError`] with stage `snapshot`.
    pub async fn write_snapshot(
        &self,
        scenario_dir: &Path,
        snapshot: &Snapshot<'_>,
    ) -> Result<PathBuf, SyncError> {
        let path = normalize_path(&scenario_dir.join(SNAPSHOT_FILE));
        let mut text = serde_json::to_string_pretty(snapshot)
            .map_err(|e| SyncError::new(SyncStage::Snapshot, &path, &io::Error::other(e)))?;
        text.push('\n');
        let result = async {
            self.ensure_parent(&path).await?;
            self.write_if_changed(&path, text.as_bytes()).await
        }
        .await;
        match result {
            Ok(_) => Ok(path),
            Err(e) => {
                tracing::error!(path = %path.display(), error = %e, "snapshot write failed");
                Err(SyncError::new(SyncStage::Snapshot, &path, &e))
            }
        }
    }

    async fn write_if_changed(&self, path: &Path, bytes: &[u8]) -> io::Result<bool> {
        match self.fs.read_file(path).await {
            Ok(current) if current == bytes => return Ok(false),
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
        self.fs.write_file(path, bytes).await?;
        Ok(true)
    }

    async fn ensure_parent(&self, path: &Path) -> io::Result<()> {
        match path.parent() {
            Some(parent) if !self.fs.is_dir(parent).await => self.fs.create_dir_all(parent).await,
            _ => Ok(()),
        }
    }
}
