//! Programmatic facade
//!
//! Every operation runs the same read pipeline (discover, parse, load
//! evidence, resolve references, validate, enrich) and then does its own
//! thing with the result. Only [`SyncEngine::sync`] writes.

use crate::cancel::CancellationToken;
use crate::config::{Clock, EngineConfig, SystemClock};
use crate::discovery::Discoverer;
use crate::enrich::Enricher;
use crate::error::{DiscoveryError, EngineError, SyncError};
use crate::evidence::{merge_phase_results, EvidenceLoader};
use crate::parser::Parser;
use crate::refs::RefIndex;
use crate::report::{ReportOptions, Reporter};
use crate::snapshot::{module_views, Snapshot};
use crate::summary::summarize;
use crate::sync::{apply_status_policy, DiagnosticCounts, StatusTransition, SyncLogRecord, Syncer};
use crate::validate::validate_with;
use reqsync_io::{relative_to, to_slash, FileSystem};
use reqsync_model::{
    normalize_phase, EvidenceBundle, Index, LiveStatus, ParseError, PhaseResult, Summary,
    ValidationResult,
};
use serde::Serialize;
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use ulid::Ulid;

/// Input to [`SyncEngine::sync`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncInput {
    /// Scenario name, recorded in the log and snapshot
    pub scenario_name: String,
    /// Scenario root
    pub scenario_dir: PathBuf,
    /// Results reported by the test driver for this run
    pub phase_results: Vec<PhaseResult>,
    /// Commands the driver ran, appended to the sync log
    pub command_history: Vec<String>,
}

impl SyncInput {
    /// Create input for a scenario
    #[inline]
    #[must_use]
    pub fn new(scenario_name: impl Into<String>, scenario_dir: impl Into<PathBuf>) -> Self {
        Self {
            scenario_name: scenario_name.into(),
            scenario_dir: scenario_dir.into(),
            ..Self::default()
        }
    }

    /// With driver phase results
    #[inline]
    #[must_use]
    pub fn with_phase_results(mut self, results: Vec<PhaseResult>) -> Self {
        self.phase_results = results;
        self
    }

    /// With command history
    #[inline]
    #[must_use]
    pub fn with_commands(mut self, commands: Vec<String>) -> Self {
        self.command_history = commands;
        self
    }
}

/// What a sync did
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SyncOutcome {
    /// The scenario had no requirements directory
    pub skipped: bool,
    /// Modules whose bytes changed
    pub files_updated: Vec<PathBuf>,
    /// Declared status rewrites
    pub transitions: Vec<StatusTransition>,
    /// Everything collected about the data
    pub diagnostics: ValidationResult,
    /// Write-back failures
    pub sync_errors: Vec<SyncError>,
    /// Summary after write-back
    pub summary: Summary,
    /// Snapshot location, when written
    pub snapshot_path: Option<PathBuf>,
}

impl SyncOutcome {
    fn skipped() -> Self {
        Self {
            skipped: true,
            ..Self::default()
        }
    }

    /// 3 on write-back failure, 2 on validation errors, else 0
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        if !self.sync_errors.is_empty() {
            3
        } else if self.diagnostics.has_errors() {
            2
        } else {
            0
        }
    }
}

/// One validation attributed to a phase
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PhaseValidation {
    /// Owning requirement
    pub requirement_id: String,
    /// Module file declaring it
    pub module: PathBuf,
    /// Position in the requirement's validation list
    pub index: usize,
    /// Validation type
    #[serde(rename = "type")]
    pub kind: String,
    /// Reference
    #[serde(rename = "ref")]
    pub reference: Option<String>,
    /// Effective phase
    pub phase: String,
    /// Declared status
    pub declared_status: Option<String>,
    /// Live status
    pub live_status: LiveStatus,
    /// Whether the reference exists; `None` without a reference
    pub exists: Option<bool>,
}

/// Result of [`SyncEngine::phase_inspect`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PhaseInspectResult {
    /// Normalized phase name
    pub phase: String,
    /// Validations in index order
    pub validations: Vec<PhaseValidation>,
}

struct Loaded {
    index: Index,
    evidence: EvidenceBundle,
    refs: RefIndex,
    diagnostics: ValidationResult,
}

/// Requirement sync engine
///
/// Holds the file-system seam, configuration, clock, and cancellation
/// token shared by every operation.
pub struct SyncEngine {
    fs: Arc<dyn FileSystem>,
    config: EngineConfig,
    clock: Arc<dyn Clock>,
    cancel: CancellationToken,
}

impl fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncEngine")
            .field("config", &self.config)
            .field("clock", &self.clock)
            .field("cancel", &self.cancel)
            .finish_non_exhaustive()
    }
}

impl SyncEngine {
    /// Create engine over a file system with the wall clock
    #[must_use]
    pub fn new(fs: Arc<dyn FileSystem>, config: EngineConfig) -> Self {
        Self {
            fs,
            config,
            clock: Arc::new(SystemClock),
            cancel: CancellationToken::new(),
        }
    }

    /// With clock
    #[inline]
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// With an externally owned cancellation token
    #[inline]
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Get configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Handle that cancels this engine's operations
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Reconcile manifests with evidence and write the result back
    ///
    /// A scenario without `requirements/` is a no-op: nothing is written,
    /// not even the log.
    ///
    /// # Errors
    /// [`EngineError::Cancelled`] if the token fires; files already written
    /// stay written.
    #[tracing::instrument(skip_all, fields(scenario = %input.scenario_name, dir = %input.scenario_dir.display()))]
    pub async fn sync(&self, input: &SyncInput) -> Result<SyncOutcome, EngineError> {
        let dir = input.scenario_dir.as_path();
        let Some(mut loaded) = self.load(dir, &input.phase_results).await? else {
            return Ok(SyncOutcome::skipped());
        };

        let timestamp = self.clock.timestamp();
        let policy = apply_status_policy(&mut loaded.index, &self.config, &timestamp);
        let syncer = Syncer::new(&*self.fs, &self.config);
        let written = syncer
            .write_modules(&loaded.index, &policy.dirty, &self.cancel)
            .await?;
        let mut sync_errors = written.errors;
        let summary = summarize(&loaded.index, &loaded.evidence);

        if self.config.append_log {
            let record = SyncLogRecord {
                run_id: Ulid::new(),
                timestamp: timestamp.clone(),
                scenario: input.scenario_name.clone(),
                files_updated: written
                    .files_updated
                    .iter()
                    .map(|p| to_slash(&relative_to(p, dir)))
                    .collect(),
                transitions: policy.transitions.clone(),
                diagnostics: DiagnosticCounts {
                    errors: loaded.diagnostics.errors().count(),
                    warnings: loaded.diagnostics.warnings().count(),
                },
                commands: input.command_history.clone(),
            };
            if let Err(err) = syncer.append_log(dir, &record).await {
                sync_errors.push(err);
            }
        }

        let mut snapshot_path = None;
        if self.config.write_snapshot {
            let snapshot = Snapshot {
                generated_at: timestamp,
                scenario: &input.scenario_name,
                summary: &summary,
                modules: module_views(&loaded.index, dir),
            };
            match syncer.write_snapshot(dir, &snapshot).await {
                Ok(path) => snapshot_path = Some(path),
                Err(err) => sync_errors.push(err),
            }
        }

        tracing::info!(
            files_updated = written.files_updated.len(),
            transitions = policy.transitions.len(),
            errors = loaded.diagnostics.errors().count(),
            sync_errors = sync_errors.len(),
            "sync complete"
        );

        Ok(SyncOutcome {
            skipped: false,
            files_updated: written.files_updated,
            transitions: policy.transitions,
            diagnostics: loaded.diagnostics,
            sync_errors,
            summary,
            snapshot_path,
        })
    }

    /// Render the current derived state
    ///
    /// Collected diagnostics are listed first, then any passed in `options`.
    ///
    /// # Errors
    /// [`EngineError::Report`] if rendering fails, or cancellation.
    #[tracing::instrument(skip_all, fields(dir = %scenario_dir.display(), format = %options.format))]
    pub async fn report(
        &self,
        scenario_dir: &Path,
        options: &ReportOptions,
        out: &mut dyn Write,
    ) -> Result<(), EngineError> {
        let (index, summary, mut diagnostics) = match self.load(scenario_dir, &[]).await? {
            Some(loaded) => {
                let summary = summarize(&loaded.index, &loaded.evidence);
                (loaded.index, summary, loaded.diagnostics)
            }
            None => (Index::new(), Summary::default(), ValidationResult::new()),
        };
        diagnostics.extend_unique(options.diagnostics.iter().cloned());
        let options = ReportOptions {
            diagnostics: diagnostics.issues,
            ..options.clone()
        };
        Reporter::new(&index, &summary, scenario_dir).generate(&options, out)?;
        Ok(())
    }

    /// Structural and data diagnostics without writing anything
    ///
    /// # Errors
    /// Only cancellation.
    #[tracing::instrument(skip_all, fields(dir = %scenario_dir.display()))]
    pub async fn validate(&self, scenario_dir: &Path) -> Result<ValidationResult, EngineError> {
        Ok(self
            .load(scenario_dir, &[])
            .await?
            .map(|loaded| loaded.diagnostics)
            .unwrap_or_default())
    }

    /// Derived totals without writing anything
    ///
    /// # Errors
    /// Only cancellation.
    #[tracing::instrument(skip_all, fields(dir = %scenario_dir.display()))]
    pub async fn summary(&self, scenario_dir: &Path) -> Result<Summary, EngineError> {
        Ok(self
            .load(scenario_dir, &[])
            .await?
            .map(|loaded| summarize(&loaded.index, &loaded.evidence))
            .unwrap_or_default())
    }

    /// Every validation attributed to `phase`, aliases normalized
    ///
    /// # Errors
    /// Only cancellation.
    #[tracing::instrument(skip(self), fields(dir = %scenario_dir.display()))]
    pub async fn phase_inspect(
        &self,
        scenario_dir: &Path,
        phase: &str,
    ) -> Result<PhaseInspectResult, EngineError> {
        let phase = normalize_phase(phase);
        let mut result = PhaseInspectResult {
            phase: phase.clone(),
            validations: Vec::new(),
        };
        let Some(loaded) = self.load(scenario_dir, &[]).await? else {
            return Ok(result);
        };

        for (loc, requirement) in loaded.index.all() {
            let module = &loaded.index.modules[loc.module].source_path;
            for (position, validation) in requirement.validations.iter().enumerate() {
                let matches = validation
                    .effective_phase()
                    .is_some_and(|p| normalize_phase(&p) == phase);
                if !matches {
                    continue;
                }
                result.validations.push(PhaseValidation {
                    requirement_id: requirement.id.clone(),
                    module: module.clone(),
                    index: position,
                    kind: validation.kind.as_str().to_string(),
                    reference: validation.ref_key(),
                    phase: phase.clone(),
                    declared_status: validation
                        .declared_status
                        .as_ref()
                        .map(|s| s.as_str().to_string()),
                    live_status: validation.live_status.unwrap_or(LiveStatus::Unknown),
                    exists: validation.ref_key().and_then(|r| loaded.refs.exists(&r)),
                });
            }
        }
        tracing::debug!(validations = result.validations.len(), "phase inspected");
        Ok(result)
    }

    async fn load(
        &self,
        scenario_dir: &Path,
        phase_results: &[PhaseResult],
    ) -> Result<Option<Loaded>, EngineError> {
        let fs = &*self.fs;
        let discovery = match Discoverer::new(fs).discover(scenario_dir).await {
            Ok(discovery) => discovery,
            Err(DiscoveryError::NoRequirementsDir(dir)) => {
                tracing::info!(dir = %dir.display(), "no requirements directory, nothing to do");
                return Ok(None);
            }
            Err(DiscoveryError::Io { path, source }) => return Err(EngineError::io(path, source)),
        };
        tracing::info!(files = discovery.files.len(), "discovery complete");
        self.cancel.check("discovery")?;

        let max = self.config.max_file_size;
        let mut index = Parser::new(fs, max)
            .parse_all(&discovery.files, &self.cancel)
            .await?;
        tracing::info!(
            modules = index.modules.len(),
            requirements = index.len(),
            "parse complete"
        );
        self.cancel.check("parse")?;

        let loaded = EvidenceLoader::new(fs, max)
            .load_all(scenario_dir, &self.cancel)
            .await?;
        let mut evidence = loaded.bundle;
        let mut evidence_issues = loaded.diagnostics;
        evidence_issues.extend(merge_phase_results(
            &mut evidence,
            phase_results,
            self.clock.now(),
        ));
        tracing::info!(
            records = evidence.record_count(),
            sources = loaded.sources.len(),
            "evidence loaded"
        );
        self.cancel.check("evidence")?;

        let refs = RefIndex::resolve(fs, scenario_dir, &index).await;
        let checks = validate_with(&index, &refs);
        Enricher::new(&evidence, &refs).enrich(&mut index);

        let mut diagnostics = ValidationResult::new();
        diagnostics.extend_unique(discovery.diagnostics);
        diagnostics.extend_unique(index.diagnostics.iter().cloned());
        diagnostics.extend_unique(index.parse_errors.iter().map(ParseError::to_issue));
        diagnostics.extend_unique(evidence_issues);
        diagnostics.extend_unique(checks.issues);
        diagnostics.cycles = checks.cycles;
        for issue in &diagnostics.issues {
            tracing::warn!(code = %issue.code, "{}", issue.message);
        }

        Ok(Some(Loaded {
            index,
            evidence,
            refs,
            diagnostics,
        }))
    }
}
