//! Evidence loading
//!
//! Sources, in priority order:
//! 1. `coverage/phase-results/*.json`, one file per phase
//! 2. `coverage/test-results.json`, only when no phase file was usable
//! 3. `coverage/requirements-sync.json`, per-requirement overrides
//!
//! Missing files are fine. Unreadable ones become warnings and are skipped.

use crate::cancel::CancellationToken;
use crate::error::EngineError;
use chrono::{DateTime, Utc};
use reqsync_io::{normalize_path, Reader};
use reqsync_model::phase::ALL_PHASES;
use reqsync_model::{
    normalize_phase, normalize_ref, EvidenceBundle, EvidenceKey, EvidenceRecord, IssueCode,
    LiveStatus, PhaseResult, PhaseTally, SyncOverride, ValidationIssue,
};
use reqsync_model::status::normalize_token;
use serde::Deserialize;
use serde_json::Value;
use std::io;
use std::path::{Path, PathBuf};

/// `coverage/phase-results`
pub const PHASE_RESULTS_DIR: &str = "coverage/phase-results";
/// `coverage/test-results.json`
pub const TEST_RESULTS_FILE: &str = "coverage/test-results.json";
/// `coverage/requirements-sync.json`
pub const OVERRIDES_FILE: &str = "coverage/requirements-sync.json";

/// Evidence plus what went wrong while collecting it
#[derive(Debug, Clone, Default)]
pub struct LoadedEvidence {
    /// Collected records and overrides
    pub bundle: EvidenceBundle,
    /// Warnings for unreadable sources
    pub diagnostics: Vec<ValidationIssue>,
    /// Files that contributed
    pub sources: Vec<PathBuf>,
}

#[derive(Debug, Deserialize)]
struct PhaseFile {
    #[serde(default)]
    phase: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    duration_seconds: Option<f64>,
    #[serde(default)]
    log_path: Option<PathBuf>,
    #[serde(default)]
    updated_at: Option<String>,
    #[serde(default)]
    requirements: Vec<PhaseEntry>,
}

#[derive(Debug, Deserialize)]
struct PhaseEntry {
    id: String,
    status: String,
    #[serde(default)]
    phase: Option<String>,
    #[serde(default)]
    validation: Option<usize>,
    #[serde(default, rename = "ref")]
    reference: Option<String>,
    #[serde(default)]
    evidence: Option<String>,
    #[serde(default)]
    duration_seconds: Option<f64>,
    #[serde(default)]
    updated_at: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TestResultsFile {
    #[serde(default)]
    passed: usize,
    #[serde(default)]
    failed: usize,
    #[serde(default)]
    skipped: usize,
    #[serde(default)]
    timestamp: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OverrideEntry {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    last_run: Option<Value>,
}

/// Loads evidence for a scenario through a [`Reader`]
#[derive(Debug)]
pub struct EvidenceLoader<'a, R: Reader + ?Sized> {
    reader: &'a R,
    max_file_size: u64,
}

impl<'a, R: Reader + ?Sized> EvidenceLoader<'a, R> {
    /// Create loader
    #[inline]
    #[must_use]
    pub fn new(reader: &'a R, max_file_size: u64) -> Self {
        Self {
            reader,
            max_file_size,
        }
    }

    /// Collect every evidence source under `scenario_dir`
    ///
    /// A single unreadable evidence file is a warning; an unlistable
    /// phase-results directory is not.
    ///
    /// # Errors
    /// [`EngineError::Io`] when `coverage/phase-results` exists but cannot be
    /// listed, [`EngineError::Cancelled`] checked before each file.
    #[tracing::instrument(level = "debug", skip(self, cancel), fields(scenario = %scenario_dir.display()))]
    pub async fn load_all(
        &self,
        scenario_dir: &Path,
        cancel: &CancellationToken,
    ) -> Result<LoadedEvidence, EngineError> {
        let mut loaded = LoadedEvidence::default();

        let phase_dir = normalize_path(&scenario_dir.join(PHASE_RESULTS_DIR));
        let mut phase_files = 0;
        let entries = match self.reader.list_dir(&phase_dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => Vec::new(),
            Err(err) => return Err(EngineError::io(phase_dir, err)),
        };
        for entry in entries {
            let is_json = Path::new(&entry.name)
                .extension()
                .is_some_and(|e| e.eq_ignore_ascii_case("json"));
            if entry.is_dir || !is_json {
                continue;
            }
            cancel.check("evidence")?;
            if self.load_phase_file(&entry.path, &mut loaded).await {
                phase_files += 1;
            }
        }

        if phase_files == 0 {
            cancel.check("evidence")?;
            let path = normalize_path(&scenario_dir.join(TEST_RESULTS_FILE));
            self.load_test_results(&path, &mut loaded).await;
        }

        cancel.check("evidence")?;
        let path = normalize_path(&scenario_dir.join(OVERRIDES_FILE));
        self.load_overrides(&path, &mut loaded).await;

        tracing::debug!(
            records = loaded.bundle.record_count(),
            sources = loaded.sources.len(),
            warnings = loaded.diagnostics.len(),
            "evidence loaded"
        );
        Ok(loaded)
    }

    /// Read and decode a JSON file; `None` when missing or unreadable
    async fn read_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &Path,
        loaded: &mut LoadedEvidence,
    ) -> Option<T> {
        let unreadable = |message: String| {
            ValidationIssue::warning(IssueCode::EvidenceUnreadable, message).at_path(path)
        };
        match self.reader.stat(path).await {
            Err(err) if err.kind() == io::ErrorKind::NotFound => return None,
            Ok(stat) if stat.len > self.max_file_size => {
                loaded.diagnostics.push(
                    ValidationIssue::warning(
                        IssueCode::OversizedFile,
                        format!(
                            "file is {} bytes, over the {} byte limit",
                            stat.len, self.max_file_size
                        ),
                    )
                    .at_path(path),
                );
                return None;
            }
            _ => {}
        }
        let bytes = match self.reader.read_file(path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return None,
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "evidence unreadable");
                loaded.diagnostics.push(unreadable(format!("cannot read: {err}")));
                return None;
            }
        };
        match serde_json::from_slice(&bytes) {
            Ok(value) => {
                loaded.sources.push(path.to_path_buf());
                Some(value)
            }
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "evidence unparseable");
                loaded.diagnostics.push(unreadable(format!("invalid evidence file: {err}")));
                None
            }
        }
    }

    async fn load_phase_file(&self, path: &Path, loaded: &mut LoadedEvidence) -> bool {
        let Some(file) = self.read_json::<PhaseFile>(path, loaded).await else {
            return false;
        };
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_string();
        let name = file.phase.as_deref().or(file.name.as_deref());
        let phase = normalize_phase(name.unwrap_or(stem.as_str()));
        let file_time = file.updated_at.as_deref().and_then(parse_timestamp);

        if let Some(raw) = file.status.as_deref() {
            let status = live_status(raw, path, loaded);
            let mut record = EvidenceRecord::new(&phase, status).from_source(
                file.log_path.clone().unwrap_or_else(|| path.to_path_buf()),
            );
            record.duration_seconds = file.duration_seconds;
            record.timestamp = file_time;
            loaded.bundle.insert(&EvidenceKey::Phase(phase.clone()), record);
        }

        for entry in file.requirements {
            let id = entry.id.trim().to_string();
            if id.is_empty() {
                continue;
            }
            let status = live_status(&entry.status, path, loaded);
            let entry_phase = entry.phase.as_deref().map_or_else(|| phase.clone(), normalize_phase);
            let mut record = EvidenceRecord::new(&entry_phase, status).from_source(path);
            record.evidence = entry.evidence;
            record.duration_seconds = entry.duration_seconds;
            record.reference = entry.reference.as_deref().map(normalize_ref);
            record.timestamp = entry
                .updated_at
                .as_deref()
                .and_then(parse_timestamp)
                .or(file_time);
            let key = match entry.validation {
                Some(index) => EvidenceKey::Validation(id, index),
                None => EvidenceKey::Requirement(id),
            };
            loaded.bundle.insert(&key, record);
        }
        true
    }

    async fn load_test_results(&self, path: &Path, loaded: &mut LoadedEvidence) {
        let Some(file) = self.read_json::<TestResultsFile>(path, loaded).await else {
            return;
        };
        let status = if file.failed > 0 {
            LiveStatus::Failed
        } else if file.passed > 0 {
            LiveStatus::Passed
        } else {
            LiveStatus::Unknown
        };
        let mut record = EvidenceRecord::new(ALL_PHASES, status).from_source(path);
        record.timestamp = file.timestamp.as_deref().and_then(parse_timestamp);
        loaded
            .bundle
            .insert(&EvidenceKey::Phase(ALL_PHASES.to_string()), record);
        loaded.bundle.add_totals(
            ALL_PHASES,
            PhaseTally {
                passed: file.passed,
                failed: file.failed,
                other: file.skipped,
            },
        );
    }

    async fn load_overrides(&self, path: &Path, loaded: &mut LoadedEvidence) {
        let Some(root) = self.read_json::<Value>(path, loaded).await else {
            return;
        };
        let map = match root.get("requirements") {
            Some(Value::Object(map)) => map.clone(),
            _ => match root {
                Value::Object(map) => map,
                _ => {
                    loaded.diagnostics.push(
                        ValidationIssue::warning(
                            IssueCode::EvidenceUnreadable,
                            "override file is not an object",
                        )
                        .at_path(path),
                    );
                    return;
                }
            },
        };
        for (id, value) in map {
            let Ok(entry) = serde_json::from_value::<OverrideEntry>(value) else {
                continue;
            };
            let status = entry.status.as_deref().map(normalize_token);
            let Some(status) = status.filter(|s| !s.is_empty()) else {
                continue;
            };
            let last_run = entry.last_run.map(|v| match v {
                Value::String(s) => s,
                other => other.to_string(),
            });
            loaded
                .bundle
                .set_override(id, SyncOverride { status, last_run });
        }
    }
}

/// Merge driver-reported phase results as the newest records
///
/// Each result becomes one phase-scoped record and one requirement-scoped
/// record per covered ID, stamped `now`.
pub fn merge_phase_results(
    bundle: &mut EvidenceBundle,
    results: &[PhaseResult],
    now: DateTime<Utc>,
) -> Vec<ValidationIssue> {
    let mut diagnostics = Vec::new();
    for result in results {
        let phase = normalize_phase(&result.name);
        let status = LiveStatus::parse(&result.status).unwrap_or_else(|| {
            diagnostics.push(ValidationIssue::warning(
                IssueCode::UnknownValue,
                format!("phase {phase} reported unknown status {:?}", result.status),
            ));
            LiveStatus::Unknown
        });
        let mut record = EvidenceRecord::new(&phase, status).at(now);
        record.duration_seconds = result.duration_seconds;
        record.source_path.clone_from(&result.log_path);
        record.evidence.clone_from(&result.error);

        for id in &result.requirements {
            bundle.insert(&EvidenceKey::Requirement(id.clone()), record.clone());
        }
        bundle.insert(&EvidenceKey::Phase(phase), record);
    }
    diagnostics
}

fn live_status(raw: &str, path: &Path, loaded: &mut LoadedEvidence) -> LiveStatus {
    LiveStatus::parse(raw).unwrap_or_else(|| {
        loaded.diagnostics.push(
            ValidationIssue::warning(
                IssueCode::UnknownValue,
                format!("unknown evidence status {raw:?}"),
            )
            .at_path(path),
        );
        LiveStatus::Unknown
    })
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw.trim())
        .ok()
        .map(|t| t.with_timezone(&Utc))
}
