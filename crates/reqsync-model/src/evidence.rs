//! Test evidence
//!
//! An evidence record is an observation, not a verdict. Records are grouped
//! under requirement-scoped, validation-scoped, or phase-scoped keys and kept
//! newest-first.

use crate::phase::normalize_phase;
use crate::status::LiveStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};
use std::path::PathBuf;

/// Prefix of phase-scoped keys
pub const PHASE_KEY_PREFIX: &str = "__phase__";

/// Key an evidence record is filed under
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EvidenceKey {
    /// `<REQ-ID>`
    Requirement(String),
    /// `<REQ-ID>#<validation-index>`
    Validation(String, usize),
    /// `__phase__<phase-name>`
    Phase(String),
}

impl EvidenceKey {
    /// Parse the string form of a key
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        if let Some(phase) = raw.strip_prefix(PHASE_KEY_PREFIX) {
            return Self::Phase(normalize_phase(phase));
        }
        if let Some((id, idx)) = raw.rsplit_once('#') {
            if let Ok(idx) = idx.parse() {
                return Self::Validation(id.to_string(), idx);
            }
        }
        Self::Requirement(raw.to_string())
    }
}

impl Serialize for EvidenceKey {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl Display for EvidenceKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Requirement(id) => f.write_str(id),
            Self::Validation(id, idx) => write!(f, "{id}#{idx}"),
            Self::Phase(phase) => write!(f, "{PHASE_KEY_PREFIX}{phase}"),
        }
    }
}

/// A single observation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvidenceRecord {
    /// Normalized phase name
    pub phase: String,
    /// Observed status
    pub status: LiveStatus,
    /// Run duration
    pub duration_seconds: Option<f64>,
    /// Log or artifact the record came from
    pub source_path: Option<PathBuf>,
    /// Free-text detail, typically an error snippet
    pub evidence: Option<String>,
    /// Validation reference the record is restricted to
    pub reference: Option<String>,
    /// When the observation was made
    pub timestamp: Option<DateTime<Utc>>,
}

impl EvidenceRecord {
    /// Create record for phase with status
    #[inline]
    #[must_use]
    pub fn new(phase: &str, status: LiveStatus) -> Self {
        Self {
            phase: normalize_phase(phase),
            status,
            duration_seconds: None,
            source_path: None,
            evidence: None,
            reference: None,
            timestamp: None,
        }
    }

    /// With timestamp
    #[inline]
    #[must_use]
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// With source path
    #[inline]
    #[must_use]
    pub fn from_source(mut self, path: impl Into<PathBuf>) -> Self {
        self.source_path = Some(path.into());
        self
    }

    /// Restrict to a validation reference
    #[inline]
    #[must_use]
    pub fn for_ref(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }
}

/// Status recorded in `coverage/requirements-sync.json`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncOverride {
    /// Normalized status spelling
    pub status: String,
    /// Last run timestamp, verbatim
    pub last_run: Option<String>,
}

impl SyncOverride {
    /// Whether the override vouches for a passing requirement
    #[must_use]
    pub fn is_passing(&self) -> bool {
        matches!(self.status.as_str(), "passed" | "complete" | "completed")
    }
}

/// Per-phase record counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PhaseTally {
    /// Passed records
    pub passed: usize,
    /// Failed records
    pub failed: usize,
    /// Skipped, not run, or unknown records (recorded, not counted)
    pub other: usize,
}

impl PhaseTally {
    /// Record one status
    pub fn record(&mut self, status: LiveStatus) {
        match status {
            LiveStatus::Passed => self.passed += 1,
            LiveStatus::Failed => self.failed += 1,
            _ => self.other += 1,
        }
    }

    /// Passed plus failed
    #[inline]
    #[must_use]
    pub fn counted(&self) -> usize {
        self.passed + self.failed
    }
}

/// Result of one phase as reported by the external test driver
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseResult {
    /// Phase name
    pub name: String,
    /// Raw status spelling (`PASSED`, `failed`, ...)
    pub status: String,
    /// Run duration
    #[serde(default)]
    pub duration_seconds: Option<f64>,
    /// Log file of the run
    #[serde(default)]
    pub log_path: Option<PathBuf>,
    /// Error snippet
    #[serde(default)]
    pub error: Option<String>,
    /// Requirement IDs the phase exercised
    #[serde(default)]
    pub requirements: Vec<String>,
}

impl PhaseResult {
    /// Create phase result
    #[inline]
    #[must_use]
    pub fn new(name: impl Into<String>, status: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: status.into(),
            duration_seconds: None,
            log_path: None,
            error: None,
            requirements: Vec::new(),
        }
    }

    /// With covered requirement IDs
    #[inline]
    #[must_use]
    pub fn covering<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.requirements = ids.into_iter().map(Into::into).collect();
        self
    }
}

/// Evidence grouped by key, newest-first per key
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EvidenceBundle {
    records: BTreeMap<EvidenceKey, Vec<EvidenceRecord>>,
    overrides: BTreeMap<String, SyncOverride>,
    phases: BTreeMap<String, PhaseTally>,
}

impl EvidenceBundle {
    /// Empty bundle
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// File a record under a key
    ///
    /// The per-key list stays ordered newest-first; records without a
    /// timestamp sort last, and equal timestamps keep insertion order.
    /// Requirement- and validation-scoped records are tallied per phase.
    pub fn insert(&mut self, key: &EvidenceKey, record: EvidenceRecord) {
        if !matches!(key, EvidenceKey::Phase(_)) {
            self.phases
                .entry(record.phase.clone())
                .or_default()
                .record(record.status);
        }
        let list = self.records.entry(key.clone()).or_default();
        let at = list
            .iter()
            .position(|existing| newer(&record, existing))
            .unwrap_or(list.len());
        list.insert(at, record);
    }

    /// Fold aggregate counts into a phase tally
    pub fn add_totals(&mut self, phase: &str, totals: PhaseTally) {
        let tally = self.phases.entry(normalize_phase(phase)).or_default();
        tally.passed += totals.passed;
        tally.failed += totals.failed;
        tally.other += totals.other;
    }

    /// Register a sync override for a requirement
    pub fn set_override(&mut self, id: impl Into<String>, value: SyncOverride) {
        self.overrides.insert(id.into(), value);
    }

    /// Records under a key, newest-first
    #[must_use]
    pub fn get(&self, key: &EvidenceKey) -> &[EvidenceRecord] {
        self.records.get(key).map_or(&[], Vec::as_slice)
    }

    /// Sync override for a requirement
    #[inline]
    #[must_use]
    pub fn override_for(&self, id: &str) -> Option<&SyncOverride> {
        self.overrides.get(id)
    }

    /// Per-phase tallies of requirement observations
    #[inline]
    #[must_use]
    pub fn phases(&self) -> &BTreeMap<String, PhaseTally> {
        &self.phases
    }

    /// All keys with their records
    pub fn iter(&self) -> impl Iterator<Item = (&EvidenceKey, &[EvidenceRecord])> {
        self.records.iter().map(|(k, v)| (k, v.as_slice()))
    }

    /// Number of records across all keys
    #[must_use]
    pub fn record_count(&self) -> usize {
        self.records.values().map(Vec::len).sum()
    }

    /// Whether the bundle holds nothing at all
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty() && self.overrides.is_empty()
    }
}

fn newer(candidate: &EvidenceRecord, existing: &EvidenceRecord) -> bool {
    match (candidate.timestamp, existing.timestamp) {
        (Some(a), Some(b)) => a > b,
        (Some(_), None) => true,
        (None, _) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, hour, 0, 0).unwrap()
    }

    #[test]
    fn lookalike_keys_stay_apart() {
        let mut bundle = EvidenceBundle::new();
        bundle.insert(
            &EvidenceKey::Requirement("X#1".into()),
            EvidenceRecord::new("unit", LiveStatus::Passed),
        );
        bundle.insert(
            &EvidenceKey::Validation("X".into(), 1),
            EvidenceRecord::new("unit", LiveStatus::Failed),
        );

        let by_id = bundle.get(&EvidenceKey::Requirement("X#1".into()));
        let by_validation = bundle.get(&EvidenceKey::Validation("X".into(), 1));
        assert_eq!(by_id.len(), 1);
        assert_eq!(by_id[0].status, LiveStatus::Passed);
        assert_eq!(by_validation.len(), 1);
        assert_eq!(by_validation[0].status, LiveStatus::Failed);
        assert_eq!(bundle.iter().count(), 2);
    }

    #[test]
    fn key_string_forms_round_trip() {
        for key in [
            EvidenceKey::Requirement("REQ-1".into()),
            EvidenceKey::Validation("REQ-1".into(), 2),
            EvidenceKey::Phase("unit".into()),
        ] {
            assert_eq!(EvidenceKey::parse(&key.to_string()), key);
        }
        assert_eq!(
            EvidenceKey::parse("__phase__e2e"),
            EvidenceKey::Phase("integration".into())
        );
    }

    #[test]
    fn records_are_kept_newest_first() {
        let key = EvidenceKey::Requirement("REQ-1".into());
        let mut bundle = EvidenceBundle::new();
        bundle.insert(&key, EvidenceRecord::new("unit", LiveStatus::Passed).at(ts(1)));
        bundle.insert(&key, EvidenceRecord::new("unit", LiveStatus::Failed).at(ts(3)));
        bundle.insert(&key, EvidenceRecord::new("unit", LiveStatus::Skipped));
        bundle.insert(&key, EvidenceRecord::new("unit", LiveStatus::NotRun).at(ts(2)));

        let statuses: Vec<_> = bundle.get(&key).iter().map(|r| r.status).collect();
        assert_eq!(
            statuses,
            vec![
                LiveStatus::Failed,
                LiveStatus::NotRun,
                LiveStatus::Passed,
                LiveStatus::Skipped
            ]
        );
    }

    #[test]
    fn phase_tallies_count_requirement_observations() {
        let mut bundle = EvidenceBundle::new();
        bundle.insert(
            &EvidenceKey::Phase("unit".into()),
            EvidenceRecord::new("unit", LiveStatus::Passed),
        );
        bundle.insert(
            &EvidenceKey::Requirement("R1".into()),
            EvidenceRecord::new("unit", LiveStatus::Passed),
        );
        bundle.insert(
            &EvidenceKey::Requirement("R2".into()),
            EvidenceRecord::new("unit", LiveStatus::Skipped),
        );
        bundle.insert(
            &EvidenceKey::Validation("R3".into(), 0),
            EvidenceRecord::new("unit", LiveStatus::Failed),
        );

        let tally = bundle.phases()["unit"];
        assert_eq!(tally.passed, 1);
        assert_eq!(tally.failed, 1);
        assert_eq!(tally.other, 1);
        assert_eq!(tally.counted(), 2);
    }

    #[test]
    fn aggregate_totals_fold_into_phase() {
        let mut bundle = EvidenceBundle::new();
        bundle.add_totals(
            "all",
            PhaseTally {
                passed: 7,
                failed: 2,
                other: 0,
            },
        );
        assert_eq!(bundle.phases()["all"].counted(), 9);
    }

    #[test]
    fn override_passing_spellings() {
        let ok = SyncOverride {
            status: "complete".into(),
            last_run: None,
        };
        let bad = SyncOverride {
            status: "failed".into(),
            last_run: None,
        };
        assert!(ok.is_passing());
        assert!(!bad.is_passing());
    }
}
