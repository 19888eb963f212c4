//! Validation reference resolution
//!
//! Enrichment and validation are pure, so whether each `ref` exists on disk
//! is looked up once, up front, and handed to them as a [`RefIndex`].

use reqsync_io::{normalize_path, Reader};
use reqsync_model::{Index, Validation};
use std::collections::BTreeMap;
use std::path::Path;

/// Existence of every validation reference in an index
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefIndex {
    exists: BTreeMap<String, bool>,
}

impl RefIndex {
    /// Empty index: every reference is unresolved
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from known outcomes
    #[must_use]
    pub fn from_entries<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (S, bool)>,
        S: Into<String>,
    {
        Self {
            exists: entries.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    /// Stat every distinct normalized reference relative to `scenario_dir`
    ///
    /// URL-like references (`scheme://...`) are never looked up and count
    /// as missing.
    pub async fn resolve<R: Reader + ?Sized>(reader: &R, scenario_dir: &Path, index: &Index) -> Self {
        let mut exists = BTreeMap::new();
        for (_, requirement) in index.all() {
            for reference in requirement.validations.iter().filter_map(Validation::ref_key) {
                if exists.contains_key(&reference) {
                    continue;
                }
                let found = if reference.contains("://") {
                    false
                } else {
                    let path = normalize_path(&scenario_dir.join(&reference));
                    reader.exists(&path).await
                };
                exists.insert(reference, found);
            }
        }
        tracing::debug!(
            refs = exists.len(),
            missing = exists.values().filter(|e| !**e).count(),
            "references resolved"
        );
        Self { exists }
    }

    /// Whether `reference` exists; `None` if it was never looked up
    #[inline]
    #[must_use]
    pub fn exists(&self, reference: &str) -> Option<bool> {
        self.exists.get(reference).copied()
    }
}
