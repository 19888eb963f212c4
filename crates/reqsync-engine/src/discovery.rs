//! Module discovery
//!
//! Finds every module file for a scenario, starting from
//! `requirements/index.json`. Without an index, every `*.json` directly under
//! `requirements/` plus each `<child>/module.json` is taken in name order.

use crate::error::DiscoveryError;
use reqsync_io::{normalize_path, FileStat, Reader};
use reqsync_model::module::{INDEX_FILE, MODULE_FILE};
use reqsync_model::{IssueCode, ValidationIssue};
use serde_json::Value;
use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};

/// Name of the requirements directory inside a scenario
pub const REQUIREMENTS_DIR: &str = "requirements";

/// Discovered module files
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Discovery {
    /// `<scenario>/requirements`
    pub requirements_dir: PathBuf,
    /// Module paths, index first, deduplicated, in import order
    pub files: Vec<PathBuf>,
    /// Unresolvable or malformed imports
    pub diagnostics: Vec<ValidationIssue>,
}

impl Discovery {
    fn push(&mut self, seen: &mut HashSet<PathBuf>, path: PathBuf) {
        let path = normalize_path(&path);
        if seen.insert(path.clone()) {
            self.files.push(path);
        }
    }
}

/// Walks a scenario's requirements tree through a [`Reader`]
#[derive(Debug)]
pub struct Discoverer<'a, R: Reader + ?Sized> {
    reader: &'a R,
}

impl<'a, R: Reader + ?Sized> Discoverer<'a, R> {
    /// Create discoverer
    #[inline]
    #[must_use]
    pub fn new(reader: &'a R) -> Self {
        Self { reader }
    }

    /// Find every module file under `<scenario_dir>/requirements`
    ///
    /// # Errors
    /// [`DiscoveryError::NoRequirementsDir`] when the directory is absent,
    /// [`DiscoveryError::Io`] when the tree exists but cannot be read.
    /// Missing or malformed imports become diagnostics on the returned value.
    #[tracing::instrument(level = "debug", skip(self), fields(scenario = %scenario_dir.display()))]
    pub async fn discover(&self, scenario_dir: &Path) -> Result<Discovery, DiscoveryError> {
        let requirements_dir = normalize_path(&scenario_dir.join(REQUIREMENTS_DIR));
        match self.reader.stat(&requirements_dir).await {
            Ok(stat) if stat.is_dir => {}
            Ok(_) => return Err(DiscoveryError::NoRequirementsDir(requirements_dir)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(DiscoveryError::NoRequirementsDir(requirements_dir));
            }
            Err(err) => return Err(DiscoveryError::io(requirements_dir, err)),
        }

        let mut discovery = Discovery {
            requirements_dir: requirements_dir.clone(),
            ..Discovery::default()
        };
        let mut seen = HashSet::new();
        let index_path = requirements_dir.join(INDEX_FILE);

        if self.stat_opt(&index_path).await?.is_some() {
            discovery.push(&mut seen, index_path.clone());
            for import in self.read_imports(&index_path, &mut discovery).await? {
                self.resolve_import(&requirements_dir, &import, &mut discovery, &mut seen)
                    .await?;
            }
        } else {
            tracing::debug!("no index.json, scanning requirements directory");
            self.scan_flat(&requirements_dir, &mut discovery, &mut seen)
                .await?;
        }

        tracing::debug!(
            files = discovery.files.len(),
            diagnostics = discovery.diagnostics.len(),
            "discovery complete"
        );
        Ok(discovery)
    }

    async fn read_imports(
        &self,
        index_path: &Path,
        discovery: &mut Discovery,
    ) -> Result<Vec<String>, DiscoveryError> {
        let bytes = match self.reader.read_file(index_path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(DiscoveryError::io(index_path, err)),
        };
        // Parse failures of the index itself are reported by the parser.
        let Ok(root) = serde_json::from_slice::<Value>(&bytes) else {
            return Ok(Vec::new());
        };
        let Some(imports) = root.get("imports") else {
            return Ok(Vec::new());
        };
        let Some(entries) = imports.as_array() else {
            discovery.diagnostics.push(
                ValidationIssue::error(IssueCode::DiscoveryError, "imports must be an array")
                    .at_path(index_path),
            );
            return Ok(Vec::new());
        };

        let mut out = Vec::with_capacity(entries.len());
        for entry in entries {
            match entry.as_str().map(str::trim) {
                Some(s) if !s.is_empty() => out.push(s.to_string()),
                _ => discovery.diagnostics.push(
                    ValidationIssue::warning(
                        IssueCode::DiscoveryError,
                        format!("ignoring import entry {entry}"),
                    )
                    .at_path(index_path),
                ),
            }
        }
        Ok(out)
    }

    async fn resolve_import(
        &self,
        requirements_dir: &Path,
        import: &str,
        discovery: &mut Discovery,
        seen: &mut HashSet<PathBuf>,
    ) -> Result<(), DiscoveryError> {
        let target = normalize_path(&requirements_dir.join(import));
        let index_path = requirements_dir.join(INDEX_FILE);
        match self.stat_opt(&target).await? {
            Some(stat) if stat.is_dir => {
                if self.expand_dir(&target, discovery, seen).await? == 0 {
                    discovery.diagnostics.push(
                        ValidationIssue::warning(
                            IssueCode::DiscoveryError,
                            format!("import {import} contains no {MODULE_FILE}"),
                        )
                        .at_path(&index_path),
                    );
                }
            }
            Some(_) => discovery.push(seen, target),
            None => {
                tracing::warn!(import, "import target missing");
                discovery.diagnostics.push(
                    ValidationIssue::error(
                        IssueCode::DiscoveryError,
                        format!("import {import} not found"),
                    )
                    .at_path(&index_path),
                );
            }
        }
        Ok(())
    }

    /// `<dir>/module.json`, then `<dir>/<child>/module.json` in name order
    ///
    /// Returns how many module files were found, including already-seen ones.
    async fn expand_dir(
        &self,
        dir: &Path,
        discovery: &mut Discovery,
        seen: &mut HashSet<PathBuf>,
    ) -> Result<usize, DiscoveryError> {
        let mut found = 0;
        let own = dir.join(MODULE_FILE);
        if self.is_file(&own).await? {
            discovery.push(seen, own);
            found += 1;
        }
        let entries = self
            .reader
            .list_dir(dir)
            .await
            .map_err(|err| DiscoveryError::io(dir, err))?;
        for entry in entries.into_iter().filter(|e| e.is_dir) {
            let nested = entry.path.join(MODULE_FILE);
            if self.is_file(&nested).await? {
                discovery.push(seen, nested);
                found += 1;
            }
        }
        Ok(found)
    }

    async fn scan_flat(
        &self,
        dir: &Path,
        discovery: &mut Discovery,
        seen: &mut HashSet<PathBuf>,
    ) -> Result<(), DiscoveryError> {
        let entries = self
            .reader
            .list_dir(dir)
            .await
            .map_err(|err| DiscoveryError::io(dir, err))?;
        for entry in entries {
            if entry.is_dir {
                let nested = entry.path.join(MODULE_FILE);
                if self.is_file(&nested).await? {
                    discovery.push(seen, nested);
                }
            } else if Path::new(&entry.name)
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
            {
                discovery.push(seen, entry.path);
            }
        }
        Ok(())
    }

    /// Stat that treats a missing path as `None`
    async fn stat_opt(&self, path: &Path) -> Result<Option<FileStat>, DiscoveryError> {
        match self.reader.stat(path).await {
            Ok(stat) => Ok(Some(stat)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(DiscoveryError::io(path, err)),
        }
    }

    async fn is_file(&self, path: &Path) -> Result<bool, DiscoveryError> {
        Ok(self.stat_opt(path).await?.is_some_and(|s| !s.is_dir))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqsync_io::MemoryFs;

    fn paths(discovery: &Discovery) -> Vec<String> {
        discovery
            .files
            .iter()
            .map(|p| p.display().to_string())
            .collect()
    }

    #[tokio::test]
    async fn missing_requirements_dir_is_an_error() {
        let fs = MemoryFs::new();
        fs.insert_dir("/s");
        let err = Discoverer::new(&fs).discover(Path::new("/s")).await.unwrap_err();
        assert!(matches!(err, DiscoveryError::NoRequirementsDir(p) if p == Path::new("/s/requirements")));
    }

    #[tokio::test]
    async fn unreadable_requirements_dir_is_an_io_error() {
        let fs = MemoryFs::new();
        fs.insert_file("/s/requirements/m/module.json", "{}");
        fs.fail_reads_to("/s/requirements");
        let err = Discoverer::new(&fs).discover(Path::new("/s")).await.unwrap_err();
        assert!(matches!(err, DiscoveryError::Io { ref path, ref source }
            if path == Path::new("/s/requirements")
                && source.kind() == io::ErrorKind::PermissionDenied));
    }

    #[tokio::test]
    async fn unreadable_index_is_an_io_error() {
        let fs = MemoryFs::new();
        fs.insert_file("/s/requirements/index.json", r#"{"imports": []}"#);
        fs.fail_reads_to("/s/requirements/index.json");
        let err = Discoverer::new(&fs).discover(Path::new("/s")).await.unwrap_err();
        assert!(matches!(err, DiscoveryError::Io { ref path, .. }
            if path == Path::new("/s/requirements/index.json")));
    }

    #[tokio::test]
    async fn requirements_file_is_not_a_requirements_dir() {
        let fs = MemoryFs::new();
        fs.insert_file("/s/requirements", "");
        let err = Discoverer::new(&fs).discover(Path::new("/s")).await.unwrap_err();
        assert!(matches!(err, DiscoveryError::NoRequirementsDir(_)));
    }

    #[tokio::test]
    async fn follows_index_imports_in_order() {
        let fs = MemoryFs::new();
        fs.insert_file(
            "/s/requirements/index.json",
            r#"{"imports": ["02-ui/module.json", "01-core", "./02-ui/module.json"]}"#,
        );
        fs.insert_file("/s/requirements/01-core/module.json", "{}");
        fs.insert_file("/s/requirements/01-core/b-sub/module.json", "{}");
        fs.insert_file("/s/requirements/01-core/a-sub/module.json", "{}");
        fs.insert_file("/s/requirements/02-ui/module.json", "{}");

        let discovery = Discoverer::new(&fs).discover(Path::new("/s")).await.unwrap();
        assert_eq!(
            paths(&discovery),
            vec![
                "/s/requirements/index.json",
                "/s/requirements/02-ui/module.json",
                "/s/requirements/01-core/module.json",
                "/s/requirements/01-core/a-sub/module.json",
                "/s/requirements/01-core/b-sub/module.json",
            ]
        );
        assert!(discovery.diagnostics.is_empty());
    }

    #[tokio::test]
    async fn missing_import_is_diagnosed_not_fatal() {
        let fs = MemoryFs::new();
        fs.insert_file(
            "/s/requirements/index.json",
            r#"{"imports": ["nope/module.json", "01-core/module.json", 7]}"#,
        );
        fs.insert_file("/s/requirements/01-core/module.json", "{}");

        let discovery = Discoverer::new(&fs).discover(Path::new("/s")).await.unwrap();
        assert_eq!(discovery.files.len(), 2);
        assert_eq!(discovery.diagnostics.len(), 2);
        assert!(discovery.diagnostics[0].is_error());
        assert_eq!(discovery.diagnostics[0].code, IssueCode::DiscoveryError);
    }

    #[tokio::test]
    async fn scans_directory_without_index() {
        let fs = MemoryFs::new();
        fs.insert_file("/s/requirements/zeta.json", "{}");
        fs.insert_file("/s/requirements/alpha.json", "{}");
        fs.insert_file("/s/requirements/notes.md", "");
        fs.insert_file("/s/requirements/m-core/module.json", "{}");
        fs.insert_dir("/s/requirements/empty");

        let discovery = Discoverer::new(&fs).discover(Path::new("/s")).await.unwrap();
        assert_eq!(
            paths(&discovery),
            vec![
                "/s/requirements/alpha.json",
                "/s/requirements/m-core/module.json",
                "/s/requirements/zeta.json",
            ]
        );
    }
}
