//! Module files
//!
//! A module is one manifest on disk. Modules do not nest; an index file
//! (`requirements/index.json`) lists imports and may carry requirements of
//! its own.

use crate::requirement::Requirement;
use crate::status::ModuleStatus;
use indexmap::IndexMap;
use serde_json::Value;
use std::path::{Path, PathBuf};

/// Keys the canonical form gives a fixed position at the top of a module
pub const MODULE_KEYS: [&str; 3] = ["_metadata", "imports", "requirements"];

/// Keys the canonical form gives a fixed position inside `_metadata`
pub const METADATA_KEYS: [&str; 3] = ["module", "owner", "last_validated_at"];

/// File name of the index manifest
pub const INDEX_FILE: &str = "index.json";

/// File name of a module manifest inside an imported directory
pub const MODULE_FILE: &str = "module.json";

/// Whether a manifest is the index or a plain module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModuleKind {
    /// `requirements/index.json`
    Index,
    /// Any other manifest
    Module,
}

/// `_metadata` block of a module
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModuleMetadata {
    /// Module name
    pub module: Option<String>,
    /// Owner
    pub owner: Option<String>,
    /// Timestamp of the last sync that changed this module
    pub last_validated_at: Option<String>,
    /// Unknown keys in original order
    pub extra: IndexMap<String, Value>,
}

/// One manifest file holding requirements
#[derive(Debug, Clone, PartialEq)]
pub struct Module {
    /// Absolute path of the manifest
    pub source_path: PathBuf,
    /// Index or module
    pub kind: ModuleKind,
    /// `_metadata`, when present
    pub metadata: Option<ModuleMetadata>,
    /// Declared imports (index files only)
    pub imports: Vec<String>,
    /// Requirements in declaration order
    pub requirements: Vec<Requirement>,
    /// Unknown top-level keys in original order
    pub extra: IndexMap<String, Value>,
    /// Derived by enrichment
    pub live_status: Option<ModuleStatus>,
}

impl Module {
    /// Create empty module at path
    #[must_use]
    pub fn new(source_path: impl Into<PathBuf>) -> Self {
        let source_path = source_path.into();
        let kind = if source_path.file_name().and_then(|n| n.to_str()) == Some(INDEX_FILE) {
            ModuleKind::Index
        } else {
            ModuleKind::Module
        };
        Self {
            source_path,
            kind,
            metadata: None,
            imports: Vec::new(),
            requirements: Vec::new(),
            extra: IndexMap::new(),
            live_status: None,
        }
    }

    /// With requirement appended
    #[inline]
    #[must_use]
    pub fn with_requirement(mut self, requirement: Requirement) -> Self {
        self.requirements.push(requirement);
        self
    }

    /// Module name from metadata, falling back to the file or directory name
    #[must_use]
    pub fn name(&self) -> String {
        if let Some(name) = self.metadata.as_ref().and_then(|m| m.module.clone()) {
            return name;
        }
        let stem = self
            .source_path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default();
        if stem == "module" {
            if let Some(dir) = self
                .source_path
                .parent()
                .and_then(Path::file_name)
                .and_then(|d| d.to_str())
            {
                return dir.to_string();
            }
        }
        stem.to_string()
    }

    /// Set `_metadata.last_validated_at`, creating the block if needed
    pub fn touch(&mut self, timestamp: impl Into<String>) {
        self.metadata
            .get_or_insert_with(ModuleMetadata::default)
            .last_validated_at = Some(timestamp.into());
    }

    /// Whether this is the index manifest
    #[inline]
    #[must_use]
    pub fn is_index(&self) -> bool {
        self.kind == ModuleKind::Index
    }
}
