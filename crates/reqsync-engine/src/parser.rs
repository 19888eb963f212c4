//! Manifest parser
//!
//! Turns module JSON into typed [`Module`]s. Known keys are normalized into
//! typed fields; anything else, including known keys holding a value of the
//! wrong shape, is carried verbatim so write-back loses nothing.

use crate::cancel::CancellationToken;
use crate::error::EngineError;
use reqsync_io::Reader;
use reqsync_model::module::ModuleMetadata;
use reqsync_model::{
    Criticality, Index, IssueCode, Module, ParseError, Requirement, RequirementStatus, Validation,
    ValidationIssue, ValidationStatus, ValidationType,
};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

/// A parsed module plus the data warnings raised while reading it
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedModule {
    /// Typed module
    pub module: Module,
    /// Warnings (missing IDs, unknown spellings)
    pub diagnostics: Vec<ValidationIssue>,
}

/// Parse one module file's bytes
///
/// # Errors
/// Invalid JSON, a non-object root, or a `requirements` key that is not an
/// array. Entry-level problems are warnings, not errors.
pub fn parse_module(path: &Path, bytes: &[u8]) -> Result<ParsedModule, ParseError> {
    let root: Value = serde_json::from_slice(bytes).map_err(|e| ParseError::from_json(path, &e))?;
    let Value::Object(root) = root else {
        return Err(ParseError::new(path, "module root must be a JSON object"));
    };

    let mut ctx = Context::new(path);
    let mut module = Module::new(path);

    for (key, value) in root {
        match key.as_str() {
            "_metadata" => module.metadata = Some(ctx.metadata(value)),
            "imports" => module.imports = ctx.imports(value),
            "requirements" => {
                let Value::Array(entries) = value else {
                    return Err(ParseError::new(path, "requirements must be an array"));
                };
                for (position, entry) in entries.into_iter().enumerate() {
                    if let Some(requirement) = ctx.requirement(position, entry) {
                        module.requirements.push(requirement);
                    }
                }
            }
            _ => {
                module.extra.insert(key, value);
            }
        }
    }

    Ok(ParsedModule {
        module,
        diagnostics: ctx.diagnostics,
    })
}

struct Context<'p> {
    path: &'p Path,
    diagnostics: Vec<ValidationIssue>,
}

impl<'p> Context<'p> {
    fn new(path: &'p Path) -> Self {
        Self {
            path,
            diagnostics: Vec::new(),
        }
    }

    fn warn(&mut self, code: IssueCode, message: String, requirement: Option<&str>) {
        let mut issue = ValidationIssue::warning(code, message).at_path(self.path);
        if let Some(id) = requirement {
            issue = issue.for_requirement(id);
        }
        self.diagnostics.push(issue);
    }

    fn metadata(&mut self, value: Value) -> ModuleMetadata {
        let Value::Object(map) = value else {
            self.warn(
                IssueCode::UnknownValue,
                "_metadata is not an object and was replaced".to_string(),
                None,
            );
            return ModuleMetadata::default();
        };
        let mut meta = ModuleMetadata::default();
        for (key, value) in map {
            match key.as_str() {
                "module" => assign_string(&mut meta.module, &mut meta.extra, key, value),
                "owner" => assign_string(&mut meta.owner, &mut meta.extra, key, value),
                "last_validated_at" => {
                    assign_string(&mut meta.last_validated_at, &mut meta.extra, key, value);
                }
                _ => {
                    meta.extra.insert(key, value);
                }
            }
        }
        meta
    }

    fn imports(&mut self, value: Value) -> Vec<String> {
        let Value::Array(entries) = value else {
            self.warn(
                IssueCode::UnknownValue,
                "imports is not an array and was dropped".to_string(),
                None,
            );
            return Vec::new();
        };
        entries
            .into_iter()
            .filter_map(|entry| match entry {
                Value::String(s) => Some(s),
                other => {
                    self.warn(
                        IssueCode::UnknownValue,
                        format!("import entry {other} is not a string and was dropped"),
                        None,
                    );
                    None
                }
            })
            .collect()
    }

    fn requirement(&mut self, position: usize, entry: Value) -> Option<Requirement> {
        let Value::Object(map) = entry else {
            self.warn(
                IssueCode::MissingId,
                format!("requirement entry {position} is not an object and was dropped"),
                None,
            );
            return None;
        };

        let id = match map.get("id") {
            Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
            _ => {
                self.warn(
                    IssueCode::MissingId,
                    format!("requirement entry {position} has no id and was dropped"),
                    None,
                );
                return None;
            }
        };
        let mut req = Requirement::new(id.clone());
        for (key, value) in map {
            match key.as_str() {
                "id" => {}
                "title" => assign_string(&mut req.title, &mut req.extra, key, value),
                "description" => assign_string(&mut req.description, &mut req.extra, key, value),
                "operational_target_id" => {
                    assign_string(&mut req.operational_target_id, &mut req.extra, key, value);
                }
                "criticality" => match value {
                    Value::String(s) => {
                        req.criticality = Criticality::parse(&s);
                        if let Some(c) = req.criticality.as_ref().filter(|c| !c.is_known()) {
                            let msg = format!("unknown criticality {:?}", c.as_str());
                            self.warn(IssueCode::UnknownValue, msg, Some(&id));
                        }
                    }
                    other => {
                        req.extra.insert(key, other);
                    }
                },
                "status" => match value {
                    Value::String(s) => {
                        req.declared_status = RequirementStatus::parse(&s);
                        if let Some(st) = req.declared_status.as_ref().filter(|s| !s.is_known()) {
                            let msg = format!("unknown requirement status {:?}", st.as_str());
                            self.warn(IssueCode::UnknownValue, msg, Some(&id));
                        }
                    }
                    other => {
                        req.extra.insert(key, other);
                    }
                },
                "children" => match string_list(&value) {
                    Some(children) => req.children = children,
                    None => {
                        req.extra.insert(key, value);
                    }
                },
                "validation" => match value {
                    Value::Array(entries) => {
                        for (i, entry) in entries.into_iter().enumerate() {
                            match entry {
                                Value::Object(map) => {
                                    let validation = self.validation(&id, map);
                                    req.validations.push(validation);
                                }
                                other => self.warn(
                                    IssueCode::UnknownValue,
                                    format!("validation entry {i} is {other}, not an object; dropped"),
                                    Some(&id),
                                ),
                            }
                        }
                    }
                    other => {
                        req.extra.insert(key, other);
                    }
                },
                "notes" => req.notes = Some(value),
                "metadata" => req.metadata = Some(value),
                _ => {
                    req.extra.insert(key, value);
                }
            }
        }
        Some(req)
    }

    fn validation(&mut self, requirement: &str, map: Map<String, Value>) -> Validation {
        let mut v = Validation::new(ValidationType::Other(String::new()));
        for (key, value) in map {
            let text = match &value {
                Value::String(s) => Some(s.trim()),
                _ => None,
            };
            match (key.as_str(), text) {
                // Kept verbatim so the rewrite reproduces it.
                ("type", Some("")) => {
                    v.extra.insert(key, value);
                }
                ("type", Some(s)) => {
                    v.kind = ValidationType::parse(s);
                    if !v.kind.is_known() && !v.kind.as_str().is_empty() {
                        let msg = format!("unknown validation type {:?}", v.kind.as_str());
                        self.warn(IssueCode::UnknownValue, msg, Some(requirement));
                    }
                }
                ("ref", Some(_)) => v.reference = value.as_str().map(str::to_string),
                ("workflow_id", Some(_)) => v.workflow_id = value.as_str().map(str::to_string),
                ("phase", Some(_)) => v.phase = value.as_str().map(str::to_string),
                ("status", Some(s)) => {
                    v.declared_status = ValidationStatus::parse(s);
                    if let Some(st) = v.declared_status.as_ref().filter(|s| !s.is_known()) {
                        let msg = format!("unknown validation status {:?}", st.as_str());
                        self.warn(IssueCode::UnknownValue, msg, Some(requirement));
                    }
                }
                ("metadata", _) => v.metadata = Some(value),
                _ => {
                    v.extra.insert(key, value);
                }
            }
        }
        v
    }
}

fn assign_string(
    slot: &mut Option<String>,
    extra: &mut indexmap::IndexMap<String, Value>,
    key: String,
    value: Value,
) {
    match value {
        Value::String(s) => *slot = Some(s),
        other => {
            extra.insert(key, other);
        }
    }
}

fn string_list(value: &Value) -> Option<Vec<String>> {
    value
        .as_array()?
        .iter()
        .map(|v| v.as_str().map(|s| s.trim().to_string()))
        .collect()
}

/// Reads and parses every discovered module into an [`Index`]
#[derive(Debug)]
pub struct Parser<'a, R: Reader + ?Sized> {
    reader: &'a R,
    max_file_size: u64,
}

impl<'a, R: Reader + ?Sized> Parser<'a, R> {
    /// Create parser with a file size cap
    #[inline]
    #[must_use]
    pub fn new(reader: &'a R, max_file_size: u64) -> Self {
        Self {
            reader,
            max_file_size,
        }
    }

    /// Parse all files in order
    ///
    /// Files that fail to read or parse are recorded in
    /// [`Index::parse_errors`] and skipped. Duplicate IDs are reported in
    /// [`Index::diagnostics`]; the first declaration stays canonical.
    ///
    /// # Errors
    /// Only [`EngineError::Cancelled`], checked before each file.
    #[tracing::instrument(level = "debug", skip_all, fields(files = paths.len()))]
    pub async fn parse_all(
        &self,
        paths: &[PathBuf],
        cancel: &CancellationToken,
    ) -> Result<Index, EngineError> {
        let mut index = Index::new();
        for path in paths {
            cancel.check("parse")?;
            if let Some(issue) = self.oversized(path).await {
                tracing::warn!(path = %path.display(), "skipping oversized module");
                index.diagnostics.push(issue);
                continue;
            }
            match self.parse_file(path).await {
                Ok(parsed) => {
                    index.diagnostics.extend(parsed.diagnostics);
                    for id in index.push_module(parsed.module) {
                        tracing::warn!(id = %id, path = %path.display(), "duplicate requirement id");
                    }
                }
                Err(err) => {
                    tracing::warn!(error = %err, "skipping unparseable module");
                    index.parse_errors.push(err);
                }
            }
        }
        for (id, paths) in index.duplicates().clone() {
            index
                .diagnostics
                .push(ValidationIssue::duplicate_id(&id, &paths));
        }
        tracing::debug!(
            modules = index.modules.len(),
            requirements = index.len(),
            parse_errors = index.parse_errors.len(),
            "parse complete"
        );
        Ok(index)
    }

    async fn oversized(&self, path: &Path) -> Option<ValidationIssue> {
        let len = self.reader.stat(path).await.ok()?.len;
        (len > self.max_file_size).then(|| {
            ValidationIssue::error(
                IssueCode::OversizedFile,
                format!("file is {len} bytes, over the {} byte limit", self.max_file_size),
            )
            .at_path(path)
        })
    }

    async fn parse_file(&self, path: &Path) -> Result<ParsedModule, ParseError> {
        let bytes = self
            .reader
            .read_file(path)
            .await
            .map_err(|e| ParseError::new(path, format!("cannot read: {e}")))?;
        parse_module(path, &bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqsync_io::MemoryFs;

    const CORE: &str = r#"{
      "_metadata": {"module": "core", "owner": "qa", "team": "x"},
      "requirements": [
        {
          "id": "REQ-001",
          "title": "Login",
          "criticality": "p0",
          "status": "In-Progress",
          "custom": {"keep": true},
          "validation": [
            {"type": "TEST", "ref": ".\\test\\phases\\test-unit.sh", "status": "implemented", "x": 1},
            {"type": "automation", "workflow_id": "wf-1", "phase": "E2E"}
          ]
        },
        {"title": "no id"},
        {"id": "GROUP", "children": ["REQ-001"]}
      ],
      "trailing": 1
    }"#;

    #[test]
    fn typed_fields_are_normalized() {
        let parsed = parse_module(Path::new("/s/requirements/core.json"), CORE.as_bytes()).unwrap();
        let module = parsed.module;

        let meta = module.metadata.as_ref().unwrap();
        assert_eq!(meta.module.as_deref(), Some("core"));
        assert_eq!(meta.extra["team"], "x");
        assert_eq!(module.extra["trailing"], 1);

        let req = &module.requirements[0];
        assert_eq!(req.criticality, Some(Criticality::P0));
        assert_eq!(req.declared_status, Some(RequirementStatus::InProgress));
        assert_eq!(req.extra["custom"]["keep"], true);

        let test = &req.validations[0];
        assert_eq!(test.kind, ValidationType::Test);
        assert_eq!(test.reference.as_deref(), Some(".\\test\\phases\\test-unit.sh"));
        assert_eq!(test.ref_key().as_deref(), Some("test/phases/test-unit.sh"));
        assert_eq!(test.effective_phase().as_deref(), Some("unit"));
        assert_eq!(test.extra["x"], 1);

        let auto = &req.validations[1];
        assert_eq!(auto.workflow_id.as_deref(), Some("wf-1"));
        assert_eq!(auto.phase.as_deref(), Some("E2E"));
        assert_eq!(auto.effective_phase().as_deref(), Some("integration"));

        assert!(module.requirements[1].is_grouping());
    }

    #[test]
    fn entries_without_id_are_dropped_with_warning() {
        let parsed = parse_module(Path::new("/s/requirements/core.json"), CORE.as_bytes()).unwrap();
        assert_eq!(parsed.module.requirements.len(), 2);
        let missing: Vec<_> = parsed
            .diagnostics
            .iter()
            .filter(|d| d.code == IssueCode::MissingId)
            .collect();
        assert_eq!(missing.len(), 1);
        assert!(!missing[0].is_error());
    }

    #[test]
    fn unknown_spellings_warn_but_survive() {
        let json = r#"{"requirements": [{"id": "R", "status": "blocked", "criticality": "p9"}]}"#;
        let parsed = parse_module(Path::new("/s/m.json"), json.as_bytes()).unwrap();
        let req = &parsed.module.requirements[0];
        assert_eq!(req.declared_status.as_ref().unwrap().as_str(), "blocked");
        assert_eq!(req.criticality.as_ref().unwrap().as_str(), "P9");
        assert_eq!(
            parsed
                .diagnostics
                .iter()
                .filter(|d| d.code == IssueCode::UnknownValue)
                .count(),
            2
        );
    }

    #[test]
    fn wrongly_typed_known_keys_are_carried() {
        let json = r#"{"requirements": [{"id": "R", "title": 5, "children": [1, 2]}]}"#;
        let parsed = parse_module(Path::new("/s/m.json"), json.as_bytes()).unwrap();
        let req = &parsed.module.requirements[0];
        assert!(req.title.is_none());
        assert_eq!(req.extra["title"], 5);
        assert!(req.children.is_empty());
        assert_eq!(req.extra["children"], serde_json::json!([1, 2]));
    }

    #[test]
    fn invalid_json_reports_position() {
        let err = parse_module(Path::new("/s/m.json"), b"{\n  \"requirements\": [,]\n}").unwrap_err();
        assert_eq!(err.line, Some(2));
        assert!(err.column.is_some());

        let err = parse_module(Path::new("/s/m.json"), b"[]").unwrap_err();
        assert!(err.message.contains("object"));
    }

    #[tokio::test]
    async fn parse_all_skips_bad_files_and_flags_duplicates() {
        let fs = MemoryFs::new();
        fs.insert_file("/s/requirements/a.json", r#"{"requirements": [{"id": "REQ-001"}]}"#);
        fs.insert_file("/s/requirements/b.json", "{ not json");
        fs.insert_file("/s/requirements/c.json", r#"{"requirements": [{"id": "REQ-001"}]}"#);
        let paths = vec![
            PathBuf::from("/s/requirements/a.json"),
            PathBuf::from("/s/requirements/b.json"),
            PathBuf::from("/s/requirements/c.json"),
        ];

        let index = Parser::new(&fs, 1024)
            .parse_all(&paths, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(index.modules.len(), 2);
        assert_eq!(index.parse_errors.len(), 1);
        assert_eq!(index.parse_errors[0].path, PathBuf::from("/s/requirements/b.json"));
        let dup: Vec<_> = index
            .diagnostics
            .iter()
            .filter(|d| d.code == IssueCode::DuplicateId)
            .collect();
        assert_eq!(dup.len(), 1);
        assert_eq!(dup[0].requirement_id.as_deref(), Some("REQ-001"));
    }

    #[tokio::test]
    async fn oversized_files_are_refused() {
        let fs = MemoryFs::new();
        fs.insert_file("/s/requirements/a.json", r#"{"requirements": []}"#);
        let index = Parser::new(&fs, 4)
            .parse_all(&[PathBuf::from("/s/requirements/a.json")], &CancellationToken::new())
            .await
            .unwrap();
        assert!(index.modules.is_empty());
        assert!(index.parse_errors.is_empty());
        assert_eq!(index.diagnostics[0].code, IssueCode::OversizedFile);
    }

    #[tokio::test]
    async fn cancellation_stops_before_next_file() {
        let fs = MemoryFs::new();
        fs.insert_file("/s/requirements/a.json", "{}");
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = Parser::new(&fs, 1024)
            .parse_all(&[PathBuf::from("/s/requirements/a.json")], &cancel)
            .await;
        assert!(matches!(result, Err(EngineError::Cancelled { stage: "parse" })));
    }
}
