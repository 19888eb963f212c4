//! Testing utilities for the reqsync workspace
//!
//! Scenario fixtures over [`MemoryFs`], a frozen clock, and canned
//! manifest JSON.

#![allow(missing_docs)]

use chrono::{DateTime, TimeZone, Utc};
use reqsync_engine::{EngineConfig, FixedClock, SyncEngine};
use reqsync_io::MemoryFs;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Scenario root used by every fixture
pub const SCENARIO_DIR: &str = "/scenario";

/// Instant every fixture clock is frozen at
pub fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0)
        .single()
        .unwrap_or_default()
}

/// `fixed_now` in the engine's timestamp format
pub const FIXED_TIMESTAMP: &str = "2026-03-01T12:00:00Z";

pub fn fixed_clock() -> FixedClock {
    FixedClock(fixed_now())
}

/// Canned single-requirement module
pub fn basic_module() -> Value {
    json!({
        "_metadata": {"module": "core"},
        "requirements": [{
            "id": "REQ-001",
            "title": "T",
            "status": "pending",
            "validation": [{"type": "test", "ref": "test/a.test.ts", "status": "not_implemented"}]
        }]
    })
}

/// Module JSON with the given requirement objects
pub fn module_with(name: &str, requirements: Vec<Value>) -> Value {
    json!({
        "_metadata": {"module": name},
        "requirements": requirements
    })
}

/// Builds a scenario tree inside a [`MemoryFs`]
#[derive(Debug)]
pub struct ScenarioBuilder {
    fs: Arc<MemoryFs>,
    root: PathBuf,
    imports: Vec<String>,
    with_index: bool,
}

impl Default for ScenarioBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ScenarioBuilder {
    pub fn new() -> Self {
        let fs = Arc::new(MemoryFs::new());
        fs.insert_dir(SCENARIO_DIR);
        Self {
            fs,
            root: PathBuf::from(SCENARIO_DIR),
            imports: Vec::new(),
            with_index: true,
        }
    }

    /// Skip `requirements/index.json`; discovery falls back to scanning
    pub fn without_index(mut self) -> Self {
        self.with_index = false;
        self
    }

    /// Add `requirements/<dir>/module.json` and import it from the index
    pub fn module(mut self, dir: &str, module: &Value) -> Self {
        self.fs.insert_file(
            self.root.join("requirements").join(dir).join("module.json"),
            pretty(module),
        );
        self.imports.push(dir.to_string());
        self
    }

    /// Add an arbitrary file under the scenario root
    pub fn file(self, relative: &str, contents: impl AsRef<[u8]>) -> Self {
        self.fs.insert_file(self.root.join(relative), contents);
        self
    }

    /// Add `coverage/phase-results/<phase>.json`
    pub fn phase_results(self, phase: &str, body: &Value) -> Self {
        let relative = format!("coverage/phase-results/{phase}.json");
        self.file(&relative, pretty(body))
    }

    /// Write the index and hand back the file system
    pub fn build(self) -> Scenario {
        if self.with_index {
            self.fs.insert_file(
                self.root.join("requirements/index.json"),
                pretty(&json!({"imports": self.imports})),
            );
        }
        self.fs.clear_ops();
        Scenario {
            fs: self.fs,
            root: self.root,
        }
    }
}

/// A built scenario
#[derive(Debug, Clone)]
pub struct Scenario {
    pub fs: Arc<MemoryFs>,
    pub root: PathBuf,
}

impl Scenario {
    /// Absolute path of a file under the scenario
    pub fn path(&self, relative: &str) -> PathBuf {
        self.root.join(relative)
    }

    /// Engine over this scenario with a frozen clock
    pub fn engine(&self, config: EngineConfig) -> SyncEngine {
        SyncEngine::new(self.fs.clone(), config).with_clock(Arc::new(fixed_clock()))
    }

    /// Parsed JSON of a file under the scenario
    pub fn json(&self, relative: &str) -> Option<Value> {
        let text = self.fs.text(self.path(relative))?;
        serde_json::from_str(&text).ok()
    }

    pub fn dir(&self) -> &Path {
        &self.root
    }
}

fn pretty(value: &Value) -> String {
    let mut text = serde_json::to_string_pretty(value).unwrap_or_default();
    text.push('\n');
    text
}
