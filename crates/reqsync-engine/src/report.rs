//! Reporter
//!
//! Renders an enriched index and its summary as a human-readable table or
//! as JSON shaped like the snapshot's `modules` array.

use crate::error::ReportError;
use crate::snapshot::{module_views, ModuleView};
use reqsync_io::{relative_to, to_slash};
use reqsync_model::{Index, LiveStatus, Requirement, Summary, ValidationIssue};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};
use std::io::Write;
use std::path::Path;
use std::str::FromStr;

/// Output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    /// Human-readable table
    #[default]
    Text,
    /// Machine-readable JSON
    Json,
}

impl FromStr for ReportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown report format: {other}")),
        }
    }
}

impl Display for ReportFormat {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Text => "text",
            Self::Json => "json",
        })
    }
}

/// Report options
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportOptions {
    /// Output format
    pub format: ReportFormat,
    /// Scenario name shown in the header
    pub scenario_name: Option<String>,
    /// Diagnostics to append
    pub diagnostics: Vec<ValidationIssue>,
}

impl ReportOptions {
    /// Options for a format
    #[inline]
    #[must_use]
    pub fn new(format: ReportFormat) -> Self {
        Self {
            format,
            ..Self::default()
        }
    }

    /// With scenario name
    #[inline]
    #[must_use]
    pub fn with_scenario(mut self, name: impl Into<String>) -> Self {
        self.scenario_name = Some(name.into());
        self
    }

    /// With diagnostics section
    #[inline]
    #[must_use]
    pub fn with_diagnostics(mut self, diagnostics: Vec<ValidationIssue>) -> Self {
        self.diagnostics = diagnostics;
        self
    }
}

#[derive(Serialize)]
struct JsonReport<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    scenario: Option<&'a str>,
    summary: &'a Summary,
    modules: Vec<ModuleView>,
    #[serde(skip_serializing_if = "<[_]>::is_empty")]
    diagnostics: &'a [ValidationIssue],
}

/// Renders reports for one enriched index
#[derive(Debug, Clone, Copy)]
pub struct Reporter<'a> {
    index: &'a Index,
    summary: &'a Summary,
    scenario_dir: &'a Path,
}

impl<'a> Reporter<'a> {
    /// Create reporter; module paths are shown relative to `scenario_dir`
    #[inline]
    #[must_use]
    pub fn new(index: &'a Index, summary: &'a Summary, scenario_dir: &'a Path) -> Self {
        Self {
            index,
            summary,
            scenario_dir,
        }
    }

    /// Write the report
    ///
    /// # Errors
    /// [`ReportError`] if the sink fails or JSON encoding fails.
    pub fn generate(&self, options: &ReportOptions, out: &mut dyn Write) -> Result<(), ReportError> {
        match options.format {
            ReportFormat::Json => self.json(options, out),
            ReportFormat::Text => self.text(options, out),
        }
    }

    fn json(&self, options: &ReportOptions, out: &mut dyn Write) -> Result<(), ReportError> {
        let report = JsonReport {
            scenario: options.scenario_name.as_deref(),
            summary: self.summary,
            modules: module_views(self.index, self.scenario_dir),
            diagnostics: &options.diagnostics,
        };
        serde_json::to_writer_pretty(&mut *out, &report)?;
        writeln!(out)?;
        Ok(())
    }

    fn text(&self, options: &ReportOptions, out: &mut dyn Write) -> Result<(), ReportError> {
        let s = self.summary;
        match &options.scenario_name {
            Some(name) => writeln!(out, "Requirements report: {name}")?,
            None => writeln!(out, "Requirements report")?,
        }
        writeln!(
            out,
            "modules {}  requirements {}  grouping {}  counted {}  passed {}  failed {}  pass rate {:.1}%",
            s.modules,
            s.total,
            s.grouping,
            s.counted,
            s.passed,
            s.failed,
            s.pass_rate_percent()
        )?;
        writeln!(
            out,
            "targets {}/{} passing  validations {} ({} passed, {} failed)",
            s.targets.passing,
            s.targets.total,
            s.validations.total,
            s.validations.passed,
            s.validations.failed
        )?;

        let groups = self.grouped();
        let width = groups
            .values()
            .flat_map(|modules| modules.values().flatten())
            .map(|r| r.id.len())
            .max()
            .unwrap_or(0);

        for ((_, label), modules) in &groups {
            writeln!(out)?;
            writeln!(out, "[{label}]")?;
            for (&position, requirements) in modules {
                let module = &self.index.modules[position];
                let path = to_slash(&relative_to(&module.source_path, self.scenario_dir));
                writeln!(out, "  {} ({path})", module.name())?;
                for r in requirements {
                    writeln!(out, "    {}", row(r, width))?;
                }
            }
        }

        if !s.phases.is_empty() {
            writeln!(out)?;
            writeln!(out, "Phases")?;
            for (phase, tally) in &s.phases {
                writeln!(
                    out,
                    "  {phase:<12} passed {:>4}  failed {:>4}  other {:>4}",
                    tally.passed, tally.failed, tally.other
                )?;
            }
        }

        if !options.diagnostics.is_empty() {
            writeln!(out)?;
            writeln!(out, "Diagnostics")?;
            for issue in &options.diagnostics {
                writeln!(out, "  {issue}")?;
            }
        }
        Ok(())
    }

    /// Canonical requirements bucketed by criticality, then module
    ///
    /// Known criticalities sort first in priority order; `unset` sorts last.
    #[allow(clippy::type_complexity)]
    fn grouped(&self) -> BTreeMap<(u8, String), BTreeMap<usize, Vec<&'a Requirement>>> {
        let mut groups: BTreeMap<(u8, String), BTreeMap<usize, Vec<&'a Requirement>>> =
            BTreeMap::new();
        for (loc, requirement) in self.index.canonical() {
            let key = match &requirement.criticality {
                Some(c) if c.is_known() => (0, c.as_str().to_string()),
                Some(c) => (1, c.as_str().to_string()),
                None => (2, "unset".to_string()),
            };
            groups
                .entry(key)
                .or_default()
                .entry(loc.module)
                .or_default()
                .push(requirement);
        }
        groups
    }
}

fn row(r: &Requirement, width: usize) -> String {
    let declared = r.declared_status.as_ref().map_or("-", |s| s.as_str());
    let live = r.live_status.unwrap_or(LiveStatus::Unknown);
    let mut line = format!("{:<width$}  {declared:<15}  {:<8}", r.id, live.as_str());
    if r.is_grouping() {
        line.push_str("  (group)");
    }
    if let Some(title) = &r.title {
        line.push_str("  ");
        line.push_str(title);
    }
    line.trim_end().to_string()
}
