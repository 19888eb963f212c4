//! Parsed collection of modules
//!
//! The index owns every module, and through them every requirement.
//! Children are referenced by ID only; lookups go through [`Index::get`].

use crate::diagnostic::{ParseError, ValidationIssue};
use crate::module::Module;
use crate::requirement::Requirement;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

/// Position of a requirement inside the index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequirementLocation {
    /// Module position in discovery order
    pub module: usize,
    /// Requirement position inside the module
    pub position: usize,
}

/// Parsed union of all modules with a by-ID lookup
#[derive(Debug, Clone, Default)]
pub struct Index {
    /// Modules in discovery order
    pub modules: Vec<Module>,
    /// Files that failed to decode
    pub parse_errors: Vec<ParseError>,
    /// Non-fatal diagnostics recorded while building the index
    pub diagnostics: Vec<ValidationIssue>,
    by_id: HashMap<String, RequirementLocation>,
    duplicates: BTreeMap<String, Vec<PathBuf>>,
}

impl Index {
    /// Empty index
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a module, registering its requirements by ID
    ///
    /// The first declaration of an ID stays canonical. Later declarations
    /// remain in their module (so write-back keeps them) and are recorded
    /// as duplicates. Returns the IDs that became duplicated by this call.
    pub fn push_module(&mut self, module: Module) -> Vec<String> {
        let module_pos = self.modules.len();
        let mut newly_duplicated = Vec::new();

        for (position, requirement) in module.requirements.iter().enumerate() {
            let location = RequirementLocation {
                module: module_pos,
                position,
            };
            match self.by_id.get(&requirement.id) {
                None => {
                    self.by_id.insert(requirement.id.clone(), location);
                }
                Some(first) => {
                    let first_path = if first.module == module_pos {
                        module.source_path.clone()
                    } else {
                        self.modules[first.module].source_path.clone()
                    };
                    let paths = self
                        .duplicates
                        .entry(requirement.id.clone())
                        .or_insert_with(|| vec![first_path]);
                    paths.push(module.source_path.clone());
                    if !newly_duplicated.contains(&requirement.id) {
                        newly_duplicated.push(requirement.id.clone());
                    }
                }
            }
        }

        self.modules.push(module);
        newly_duplicated
    }

    /// Canonical requirement for an ID
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Requirement> {
        let loc = self.by_id.get(id)?;
        self.modules
            .get(loc.module)
            .and_then(|m| m.requirements.get(loc.position))
    }

    /// Mutable canonical requirement for an ID
    pub fn get_mut(&mut self, id: &str) -> Option<&mut Requirement> {
        let loc = *self.by_id.get(id)?;
        self.modules
            .get_mut(loc.module)
            .and_then(|m| m.requirements.get_mut(loc.position))
    }

    /// Location of the canonical requirement for an ID
    #[inline]
    #[must_use]
    pub fn location(&self, id: &str) -> Option<RequirementLocation> {
        self.by_id.get(id).copied()
    }

    /// Whether the requirement at a location is the canonical one for its ID
    #[must_use]
    pub fn is_canonical(&self, location: RequirementLocation) -> bool {
        self.modules
            .get(location.module)
            .and_then(|m| m.requirements.get(location.position))
            .is_some_and(|r| self.by_id.get(&r.id) == Some(&location))
    }

    /// Whether an ID is declared in more than one place
    #[inline]
    #[must_use]
    pub fn is_duplicated(&self, id: &str) -> bool {
        self.duplicates.contains_key(id)
    }

    /// Duplicated IDs with every declaring file, first declaration first
    #[inline]
    #[must_use]
    pub fn duplicates(&self) -> &BTreeMap<String, Vec<PathBuf>> {
        &self.duplicates
    }

    /// Canonical requirements in index order, with their locations
    pub fn canonical(&self) -> impl Iterator<Item = (RequirementLocation, &Requirement)> {
        self.all().filter(|(loc, _)| self.is_canonical(*loc))
    }

    /// Every requirement in index order, duplicates included
    pub fn all(&self) -> impl Iterator<Item = (RequirementLocation, &Requirement)> {
        self.modules.iter().enumerate().flat_map(|(m, module)| {
            module
                .requirements
                .iter()
                .enumerate()
                .map(move |(position, r)| (RequirementLocation { module: m, position }, r))
        })
    }

    /// Number of distinct requirement IDs
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    /// Whether the index holds no requirements
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}
