//! Phase naming
//!
//! Phases are named stages of test execution. `e2e` is accepted as an alias
//! for `integration`; everything is normalized before matching.

use crate::status::normalize_token;
use once_cell::sync::Lazy;
use regex::Regex;

/// Reference shape of a phase runner script
static PHASE_SCRIPT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^test/phases/test-([A-Za-z0-9_-]+)\.sh$").expect("phase script pattern is valid")
});

/// Phase name for aggregate fallback evidence
pub const ALL_PHASES: &str = "all";

/// Phases a scenario test driver knows about, in execution order
pub const KNOWN_PHASES: [&str; 6] = [
    "structure",
    "dependencies",
    "unit",
    "integration",
    "business",
    "performance",
];

/// Normalize a phase name, resolving aliases
#[must_use]
pub fn normalize_phase(raw: &str) -> String {
    let token = normalize_token(raw);
    match token.as_str() {
        "e2e" => "integration".to_string(),
        _ => token,
    }
}

/// Phase captured from a `test/phases/test-<phase>.sh` reference
#[must_use]
pub fn phase_from_ref(reference: &str) -> Option<String> {
    PHASE_SCRIPT
        .captures(reference)
        .and_then(|caps| caps.get(1))
        .map(|m| normalize_phase(m.as_str()))
}

/// Canonical form of a validation reference
///
/// Backslashes become slashes, repeated slashes collapse, and a leading
/// `./` is dropped.
#[must_use]
pub fn normalize_ref(raw: &str) -> String {
    let slashed = raw.trim().replace('\\', "/");
    let mut out = String::with_capacity(slashed.len());
    let mut prev_slash = false;
    for c in slashed.chars() {
        if c == '/' {
            if prev_slash {
                continue;
            }
            prev_slash = true;
        } else {
            prev_slash = false;
        }
        out.push(c);
    }
    let mut trimmed = out.as_str();
    while let Some(rest) = trimmed.strip_prefix("./") {
        trimmed = rest;
    }
    trimmed.to_string()
}
