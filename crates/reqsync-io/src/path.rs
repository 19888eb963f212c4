//! Lexical path helpers
//!
//! Nothing here touches the file system; `..` is resolved textually.

use std::path::{Component, Path, PathBuf};

/// Resolve `.` and `..` components without consulting the file system
#[must_use]
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let popped = match out.components().next_back() {
                    Some(Component::Normal(_)) => out.pop(),
                    _ => false,
                };
                if !popped && !out.has_root() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// `path` relative to `base` when it lies underneath, else `path` unchanged
#[must_use]
pub fn relative_to(path: &Path, base: &Path) -> PathBuf {
    path.strip_prefix(base)
        .map_or_else(|_| path.to_path_buf(), Path::to_path_buf)
}

/// Forward-slash rendering of a path, for stable output across platforms
#[must_use]
pub fn to_slash(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
            Component::RootDir => Some(String::new()),
            Component::ParentDir => Some("..".to_string()),
            Component::CurDir | Component::Prefix(_) => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Sibling temp path used for atomic writes: `<path>.tmp`
#[must_use]
pub fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_resolves_dots() {
        assert_eq!(
            normalize_path(Path::new("/s/requirements/./01-core/../02-ui/module.json")),
            PathBuf::from("/s/requirements/02-ui/module.json")
        );
        assert_eq!(normalize_path(Path::new("/../a")), PathBuf::from("/a"));
        assert_eq!(normalize_path(Path::new("../a")), PathBuf::from("../a"));
    }

    #[test]
    fn relative_and_slash_rendering() {
        let rel = relative_to(
            Path::new("/s/requirements/01-core/module.json"),
            Path::new("/s"),
        );
        assert_eq!(to_slash(&rel), "requirements/01-core/module.json");
        assert_eq!(to_slash(Path::new("/abs/x")), "/abs/x");
        assert_eq!(relative_to(Path::new("/t/x"), Path::new("/s")), PathBuf::from("/t/x"));
    }

    #[test]
    fn temp_path_appends_suffix() {
        assert_eq!(
            temp_path(Path::new("/s/m.json")),
            PathBuf::from("/s/m.json.tmp")
        );
    }
}
