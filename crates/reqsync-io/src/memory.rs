//! In-memory file system for tests
//!
//! Keeps a flat map of normalized paths. Directories are explicit nodes;
//! writing a file requires its parent directory to exist, as on a real
//! file system. Every mutation is recorded so tests can assert on exactly
//! what the engine wrote.

use crate::path::{normalize_path, temp_path};
use crate::{DirEntry, FileStat, Reader, Writer};
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, BTreeSet};
use std::io;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
enum Node {
    File(Vec<u8>),
    Dir,
}

/// Mutation recorded by [`MemoryFs`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOp {
    /// `write_file`
    Write(PathBuf),
    /// `append_file`
    Append(PathBuf),
    /// `create_dir_all`
    CreateDir(PathBuf),
    /// `remove_file`
    Remove(PathBuf),
}

/// In-memory [`Reader`] + [`Writer`]
#[derive(Debug, Default)]
pub struct MemoryFs {
    nodes: RwLock<BTreeMap<PathBuf, Node>>,
    ops: Mutex<Vec<WriteOp>>,
    failing: RwLock<BTreeSet<PathBuf>>,
    unreadable: RwLock<BTreeSet<PathBuf>>,
}

impl MemoryFs {
    /// Empty file system
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a file, creating all parent directories; not recorded as a write
    pub fn insert_file(&self, path: impl AsRef<Path>, contents: impl AsRef<[u8]>) {
        let path = normalize_path(path.as_ref());
        let mut nodes = self.nodes.write();
        if let Some(parent) = path.parent() {
            insert_dirs(&mut nodes, parent);
        }
        nodes.insert(path, Node::File(contents.as_ref().to_vec()));
    }

    /// Seed a directory and its parents; not recorded as a write
    pub fn insert_dir(&self, path: impl AsRef<Path>) {
        insert_dirs(&mut self.nodes.write(), &normalize_path(path.as_ref()));
    }

    /// Make every later mutation of `path` fail with `PermissionDenied`
    pub fn fail_writes_to(&self, path: impl AsRef<Path>) {
        self.failing.write().insert(normalize_path(path.as_ref()));
    }

    /// Make every later read, stat, or listing of `path` fail with
    /// `PermissionDenied`
    pub fn fail_reads_to(&self, path: impl AsRef<Path>) {
        self.unreadable.write().insert(normalize_path(path.as_ref()));
    }

    /// Current contents of a file
    #[must_use]
    pub fn contents(&self, path: impl AsRef<Path>) -> Option<Vec<u8>> {
        match self.nodes.read().get(&normalize_path(path.as_ref())) {
            Some(Node::File(bytes)) => Some(bytes.clone()),
            _ => None,
        }
    }

    /// Current contents of a file as text
    #[must_use]
    pub fn text(&self, path: impl AsRef<Path>) -> Option<String> {
        self.contents(path)
            .and_then(|bytes| String::from_utf8(bytes).ok())
    }

    /// Every recorded mutation, in order
    #[must_use]
    pub fn ops(&self) -> Vec<WriteOp> {
        self.ops.lock().clone()
    }

    /// Paths replaced through `write_file`, in order
    #[must_use]
    pub fn written(&self) -> Vec<PathBuf> {
        self.ops
            .lock()
            .iter()
            .filter_map(|op| match op {
                WriteOp::Write(p) => Some(p.clone()),
                _ => None,
            })
            .collect()
    }

    /// Forget recorded mutations
    pub fn clear_ops(&self) {
        self.ops.lock().clear();
    }

    /// Every file path currently present
    #[must_use]
    pub fn files(&self) -> Vec<PathBuf> {
        self.nodes
            .read()
            .iter()
            .filter(|(_, n)| matches!(n, Node::File(_)))
            .map(|(p, _)| p.clone())
            .collect()
    }

    fn check_writable(&self, path: &Path) -> io::Result<()> {
        if self.failing.read().contains(path) {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("write to {} rejected", path.display()),
            ));
        }
        Ok(())
    }

    fn check_readable(&self, path: &Path) -> io::Result<()> {
        if self.unreadable.read().contains(path) {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("read of {} rejected", path.display()),
            ));
        }
        Ok(())
    }

    fn require_parent(nodes: &BTreeMap<PathBuf, Node>, path: &Path) -> io::Result<()> {
        match path.parent() {
            Some(parent) if parent.as_os_str().is_empty() => Ok(()),
            Some(parent) => match nodes.get(parent) {
                Some(Node::Dir) => Ok(()),
                _ => Err(not_found(parent)),
            },
            None => Ok(()),
        }
    }
}

fn insert_dirs(nodes: &mut BTreeMap<PathBuf, Node>, dir: &Path) {
    for ancestor in dir.ancestors() {
        if ancestor.as_os_str().is_empty() {
            continue;
        }
        nodes.entry(ancestor.to_path_buf()).or_insert(Node::Dir);
    }
}

fn not_found(path: &Path) -> io::Error {
    io::Error::new(
        io::ErrorKind::NotFound,
        format!("{} not found", path.display()),
    )
}

#[async_trait]
impl Reader for MemoryFs {
    async fn read_file(&self, path: &Path) -> io::Result<Vec<u8>> {
        let path = normalize_path(path);
        self.check_readable(&path)?;
        match self.nodes.read().get(&path) {
            Some(Node::File(bytes)) => Ok(bytes.clone()),
            Some(Node::Dir) => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} is a directory", path.display()),
            )),
            None => Err(not_found(&path)),
        }
    }

    async fn stat(&self, path: &Path) -> io::Result<FileStat> {
        let path = normalize_path(path);
        self.check_readable(&path)?;
        match self.nodes.read().get(&path) {
            Some(Node::File(bytes)) => Ok(FileStat {
                is_dir: false,
                len: bytes.len() as u64,
                modified: None,
            }),
            Some(Node::Dir) => Ok(FileStat {
                is_dir: true,
                len: 0,
                modified: None,
            }),
            None => Err(not_found(&path)),
        }
    }

    async fn list_dir(&self, path: &Path) -> io::Result<Vec<DirEntry>> {
        let path = normalize_path(path);
        self.check_readable(&path)?;
        let nodes = self.nodes.read();
        match nodes.get(&path) {
            Some(Node::Dir) => {}
            Some(Node::File(_)) => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("{} is not a directory", path.display()),
                ))
            }
            None => return Err(not_found(&path)),
        }
        let mut entries: Vec<DirEntry> = nodes
            .iter()
            .filter(|(p, _)| p.parent() == Some(path.as_path()))
            .filter_map(|(p, node)| {
                let name = p.file_name()?.to_string_lossy().into_owned();
                Some(DirEntry {
                    name,
                    path: p.clone(),
                    is_dir: matches!(node, Node::Dir),
                })
            })
            .collect();
        entries.sort();
        Ok(entries)
    }
}

#[async_trait]
impl Writer for MemoryFs {
    async fn write_file(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        let path = normalize_path(path);
        let mut nodes = self.nodes.write();
        Self::require_parent(&nodes, &path)?;
        if matches!(nodes.get(&path), Some(Node::Dir)) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} is a directory", path.display()),
            ));
        }
        // The temp file is staged and dropped on failure so a rejected
        // rename leaves the original bytes in place.
        let tmp = temp_path(&path);
        nodes.insert(tmp.clone(), Node::File(contents.to_vec()));
        if let Err(err) = self.check_writable(&path) {
            nodes.remove(&tmp);
            return Err(err);
        }
        nodes.remove(&tmp);
        nodes.insert(path.clone(), Node::File(contents.to_vec()));
        self.ops.lock().push(WriteOp::Write(path));
        Ok(())
    }

    async fn append_file(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        let path = normalize_path(path);
        self.check_writable(&path)?;
        let mut nodes = self.nodes.write();
        Self::require_parent(&nodes, &path)?;
        match nodes.get_mut(&path) {
            Some(Node::File(bytes)) => bytes.extend_from_slice(contents),
            Some(Node::Dir) => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("{} is a directory", path.display()),
                ))
            }
            None => {
                nodes.insert(path.clone(), Node::File(contents.to_vec()));
            }
        }
        self.ops.lock().push(WriteOp::Append(path));
        Ok(())
    }

    async fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        let path = normalize_path(path);
        self.check_writable(&path)?;
        let mut nodes = self.nodes.write();
        for ancestor in path.ancestors() {
            if let Some(Node::File(_)) = nodes.get(ancestor) {
                return Err(io::Error::new(
                    io::ErrorKind::AlreadyExists,
                    format!("{} is a file", ancestor.display()),
                ));
            }
        }
        insert_dirs(&mut nodes, &path);
        self.ops.lock().push(WriteOp::CreateDir(path));
        Ok(())
    }

    async fn remove_file(&self, path: &Path) -> io::Result<()> {
        let path = normalize_path(path);
        self.check_writable(&path)?;
        let mut nodes = self.nodes.write();
        match nodes.get(&path) {
            Some(Node::File(_)) => {
                nodes.remove(&path);
                self.ops.lock().push(WriteOp::Remove(path));
                Ok(())
            }
            Some(Node::Dir) => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} is a directory", path.display()),
            )),
            None => Err(not_found(&path)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn seeded_files_create_parents() {
        let fs = MemoryFs::new();
        fs.insert_file("/s/requirements/01-core/module.json", "{}");

        assert!(fs.is_dir(Path::new("/s/requirements/01-core")).await);
        assert!(fs.is_dir(Path::new("/s")).await);
        assert!(fs.ops().is_empty());
    }

    #[tokio::test]
    async fn list_dir_returns_direct_children_sorted() {
        let fs = MemoryFs::new();
        fs.insert_file("/s/b.json", "{}");
        fs.insert_file("/s/a.json", "{}");
        fs.insert_file("/s/sub/deep.json", "{}");

        let names: Vec<_> = fs
            .list_dir(Path::new("/s"))
            .await
            .unwrap()
            .into_iter()
            .map(|e| (e.name, e.is_dir))
            .collect();
        assert_eq!(
            names,
            vec![
                ("a.json".to_string(), false),
                ("b.json".to_string(), false),
                ("sub".to_string(), true)
            ]
        );
    }

    #[tokio::test]
    async fn write_requires_parent_dir() {
        let fs = MemoryFs::new();
        let err = fs
            .write_file(Path::new("/s/coverage/latest.json"), b"{}")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);

        fs.create_dir_all(Path::new("/s/coverage")).await.unwrap();
        fs.write_file(Path::new("/s/coverage/latest.json"), b"{}")
            .await
            .unwrap();
        assert_eq!(fs.written(), vec![PathBuf::from("/s/coverage/latest.json")]);
    }

    #[tokio::test]
    async fn failed_write_leaves_original_and_no_temp() {
        let fs = MemoryFs::new();
        fs.insert_file("/s/m.json", "old");
        fs.fail_writes_to("/s/m.json");

        let err = fs
            .write_file(Path::new("/s/m.json"), b"new")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::PermissionDenied);
        assert_eq!(fs.text("/s/m.json").as_deref(), Some("old"));
        assert!(!fs.exists(Path::new("/s/m.json.tmp")).await);
        assert!(fs.written().is_empty());
    }

    #[tokio::test]
    async fn rejected_reads_are_permission_errors() {
        let fs = MemoryFs::new();
        fs.insert_file("/s/requirements/m/module.json", "{}");
        fs.fail_reads_to("/s/requirements");

        let err = fs.stat(Path::new("/s/requirements")).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::PermissionDenied);
        assert!(fs.list_dir(Path::new("/s/requirements")).await.is_err());
        assert!(!fs.is_dir(Path::new("/s/requirements")).await);
        assert!(fs.read_file(Path::new("/s/requirements/m/module.json")).await.is_ok());
    }

    #[tokio::test]
    async fn append_extends_existing_file() {
        let fs = MemoryFs::new();
        fs.insert_dir("/s");
        fs.append_file(Path::new("/s/log"), b"a\n").await.unwrap();
        fs.append_file(Path::new("/s/log"), b"b\n").await.unwrap();
        assert_eq!(fs.text("/s/log").as_deref(), Some("a\nb\n"));
        assert_eq!(
            fs.ops(),
            vec![
                WriteOp::Append(PathBuf::from("/s/log")),
                WriteOp::Append(PathBuf::from("/s/log"))
            ]
        );
    }
}
