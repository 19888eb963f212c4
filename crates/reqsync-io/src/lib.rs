//! Requirement Sync I/O Seam
//!
//! The trusted boundary between the host file system and the sync engine.
//! Nothing in the engine touches the OS directly; every read goes through a
//! [`Reader`] and every write through a [`Writer`].
//!
//! # Backends
//!
//! - [`OsFs`]: tokio-backed, writes atomically via `<path>.tmp` + rename
//! - [`MemoryFs`]: in-memory tree for tests, with write recording and
//!   failure injection
//!
//! # Example
//!
//! ```rust
//! use reqsync_io::{MemoryFs, Reader};
//! use std::path::Path;
//!
//! # async fn example() -> std::io::Result<()> {
//! let fs = MemoryFs::new();
//! fs.insert_file("/scenario/requirements/index.json", br#"{"imports":[]}"#);
//! assert!(fs.exists(Path::new("/scenario/requirements")).await);
//! # Ok(())
//! # }
//! ```


use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

mod memory;
mod os;
pub mod path;

pub use memory::{MemoryFs, WriteOp};
pub use os::OsFs;
pub use path::{normalize_path, relative_to, temp_path, to_slash};

/// File metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStat {
    /// Whether the path is a directory
    pub is_dir: bool,
    /// Size in bytes (0 for directories)
    pub len: u64,
    /// Last modification time, when the backend knows it
    pub modified: Option<SystemTime>,
}

/// Directory listing entry
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct DirEntry {
    /// Entry file name
    pub name: String,
    /// Full path
    pub path: PathBuf,
    /// Whether the entry is a directory
    pub is_dir: bool,
}

/// Read side of the file-system seam
#[async_trait]
pub trait Reader: Send + Sync {
    /// Read whole file
    async fn read_file(&self, path: &Path) -> io::Result<Vec<u8>>;

    /// Stat a path
    async fn stat(&self, path: &Path) -> io::Result<FileStat>;

    /// List directory entries, sorted by name
    async fn list_dir(&self, path: &Path) -> io::Result<Vec<DirEntry>>;

    /// Whether a path exists
    async fn exists(&self, path: &Path) -> bool {
        self.stat(path).await.is_ok()
    }

    /// Whether a path is a directory
    async fn is_dir(&self, path: &Path) -> bool {
        self.stat(path).await.is_ok_and(|s| s.is_dir)
    }
}

/// Write side of the file-system seam
#[async_trait]
pub trait Writer: Send + Sync {
    /// Replace file contents atomically
    ///
    /// Implementations write to `<path>.tmp` and rename over `path`; a failed
    /// rename leaves the original untouched.
    async fn write_file(&self, path: &Path, contents: &[u8]) -> io::Result<()>;

    /// Append to a file, creating it if missing
    async fn append_file(&self, path: &Path, contents: &[u8]) -> io::Result<()>;

    /// Create a directory and all missing parents
    async fn create_dir_all(&self, path: &Path) -> io::Result<()>;

    /// Remove a file
    async fn remove_file(&self, path: &Path) -> io::Result<()>;
}

/// Both halves of the seam
pub trait FileSystem: Reader + Writer {}

impl<T: Reader + Writer> FileSystem for T {}

/// Read a file as UTF-8 text
///
/// # Errors
/// Propagates read failures; invalid UTF-8 becomes `InvalidData`.
pub async fn read_to_string<R: Reader + ?Sized>(reader: &R, path: &Path) -> io::Result<String> {
    let bytes = reader.read_file(path).await?;
    String::from_utf8(bytes).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
