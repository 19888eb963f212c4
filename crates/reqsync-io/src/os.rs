//! OS-backed file system

use crate::path::temp_path;
use crate::{DirEntry, FileStat, Reader, Writer};
use async_trait::async_trait;
use std::io;
use std::path::Path;
use tokio::io::AsyncWriteExt;

/// File system backed by `tokio::fs`
#[derive(Debug, Clone, Copy, Default)]
pub struct OsFs;

impl OsFs {
    /// Create OS file system handle
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Reader for OsFs {
    async fn read_file(&self, path: &Path) -> io::Result<Vec<u8>> {
        tokio::fs::read(path).await
    }

    async fn stat(&self, path: &Path) -> io::Result<FileStat> {
        let meta = tokio::fs::metadata(path).await?;
        Ok(FileStat {
            is_dir: meta.is_dir(),
            len: if meta.is_dir() { 0 } else { meta.len() },
            modified: meta.modified().ok(),
        })
    }

    async fn list_dir(&self, path: &Path) -> io::Result<Vec<DirEntry>> {
        let mut entries = Vec::new();
        let mut dir = tokio::fs::read_dir(path).await?;
        while let Some(entry) = dir.next_entry().await? {
            let file_type = entry.file_type().await?;
            entries.push(DirEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                path: entry.path(),
                is_dir: file_type.is_dir(),
            });
        }
        entries.sort();
        Ok(entries)
    }
}

#[async_trait]
impl Writer for OsFs {
    async fn write_file(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        let tmp = temp_path(path);
        let mut file = tokio::fs::File::create(&tmp).await?;
        let staged = stage(&mut file, contents).await;
        drop(file);
        let committed = match staged {
            Ok(()) => tokio::fs::rename(&tmp, path).await,
            Err(err) => Err(err),
        };
        if let Err(err) = committed {
            tracing::warn!(path = %path.display(), error = %err, "atomic write failed");
            if let Err(cleanup) = tokio::fs::remove_file(&tmp).await {
                tracing::debug!(tmp = %tmp.display(), error = %cleanup, "temp file not removed");
            }
            return Err(err);
        }
        Ok(())
    }

    async fn append_file(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;
        file.write_all(contents).await?;
        file.flush().await
    }

    async fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        tokio::fs::create_dir_all(path).await
    }

    async fn remove_file(&self, path: &Path) -> io::Result<()> {
        tokio::fs::remove_file(path).await
    }
}

async fn stage(file: &mut tokio::fs::File, contents: &[u8]) -> io::Result<()> {
    file.write_all(contents).await?;
    file.sync_all().await
}
