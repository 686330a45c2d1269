//! Filesystem service capability
//!
//! The analysis scanner consumes this interface rather than touching
//! the filesystem directly, so the file-walking behavior is testable
//! and a remote/virtual workspace stays possible. `LocalFilesystem`
//! is the production implementation over `tokio::fs`.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};

/// Minimal stat result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileStat {
    pub size: u64,
    pub is_dir: bool,
    pub is_file: bool,
}

/// One directory entry
#[derive(Debug, Clone)]
pub struct DirEntry {
    pub path: PathBuf,
    pub file_name: String,
    pub is_dir: bool,
}

/// Filesystem capability consumed by the core
#[async_trait]
pub trait FilesystemService: Send + Sync {
    async fn read_file(&self, path: &Path) -> eyre::Result<String>;
    async fn read_dir(&self, path: &Path) -> eyre::Result<Vec<DirEntry>>;
    async fn stat(&self, path: &Path) -> eyre::Result<FileStat>;

    /// Stream a file line by line through a bounded buffer, invoking
    /// `on_line` per line. `high_water_mark` caps the read buffer.
    async fn read_lines(
        &self,
        path: &Path,
        high_water_mark: usize,
        on_line: &mut (dyn for<'a> FnMut(&'a str) + Send),
    ) -> eyre::Result<()>;
}

/// Production implementation over tokio::fs
#[derive(Default)]
pub struct LocalFilesystem;

impl LocalFilesystem {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl FilesystemService for LocalFilesystem {
    async fn read_file(&self, path: &Path) -> eyre::Result<String> {
        Ok(tokio::fs::read_to_string(path).await?)
    }

    async fn read_dir(&self, path: &Path) -> eyre::Result<Vec<DirEntry>> {
        let mut entries = Vec::new();
        let mut dir = tokio::fs::read_dir(path).await?;
        while let Some(entry) = dir.next_entry().await? {
            let file_type = entry.file_type().await?;
            entries.push(DirEntry {
                path: entry.path(),
                file_name: entry.file_name().to_string_lossy().into_owned(),
                is_dir: file_type.is_dir(),
            });
        }
        // Deterministic traversal order
        entries.sort_by(|a, b| a.file_name.cmp(&b.file_name));
        Ok(entries)
    }

    async fn stat(&self, path: &Path) -> eyre::Result<FileStat> {
        let metadata = tokio::fs::metadata(path).await?;
        Ok(FileStat {
            size: metadata.len(),
            is_dir: metadata.is_dir(),
            is_file: metadata.is_file(),
        })
    }

    async fn read_lines(
        &self,
        path: &Path,
        high_water_mark: usize,
        on_line: &mut (dyn for<'a> FnMut(&'a str) + Send),
    ) -> eyre::Result<()> {
        let file = File::open(path).await?;
        let mut reader = BufReader::with_capacity(high_water_mark, file);
        let mut line = String::new();
        loop {
            line.clear();
            let n = reader.read_line(&mut line).await?;
            if n == 0 {
                break;
            }
            on_line(line.trim_end_matches(['\n', '\r']));
        }
        Ok(())
    }
}
