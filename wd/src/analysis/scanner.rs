//! File scanner - lazy producer feeding the analyzers
//!
//! Walks the project tree through the filesystem capability, skipping
//! excluded directories, oversized files (recorded as violations) and
//! anything deeper than the depth cap. Files stream out in batches
//! over a bounded channel so a huge tree never sits in memory at once.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::adapters::FilesystemService;
use crate::workflow::CancelToken;

/// One scanned file with its streamed-in lines
#[derive(Debug, Clone)]
pub struct ScannedFile {
    pub path: PathBuf,
    pub relative: String,
    pub extension: String,
    pub size: u64,
    pub lines: Vec<String>,
}

/// A scan rule violation (oversized file, unreadable entry)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Violation {
    pub kind: String,
    pub path: String,
}

/// Stream item produced by a scan
#[derive(Debug)]
pub enum ScanEvent {
    Batch(Vec<ScannedFile>),
    Violation(Violation),
    /// Scan finished; carries the total file count
    Done(usize),
}

/// Scanner limits (a narrowed view of the analysis config)
#[derive(Debug, Clone)]
pub struct ScanLimits {
    pub exclude_dirs: Vec<String>,
    pub max_file_size: u64,
    pub max_directory_depth: usize,
    pub chunk_buffer: usize,
}

/// Streaming project-tree scanner
pub struct FileScanner {
    fs: Arc<dyn FilesystemService>,
    limits: ScanLimits,
}

/// Bounded batches in flight before the producer parks
const CHANNEL_DEPTH: usize = 4;

impl FileScanner {
    pub fn new(fs: Arc<dyn FilesystemService>, limits: ScanLimits) -> Self {
        Self { fs, limits }
    }

    /// Start a scan; events arrive on the returned receiver
    pub fn spawn_scan(&self, root: &Path, batch_size: usize, token: CancelToken) -> mpsc::Receiver<ScanEvent> {
        let (tx, rx) = mpsc::channel(CHANNEL_DEPTH);
        let fs = self.fs.clone();
        let limits = self.limits.clone();
        let root = root.to_path_buf();

        tokio::spawn(async move {
            let mut batch: Vec<ScannedFile> = Vec::with_capacity(batch_size);
            let mut total = 0usize;

            // Iterative walk with a depth-tagged stack
            let mut stack = vec![(root.clone(), 0usize)];
            while let Some((dir, depth)) = stack.pop() {
                if token.is_cancelled() {
                    debug!("Scan cancelled");
                    return;
                }
                if depth > limits.max_directory_depth {
                    continue;
                }

                let entries = match fs.read_dir(&dir).await {
                    Ok(entries) => entries,
                    Err(e) => {
                        warn!(dir = %dir.display(), error = %e, "Unreadable directory");
                        continue;
                    }
                };

                for entry in entries {
                    if entry.is_dir {
                        if !limits.exclude_dirs.iter().any(|ex| ex == &entry.file_name) {
                            stack.push((entry.path.clone(), depth + 1));
                        }
                        continue;
                    }

                    let stat = match fs.stat(&entry.path).await {
                        Ok(stat) => stat,
                        Err(_) => continue,
                    };
                    if stat.size > limits.max_file_size {
                        let violation = Violation {
                            kind: "large-file-skipped".to_string(),
                            path: entry.path.display().to_string(),
                        };
                        if tx.send(ScanEvent::Violation(violation)).await.is_err() {
                            return;
                        }
                        continue;
                    }

                    let mut lines = Vec::new();
                    let read = fs
                        .read_lines(&entry.path, limits.chunk_buffer, &mut |line| {
                            lines.push(line.to_string());
                        })
                        .await;
                    if read.is_err() {
                        // Binary or unreadable; not an analyzable file
                        continue;
                    }

                    let relative = entry
                        .path
                        .strip_prefix(&root)
                        .map(|p| p.display().to_string())
                        .unwrap_or_else(|_| entry.path.display().to_string());
                    let extension = entry
                        .path
                        .extension()
                        .and_then(|e| e.to_str())
                        .unwrap_or("")
                        .to_string();

                    batch.push(ScannedFile {
                        path: entry.path.clone(),
                        relative,
                        extension,
                        size: stat.size,
                        lines,
                    });
                    total += 1;

                    if batch.len() >= batch_size {
                        let full = std::mem::replace(&mut batch, Vec::with_capacity(batch_size));
                        if tx.send(ScanEvent::Batch(full)).await.is_err() {
                            return;
                        }
                    }
                }
            }

            if !batch.is_empty() && tx.send(ScanEvent::Batch(batch)).await.is_err() {
                return;
            }
            let _ = tx.send(ScanEvent::Done(total)).await;
        });

        rx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::LocalFilesystem;
    use std::fs;
    use tempfile::tempdir;

    fn limits() -> ScanLimits {
        ScanLimits {
            exclude_dirs: vec!["node_modules".to_string(), ".git".to_string()],
            max_file_size: 1024,
            max_directory_depth: 8,
            chunk_buffer: 64 * 1024,
        }
    }

    async fn collect(mut rx: mpsc::Receiver<ScanEvent>) -> (Vec<ScannedFile>, Vec<Violation>, usize) {
        let mut files = Vec::new();
        let mut violations = Vec::new();
        let mut total = 0;
        while let Some(event) = rx.recv().await {
            match event {
                ScanEvent::Batch(batch) => files.extend(batch),
                ScanEvent::Violation(v) => violations.push(v),
                ScanEvent::Done(n) => total = n,
            }
        }
        (files, violations, total)
    }

    #[tokio::test]
    async fn test_scan_excludes_and_batches() {
        let temp = tempdir().unwrap();
        fs::write(temp.path().join("main.rs"), "fn main() {}\n").unwrap();
        fs::create_dir(temp.path().join("src")).unwrap();
        fs::write(temp.path().join("src/lib.rs"), "pub fn lib() {}\n").unwrap();
        fs::create_dir(temp.path().join("node_modules")).unwrap();
        fs::write(temp.path().join("node_modules/junk.js"), "ignored\n").unwrap();

        let scanner = FileScanner::new(Arc::new(LocalFilesystem::new()), limits());
        let rx = scanner.spawn_scan(temp.path(), 1, CancelToken::new());
        let (files, violations, total) = collect(rx).await;

        assert_eq!(total, 2);
        assert!(violations.is_empty());
        let mut names: Vec<&str> = files.iter().map(|f| f.relative.as_str()).collect();
        names.sort();
        assert_eq!(names, ["main.rs", "src/lib.rs"]);
        assert_eq!(files.iter().find(|f| f.relative == "main.rs").unwrap().lines, ["fn main() {}"]);
    }

    #[tokio::test]
    async fn test_oversized_file_recorded_as_violation() {
        let temp = tempdir().unwrap();
        fs::write(temp.path().join("big.txt"), "x".repeat(5000)).unwrap();
        fs::write(temp.path().join("small.txt"), "ok\n").unwrap();

        let scanner = FileScanner::new(Arc::new(LocalFilesystem::new()), limits());
        let rx = scanner.spawn_scan(temp.path(), 10, CancelToken::new());
        let (files, violations, total) = collect(rx).await;

        assert_eq!(total, 1);
        assert_eq!(files[0].relative, "small.txt");
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].kind, "large-file-skipped");
        assert!(violations[0].path.contains("big.txt"));
    }

    #[tokio::test]
    async fn test_depth_cap() {
        let temp = tempdir().unwrap();
        let mut dir = temp.path().to_path_buf();
        for i in 0..4 {
            dir = dir.join(format!("d{i}"));
            fs::create_dir(&dir).unwrap();
            fs::write(dir.join("f.txt"), "line\n").unwrap();
        }

        let scanner = FileScanner::new(
            Arc::new(LocalFilesystem::new()),
            ScanLimits {
                max_directory_depth: 2,
                ..limits()
            },
        );
        let rx = scanner.spawn_scan(temp.path(), 10, CancelToken::new());
        let (files, _, _) = collect(rx).await;

        // d0/f.txt (depth 1) and d0/d1/f.txt (depth 2) only
        assert_eq!(files.len(), 2);
    }

    #[tokio::test]
    async fn test_cancelled_scan_stops() {
        let temp = tempdir().unwrap();
        for i in 0..50 {
            fs::write(temp.path().join(format!("f{i}.txt")), "x\n").unwrap();
        }

        let token = CancelToken::new();
        token.cancel();
        let scanner = FileScanner::new(Arc::new(LocalFilesystem::new()), limits());
        let mut rx = scanner.spawn_scan(temp.path(), 10, token);

        // Producer exits without a Done marker
        let mut saw_done = false;
        while let Some(event) = rx.recv().await {
            if matches!(event, ScanEvent::Done(_)) {
                saw_done = true;
            }
        }
        assert!(!saw_done);
    }
}
