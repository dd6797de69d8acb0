// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `local`: lists a filesystem tree directly (spec §4.1). Symlinks are
//! followed only when their resolved target stays under the configured root.

use crate::driver::{Driver, ListOptions, RemoteEntry};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use strmsync_core::{DataServerKind, TaskError};

#[derive(Debug, Clone)]
pub struct LocalDriver {
    root: PathBuf,
}

impl LocalDriver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl Driver for LocalDriver {
    fn kind(&self) -> DataServerKind {
        DataServerKind::Local
    }

    async fn list(&self, path: &str, opts: ListOptions) -> Result<Vec<RemoteEntry>, TaskError> {
        let root = self.root.clone();
        let rel = path.trim_start_matches('/').to_string();
        tokio::task::spawn_blocking(move || list_blocking(&root, &rel, opts))
            .await
            .map_err(|e| TaskError::transient(format!("list task panicked: {e}")))?
    }

    async fn read(&self, path: &str) -> Result<Vec<u8>, TaskError> {
        let root = self.root.clone();
        let rel = path.trim_start_matches('/').to_string();
        tokio::task::spawn_blocking(move || read_blocking(&root, &rel))
            .await
            .map_err(|e| TaskError::transient(format!("read task panicked: {e}")))?
    }
}

fn read_blocking(root: &Path, rel: &str) -> Result<Vec<u8>, TaskError> {
    let target = root.join(rel);
    let canonical_root = std::fs::canonicalize(root)?;
    let canonical_target = std::fs::canonicalize(&target)?;
    if !canonical_target.starts_with(&canonical_root) {
        return Err(TaskError::invalid_input(format!("path escapes root: {rel}")));
    }
    Ok(std::fs::read(&target)?)
}

fn list_blocking(root: &Path, rel: &str, opts: ListOptions) -> Result<Vec<RemoteEntry>, TaskError> {
    let start = if rel.is_empty() { root.to_path_buf() } else { root.join(rel) };
    if !start.exists() {
        return Err(TaskError::not_found(format!("path not found: {}", start.display())));
    }
    let canonical_root = std::fs::canonicalize(root)?;

    let mut walker = walkdir::WalkDir::new(&start).follow_links(false);
    walker = if opts.recursive {
        walker.max_depth(opts.clamped_max_depth() as usize)
    } else {
        walker.max_depth(1)
    };

    let mut entries = Vec::new();
    for entry in walker {
        let entry = entry.map_err(|e| TaskError::transient(format!("walk error: {e}")))?;
        if entry.path() == start {
            continue;
        }
        if entry.path_is_symlink() {
            let Ok(resolved) = std::fs::canonicalize(entry.path()) else {
                continue;
            };
            if !resolved.starts_with(&canonical_root) {
                continue;
            }
        }
        let meta = entry
            .metadata()
            .map_err(|e| TaskError::transient(format!("metadata error: {e}")))?;
        let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
        entries.push(RemoteEntry {
            path: format!("/{}", to_slash_path(relative)),
            name: entry.file_name().to_string_lossy().into_owned(),
            is_dir: meta.is_dir(),
            size: meta.len(),
            mod_time: meta
                .modified()
                .map(DateTime::<Utc>::from)
                .unwrap_or_else(|_| Utc::now()),
        });
    }
    Ok(entries)
}

fn to_slash_path(p: &Path) -> String {
    p.components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lists_nested_files_recursively() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("movies/sample")).unwrap();
        std::fs::write(dir.path().join("movies/a.mkv"), b"x").unwrap();
        std::fs::write(dir.path().join("movies/sample/b.mkv"), b"y").unwrap();

        let driver = LocalDriver::new(dir.path());
        let entries = driver
            .list("/", ListOptions { recursive: true, max_depth: 100 })
            .await
            .unwrap();

        let paths: Vec<_> = entries.iter().map(|e| e.path.clone()).collect();
        assert!(paths.contains(&"/movies/a.mkv".to_string()));
        assert!(paths.contains(&"/movies/sample/b.mkv".to_string()));
    }

    #[tokio::test]
    async fn non_recursive_list_stops_at_one_level() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("top.mkv"), b"x").unwrap();
        std::fs::write(dir.path().join("sub/nested.mkv"), b"y").unwrap();

        let driver = LocalDriver::new(dir.path());
        let entries = driver
            .list("/", ListOptions { recursive: false, max_depth: 0 })
            .await
            .unwrap();

        let names: Vec<_> = entries.iter().map(|e| e.name.clone()).collect();
        assert!(names.contains(&"top.mkv".to_string()));
        assert!(names.contains(&"sub".to_string()));
        assert!(!names.contains(&"nested.mkv".to_string()));
    }

    #[tokio::test]
    async fn reads_file_contents_under_root() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.nfo"), b"metadata").unwrap();
        let driver = LocalDriver::new(dir.path());
        let bytes = driver.read("/a.nfo").await.unwrap();
        assert_eq!(bytes, b"metadata");
    }

    #[tokio::test]
    async fn missing_path_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let driver = LocalDriver::new(dir.path());
        let err = driver
            .list("/missing", ListOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind, strmsync_core::ErrorKind::NotFound);
    }
}
