// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! StrmWriter: atomically writes one `.strm` file under an output root,
//! enforcing containment (spec §4.2).

use chrono::{DateTime, Utc};
use filetime::FileTime;
use std::path::{Component, Path, PathBuf};
use strmsync_core::TaskError;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Created,
    Updated,
    Unchanged,
    Skipped,
}

#[derive(Debug, Clone)]
pub struct StrmWriter {
    root: PathBuf,
}

impl StrmWriter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Writes `content` to `rel_target_path` under the root. Atomic:
    /// write-to-temp-in-same-directory + rename.
    pub async fn write_strm(
        &self,
        rel_target_path: &str,
        content: &str,
        mod_time: DateTime<Utc>,
        skip_existing: bool,
        mod_time_epsilon_seconds: i64,
    ) -> Result<WriteOutcome, TaskError> {
        self.write_bytes(
            rel_target_path,
            content.as_bytes(),
            mod_time,
            skip_existing,
            mod_time_epsilon_seconds,
        )
        .await
    }

    /// Same contract as [`Self::write_strm`] but for arbitrary bytes, used by
    /// the metadata replicator (spec §4.5) to copy/download sidecar files
    /// under the same containment and atomicity rules.
    pub async fn write_bytes(
        &self,
        rel_target_path: &str,
        content: &[u8],
        mod_time: DateTime<Utc>,
        skip_existing: bool,
        mod_time_epsilon_seconds: i64,
    ) -> Result<WriteOutcome, TaskError> {
        let target = self.resolve(rel_target_path)?;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        if let Ok(existing_bytes) = tokio::fs::read(&target).await {
            let same_bytes = existing_bytes == content;
            if same_bytes {
                if let Ok(meta) = tokio::fs::metadata(&target).await {
                    if let Ok(existing_mtime) = meta.modified() {
                        let existing_mtime: DateTime<Utc> = existing_mtime.into();
                        if (existing_mtime - mod_time).num_seconds().abs() <= mod_time_epsilon_seconds
                        {
                            return Ok(WriteOutcome::Unchanged);
                        }
                    }
                }
            }
            if skip_existing {
                return Ok(WriteOutcome::Skipped);
            }
            self.atomic_write(&target, content).await?;
            set_mtime(&target, mod_time)?;
            return Ok(WriteOutcome::Updated);
        }

        self.atomic_write(&target, content).await?;
        set_mtime(&target, mod_time)?;
        Ok(WriteOutcome::Created)
    }

    /// Resolves and validates `rel`, without writing anything. Used by the
    /// orphan-cleanup phase to locate `.strm` files it is considering for
    /// deletion.
    pub fn resolved_root(&self) -> &Path {
        &self.root
    }

    /// Cleans `rel` and joins it to the root, rejecting absolute paths,
    /// null bytes, and any path that escapes the root.
    fn resolve(&self, rel: &str) -> Result<PathBuf, TaskError> {
        if rel.contains('\0') {
            return Err(TaskError::invalid_input(format!("null byte in path: {rel}")));
        }
        let rel_path = Path::new(rel);
        if rel_path.is_absolute() {
            return Err(TaskError::invalid_input(format!("absolute path not allowed: {rel}")));
        }

        let mut cleaned = PathBuf::new();
        for component in rel_path.components() {
            match component {
                Component::Normal(seg) => cleaned.push(seg),
                Component::CurDir => {}
                Component::ParentDir => {
                    if !cleaned.pop() {
                        return Err(TaskError::invalid_input(format!("path escapes root: {rel}")));
                    }
                }
                _ => return Err(TaskError::invalid_input(format!("invalid path component in {rel}"))),
            }
        }
        Ok(self.root.join(cleaned))
    }

    async fn atomic_write(&self, target: &Path, content: &[u8]) -> Result<(), TaskError> {
        let parent = target
            .parent()
            .ok_or_else(|| TaskError::invalid_input("target path has no parent directory"))?;
        let file_name = target.file_name().and_then(|n| n.to_str()).unwrap_or("strm");
        let tmp_path = parent.join(format!(".{file_name}.{}.tmp", Uuid::new_v4()));

        let mut file = tokio::fs::File::create(&tmp_path).await?;
        file.write_all(content).await?;
        file.sync_all().await?;
        drop(file);

        if let Err(e) = tokio::fs::rename(&tmp_path, target).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(e.into());
        }
        Ok(())
    }
}

fn set_mtime(path: &Path, mod_time: DateTime<Utc>) -> Result<(), TaskError> {
    let ft = FileTime::from_unix_time(mod_time.timestamp(), 0);
    filetime::set_file_mtime(path, ft).map_err(TaskError::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn creates_new_file() {
        let dir = tempfile::tempdir().unwrap();
        let writer = StrmWriter::new(dir.path());
        let outcome = writer
            .write_strm("movies/a.strm", "/src/a.mkv", Utc::now(), false, 0)
            .await
            .unwrap();
        assert_eq!(outcome, WriteOutcome::Created);
        assert_eq!(
            tokio::fs::read_to_string(dir.path().join("movies/a.strm")).await.unwrap(),
            "/src/a.mkv"
        );
    }

    #[tokio::test]
    async fn rewrite_with_new_content_is_updated() {
        let dir = tempfile::tempdir().unwrap();
        let writer = StrmWriter::new(dir.path());
        writer.write_strm("a.strm", "one", Utc::now(), false, 0).await.unwrap();
        let outcome = writer.write_strm("a.strm", "two", Utc::now(), false, 0).await.unwrap();
        assert_eq!(outcome, WriteOutcome::Updated);
    }

    #[tokio::test]
    async fn identical_content_within_epsilon_is_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let writer = StrmWriter::new(dir.path());
        let now = Utc::now();
        writer.write_strm("a.strm", "same", now, false, 5).await.unwrap();
        let outcome = writer.write_strm("a.strm", "same", now, false, 5).await.unwrap();
        assert_eq!(outcome, WriteOutcome::Unchanged);
    }

    #[tokio::test]
    async fn skip_existing_policy_skips_rather_than_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let writer = StrmWriter::new(dir.path());
        writer.write_strm("a.strm", "one", Utc::now(), false, 0).await.unwrap();
        let outcome = writer.write_strm("a.strm", "two", Utc::now(), true, 0).await.unwrap();
        assert_eq!(outcome, WriteOutcome::Skipped);
        assert_eq!(tokio::fs::read_to_string(dir.path().join("a.strm")).await.unwrap(), "one");
    }

    #[tokio::test]
    async fn absolute_path_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let writer = StrmWriter::new(dir.path());
        let err = writer.write_strm("/etc/passwd", "x", Utc::now(), false, 0).await.unwrap_err();
        assert_eq!(err.kind, strmsync_core::ErrorKind::InvalidInput);
    }

    #[tokio::test]
    async fn path_escaping_root_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let writer = StrmWriter::new(dir.path());
        let err = writer
            .write_strm("../../etc/passwd", "x", Utc::now(), false, 0)
            .await
            .unwrap_err();
        assert_eq!(err.kind, strmsync_core::ErrorKind::InvalidInput);
    }

    #[tokio::test]
    async fn null_byte_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let writer = StrmWriter::new(dir.path());
        let err = writer.write_strm("a\0.strm", "x", Utc::now(), false, 0).await.unwrap_err();
        assert_eq!(err.kind, strmsync_core::ErrorKind::InvalidInput);
    }
}
