// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The Driver abstraction: a way to enumerate entries rooted at a remote
//! path (spec §4.1).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt;
use strmsync_core::{DataServerKind, TaskError};

/// One entry returned by [`Driver::list`]. Paths are canonical slash form,
/// rooted as reported by the driver.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteEntry {
    pub path: String,
    pub name: String,
    pub is_dir: bool,
    pub size: u64,
    pub mod_time: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ListOptions {
    pub recursive: bool,
    pub max_depth: u32,
}

impl ListOptions {
    const MAX_DEPTH_CAP: u32 = 100;

    pub fn clamped_max_depth(&self) -> u32 {
        self.max_depth.min(Self::MAX_DEPTH_CAP)
    }
}

/// A way to enumerate entries rooted at a remote path. `local`, `clouddrive2`
/// and `openlist` each provide one implementation (spec §4.1, §9).
#[async_trait]
pub trait Driver: fmt::Debug + Send + Sync {
    fn kind(&self) -> DataServerKind;

    /// Lists entries under `path`. Honors cancellation via the caller
    /// dropping the future; returns all-or-error rather than partial results.
    async fn list(&self, path: &str, opts: ListOptions) -> Result<Vec<RemoteEntry>, TaskError>;

    /// Reads the full contents of the file at `path`. An optional capability
    /// (spec §9: "new sources implement List (+ optional Open for metadata
    /// download)") used by the metadata replicator's `copy` strategy; drivers
    /// that cannot serve bytes directly return `NotSupported`.
    async fn read(&self, path: &str) -> Result<Vec<u8>, TaskError> {
        Err(TaskError::not_supported(format!(
            "{:?} driver does not support reading file contents ({path})",
            self.kind()
        )))
    }
}
