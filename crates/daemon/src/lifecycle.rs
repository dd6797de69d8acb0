// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon startup and shutdown: acquire a single-instance lock, recover
//! `TaskRun`s orphaned by a previous crash, then hand off to the Scheduler
//! and WorkerPool. Shutdown is driven by `main.rs`'s signal handling; this
//! module only covers the parts that must run exactly once per process.

use fs2::FileExt;
use sqlx::SqlitePool;
use std::fs::File;
use std::path::{Path, PathBuf};
use strmsync_queue::Queue;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("failed to acquire lock {0}: daemon already running?")]
    LockFailed(PathBuf, #[source] std::io::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Db(#[from] sqlx::Error),

    #[error(transparent)]
    Queue(#[from] strmsync_queue::QueueError),
}

/// Holds the daemon's single-instance lock for the lifetime of the process;
/// the OS releases the lock automatically when this (and the underlying
/// `File`) drops.
pub struct InstanceLock {
    _file: File,
}

impl InstanceLock {
    pub fn acquire(path: &Path) -> Result<Self, LifecycleError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = std::fs::OpenOptions::new().write(true).create(true).truncate(false).open(path)?;
        file.try_lock_exclusive().map_err(|e| LifecycleError::LockFailed(path.to_path_buf(), e))?;
        Ok(Self { _file: file })
    }
}

/// Requeues `TaskRun`s left `running` by a worker that died mid-attempt
/// (spec §4.6: recovery on startup), logging how many were recovered.
pub async fn recover(pool: &SqlitePool) -> Result<u64, LifecycleError> {
    let queue = Queue::new(pool.clone());
    let recovered = queue.recover_orphaned().await?;
    if recovered > 0 {
        warn!(count = recovered, "requeued task runs orphaned by a previous crash");
    } else {
        info!("no orphaned task runs found at startup");
    }
    Ok(recovered)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn recover_requeues_and_reports_orphaned_runs() {
        let pool = strmsync_queue::pool::connect_in_memory().await.unwrap();
        let recovered = recover(&pool).await.unwrap();
        assert_eq!(recovered, 0);
    }

    #[test]
    fn second_lock_acquisition_fails_while_first_is_held() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("strmsyncd.lock");
        let first = InstanceLock::acquire(&path).unwrap();
        let second = InstanceLock::acquire(&path);
        assert!(second.is_err());
        drop(first);
    }
}
