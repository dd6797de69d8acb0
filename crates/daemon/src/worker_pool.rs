// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! WorkerPool: N tokio tasks claiming TaskRuns and driving them through the
//! [`strmsync_engine::executor::Executor`] (spec §4.8).

use dashmap::DashMap;
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use strmsync_core::{TaskRunId, TaskRunStatus, WorkerId};
use strmsync_engine::Executor;
use strmsync_queue::Queue;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// How long an idle worker waits before polling the queue again.
const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Per-worker grace period given to an in-flight TaskRun to react to
/// cancellation during a graceful shutdown (spec §4.8).
const DRAIN_DEADLINE: Duration = Duration::from_secs(30);

/// How often a worker checks whether its own in-flight TaskRun has been
/// cancelled by someone else (e.g. the CLI, which has no direct handle to
/// this process's `CancellationToken`s). Comfortably under the spec's 5s
/// cancellation-promptness bound (spec §4.6).
const CANCEL_POLL_INTERVAL: Duration = Duration::from_secs(1);

pub struct WorkerPool {
    pool: SqlitePool,
    concurrency: usize,
    /// Tracks every TaskRun currently executing, so shutdown can cancel
    /// them individually rather than aborting the whole task.
    inflight: Arc<DashMap<TaskRunId, CancellationToken>>,
}

impl WorkerPool {
    pub fn new(pool: SqlitePool, concurrency: usize) -> Self {
        Self { pool, concurrency: concurrency.max(1), inflight: Arc::new(DashMap::new()) }
    }

    /// Runs `concurrency` workers until `cancel` fires, then waits up to
    /// `concurrency * DRAIN_DEADLINE` for in-flight attempts to finish
    /// before returning (spec §4.8: graceful shutdown).
    pub async fn run(&self, cancel: CancellationToken) {
        let mut workers = JoinSet::new();
        for idx in 0..self.concurrency {
            let worker_id = WorkerId::new(format!("worker-{idx}"));
            let pool = self.pool.clone();
            let inflight = self.inflight.clone();
            let cancel = cancel.clone();
            workers.spawn(async move { worker_loop(worker_id, pool, inflight, cancel).await });
        }

        while workers.join_next().await.is_some() {}

        let drain_deadline = DRAIN_DEADLINE * self.concurrency as u32;
        if tokio::time::timeout(drain_deadline, self.wait_for_drain()).await.is_err() {
            warn!("worker pool did not drain within the deadline, remaining attempts were abandoned");
        }
    }

    async fn wait_for_drain(&self) {
        while !self.inflight.is_empty() {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }
}

async fn worker_loop(
    worker_id: WorkerId,
    pool: SqlitePool,
    inflight: Arc<DashMap<TaskRunId, CancellationToken>>,
    cancel: CancellationToken,
) {
    let queue = Queue::new(pool.clone());
    let executor = Executor::new(pool);

    loop {
        if cancel.is_cancelled() {
            return;
        }

        let claimed = tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            res = queue.claim_next(&worker_id) => res,
        };

        let task_run = match claimed {
            Ok(Some(t)) => t,
            Ok(None) => {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return,
                    _ = tokio::time::sleep(POLL_INTERVAL) => continue,
                }
            }
            Err(e) => {
                error!(worker = %worker_id, error = %e, "failed to claim next task run");
                tokio::time::sleep(POLL_INTERVAL).await;
                continue;
            }
        };

        let run_cancel = cancel.child_token();
        inflight.insert(task_run.id.clone(), run_cancel.clone());
        info!(worker = %worker_id, task_run_id = %task_run.id, job_id = %task_run.job_id, "starting attempt");

        let watcher = spawn_cancel_watcher(queue.clone(), task_run.id.clone(), run_cancel.clone());
        let result = executor.execute(&task_run, run_cancel.clone()).await;
        watcher.abort();
        inflight.remove(&task_run.id);

        if run_cancel.is_cancelled() {
            info!(worker = %worker_id, task_run_id = %task_run.id, "attempt cancelled");
            continue;
        }

        match result {
            Ok(progress) => {
                if let Err(e) = queue.complete(task_run.id.as_str(), progress).await {
                    error!(worker = %worker_id, task_run_id = %task_run.id, error = %e, "failed to mark task run completed");
                }
            }
            Err(err) => {
                error!(worker = %worker_id, task_run_id = %task_run.id, kind = %err.kind, error = %err, "attempt failed");
                if let Err(e) = queue
                    .fail(task_run.id.as_str(), err.kind, err.to_string(), strmsync_core::ProgressCounters::default())
                    .await
                {
                    error!(worker = %worker_id, task_run_id = %task_run.id, error = %e, "failed to record task run failure");
                }
            }
        }
    }
}

/// Polls the TaskRun's own row for an externally-set `cancelled` status
/// (spec §4.6: a `queue cancel` from the no-IPC CLI can only reach the DB
/// row, never this process's `CancellationToken` directly) and cancels
/// `token` the moment it sees one, so the Engine context it wraps unwinds
/// within the poll interval instead of running to completion.
fn spawn_cancel_watcher(queue: Queue, task_run_id: TaskRunId, token: CancellationToken) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(CANCEL_POLL_INTERVAL).await;
            if token.is_cancelled() {
                return;
            }
            match queue.get(task_run_id.as_str()).await {
                Ok(run) if run.status == TaskRunStatus::Cancelled => {
                    token.cancel();
                    return;
                }
                Ok(_) => {}
                Err(e) => warn!(task_run_id = %task_run_id, error = %e, "cancel watcher failed to read task run"),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use strmsync_core::{DataServerId, DataServerKind, DataServerOptions, Job, JobId, JobOptions, JobStatus, Priority, WatchMode};
    use strmsync_queue::repo::{data_servers, jobs};
    use strmsync_queue::EnqueueRequest;

    #[tokio::test]
    async fn pool_claims_and_completes_a_pending_run() {
        let pool = strmsync_queue::pool::connect_in_memory().await.unwrap();
        let access_dir = tempfile::tempdir().unwrap();
        let target_dir = tempfile::tempdir().unwrap();

        let ds = strmsync_core::DataServer {
            id: DataServerId::new("ds1"),
            name: "local".into(),
            kind: DataServerKind::Local,
            host: "localhost".into(),
            port: 0,
            credential: None,
            enabled: true,
            options: DataServerOptions {
                access_path: Some(access_dir.path().to_string_lossy().to_string()),
                ..Default::default()
            },
            uid: "uid1".into(),
        };
        data_servers::insert(&pool, &ds).await.unwrap();

        let job = Job {
            id: JobId::new("job1"),
            name: "job1".into(),
            enabled: true,
            cron: None,
            watch_mode: WatchMode::Local,
            source_path: "/".into(),
            remote_root: None,
            target_path: target_dir.path().to_string_lossy().to_string(),
            strm_path: None,
            data_server_id: ds.id.clone(),
            media_server_id: None,
            options: JobOptions::default(),
            last_run_at: None,
            status: JobStatus::Idle,
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        };
        jobs::insert(&pool, &job).await.unwrap();

        let queue = Queue::new(pool.clone());
        queue
            .enqueue(EnqueueRequest {
                job_id: job.id.clone(),
                dedup_key: "d1".into(),
                priority: Priority::Normal,
                max_attempts: 3,
                available_at: None,
                payload: None,
            })
            .await
            .unwrap();

        let cancel = CancellationToken::new();
        let pool_runner = WorkerPool::new(pool.clone(), 1);
        let run_cancel = cancel.clone();
        let handle = tokio::spawn(async move { pool_runner.run(run_cancel).await });

        let mut completed = false;
        for _ in 0..50 {
            tokio::time::sleep(Duration::from_millis(50)).await;
            let runs = queue.list_for_job("job1").await.unwrap();
            if runs.iter().any(|r| r.status == strmsync_core::TaskRunStatus::Completed) {
                completed = true;
                break;
            }
        }
        cancel.cancel();
        let _ = handle.await;
        assert!(completed, "expected the enqueued job to complete");
    }
}
