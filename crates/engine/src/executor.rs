// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Executor: assembles a [`crate::engine::SyncEngine`] +
//! [`crate::metadata::MetadataReplicator`] pair from a `Job`/`DataServer`
//! row and runs one attempt (spec §4.9). The WorkerPool calls this, then
//! decides `Queue::complete`/`fail` from the result it gets back.

use crate::engine::{EngineOptions, MetaStrategy, SyncEngine};
use crate::events::EngineEvents;
use crate::metadata::MetadataReplicator;
use async_trait::async_trait;
use sqlx::SqlitePool;
use std::sync::Arc;
use strmsync_core::{
    DataServer, DataServerKind, MetadataMode, ProgressCounters, StrmMode, TaskError, TaskRun,
    TaskRunEvent, TaskRunId,
};
use strmsync_drivers::{
    CloudDrive2Driver, ContentBuilderConfig, Driver, HttpRemoteClient, LocalDriver, OpenListDriver,
};
use strmsync_queue::repo::{data_servers, events::EventBatcher, jobs};
use strmsync_queue::Queue;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Persists progress/events for one attempt. Progress writes go straight to
/// the `task_runs` row; events are buffered through an [`EventBatcher`] and
/// flushed once the attempt finishes. Persistence failures are logged and
/// otherwise swallowed — a lost audit row must never fail the sync itself.
struct ExecutorEventSink {
    queue: Queue,
    batcher: EventBatcher,
    task_run_id: TaskRunId,
}

#[async_trait]
impl EngineEvents for ExecutorEventSink {
    async fn on_progress(&self, progress: ProgressCounters) {
        if let Err(e) = self.queue.update_progress(self.task_run_id.as_str(), progress).await {
            warn!(task_run_id = %self.task_run_id, error = %e, "failed to persist progress snapshot");
        }
    }

    async fn on_file_event(&self, event: TaskRunEvent) {
        if let Err(e) = self.batcher.record(event).await {
            warn!(task_run_id = %self.task_run_id, error = %e, "failed to buffer task run event");
        }
    }
}

/// Builds and runs the Engine/Replicator pair for one `TaskRun` (spec §4.9).
pub struct Executor {
    pool: SqlitePool,
}

impl Executor {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Runs the Job named by `task_run.job_id`, reporting progress/events
    /// through the queue as it goes. The caller (the WorkerPool) is
    /// responsible for transitioning the TaskRun to its terminal state from
    /// the returned `Result`.
    pub async fn execute(
        &self,
        task_run: &TaskRun,
        cancel: CancellationToken,
    ) -> Result<ProgressCounters, TaskError> {
        let mut job = jobs::get(&self.pool, task_run.job_id.as_str()).await?;
        if !job.enabled {
            return Err(TaskError::disabled(format!("job {} is disabled", job.id)));
        }
        job.options.normalize();

        let data_server = data_servers::get(&self.pool, job.data_server_id.as_str()).await?;
        if !data_server.enabled {
            return Err(TaskError::disabled(format!(
                "data server {} is disabled",
                data_server.id
            )));
        }

        let driver = build_driver(&data_server)?;
        let writer = strmsync_drivers::StrmWriter::new(
            job.strm_path.as_deref().unwrap_or(job.target_path.as_str()),
        );
        let strm_mode = job.options.strm_mode.or(data_server.options.strm_mode).unwrap_or(StrmMode::Local);
        let content_config = ContentBuilderConfig {
            local_root: data_server.options.mount_path.clone(),
            base_url: data_server.options.base_url.clone(),
            replace_rules: job.options.strm_replace_rules.clone(),
        };

        let queue = Queue::new(self.pool.clone());
        let sink = Arc::new(ExecutorEventSink {
            queue,
            batcher: EventBatcher::new(self.pool.clone()),
            task_run_id: task_run.id.clone(),
        });
        let events: Arc<dyn EngineEvents> = sink.clone();

        let options = EngineOptions {
            job_id: job.id.clone(),
            task_run_id: task_run.id.clone(),
            media_exts: job.options.media_exts.clone(),
            meta_exts: job.options.meta_exts.clone(),
            exclude_dirs: job.options.exclude_dirs.clone(),
            min_file_size_bytes: job.options.min_file_size_bytes(),
            max_concurrency: job.options.max_concurrency(),
            dry_run: job.options.dry_run,
            force_update: job.options.force_update,
            skip_existing: job.options.skip_existing,
            mod_time_epsilon_seconds: job.options.mod_time_epsilon_seconds,
            enable_orphan_cleanup: job.options.enable_orphan_cleanup,
            orphan_cleanup_dry_run: job.options.orphan_cleanup_dry_run,
            metadata_mode: job.options.metadata_mode,
            meta_strategy: MetaStrategy::from_sync_opts(&job.options.sync_opts),
            content_config,
            strm_mode,
            data_server_kind: data_server.kind,
            prefer_mount: data_server.options.access_path.is_some(),
        };

        let remote_root = job.remote_root.clone().unwrap_or_else(|| job.source_path.clone());
        let engine = SyncEngine::new(driver.clone(), writer.clone(), options.clone(), events.clone());
        let outcome = engine.run_once(&remote_root, cancel.clone()).await?;

        let mut stats = outcome.stats;
        if job.options.metadata_mode != MetadataMode::None
            && options.meta_strategy != MetaStrategy::Skip
            && !outcome.meta_plan.is_empty()
        {
            let replicator = MetadataReplicator::new(
                driver,
                writer,
                events,
                job.id.clone(),
                task_run.id.clone(),
                options.max_concurrency,
            );
            let meta_stats = replicator.run(outcome.meta_plan, cancel).await?;
            stats.meta_total = meta_stats.meta_total;
            stats.meta_processed = meta_stats.meta_processed;
            stats.meta_created = meta_stats.meta_created;
            stats.meta_updated = meta_stats.meta_updated;
            stats.meta_failed = meta_stats.meta_failed;
        }

        if let Err(e) = sink.batcher.flush().await {
            warn!(task_run_id = %task_run.id, error = %e, "failed to flush trailing task run events");
        }

        Ok(stats)
    }
}

fn build_driver(data_server: &DataServer) -> Result<Arc<dyn Driver>, TaskError> {
    match data_server.kind {
        DataServerKind::Local => {
            let root = data_server
                .options
                .access_path
                .clone()
                .ok_or_else(|| TaskError::invalid_input("local data server requires access_path"))?;
            Ok(Arc::new(LocalDriver::new(root)))
        }
        DataServerKind::CloudDrive2 => {
            if let Some(root) = &data_server.options.access_path {
                return Ok(Arc::new(LocalDriver::new(root.clone())));
            }
            let client = build_http_client(data_server)?;
            Ok(Arc::new(CloudDrive2Driver::new(client)))
        }
        DataServerKind::OpenList => {
            if let Some(root) = &data_server.options.access_path {
                return Ok(Arc::new(LocalDriver::new(root.clone())));
            }
            let client = build_http_client(data_server)?;
            Ok(Arc::new(OpenListDriver::new(client)))
        }
    }
}

fn build_http_client(data_server: &DataServer) -> Result<HttpRemoteClient, TaskError> {
    let base_url = data_server
        .options
        .base_url
        .clone()
        .ok_or_else(|| TaskError::invalid_input(format!("{} requires base_url", data_server.kind.as_str())))?;
    let api_key = match &data_server.credential {
        Some(strmsync_core::Credential::ApiKey { api_key }) => Some(api_key.clone()),
        _ => None,
    };
    let timeout = if data_server.options.timeout_seconds == 0 {
        30
    } else {
        data_server.options.timeout_seconds
    };
    Ok(HttpRemoteClient::new(base_url, api_key, timeout))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use strmsync_core::{
        DataServerOptions, Job, JobId, JobOptions, JobStatus, Priority, TaskRunStatus, WatchMode,
    };
    use strmsync_queue::EnqueueRequest;

    async fn seed(pool: &SqlitePool, access_dir: &std::path::Path, target_dir: &std::path::Path) -> (Job, DataServer) {
        let ds = DataServer {
            id: strmsync_core::DataServerId::new("ds1"),
            name: "local".into(),
            kind: DataServerKind::Local,
            host: "localhost".into(),
            port: 0,
            credential: None,
            enabled: true,
            options: DataServerOptions {
                access_path: Some(access_dir.to_string_lossy().to_string()),
                ..Default::default()
            },
            uid: "uid1".into(),
        };
        data_servers::insert(pool, &ds).await.unwrap();

        let mut options = JobOptions::default();
        options.media_exts = vec![".mkv".into()];
        let job = Job {
            id: JobId::new("job1"),
            name: "job1".into(),
            enabled: true,
            cron: None,
            watch_mode: WatchMode::Local,
            source_path: "/".into(),
            remote_root: None,
            target_path: target_dir.to_string_lossy().to_string(),
            strm_path: None,
            data_server_id: ds.id.clone(),
            media_server_id: None,
            options,
            last_run_at: None,
            status: JobStatus::Idle,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        jobs::insert(pool, &job).await.unwrap();
        (job, ds)
    }

    #[tokio::test]
    async fn disabled_job_fails_with_disabled_kind() {
        let pool = strmsync_queue::pool::connect_in_memory().await.unwrap();
        let access_dir = tempfile::tempdir().unwrap();
        let target_dir = tempfile::tempdir().unwrap();
        let (mut job, _ds) = seed(&pool, access_dir.path(), target_dir.path()).await;
        job.enabled = false;
        sqlx::query("UPDATE jobs SET enabled = 0 WHERE id = ?")
            .bind(job.id.as_str())
            .execute(&pool)
            .await
            .unwrap();

        let queue = Queue::new(pool.clone());
        let run = queue
            .enqueue(EnqueueRequest {
                job_id: job.id.clone(),
                priority: Priority::Normal,
                dedup_key: "dedup1".into(),
                max_attempts: 3,
                available_at: None,
                payload: None,
            })
            .await
            .unwrap();

        let executor = Executor::new(pool);
        let err = executor.execute(&run, CancellationToken::new()).await.unwrap_err();
        assert_eq!(err.kind, strmsync_core::ErrorKind::Disabled);
    }

    #[tokio::test]
    async fn enabled_job_runs_and_reports_progress() {
        let pool = strmsync_queue::pool::connect_in_memory().await.unwrap();
        let access_dir = tempfile::tempdir().unwrap();
        let target_dir = tempfile::tempdir().unwrap();
        let (job, _ds) = seed(&pool, access_dir.path(), target_dir.path()).await;

        let queue = Queue::new(pool.clone());
        let run = queue
            .enqueue(EnqueueRequest {
                job_id: job.id.clone(),
                priority: Priority::Normal,
                dedup_key: "dedup2".into(),
                max_attempts: 3,
                available_at: None,
                payload: None,
            })
            .await
            .unwrap();
        let claimed = queue
            .claim_next(&strmsync_core::WorkerId::new("w1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(claimed.status, TaskRunStatus::Running);

        let executor = Executor::new(pool);
        let stats = executor.execute(&claimed, CancellationToken::new()).await.unwrap();
        assert_eq!(stats.total_files, 0);
    }
}
