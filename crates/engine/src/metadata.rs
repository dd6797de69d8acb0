// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! MetadataReplicator: copies or downloads metadata sidecar files for the
//! entries the [`crate::engine::SyncEngine`] identified as needing one
//! (spec §4.5). Skip decisions (same-size AND |ΔModTime|<=2s) are made by
//! the engine's plan-building step, not here — the replicator executes
//! every item it is handed.

use crate::events::EngineEvents;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use strmsync_core::{
    EventKind, EventOp, EventStatus, JobId, ProgressCounters, TaskError, TaskRunEvent,
    TaskRunEventId, TaskRunId,
};
use strmsync_drivers::{Driver, StrmWriter};
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Whether a sidecar is read from a local mount or fetched over the
/// source's remote API. Distinct from [`strmsync_core::EventOp`], which
/// records whether the *target* file is being created or updated (spec §9:
/// the plan's `Op` field is overloaded across both dimensions in the
/// original design note — this implementation keeps them separate).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanSourceStrategy {
    Copy,
    Download,
}

/// One metadata sidecar the engine decided needs a write (spec §4.5).
#[derive(Debug, Clone)]
pub struct PlanItem {
    pub fs_op: EventOp,
    pub source_strategy: PlanSourceStrategy,
    pub source_path: String,
    pub target_meta_path: String,
    pub size: u64,
    pub mod_time: DateTime<Utc>,
}

/// Executes a metadata plan with the same bounded-parallelism worker-pool
/// shape as the STRM phase (spec §4.5).
pub struct MetadataReplicator {
    driver: Arc<dyn Driver>,
    writer: StrmWriter,
    events: Arc<dyn EngineEvents>,
    job_id: JobId,
    task_run_id: TaskRunId,
    max_concurrency: usize,
}

impl MetadataReplicator {
    pub fn new(
        driver: Arc<dyn Driver>,
        writer: StrmWriter,
        events: Arc<dyn EngineEvents>,
        job_id: JobId,
        task_run_id: TaskRunId,
        max_concurrency: usize,
    ) -> Self {
        Self { driver, writer, events, job_id, task_run_id, max_concurrency }
    }

    /// Runs the plan to completion (or until cancelled), returning the
    /// `meta_*` counters to merge into the attempt's terminal stats.
    pub async fn run(
        &self,
        plan: Vec<PlanItem>,
        cancel: CancellationToken,
    ) -> Result<ProgressCounters, TaskError> {
        let total = plan.len() as u64;
        let concurrency = self.max_concurrency.max(1);
        let (tx, rx) = mpsc::channel::<PlanItem>(concurrency);
        let rx = Arc::new(AsyncMutex::new(rx));

        let created = Arc::new(std::sync::atomic::AtomicU64::new(0));
        let updated = Arc::new(std::sync::atomic::AtomicU64::new(0));
        let failed = Arc::new(std::sync::atomic::AtomicU64::new(0));
        let processed = Arc::new(std::sync::atomic::AtomicU64::new(0));

        let mut workers = JoinSet::new();
        for _ in 0..concurrency {
            let rx = rx.clone();
            let driver = self.driver.clone();
            let writer = self.writer.clone();
            let events = self.events.clone();
            let job_id = self.job_id.clone();
            let task_run_id = self.task_run_id.clone();
            let cancel = cancel.clone();
            let created = created.clone();
            let updated = updated.clone();
            let failed = failed.clone();
            let processed = processed.clone();
            workers.spawn(async move {
                loop {
                    let item = {
                        let mut guard = rx.lock().await;
                        guard.recv().await
                    };
                    let Some(item) = item else { break };
                    if cancel.is_cancelled() {
                        break;
                    }
                    processed.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                    match apply(&driver, &writer, &item).await {
                        Ok(()) => match item.fs_op {
                            EventOp::Update => {
                                updated.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                            }
                            _ => {
                                created.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                            }
                        },
                        Err(e) => {
                            failed.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                            events
                                .on_file_event(TaskRunEvent {
                                    id: TaskRunEventId::new(uuid::Uuid::new_v4().to_string()),
                                    task_run_id: task_run_id.clone(),
                                    job_id: job_id.clone(),
                                    kind: EventKind::Meta,
                                    op: item.fs_op,
                                    status: EventStatus::Failed,
                                    source_path: item.source_path.clone(),
                                    target_path: item.target_meta_path.clone(),
                                    error_message: Some(e.to_string()),
                                    created_at: Utc::now(),
                                })
                                .await;
                            continue;
                        }
                    }
                    events
                        .on_file_event(TaskRunEvent {
                            id: TaskRunEventId::new(uuid::Uuid::new_v4().to_string()),
                            task_run_id: task_run_id.clone(),
                            job_id: job_id.clone(),
                            kind: EventKind::Meta,
                            op: item.fs_op,
                            status: EventStatus::Success,
                            source_path: item.source_path.clone(),
                            target_path: item.target_meta_path.clone(),
                            error_message: None,
                            created_at: Utc::now(),
                        })
                        .await;
                }
            });
        }

        for item in plan {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                send_res = tx.send(item) => { if send_res.is_err() { break; } }
            }
        }
        drop(tx);
        while workers.join_next().await.is_some() {}

        Ok(ProgressCounters {
            meta_total: total,
            meta_processed: processed.load(std::sync::atomic::Ordering::Relaxed),
            meta_created: created.load(std::sync::atomic::Ordering::Relaxed),
            meta_updated: updated.load(std::sync::atomic::Ordering::Relaxed),
            meta_failed: failed.load(std::sync::atomic::Ordering::Relaxed),
            ..Default::default()
        })
    }
}

/// Fetches `item.source_path`'s bytes via the driver and writes them under
/// the target path, regardless of [`PlanSourceStrategy`] — both strategies
/// read through [`strmsync_drivers::Driver::read`]; the distinction only
/// matters for which concrete driver the Executor constructed.
async fn apply(driver: &Arc<dyn Driver>, writer: &StrmWriter, item: &PlanItem) -> Result<(), TaskError> {
    let bytes = driver.read(&item.source_path).await?;
    writer
        .write_bytes(&item.target_meta_path, &bytes, item.mod_time, false, 0)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::NullEvents;
    use strmsync_core::DataServerKind;
    use strmsync_drivers::FakeDriver;

    #[tokio::test]
    async fn copies_sidecar_bytes_to_target() {
        let dir = tempfile::tempdir().unwrap();
        let driver = FakeDriver::new(DataServerKind::Local, vec![]);
        driver.with_content("/movies/a.nfo", b"metadata".to_vec());
        let writer = StrmWriter::new(dir.path());
        let replicator = MetadataReplicator::new(
            Arc::new(driver),
            writer,
            Arc::new(NullEvents),
            JobId::new("job1"),
            TaskRunId::new("run1"),
            2,
        );

        let plan = vec![PlanItem {
            fs_op: EventOp::Create,
            source_strategy: PlanSourceStrategy::Copy,
            source_path: "/movies/a.nfo".into(),
            target_meta_path: "a.nfo".into(),
            size: 8,
            mod_time: Utc::now(),
        }];
        let stats = replicator.run(plan, CancellationToken::new()).await.unwrap();
        assert_eq!(stats.meta_created, 1);
        assert_eq!(stats.meta_failed, 0);
        assert_eq!(tokio::fs::read(dir.path().join("a.nfo")).await.unwrap(), b"metadata");
    }

    #[tokio::test]
    async fn missing_source_bytes_count_as_failed() {
        let dir = tempfile::tempdir().unwrap();
        let driver = FakeDriver::new(DataServerKind::Local, vec![]);
        let writer = StrmWriter::new(dir.path());
        let replicator = MetadataReplicator::new(
            Arc::new(driver),
            writer,
            Arc::new(NullEvents),
            JobId::new("job1"),
            TaskRunId::new("run1"),
            2,
        );

        let plan = vec![PlanItem {
            fs_op: EventOp::Create,
            source_strategy: PlanSourceStrategy::Copy,
            source_path: "/movies/missing.nfo".into(),
            target_meta_path: "missing.nfo".into(),
            size: 0,
            mod_time: Utc::now(),
        }];
        let stats = replicator.run(plan, CancellationToken::new()).await.unwrap();
        assert_eq!(stats.meta_failed, 1);
        assert_eq!(stats.meta_created, 0);
    }
}
