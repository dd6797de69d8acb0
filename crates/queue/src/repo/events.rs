// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! TaskRunEvent repository, plus the batching sink that funnels events from
//! up to `MaxConcurrency` emission workers through a single writer (spec §9:
//! "Event sink fan-in... batch inserts every <=128 events or <=1s").

use crate::error::QueueError;
use sqlx::{Row, SqlitePool};
use std::time::{Duration, Instant};
use strmsync_core::{EventKind, EventOp, EventStatus, TaskRunEvent};
use tokio::sync::Mutex;

const BATCH_SIZE: usize = 128;
const FLUSH_INTERVAL: Duration = Duration::from_secs(1);

fn kind_str(k: EventKind) -> &'static str {
    match k {
        EventKind::Strm => "strm",
        EventKind::Meta => "meta",
    }
}

fn op_str(op: EventOp) -> &'static str {
    match op {
        EventOp::Create => "create",
        EventOp::Update => "update",
        EventOp::Delete => "delete",
        EventOp::Copy => "copy",
        EventOp::Skip => "skip",
    }
}

fn status_str(s: EventStatus) -> &'static str {
    match s {
        EventStatus::Success => "success",
        EventStatus::Failed => "failed",
        EventStatus::Skipped => "skipped",
    }
}

fn status_from_str(s: &str) -> Result<EventStatus, QueueError> {
    match s {
        "success" => Ok(EventStatus::Success),
        "failed" => Ok(EventStatus::Failed),
        "skipped" => Ok(EventStatus::Skipped),
        other => Err(QueueError::Malformed(format!("unknown event status {other}"))),
    }
}

fn row_to_event(row: &sqlx::sqlite::SqliteRow) -> Result<TaskRunEvent, QueueError> {
    let kind = match row.try_get::<String, _>("kind")?.as_str() {
        "strm" => EventKind::Strm,
        "meta" => EventKind::Meta,
        other => return Err(QueueError::Malformed(format!("unknown event kind {other}"))),
    };
    let op = match row.try_get::<String, _>("op")?.as_str() {
        "create" => EventOp::Create,
        "update" => EventOp::Update,
        "delete" => EventOp::Delete,
        "copy" => EventOp::Copy,
        "skip" => EventOp::Skip,
        other => return Err(QueueError::Malformed(format!("unknown event op {other}"))),
    };
    Ok(TaskRunEvent {
        id: row.try_get::<String, _>("id")?.into(),
        task_run_id: row.try_get::<String, _>("task_run_id")?.into(),
        job_id: row.try_get::<String, _>("job_id")?.into(),
        kind,
        op,
        status: status_from_str(&row.try_get::<String, _>("status")?)?,
        source_path: row.try_get("source_path")?,
        target_path: row.try_get("target_path")?,
        error_message: row.try_get("error_message")?,
        created_at: row.try_get("created_at")?,
    })
}

pub async fn insert_many(pool: &SqlitePool, events: &[TaskRunEvent]) -> Result<(), QueueError> {
    if events.is_empty() {
        return Ok(());
    }
    let mut tx = pool.begin().await?;
    for event in events {
        sqlx::query(
            "INSERT INTO task_run_events (id, task_run_id, job_id, kind, op, status, \
             source_path, target_path, error_message, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(event.id.as_str())
        .bind(event.task_run_id.as_str())
        .bind(event.job_id.as_str())
        .bind(kind_str(event.kind))
        .bind(op_str(event.op))
        .bind(status_str(event.status))
        .bind(&event.source_path)
        .bind(&event.target_path)
        .bind(&event.error_message)
        .bind(event.created_at)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;
    Ok(())
}

pub async fn list_for_task_run(
    pool: &SqlitePool,
    task_run_id: &str,
) -> Result<Vec<TaskRunEvent>, QueueError> {
    let rows = sqlx::query(
        "SELECT * FROM task_run_events WHERE task_run_id = ? ORDER BY created_at",
    )
    .bind(task_run_id)
    .fetch_all(pool)
    .await?;
    rows.iter().map(row_to_event).collect()
}

/// Buffers events in memory and flushes on a size or time threshold.
/// Shared across emission workers; `record` is safe to call concurrently.
pub struct EventBatcher {
    pool: SqlitePool,
    buffer: Mutex<(Vec<TaskRunEvent>, Instant)>,
}

impl EventBatcher {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            buffer: Mutex::new((Vec::new(), Instant::now())),
        }
    }

    pub async fn record(&self, event: TaskRunEvent) -> Result<(), QueueError> {
        let to_flush = {
            let mut guard = self.buffer.lock().await;
            guard.0.push(event);
            if guard.0.len() >= BATCH_SIZE || guard.1.elapsed() >= FLUSH_INTERVAL {
                let drained = std::mem::take(&mut guard.0);
                guard.1 = Instant::now();
                Some(drained)
            } else {
                None
            }
        };
        if let Some(batch) = to_flush {
            insert_many(&self.pool, &batch).await?;
        }
        Ok(())
    }

    /// Forces out whatever is buffered, regardless of threshold. Called at
    /// the end of an Engine run so the last partial batch isn't lost.
    pub async fn flush(&self) -> Result<(), QueueError> {
        let batch = {
            let mut guard = self.buffer.lock().await;
            guard.1 = Instant::now();
            std::mem::take(&mut guard.0)
        };
        insert_many(&self.pool, &batch).await
    }
}
