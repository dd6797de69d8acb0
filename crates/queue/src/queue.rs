// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The durable task queue: enqueue, claim, complete, fail, cancel, and
//! crash recovery over the `task_runs` table (spec §4.6, §9).
//!
//! `claim_next` uses `BEGIN IMMEDIATE` to take the write lock before its
//! `SELECT`, giving it the same "pick one row and nobody else can" semantics
//! a `SELECT ... FOR UPDATE SKIP LOCKED` gives on a row-locking backend.

use crate::error::QueueError;
use chrono::{DateTime, Utc};
use rand::Rng;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use strmsync_core::{
    backoff_base_seconds, ErrorKind, FailureKind, JobId, Priority, ProgressCounters, TaskRun,
    TaskRunId, TaskRunStatus, WorkerId,
};
use uuid::Uuid;

fn status_str(s: TaskRunStatus) -> &'static str {
    match s {
        TaskRunStatus::Pending => "pending",
        TaskRunStatus::Running => "running",
        TaskRunStatus::Completed => "completed",
        TaskRunStatus::Failed => "failed",
        TaskRunStatus::Cancelled => "cancelled",
    }
}

fn status_from_str(s: &str) -> Result<TaskRunStatus, QueueError> {
    match s {
        "pending" => Ok(TaskRunStatus::Pending),
        "running" => Ok(TaskRunStatus::Running),
        "completed" => Ok(TaskRunStatus::Completed),
        "failed" => Ok(TaskRunStatus::Failed),
        "cancelled" => Ok(TaskRunStatus::Cancelled),
        other => Err(QueueError::Malformed(format!("unknown task_run status {other}"))),
    }
}

fn failure_kind_str(k: FailureKind) -> &'static str {
    match k {
        FailureKind::Retryable => "retryable",
        FailureKind::Permanent => "permanent",
        FailureKind::Cancelled => "cancelled",
    }
}

fn failure_kind_from_str(s: &str) -> Result<FailureKind, QueueError> {
    match s {
        "retryable" => Ok(FailureKind::Retryable),
        "permanent" => Ok(FailureKind::Permanent),
        "cancelled" => Ok(FailureKind::Cancelled),
        other => Err(QueueError::Malformed(format!("unknown failure_kind {other}"))),
    }
}

fn row_to_task_run(row: &SqliteRow) -> Result<TaskRun, QueueError> {
    let progress_json: String = row.try_get("progress")?;
    let progress: ProgressCounters = serde_json::from_str(&progress_json)
        .map_err(|e| QueueError::Malformed(format!("progress: {e}")))?;
    let failure_kind = row
        .try_get::<Option<String>, _>("failure_kind")?
        .map(|s| failure_kind_from_str(&s))
        .transpose()?;

    Ok(TaskRun {
        id: row.try_get::<String, _>("id")?.into(),
        job_id: JobId::new(row.try_get::<String, _>("job_id")?),
        status: status_from_str(&row.try_get::<String, _>("status")?)?,
        priority: Priority::from_i16(row.try_get::<i64, _>("priority")? as i16)
            .ok_or_else(|| QueueError::Malformed("unknown priority".into()))?,
        available_at: row.try_get("available_at")?,
        attempts: row.try_get::<i64, _>("attempts")? as u32,
        max_attempts: row.try_get::<i64, _>("max_attempts")? as u32,
        dedup_key: row.try_get("dedup_key")?,
        worker_id: row.try_get::<Option<String>, _>("worker_id")?.map(WorkerId::new),
        failure_kind,
        started_at: row.try_get("started_at")?,
        ended_at: row.try_get("ended_at")?,
        duration_seconds: row.try_get("duration_seconds")?,
        progress,
        payload: row.try_get("payload")?,
        error_message: row.try_get("error_message")?,
        created_at: row.try_get("created_at")?,
    })
}

/// `backoff(n) * (1 +/- 20%)`, floored at 1 second.
fn jittered_backoff_seconds(attempts_so_far: u32) -> i64 {
    let base = backoff_base_seconds(attempts_so_far);
    let jitter = rand::thread_rng().gen_range(-0.2..=0.2);
    ((base as f64) * (1.0 + jitter)).round().max(1.0) as i64
}

/// Parameters for a new [`TaskRun`]; constructed by the Executor/CLI when
/// scheduling or manually triggering a Job.
pub struct EnqueueRequest {
    pub job_id: JobId,
    pub dedup_key: String,
    pub priority: Priority,
    pub max_attempts: u32,
    pub available_at: Option<DateTime<Utc>>,
    pub payload: Option<String>,
}

#[derive(Clone)]
pub struct Queue {
    pool: SqlitePool,
}

impl Queue {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Invariant I2: a second enqueue with the same `dedup_key` fails with
    /// [`QueueError::Duplicate`] rather than creating a second pending/running
    /// TaskRun for the same Job.
    pub async fn enqueue(&self, req: EnqueueRequest) -> Result<TaskRun, QueueError> {
        let now = Utc::now();
        let task_run = TaskRun {
            id: TaskRunId::new(Uuid::new_v4().to_string()),
            job_id: req.job_id,
            status: TaskRunStatus::Pending,
            priority: req.priority,
            available_at: req.available_at.unwrap_or(now),
            attempts: 0,
            max_attempts: req.max_attempts,
            dedup_key: req.dedup_key,
            worker_id: None,
            failure_kind: None,
            started_at: None,
            ended_at: None,
            duration_seconds: None,
            progress: ProgressCounters::default(),
            payload: req.payload,
            error_message: None,
            created_at: now,
        };
        let progress_json = serde_json::to_string(&task_run.progress)
            .map_err(|e| QueueError::Malformed(format!("progress: {e}")))?;

        sqlx::query(
            "INSERT INTO task_runs (id, job_id, status, priority, available_at, attempts, \
             max_attempts, dedup_key, worker_id, failure_kind, started_at, ended_at, \
             duration_seconds, progress, payload, error_message, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, NULL, NULL, NULL, NULL, NULL, ?, ?, NULL, ?)",
        )
        .bind(task_run.id.as_str())
        .bind(task_run.job_id.as_str())
        .bind(status_str(task_run.status))
        .bind(task_run.priority.as_i16() as i64)
        .bind(task_run.available_at)
        .bind(task_run.attempts as i64)
        .bind(task_run.max_attempts as i64)
        .bind(&task_run.dedup_key)
        .bind(progress_json)
        .bind(&task_run.payload)
        .bind(task_run.created_at)
        .execute(&self.pool)
        .await
        .map_err(QueueError::from_insert)?;

        Ok(task_run)
    }

    pub async fn get(&self, task_run_id: &str) -> Result<TaskRun, QueueError> {
        let row = sqlx::query("SELECT * FROM task_runs WHERE id = ?")
            .bind(task_run_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(QueueError::NotFound)?;
        row_to_task_run(&row)
    }

    pub async fn list_for_job(&self, job_id: &str) -> Result<Vec<TaskRun>, QueueError> {
        let rows = sqlx::query("SELECT * FROM task_runs WHERE job_id = ? ORDER BY created_at DESC")
            .bind(job_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_task_run).collect()
    }

    /// Claims the highest-priority, earliest-available pending TaskRun and
    /// marks it running under this worker, or returns `None` if the queue is
    /// empty. Invariant I1/I3: at most one worker ever claims a given row.
    pub async fn claim_next(&self, worker_id: &WorkerId) -> Result<Option<TaskRun>, QueueError> {
        let now = Utc::now();
        let mut conn = self.pool.acquire().await?;
        sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;

        let row = match sqlx::query(
            "SELECT * FROM task_runs WHERE status = 'pending' AND available_at <= ? \
             ORDER BY priority ASC, available_at ASC, created_at ASC LIMIT 1",
        )
        .bind(now)
        .fetch_optional(&mut *conn)
        .await
        {
            Ok(row) => row,
            Err(e) => {
                let _ = sqlx::query("ROLLBACK").execute(&mut *conn).await;
                return Err(e.into());
            }
        };

        let Some(row) = row else {
            sqlx::query("COMMIT").execute(&mut *conn).await?;
            return Ok(None);
        };

        let claimed = match row_to_task_run(&row) {
            Ok(t) => t,
            Err(e) => {
                let _ = sqlx::query("ROLLBACK").execute(&mut *conn).await;
                return Err(e);
            }
        };

        let attempts = claimed.attempts + 1;
        let update = sqlx::query(
            "UPDATE task_runs SET status = 'running', worker_id = ?, attempts = ?, \
             started_at = ?, ended_at = NULL WHERE id = ?",
        )
        .bind(worker_id.as_str())
        .bind(attempts as i64)
        .bind(now)
        .bind(claimed.id.as_str())
        .execute(&mut *conn)
        .await;

        if let Err(e) = update {
            let _ = sqlx::query("ROLLBACK").execute(&mut *conn).await;
            return Err(e.into());
        }

        sqlx::query("COMMIT").execute(&mut *conn).await?;

        Ok(Some(TaskRun {
            status: TaskRunStatus::Running,
            worker_id: Some(worker_id.clone()),
            attempts,
            started_at: Some(now),
            ended_at: None,
            ..claimed
        }))
    }

    /// Persists an in-flight progress snapshot without touching `status`
    /// (spec §9 open question (a): "progress updates do not change Status").
    /// Idempotent no-op if the row has since gone terminal or vanished.
    pub async fn update_progress(
        &self,
        task_run_id: &str,
        progress: ProgressCounters,
    ) -> Result<(), QueueError> {
        let progress_json = serde_json::to_string(&progress)
            .map_err(|e| QueueError::Malformed(format!("progress: {e}")))?;
        sqlx::query("UPDATE task_runs SET progress = ? WHERE id = ? AND status = 'running'")
            .bind(progress_json)
            .bind(task_run_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// If the row has since left `running` (e.g. a concurrent `cancel`), the
    /// guarded `UPDATE` this follows affected zero rows; confirm the row
    /// still exists and treat the no-op as success rather than resurrecting
    /// a terminal status (invariant I4).
    async fn ok_if_row_exists(&self, task_run_id: &str, rows_affected: u64) -> Result<(), QueueError> {
        if rows_affected == 0 {
            self.get(task_run_id).await?;
        }
        Ok(())
    }

    /// Invariant I5: terminal progress counters are exactly what the Engine
    /// last reported; the queue never recomputes them. Guarded by
    /// `status = 'running'` so a TaskRun cancelled out from under its
    /// worker cannot be flipped back to completed (invariant I4).
    pub async fn complete(
        &self,
        task_run_id: &str,
        progress: ProgressCounters,
    ) -> Result<(), QueueError> {
        let existing = self.get(task_run_id).await?;
        let now = Utc::now();
        let duration = existing.started_at.map(|s| (now - s).num_seconds());
        let progress_json = serde_json::to_string(&progress)
            .map_err(|e| QueueError::Malformed(format!("progress: {e}")))?;

        let result = sqlx::query(
            "UPDATE task_runs SET status = 'completed', worker_id = NULL, ended_at = ?, \
             duration_seconds = ?, progress = ?, error_message = NULL \
             WHERE id = ? AND status = 'running'",
        )
        .bind(now)
        .bind(duration)
        .bind(progress_json)
        .bind(task_run_id)
        .execute(&self.pool)
        .await?;
        self.ok_if_row_exists(task_run_id, result.rows_affected()).await
    }

    /// Classifies `kind` into retryable/permanent/cancelled and either
    /// requeues with jittered exponential backoff or marks the TaskRun
    /// terminal (spec §4.6, §7). Guarded by `status = 'running'` so a
    /// TaskRun cancelled out from under its worker cannot be resurrected.
    pub async fn fail(
        &self,
        task_run_id: &str,
        kind: ErrorKind,
        message: impl Into<String>,
        progress: ProgressCounters,
    ) -> Result<(), QueueError> {
        let existing = self.get(task_run_id).await?;
        let now = Utc::now();
        let message = message.into();
        let failure_kind = FailureKind::from(kind);
        let progress_json = serde_json::to_string(&progress)
            .map_err(|e| QueueError::Malformed(format!("progress: {e}")))?;

        if failure_kind == FailureKind::Retryable && existing.has_attempts_remaining() {
            let delay = jittered_backoff_seconds(existing.attempts);
            let available_at = now + chrono::Duration::seconds(delay);
            let result = sqlx::query(
                "UPDATE task_runs SET status = 'pending', worker_id = NULL, available_at = ?, \
                 failure_kind = ?, error_message = ?, progress = ?, ended_at = ? \
                 WHERE id = ? AND status = 'running'",
            )
            .bind(available_at)
            .bind(failure_kind_str(failure_kind))
            .bind(&message)
            .bind(progress_json)
            .bind(now)
            .bind(task_run_id)
            .execute(&self.pool)
            .await?;
            self.ok_if_row_exists(task_run_id, result.rows_affected()).await?;
        } else {
            let terminal_status = if failure_kind == FailureKind::Cancelled {
                TaskRunStatus::Cancelled
            } else {
                TaskRunStatus::Failed
            };
            let duration = existing.started_at.map(|s| (now - s).num_seconds());
            let result = sqlx::query(
                "UPDATE task_runs SET status = ?, worker_id = NULL, ended_at = ?, \
                 duration_seconds = ?, failure_kind = ?, error_message = ?, progress = ? \
                 WHERE id = ? AND status = 'running'",
            )
            .bind(status_str(terminal_status))
            .bind(now)
            .bind(duration)
            .bind(failure_kind_str(failure_kind))
            .bind(&message)
            .bind(progress_json)
            .bind(task_run_id)
            .execute(&self.pool)
            .await?;
            self.ok_if_row_exists(task_run_id, result.rows_affected()).await?;
        }
        Ok(())
    }

    /// Cancels a pending or running TaskRun; a no-op (not an error) if it is
    /// already terminal. For a `running` row this only marks the row —
    /// the worker holding it notices on its own poll and cancels its
    /// in-flight Engine context (spec §4.6; see `WorkerPool`'s cancel
    /// watcher, since there is no channel from this call into that
    /// process's `CancellationToken`).
    pub async fn cancel(&self, task_run_id: &str) -> Result<(), QueueError> {
        let existing = self.get(task_run_id).await?;
        if existing.status.is_terminal() {
            return Ok(());
        }
        let now = Utc::now();
        let duration = existing.started_at.map(|s| (now - s).num_seconds());
        let result = sqlx::query(
            "UPDATE task_runs SET status = 'cancelled', worker_id = NULL, ended_at = ?, \
             duration_seconds = ?, failure_kind = 'cancelled' \
             WHERE id = ? AND status IN ('pending', 'running')",
        )
        .bind(now)
        .bind(duration)
        .bind(task_run_id)
        .execute(&self.pool)
        .await?;
        self.ok_if_row_exists(task_run_id, result.rows_affected()).await
    }

    /// Requeues or terminates every TaskRun still `running` at process
    /// startup — the worker that held it is gone (spec §4.6: crash
    /// recovery). A row with attempts remaining goes straight back to
    /// `pending` with `available_at = now` so it is claimable within one
    /// poll; a row that already exhausted its attempts is marked `failed`
    /// with `failure_kind = 'permanent'` rather than requeued again.
    pub async fn recover_orphaned(&self) -> Result<u64, QueueError> {
        let rows = sqlx::query("SELECT id, attempts, max_attempts FROM task_runs WHERE status = 'running'")
            .fetch_all(&self.pool)
            .await?;
        let now = Utc::now();
        let mut recovered = 0u64;
        for row in &rows {
            let id: String = row.try_get("id")?;
            let attempts: i64 = row.try_get("attempts")?;
            let max_attempts: i64 = row.try_get("max_attempts")?;

            if attempts < max_attempts {
                sqlx::query(
                    "UPDATE task_runs SET status = 'pending', worker_id = NULL, available_at = ? \
                     WHERE id = ? AND status = 'running'",
                )
                .bind(now)
                .bind(&id)
                .execute(&self.pool)
                .await?;
            } else {
                sqlx::query(
                    "UPDATE task_runs SET status = 'failed', worker_id = NULL, ended_at = ?, \
                     failure_kind = 'permanent', error_message = ? \
                     WHERE id = ? AND status = 'running'",
                )
                .bind(now)
                .bind("worker lost liveness before completing this attempt; max attempts exhausted")
                .bind(&id)
                .execute(&self.pool)
                .await?;
            }
            recovered += 1;
        }
        Ok(recovered)
    }
}
