// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job repository: CRUD over the `jobs` table (spec §6).

use crate::error::QueueError;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use strmsync_core::{DataServerId, Job, JobOptions, JobStatus, MediaServerId, WatchMode};

fn watch_mode_str(m: WatchMode) -> &'static str {
    match m {
        WatchMode::Local => "local",
        WatchMode::Api => "api",
    }
}

fn watch_mode_from_str(s: &str) -> Result<WatchMode, QueueError> {
    match s {
        "local" => Ok(WatchMode::Local),
        "api" => Ok(WatchMode::Api),
        other => Err(QueueError::Malformed(format!("unknown watch_mode {other}"))),
    }
}

fn job_status_str(s: JobStatus) -> &'static str {
    match s {
        JobStatus::Idle => "idle",
        JobStatus::Running => "running",
        JobStatus::Error => "error",
    }
}

fn job_status_from_str(s: &str) -> Result<JobStatus, QueueError> {
    match s {
        "idle" => Ok(JobStatus::Idle),
        "running" => Ok(JobStatus::Running),
        "error" => Ok(JobStatus::Error),
        other => Err(QueueError::Malformed(format!("unknown job status {other}"))),
    }
}

fn row_to_job(row: &sqlx::sqlite::SqliteRow) -> Result<Job, QueueError> {
    let options_json: String = row.try_get("options")?;
    let options: JobOptions = serde_json::from_str(&options_json)
        .map_err(|e| QueueError::Malformed(format!("job options: {e}")))?;

    Ok(Job {
        id: row.try_get::<String, _>("id")?.into(),
        name: row.try_get("name")?,
        enabled: row.try_get::<i64, _>("enabled")? != 0,
        cron: row.try_get("cron")?,
        watch_mode: watch_mode_from_str(&row.try_get::<String, _>("watch_mode")?)?,
        source_path: row.try_get("source_path")?,
        remote_root: row.try_get("remote_root")?,
        target_path: row.try_get("target_path")?,
        strm_path: row.try_get("strm_path")?,
        data_server_id: DataServerId::new(row.try_get::<String, _>("data_server_id")?),
        media_server_id: row
            .try_get::<Option<String>, _>("media_server_id")?
            .map(MediaServerId::new),
        options,
        status: job_status_from_str(&row.try_get::<String, _>("status")?)?,
        last_run_at: row.try_get::<Option<DateTime<Utc>>, _>("last_run_at")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

pub async fn insert(pool: &SqlitePool, job: &Job) -> Result<(), QueueError> {
    let options_json = serde_json::to_string(&job.options)
        .map_err(|e| QueueError::Malformed(format!("job options: {e}")))?;
    sqlx::query(
        "INSERT INTO jobs (id, name, enabled, cron, watch_mode, source_path, remote_root, \
         target_path, strm_path, data_server_id, media_server_id, options, status, \
         last_run_at, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(job.id.as_str())
    .bind(&job.name)
    .bind(job.enabled as i64)
    .bind(&job.cron)
    .bind(watch_mode_str(job.watch_mode))
    .bind(&job.source_path)
    .bind(&job.remote_root)
    .bind(&job.target_path)
    .bind(&job.strm_path)
    .bind(job.data_server_id.as_str())
    .bind(job.media_server_id.as_ref().map(|id| id.as_str()))
    .bind(options_json)
    .bind(job_status_str(job.status))
    .bind(job.last_run_at)
    .bind(job.created_at)
    .bind(job.updated_at)
    .execute(pool)
    .await
    .map_err(QueueError::from_insert)?;
    Ok(())
}

pub async fn get(pool: &SqlitePool, id: &str) -> Result<Job, QueueError> {
    let row = sqlx::query("SELECT * FROM jobs WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(QueueError::NotFound)?;
    row_to_job(&row)
}

pub async fn get_by_name(pool: &SqlitePool, name: &str) -> Result<Job, QueueError> {
    let row = sqlx::query("SELECT * FROM jobs WHERE name = ?")
        .bind(name)
        .fetch_optional(pool)
        .await?
        .ok_or(QueueError::NotFound)?;
    row_to_job(&row)
}

pub async fn list(pool: &SqlitePool) -> Result<Vec<Job>, QueueError> {
    let rows = sqlx::query("SELECT * FROM jobs ORDER BY name").fetch_all(pool).await?;
    rows.iter().map(row_to_job).collect()
}

pub async fn list_schedulable(pool: &SqlitePool) -> Result<Vec<Job>, QueueError> {
    let rows = sqlx::query("SELECT * FROM jobs WHERE enabled = 1 AND cron IS NOT NULL")
        .fetch_all(pool)
        .await?;
    rows.iter().map(row_to_job).collect()
}

/// Persists status/last_run_at mutations made by the Scheduler/Executor
/// (spec §3: "mutated by config API and the Scheduler/Executor for
/// status/last-run").
pub async fn update_run_state(
    pool: &SqlitePool,
    id: &str,
    status: JobStatus,
    last_run_at: Option<DateTime<Utc>>,
) -> Result<(), QueueError> {
    let result = sqlx::query(
        "UPDATE jobs SET status = ?, last_run_at = COALESCE(?, last_run_at), updated_at = ? WHERE id = ?",
    )
    .bind(job_status_str(status))
    .bind(last_run_at)
    .bind(Utc::now())
    .bind(id)
    .execute(pool)
    .await?;
    if result.rows_affected() == 0 {
        return Err(QueueError::NotFound);
    }
    Ok(())
}

/// Cascade-deletes the Job's TaskRuns via the `ON DELETE CASCADE` foreign
/// key (spec §3).
pub async fn delete(pool: &SqlitePool, id: &str) -> Result<(), QueueError> {
    let result = sqlx::query("DELETE FROM jobs WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(QueueError::NotFound);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::connect_in_memory;
    use crate::repo::data_servers;
    use strmsync_core::{DataServer, DataServerKind, DataServerOptions, JobId, JobOptions};

    fn sample_data_server() -> DataServer {
        DataServer {
            id: strmsync_core::DataServerId::new("ds1"),
            name: "ds1".into(),
            kind: DataServerKind::Local,
            host: "".into(),
            port: 0,
            credential: None,
            enabled: true,
            options: DataServerOptions::default(),
            uid: DataServer::compute_uid(DataServerKind::Local, "", 0, "ds1"),
        }
    }

    fn sample_job(name: &str) -> Job {
        Job {
            id: JobId::new(format!("job-{name}")),
            name: name.into(),
            enabled: true,
            cron: None,
            watch_mode: WatchMode::Local,
            source_path: "/src".into(),
            remote_root: None,
            target_path: "/out".into(),
            strm_path: None,
            data_server_id: DataServerId::new("ds1"),
            media_server_id: None,
            options: JobOptions::default(),
            last_run_at: None,
            status: JobStatus::Idle,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn insert_and_get_roundtrips_job() {
        let pool = connect_in_memory().await.unwrap();
        data_servers::insert(&pool, &sample_data_server()).await.unwrap();
        let job = sample_job("alpha");
        insert(&pool, &job).await.unwrap();

        let fetched = get(&pool, job.id.as_str()).await.unwrap();
        assert_eq!(fetched.name, "alpha");
        assert_eq!(fetched.target_path, "/out");
    }

    #[tokio::test]
    async fn duplicate_name_is_rejected() {
        let pool = connect_in_memory().await.unwrap();
        data_servers::insert(&pool, &sample_data_server()).await.unwrap();
        insert(&pool, &sample_job("dup")).await.unwrap();
        let err = insert(&pool, &sample_job("dup")).await.unwrap_err();
        assert!(matches!(err, QueueError::Duplicate));
    }

    #[tokio::test]
    async fn delete_missing_job_is_not_found() {
        let pool = connect_in_memory().await.unwrap();
        let err = delete(&pool, "missing").await.unwrap_err();
        assert!(matches!(err, QueueError::NotFound));
    }

    #[tokio::test]
    async fn list_schedulable_filters_disabled_and_cronless_jobs() {
        let pool = connect_in_memory().await.unwrap();
        data_servers::insert(&pool, &sample_data_server()).await.unwrap();

        let mut cronned = sample_job("cronned");
        cronned.cron = Some("0 * * * * *".into());
        insert(&pool, &cronned).await.unwrap();

        let mut disabled = sample_job("disabled");
        disabled.cron = Some("0 * * * * *".into());
        disabled.enabled = false;
        insert(&pool, &disabled).await.unwrap();

        insert(&pool, &sample_job("no_cron")).await.unwrap();

        let schedulable = list_schedulable(&pool).await.unwrap();
        assert_eq!(schedulable.len(), 1);
        assert_eq!(schedulable[0].name, "cronned");
    }
}
