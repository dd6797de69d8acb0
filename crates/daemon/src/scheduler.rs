// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scheduler: wakes up schedulable Jobs on their cron expression and
//! enqueues a TaskRun (spec §4.7).

use chrono::{DateTime, Utc};
use cron::Schedule;
use dashmap::DashMap;
use sqlx::SqlitePool;
use std::str::FromStr;
use std::time::Duration;
use strmsync_core::{JobId, Priority, TaskRun};
use strmsync_queue::repo::jobs;
use strmsync_queue::{EnqueueRequest, Queue, QueueError};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Re-scanned on this interval so Job inserts/updates/deletes and cron
/// edits take effect without a daemon restart.
const REFRESH_INTERVAL: Duration = Duration::from_secs(30);

/// The longest the scheduler ever sleeps between refresh scans, so a brand
/// new schedule added between scans is still picked up promptly.
const MAX_SLEEP: Duration = Duration::from_secs(30);

/// How far back a newly discovered Job's watch window starts. Guarantees
/// the first tick after discovery observes at least one occurrence of any
/// schedule with a period at or above this, instead of racing the clock
/// against `fire_due`'s own call cadence.
const INITIAL_LOOKBACK: chrono::Duration = chrono::Duration::seconds(1);

struct ScheduleEntry {
    schedule: Schedule,
    last_tick: DateTime<Utc>,
}

pub struct Scheduler {
    pool: SqlitePool,
    queue: Queue,
    schedules: DashMap<JobId, ScheduleEntry>,
}

impl Scheduler {
    pub fn new(pool: SqlitePool) -> Self {
        let queue = Queue::new(pool.clone());
        Self { pool, queue, schedules: DashMap::new() }
    }

    /// Reloads schedulable Jobs from the database and rebuilds the cron
    /// table, dropping entries for Jobs that are no longer schedulable.
    /// An existing entry's `last_tick` is left untouched so a job that was
    /// already known keeps its place in time across refreshes.
    async fn refresh(&self) {
        let jobs = match jobs::list_schedulable(&self.pool).await {
            Ok(jobs) => jobs,
            Err(e) => {
                error!(error = %e, "failed to list schedulable jobs");
                return;
            }
        };

        let live: std::collections::HashSet<JobId> = jobs.iter().map(|j| j.id.clone()).collect();
        self.schedules.retain(|id, _| live.contains(id));

        for job in jobs {
            let Some(expr) = job.cron.as_deref() else { continue };
            match Schedule::from_str(expr) {
                Ok(schedule) => {
                    if let Some(mut entry) = self.schedules.get_mut(&job.id) {
                        entry.schedule = schedule;
                    } else {
                        let last_tick = Utc::now() - INITIAL_LOOKBACK;
                        self.schedules.insert(job.id.clone(), ScheduleEntry { schedule, last_tick });
                    }
                }
                Err(e) => {
                    warn!(job_id = %job.id, cron = expr, error = %e, "invalid cron expression, skipping");
                    self.schedules.remove(&job.id);
                }
            }
        }
    }

    /// Enqueues every Job whose schedule has an occurrence after its last
    /// tick and at or before `now`, then advances that Job's tick to the
    /// occurrence it just fired (spec §4.7: "evaluates each job's cron
    /// expression against the last tick"). Multiple missed occurrences
    /// (e.g. after a long daemon outage) collapse into a single fire rather
    /// than enqueueing a backlog.
    async fn fire_due(&self) {
        let now = Utc::now();
        let due: Vec<(JobId, DateTime<Utc>)> = self
            .schedules
            .iter()
            .filter_map(|entry| {
                let fire_at = entry.schedule.after(&entry.last_tick).take_while(|t| *t <= now).last()?;
                Some((entry.key().clone(), fire_at))
            })
            .collect();

        for (job_id, fire_at) in due {
            if let Some(mut entry) = self.schedules.get_mut(&job_id) {
                entry.last_tick = fire_at;
            }
            let dedup_key = format!("job:{job_id}:cron:{}", fire_at.timestamp());
            let payload = serde_json::json!({
                "trigger": "cron",
                "fired_at": fire_at.to_rfc3339(),
            })
            .to_string();
            match self.enqueue(job_id.clone(), dedup_key, payload).await {
                Ok(_) | Err(QueueError::Duplicate) => {}
                Err(e) => error!(job_id = %job_id, error = %e, "failed to enqueue scheduled run"),
            }
        }
    }

    async fn enqueue(&self, job_id: JobId, dedup_key: String, payload: String) -> Result<TaskRun, QueueError> {
        self.queue
            .enqueue(EnqueueRequest {
                job_id,
                dedup_key,
                priority: Priority::Normal,
                max_attempts: 3,
                available_at: None,
                payload: Some(payload),
            })
            .await
    }

    /// Runs until `cancel` fires: refresh the schedule table, fire anything
    /// due, sleep until the next tick (spec §4.7).
    pub async fn run(&self, cancel: CancellationToken) {
        self.refresh().await;
        let mut last_refresh = tokio::time::Instant::now();
        loop {
            self.fire_due().await;
            if last_refresh.elapsed() >= REFRESH_INTERVAL {
                self.refresh().await;
                last_refresh = tokio::time::Instant::now();
            }
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!("scheduler stopping");
                    return;
                }
                _ = tokio::time::sleep(MAX_SLEEP) => {}
            }
        }
    }
}
