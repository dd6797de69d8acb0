// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `strmsync run` — manually enqueue a Job at high priority (spec §6).

use anyhow::{anyhow, Result};
use clap::Args;
use sqlx::SqlitePool;
use strmsync_core::Priority;
use strmsync_queue::repo::jobs;
use strmsync_queue::{EnqueueRequest, Queue};

#[derive(Args)]
pub struct RunArgs {
    /// Job name or id
    pub job: String,
}

pub async fn handle(args: RunArgs, pool: &SqlitePool) -> Result<()> {
    let job = match jobs::get_by_name(pool, &args.job).await {
        Ok(job) => job,
        Err(_) => jobs::get(pool, &args.job).await.map_err(|_| anyhow!("no such job: {}", args.job))?,
    };

    let queue = Queue::new(pool.clone());
    let dedup_key = format!("manual:{}:{}", job.id, uuid::Uuid::new_v4());
    let run = queue
        .enqueue(EnqueueRequest {
            job_id: job.id.clone(),
            dedup_key,
            priority: Priority::High,
            max_attempts: 5,
            available_at: None,
            payload: None,
        })
        .await?;
    println!("enqueued task run {} for job {}", run.id, job.name);
    Ok(())
}
