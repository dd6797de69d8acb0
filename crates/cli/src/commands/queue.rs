// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Queue command handlers: list|cancel (spec §6).

use anyhow::Result;
use clap::{Args, Subcommand};
use sqlx::SqlitePool;
use strmsync_queue::repo::jobs;
use strmsync_queue::Queue;

use crate::output::OutputFormat;
use crate::table::{Column, Table};

#[derive(Args)]
pub struct QueueArgs {
    #[command(subcommand)]
    pub command: QueueCommand,
}

#[derive(Subcommand)]
pub enum QueueCommand {
    /// List TaskRuns for a Job
    List {
        /// Job name or id
        job: String,
    },
    /// Cancel a pending or running TaskRun
    Cancel {
        /// TaskRun id
        task_run_id: String,
    },
}

pub async fn handle(command: QueueCommand, pool: &SqlitePool, format: OutputFormat) -> Result<()> {
    match command {
        QueueCommand::List { job } => list(pool, &job, format).await,
        QueueCommand::Cancel { task_run_id } => {
            let queue = Queue::new(pool.clone());
            queue.cancel(&task_run_id).await?;
            println!("cancelled task run {task_run_id}");
            Ok(())
        }
    }
}

async fn list(pool: &SqlitePool, job: &str, format: OutputFormat) -> Result<()> {
    let job = match jobs::get_by_name(pool, job).await {
        Ok(job) => job,
        Err(_) => jobs::get(pool, job).await?,
    };
    let queue = Queue::new(pool.clone());
    let runs = queue.list_for_job(job.id.as_str()).await?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&runs)?),
        OutputFormat::Text => {
            let mut table = Table::plain(vec![
                Column::left("ID"),
                Column::left("STATUS"),
                Column::left("PRIORITY"),
                Column::right("ATTEMPTS"),
                Column::left("CREATED"),
            ]);
            for run in &runs {
                table.row(vec![
                    run.id.short(8).to_string(),
                    format!("{:?}", run.status),
                    format!("{:?}", run.priority),
                    format!("{}/{}", run.attempts, run.max_attempts),
                    run.created_at.to_rfc3339(),
                ]);
            }
            table.render(&mut std::io::stdout());
        }
    }
    Ok(())
}
