// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `strmsync events <task-run-id>` — list the per-file audit trail for one
//! attempt (spec §3, §6).

use anyhow::Result;
use clap::Args;
use sqlx::SqlitePool;
use strmsync_queue::repo::events;

use crate::output::OutputFormat;
use crate::table::{Column, Table};

#[derive(Args)]
pub struct EventsArgs {
    /// TaskRun id
    pub task_run_id: String,
}

pub async fn handle(args: EventsArgs, pool: &SqlitePool, format: OutputFormat) -> Result<()> {
    let events = events::list_for_task_run(pool, &args.task_run_id).await?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&events)?),
        OutputFormat::Text => {
            let mut table = Table::plain(vec![
                Column::left("KIND"),
                Column::left("OP"),
                Column::left("STATUS"),
                Column::left("TARGET"),
                Column::left("ERROR"),
            ]);
            for event in &events {
                table.row(vec![
                    format!("{:?}", event.kind),
                    format!("{:?}", event.op),
                    format!("{:?}", event.status),
                    event.target_path.clone(),
                    event.error_message.clone().unwrap_or_default(),
                ]);
            }
            table.render(&mut std::io::stdout());
        }
    }
    Ok(())
}
