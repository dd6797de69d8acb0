// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job command handlers: add|list|show|rm (spec §6).

use anyhow::{anyhow, Result};
use clap::{Args, Subcommand};
use sqlx::SqlitePool;
use strmsync_core::{Job, JobId, JobOptions, JobStatus, MetadataMode, WatchMode};
use strmsync_queue::repo::jobs;

use crate::output::OutputFormat;
use crate::table::{Column, Table};

#[derive(Args)]
pub struct JobArgs {
    #[command(subcommand)]
    pub command: JobCommand,
}

#[derive(Subcommand)]
pub enum JobCommand {
    /// Define a new sync Job
    Add {
        /// Unique, human-readable name
        name: String,
        /// DataServer this Job reads from
        #[arg(long)]
        data_server: String,
        /// Source path relative to the DataServer
        #[arg(long)]
        source: String,
        /// Directory `.strm` files are written under
        #[arg(long)]
        target: String,
        /// Cron expression; omit to leave the Job schedule-less (run manually)
        #[arg(long)]
        cron: Option<String>,
        /// Media file extensions to include, e.g. --media-ext mkv --media-ext mp4
        #[arg(long = "media-ext")]
        media_exts: Vec<String>,
        /// Replicate metadata sidecars by copying bytes through the driver
        #[arg(long)]
        copy_meta: bool,
        /// Watch the DataServer's API instead of its local listing
        #[arg(long)]
        api_mode: bool,
    },
    /// List all Jobs
    List {},
    /// Show one Job's full configuration
    Show {
        /// Job name or id
        name: String,
    },
    /// Remove a Job
    Rm {
        /// Job name or id
        name: String,
    },
}

pub async fn handle(command: JobCommand, pool: &SqlitePool, format: OutputFormat) -> Result<()> {
    match command {
        JobCommand::Add { name, data_server, source, target, cron, media_exts, copy_meta, api_mode } => {
            let options = JobOptions {
                media_exts,
                metadata_mode: if copy_meta { MetadataMode::Copy } else { MetadataMode::None },
                ..JobOptions::default()
            };
            let now = chrono::Utc::now();
            let job = Job {
                id: JobId::new(uuid::Uuid::new_v4().to_string()),
                name: name.clone(),
                enabled: true,
                cron,
                watch_mode: if api_mode { WatchMode::Api } else { WatchMode::Local },
                source_path: source,
                remote_root: None,
                target_path: target,
                strm_path: None,
                data_server_id: strmsync_core::DataServerId::new(data_server),
                media_server_id: None,
                options,
                last_run_at: None,
                status: JobStatus::Idle,
                created_at: now,
                updated_at: now,
            };
            jobs::insert(pool, &job).await?;
            println!("created job {} ({})", job.name, job.id);
            Ok(())
        }
        JobCommand::List {} => list(pool, format).await,
        JobCommand::Show { name } => show(pool, &name, format).await,
        JobCommand::Rm { name } => {
            let job = resolve(pool, &name).await?;
            jobs::delete(pool, job.id.as_str()).await?;
            println!("removed job {}", job.name);
            Ok(())
        }
    }
}

async fn resolve(pool: &SqlitePool, name: &str) -> Result<Job> {
    if let Ok(job) = jobs::get_by_name(pool, name).await {
        return Ok(job);
    }
    jobs::get(pool, name).await.map_err(|_| anyhow!("no such job: {name}"))
}

async fn list(pool: &SqlitePool, format: OutputFormat) -> Result<()> {
    let jobs = jobs::list(pool).await?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&jobs)?),
        OutputFormat::Text => {
            let mut table = Table::plain(vec![
                Column::left("NAME"),
                Column::left("ENABLED"),
                Column::left("CRON"),
                Column::left("STATUS"),
                Column::left("LAST RUN"),
            ]);
            for job in &jobs {
                table.row(vec![
                    job.name.clone(),
                    job.enabled.to_string(),
                    job.cron.clone().unwrap_or_else(|| "-".into()),
                    format!("{:?}", job.status),
                    job.last_run_at.map(|t| t.to_rfc3339()).unwrap_or_else(|| "-".into()),
                ]);
            }
            table.render(&mut std::io::stdout());
        }
    }
    Ok(())
}

async fn show(pool: &SqlitePool, name: &str, format: OutputFormat) -> Result<()> {
    let job = resolve(pool, name).await?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&job)?),
        OutputFormat::Text => {
            println!("id:            {}", job.id);
            println!("name:          {}", job.name);
            println!("enabled:       {}", job.enabled);
            println!("cron:          {}", job.cron.as_deref().unwrap_or("-"));
            println!("watch_mode:    {:?}", job.watch_mode);
            println!("data_server:   {}", job.data_server_id);
            println!("source_path:   {}", job.source_path);
            println!("target_path:   {}", job.target_path);
            println!("status:        {:?}", job.status);
            println!("media_exts:    {}", job.options.media_exts.join(","));
            println!("metadata_mode: {:?}", job.options.metadata_mode);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use strmsync_core::{DataServer, DataServerKind, DataServerOptions};

    async fn seed_data_server(pool: &SqlitePool) -> strmsync_core::DataServerId {
        let server = DataServer {
            id: strmsync_core::DataServerId::new("ds1"),
            name: "local-disk".into(),
            kind: DataServerKind::Local,
            host: "localhost".into(),
            port: 0,
            credential: None,
            enabled: true,
            options: DataServerOptions::default(),
            uid: DataServer::compute_uid(DataServerKind::Local, "localhost", 0, "local-disk"),
        };
        strmsync_queue::repo::data_servers::insert(pool, &server).await.unwrap();
        server.id
    }

    #[tokio::test]
    async fn add_list_show_rm_roundtrips() {
        let pool = strmsync_queue::pool::connect_in_memory().await.unwrap();
        let data_server = seed_data_server(&pool).await;

        handle(
            JobCommand::Add {
                name: "movies".into(),
                data_server: data_server.to_string(),
                source: "/media/movies".into(),
                target: "/strm/movies".into(),
                cron: Some("0 */15 * * * *".into()),
                media_exts: vec!["mkv".into()],
                copy_meta: true,
                api_mode: false,
            },
            &pool,
            OutputFormat::Json,
        )
        .await
        .unwrap();

        let listed = jobs::list(&pool).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, "movies");

        let shown = resolve(&pool, "movies").await.unwrap();
        assert_eq!(shown.options.metadata_mode, MetadataMode::Copy);

        handle(JobCommand::Rm { name: "movies".into() }, &pool, OutputFormat::Text).await.unwrap();
        assert!(jobs::list(&pool).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn resolve_unknown_job_errors() {
        let pool = strmsync_queue::pool::connect_in_memory().await.unwrap();
        assert!(resolve(&pool, "nope").await.is_err());
    }
}
