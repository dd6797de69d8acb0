// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! DataServer command handlers: add|list (spec §6).

use anyhow::Result;
use clap::{Args, Subcommand, ValueEnum};
use sqlx::SqlitePool;
use strmsync_core::{DataServer, DataServerId, DataServerKind, DataServerOptions};
use strmsync_queue::repo::data_servers;

use crate::output::OutputFormat;
use crate::table::{Column, Table};

#[derive(Args)]
pub struct ServerArgs {
    #[command(subcommand)]
    pub command: ServerCommand,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum ServerKindArg {
    Local,
    Clouddrive2,
    Openlist,
}

impl From<ServerKindArg> for DataServerKind {
    fn from(arg: ServerKindArg) -> Self {
        match arg {
            ServerKindArg::Local => DataServerKind::Local,
            ServerKindArg::Clouddrive2 => DataServerKind::CloudDrive2,
            ServerKindArg::Openlist => DataServerKind::OpenList,
        }
    }
}

#[derive(Subcommand)]
pub enum ServerCommand {
    /// Register a new DataServer
    Add {
        /// Unique, human-readable name
        name: String,
        #[arg(long, value_enum)]
        kind: ServerKindArg,
        /// Hostname or address (informational for `local`)
        #[arg(long, default_value = "localhost")]
        host: String,
        #[arg(long, default_value_t = 0)]
        port: u16,
        /// Filesystem path this host can reach directly (mount or local root)
        #[arg(long)]
        access_path: Option<String>,
        /// API base URL, required for `clouddrive2`/`openlist` without `--access-path`
        #[arg(long)]
        base_url: Option<String>,
        /// API key credential
        #[arg(long)]
        api_key: Option<String>,
    },
    /// List all DataServers
    List {},
}

pub async fn handle(command: ServerCommand, pool: &SqlitePool, format: OutputFormat) -> Result<()> {
    match command {
        ServerCommand::Add { name, kind, host, port, access_path, base_url, api_key } => {
            let kind = DataServerKind::from(kind);
            let uid = DataServer::compute_uid(kind, &host, port, &name);
            let credential = api_key.map(|api_key| strmsync_core::Credential::ApiKey { api_key });
            let server = DataServer {
                id: DataServerId::new(uuid::Uuid::new_v4().to_string()),
                name: name.clone(),
                kind,
                host,
                port,
                credential,
                enabled: true,
                options: DataServerOptions { access_path, base_url, ..DataServerOptions::default() },
                uid,
            };
            data_servers::insert(pool, &server).await?;
            println!("created data server {} ({})", server.name, server.id);
            Ok(())
        }
        ServerCommand::List {} => list(pool, format).await,
    }
}

async fn list(pool: &SqlitePool, format: OutputFormat) -> Result<()> {
    let servers = data_servers::list(pool).await?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&servers)?),
        OutputFormat::Text => {
            let mut table = Table::plain(vec![
                Column::left("NAME"),
                Column::left("KIND"),
                Column::left("HOST"),
                Column::left("ENABLED"),
                Column::left("ACCESS PATH"),
            ]);
            for server in &servers {
                table.row(vec![
                    server.name.clone(),
                    server.kind.as_str().to_string(),
                    format!("{}:{}", server.host, server.port),
                    server.enabled.to_string(),
                    server.options.access_path.clone().unwrap_or_else(|| "-".into()),
                ]);
            }
            table.render(&mut std::io::stdout());
        }
    }
    Ok(())
}
