// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! strmsync — operator CLI. Opens the same SQLite database the daemon
//! does and calls the same `Queue`/repository functions directly; there is
//! no IPC layer (spec §6).

mod color;
mod commands;
mod db;
mod output;
mod table;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use commands::{events, job, queue, run, server};
use output::OutputFormat;

#[derive(Parser)]
#[command(name = "strmsync", version, about = "Operator CLI for the STRM sync engine")]
struct Cli {
    /// Path to strmsyncd.toml (defaults to ./strmsyncd.toml)
    #[arg(short = 'c', long, global = true)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(short = 'o', long = "output", value_enum, default_value_t, global = true)]
    output: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Job management
    Job(job::JobArgs),
    /// DataServer management
    Server(server::ServerArgs),
    /// Manually enqueue a Job at high priority
    Run(run::RunArgs),
    /// TaskRun queue inspection
    Queue(queue::QueueArgs),
    /// Show the per-file audit trail for a TaskRun
    Events(events::EventsArgs),
}

#[tokio::main]
async fn main() {
    if let Err(e) = run_cli().await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run_cli() -> Result<()> {
    let cli = Cli::parse();
    let pool = db::connect(cli.config.as_deref()).await?;

    match cli.command {
        Commands::Job(args) => job::handle(args.command, &pool, cli.output).await,
        Commands::Server(args) => server::handle(args.command, &pool, cli.output).await,
        Commands::Run(args) => run::handle(args, &pool).await,
        Commands::Queue(args) => queue::handle(args.command, &pool, cli.output).await,
        Commands::Events(args) => events::handle(args, &pool, cli.output).await,
    }
}
