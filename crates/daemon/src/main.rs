// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! strmsyncd: the background daemon that owns the Scheduler and WorkerPool
//! (spec §2, §4.7, §4.8). The CLI talks to the same SQLite database directly
//! and never goes through this process — there is no IPC layer.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

use std::path::PathBuf;
use std::sync::Arc;

use strmsync_daemon::config::Config;
use strmsync_daemon::lifecycle::{self, InstanceLock};
use strmsync_daemon::scheduler::Scheduler;
use strmsync_daemon::worker_pool::WorkerPool;
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if matches!(std::env::args().nth(1).as_deref(), Some("--version" | "-V" | "-v")) {
        println!("strmsyncd {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = Config::load(config_path.as_deref())?;
    let _log_guard = setup_logging(&config)?;

    let lock_path = config.log_dir.join("strmsyncd.lock");
    let _lock = InstanceLock::acquire(&lock_path)?;

    info!(database_url = %config.database_url, "starting strmsyncd");
    let pool = strmsync_queue::pool::connect(&config.database_url, config.max_db_connections).await?;
    lifecycle::recover(&pool).await?;

    let cancel = CancellationToken::new();
    let scheduler = Arc::new(Scheduler::new(pool.clone()));
    let worker_pool = Arc::new(WorkerPool::new(pool.clone(), config.worker_concurrency));

    let scheduler_handle = {
        let scheduler = scheduler.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { scheduler.run(cancel).await })
    };
    let worker_handle = {
        let worker_pool = worker_pool.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { worker_pool.run(cancel).await })
    };

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    tokio::select! {
        _ = sigterm.recv() => info!("received SIGTERM, shutting down"),
        _ = sigint.recv() => info!("received SIGINT, shutting down"),
    }

    cancel.cancel();
    if let Err(e) = scheduler_handle.await {
        error!(error = %e, "scheduler task panicked");
    }
    if let Err(e) = worker_handle.await {
        error!(error = %e, "worker pool task panicked");
    }

    info!("strmsyncd stopped");
    Ok(())
}

fn setup_logging(config: &Config) -> anyhow::Result<tracing_appender::non_blocking::WorkerGuard> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    std::fs::create_dir_all(&config.log_dir)?;
    let file_appender = tracing_appender::rolling::never(&config.log_dir, &config.log_file);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(non_blocking))
        .init();

    Ok(guard)
}
