// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Opens the same SQLite pool the daemon uses (spec §6: no IPC layer — the
//! CLI and `strmsyncd` are independent processes over one database).

use anyhow::Result;
use sqlx::SqlitePool;
use std::path::Path;
use strmsync_daemon::Config;

pub async fn connect(config_path: Option<&Path>) -> Result<SqlitePool> {
    let config = Config::load(config_path)?;
    let pool = strmsync_queue::pool::connect(&config.database_url, config.max_db_connections).await?;
    Ok(pool)
}
