// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Connection pool construction and migration.
//!
//! SQLite is the default backend: the lightest-weight backend that still
//! gives real transactions and row-locking semantics via `BEGIN IMMEDIATE`,
//! used in place of `SELECT ... FOR UPDATE` in [`crate::queue::Queue::claim_next`].

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;
use std::time::Duration;

pub async fn connect(database_url: &str, max_connections: u32) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .foreign_keys(true)
        .busy_timeout(Duration::from_secs(5));

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    Ok(pool)
}

/// An in-memory database, for tests and ephemeral CLI invocations.
pub async fn connect_in_memory() -> Result<SqlitePool, sqlx::Error> {
    connect("sqlite::memory:", 1).await
}
