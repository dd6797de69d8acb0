// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Errors raised by the SQL-backed repositories and queue.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("duplicate dedup_key")]
    Duplicate,
    #[error("not found")]
    NotFound,
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
    #[error("malformed row: {0}")]
    Malformed(String),
}

impl QueueError {
    /// Maps a unique-constraint violation on `dedup_key`/`name`/`uid` to
    /// [`QueueError::Duplicate`]; every other database error passes through.
    pub fn from_insert(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.is_unique_violation() {
                return QueueError::Duplicate;
            }
        }
        QueueError::Db(err)
    }
}

impl From<QueueError> for strmsync_core::TaskError {
    fn from(err: QueueError) -> Self {
        match err {
            QueueError::Duplicate | QueueError::Malformed(_) => {
                strmsync_core::TaskError::invalid_input(err)
            }
            QueueError::NotFound => strmsync_core::TaskError::not_found(err),
            QueueError::Db(e) => strmsync_core::TaskError::transient(e),
        }
    }
}
