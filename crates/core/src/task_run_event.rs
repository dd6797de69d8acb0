// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! TaskRunEvent: an append-only per-file audit entry (spec §3).

use crate::ids::{JobId, TaskRunEventId, TaskRunId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Strm,
    Meta,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventOp {
    Create,
    Update,
    Delete,
    Copy,
    Skip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    Success,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRunEvent {
    pub id: TaskRunEventId,
    pub task_run_id: TaskRunId,
    pub job_id: JobId,
    pub kind: EventKind,
    pub op: EventOp,
    pub status: EventStatus,
    pub source_path: String,
    pub target_path: String,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}
