// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! TaskRun: one attempt to execute a Job — the queue unit (spec §3, §4.6).

use crate::ids::{JobId, TaskRunId};
use crate::worker::WorkerId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lower sorts first: High=1, Normal=2, Low=3 (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(i16)]
pub enum Priority {
    High = 1,
    Normal = 2,
    Low = 3,
}

impl Priority {
    pub fn as_i16(self) -> i16 {
        self as i16
    }

    pub fn from_i16(v: i16) -> Option<Self> {
        match v {
            1 => Some(Priority::High),
            2 => Some(Priority::Normal),
            3 => Some(Priority::Low),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskRunStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TaskRunStatus {
    /// Invariant I4: the state machine admits no transition not listed here.
    pub fn can_transition_to(self, next: TaskRunStatus) -> bool {
        use TaskRunStatus::*;
        matches!(
            (self, next),
            (Pending, Running)
                | (Pending, Cancelled)
                | (Running, Completed)
                | (Running, Failed)
                | (Running, Cancelled)
                | (Running, Pending) // retryable failure with remaining attempts
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskRunStatus::Completed | TaskRunStatus::Failed | TaskRunStatus::Cancelled
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Retryable,
    Permanent,
    Cancelled,
}

impl From<crate::error::ErrorKind> for FailureKind {
    fn from(kind: crate::error::ErrorKind) -> Self {
        if kind.is_cancelled() {
            FailureKind::Cancelled
        } else if kind.is_retryable() {
            FailureKind::Retryable
        } else {
            FailureKind::Permanent
        }
    }
}

/// Per-file progress counters. Monotonically grow within one attempt and
/// reset on a new attempt (invariant I5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ProgressCounters {
    pub total_files: u64,
    pub processed_files: u64,
    pub failed_files: u64,
    pub created_files: u64,
    pub updated_files: u64,
    pub skipped_files: u64,
    pub filtered_files: u64,
    pub meta_total: u64,
    pub meta_processed: u64,
    pub meta_created: u64,
    pub meta_updated: u64,
    pub meta_skipped: u64,
    pub meta_failed: u64,
}

/// One attempt to execute a Job (spec §3, §4.6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRun {
    pub id: TaskRunId,
    pub job_id: JobId,
    pub status: TaskRunStatus,
    pub priority: Priority,
    pub available_at: DateTime<Utc>,
    pub attempts: u32,
    pub max_attempts: u32,
    pub dedup_key: String,
    pub worker_id: Option<WorkerId>,
    pub failure_kind: Option<FailureKind>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_seconds: Option<i64>,
    pub progress: ProgressCounters,
    pub payload: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl TaskRun {
    /// Invariant I3: `worker_id` is populated iff `status = running`.
    pub fn worker_invariant_holds(&self) -> bool {
        (self.status == TaskRunStatus::Running) == self.worker_id.is_some()
    }

    pub fn has_attempts_remaining(&self) -> bool {
        self.attempts < self.max_attempts
    }
}

/// `backoff(n) = min(60s * 2^(n-1), 15m)` plus +/-20% jitter (spec §4.6).
pub fn backoff_base_seconds(attempts: u32) -> i64 {
    let exp = attempts.saturating_sub(1).min(32);
    let secs = 60i64.saturating_mul(1i64 << exp.min(20));
    secs.min(15 * 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_orders_high_before_low() {
        let mut ps = vec![Priority::Low, Priority::High, Priority::Normal];
        ps.sort();
        assert_eq!(ps, vec![Priority::High, Priority::Normal, Priority::Low]);
    }

    #[test]
    fn state_machine_allows_only_listed_transitions() {
        use TaskRunStatus::*;
        assert!(Pending.can_transition_to(Running));
        assert!(Pending.can_transition_to(Cancelled));
        assert!(Running.can_transition_to(Completed));
        assert!(Running.can_transition_to(Failed));
        assert!(Running.can_transition_to(Cancelled));
        assert!(Running.can_transition_to(Pending));

        assert!(!Pending.can_transition_to(Completed));
        assert!(!Completed.can_transition_to(Running));
        assert!(!Cancelled.can_transition_to(Pending));
        assert!(!Failed.can_transition_to(Pending));
    }

    #[test]
    fn backoff_doubles_then_caps_at_fifteen_minutes() {
        assert_eq!(backoff_base_seconds(1), 60);
        assert_eq!(backoff_base_seconds(2), 120);
        assert_eq!(backoff_base_seconds(3), 240);
        assert_eq!(backoff_base_seconds(10), 15 * 60);
    }

    #[test]
    fn error_kind_maps_to_failure_kind() {
        use crate::error::ErrorKind;
        assert_eq!(FailureKind::from(ErrorKind::Transient), FailureKind::Retryable);
        assert_eq!(FailureKind::from(ErrorKind::InvalidInput), FailureKind::Permanent);
        assert_eq!(FailureKind::from(ErrorKind::Cancelled), FailureKind::Cancelled);
    }
}
