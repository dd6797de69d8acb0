// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The sink a [`crate::engine::SyncEngine`] and [`crate::metadata::MetadataReplicator`]
//! report through. The Executor supplies the concrete implementation that
//! persists progress/events to the queue; tests supply an in-memory one.

use async_trait::async_trait;
use strmsync_core::{ProgressCounters, TaskRunEvent};

/// Callbacks a sync run reports through. Implementations must be cheap to
/// call from many concurrent workers — the Executor's implementation
/// batches events and throttles progress writes internally.
#[async_trait]
pub trait EngineEvents: Send + Sync {
    /// A progress snapshot, reported at least every 1s of wall time and
    /// every 128 processed items (spec §4.4.2).
    async fn on_progress(&self, progress: ProgressCounters);

    /// One per-file audit entry.
    async fn on_file_event(&self, event: TaskRunEvent);
}

/// Discards everything. Useful as a default in tests that only care about
/// the returned stats, not the event stream.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullEvents;

#[async_trait]
impl EngineEvents for NullEvents {
    async fn on_progress(&self, _progress: ProgressCounters) {}
    async fn on_file_event(&self, _event: TaskRunEvent) {}
}
