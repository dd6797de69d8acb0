// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Identifier newtypes for the domain model.

crate::define_id! {
    /// Unique identifier for a Job.
    pub struct JobId;
}

crate::define_id! {
    /// Unique identifier for a DataServer.
    pub struct DataServerId;
}

crate::define_id! {
    /// Unique identifier for a MediaServer.
    pub struct MediaServerId;
}

crate::define_id! {
    /// Unique identifier for a TaskRun (the queue unit).
    pub struct TaskRunId;
}

crate::define_id! {
    /// Unique identifier for a TaskRunEvent.
    pub struct TaskRunEventId;
}
