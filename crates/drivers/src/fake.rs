// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! An in-memory [`Driver`] for engine/executor tests, mirroring the
//! teacher's fake-adapter pattern.

use crate::driver::{Driver, ListOptions, RemoteEntry};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use strmsync_core::{DataServerKind, TaskError};

#[derive(Debug, Clone)]
pub struct FakeDriver {
    kind: DataServerKind,
    entries: Arc<Mutex<Vec<RemoteEntry>>>,
    contents: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    fail_with: Arc<Mutex<Option<TaskError>>>,
}

impl FakeDriver {
    pub fn new(kind: DataServerKind, entries: Vec<RemoteEntry>) -> Self {
        Self {
            kind,
            entries: Arc::new(Mutex::new(entries)),
            contents: Arc::new(Mutex::new(HashMap::new())),
            fail_with: Arc::new(Mutex::new(None)),
        }
    }

    /// Makes every subsequent `list` call return `err` instead of entries.
    pub fn fail_next_list_with(&self, err: TaskError) {
        *self.fail_with.lock() = Some(err);
    }

    /// Registers the bytes `read(path)` should return.
    pub fn with_content(&self, path: impl Into<String>, bytes: impl Into<Vec<u8>>) {
        self.contents.lock().insert(path.into(), bytes.into());
    }
}

#[async_trait]
impl Driver for FakeDriver {
    fn kind(&self) -> DataServerKind {
        self.kind
    }

    async fn list(&self, path: &str, _opts: ListOptions) -> Result<Vec<RemoteEntry>, TaskError> {
        if let Some(err) = self.fail_with.lock().take() {
            return Err(err);
        }
        let prefix = if path.is_empty() || path == "/" { String::new() } else { path.to_string() };
        Ok(self
            .entries
            .lock()
            .iter()
            .filter(|e| e.path.starts_with(&prefix))
            .cloned()
            .collect())
    }

    async fn read(&self, path: &str) -> Result<Vec<u8>, TaskError> {
        self.contents
            .lock()
            .get(path)
            .cloned()
            .ok_or_else(|| TaskError::not_found(format!("no fake content registered for {path}")))
    }
}
