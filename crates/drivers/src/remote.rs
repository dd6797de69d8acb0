// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `clouddrive2` and `openlist`: thin HTTP-shaped clients modeling
//! timeout/auth/not-found classification (spec §4.1, §9). The real
//! CloudDrive2 gRPC and OpenList REST wire protocols are out of scope
//! (spec §1) — [`HttpRemoteClient`] is a generic JSON listing client that
//! both driver kinds are built on, standing in for whichever production
//! client eventually implements [`RemoteClient`].

use crate::driver::{Driver, ListOptions, RemoteEntry};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::fmt;
use std::time::Duration;
use strmsync_core::{DataServerKind, TaskError};

/// The contract a production CloudDrive2/OpenList client fulfills.
#[async_trait]
pub trait RemoteClient: fmt::Debug + Send + Sync {
    async fn list_entries(&self, path: &str, opts: ListOptions) -> Result<Vec<RemoteEntry>, TaskError>;

    /// Reads a file's bytes. Default errors `NotSupported`; overridden by
    /// clients that can serve downloads (spec §4.5 `download` strategy).
    async fn read_entry(&self, path: &str) -> Result<Vec<u8>, TaskError> {
        Err(TaskError::not_supported(format!("read not supported for {path}")))
    }
}

#[derive(Debug, Deserialize)]
struct WireEntry {
    path: String,
    name: String,
    is_dir: bool,
    size: u64,
    mod_time: DateTime<Utc>,
}

impl From<WireEntry> for RemoteEntry {
    fn from(w: WireEntry) -> Self {
        RemoteEntry {
            path: w.path,
            name: w.name,
            is_dir: w.is_dir,
            size: w.size,
            mod_time: w.mod_time,
        }
    }
}

/// A generic REST/JSON listing client: `GET {base_url}/api/list?path=..&recursive=..&max_depth=..`
/// returning a JSON array of [`WireEntry`]. Not the authoritative wire
/// format for either data server kind — a placeholder implementation of
/// [`RemoteClient`] so the two driver kinds have something runnable to
/// delegate to.
#[derive(Debug, Clone)]
pub struct HttpRemoteClient {
    base_url: String,
    api_key: Option<String>,
    timeout: Duration,
    http: reqwest::Client,
}

impl HttpRemoteClient {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>, timeout_seconds: u64) -> Self {
        Self {
            base_url: base_url.into(),
            api_key,
            timeout: Duration::from_secs(timeout_seconds),
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl RemoteClient for HttpRemoteClient {
    async fn list_entries(&self, path: &str, opts: ListOptions) -> Result<Vec<RemoteEntry>, TaskError> {
        let url = format!("{}/api/list", self.base_url.trim_end_matches('/'));
        let mut req = self
            .http
            .get(url)
            .query(&[
                ("path", path.to_string()),
                ("recursive", opts.recursive.to_string()),
                ("max_depth", opts.clamped_max_depth().to_string()),
            ])
            .timeout(self.timeout);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let resp = req.send().await.map_err(classify_reqwest_error)?;
        match resp.status() {
            reqwest::StatusCode::UNAUTHORIZED | reqwest::StatusCode::FORBIDDEN => {
                return Err(TaskError::disabled(format!(
                    "authentication rejected: {}",
                    resp.status()
                )));
            }
            reqwest::StatusCode::NOT_FOUND => {
                return Err(TaskError::not_found(format!("remote path not found: {path}")));
            }
            status if !status.is_success() => {
                return Err(TaskError::transient(format!("remote list failed: {status}")));
            }
            _ => {}
        }

        let entries: Vec<WireEntry> = resp
            .json()
            .await
            .map_err(|e| TaskError::transient(format!("decode list response: {e}")))?;
        Ok(entries.into_iter().map(RemoteEntry::from).collect())
    }

    async fn read_entry(&self, path: &str) -> Result<Vec<u8>, TaskError> {
        let url = format!("{}/api/read", self.base_url.trim_end_matches('/'));
        let mut req = self.http.get(url).query(&[("path", path)]).timeout(self.timeout);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let resp = req.send().await.map_err(classify_reqwest_error)?;
        match resp.status() {
            reqwest::StatusCode::UNAUTHORIZED | reqwest::StatusCode::FORBIDDEN => {
                return Err(TaskError::disabled(format!(
                    "authentication rejected: {}",
                    resp.status()
                )));
            }
            reqwest::StatusCode::NOT_FOUND => {
                return Err(TaskError::not_found(format!("remote path not found: {path}")));
            }
            status if !status.is_success() => {
                return Err(TaskError::transient(format!("remote read failed: {status}")));
            }
            _ => {}
        }
        let bytes = resp.bytes().await.map_err(|e| TaskError::transient(format!("read body: {e}")))?;
        Ok(bytes.to_vec())
    }
}

fn classify_reqwest_error(err: reqwest::Error) -> TaskError {
    if err.is_timeout() || err.is_connect() {
        TaskError::transient(err)
    } else {
        TaskError::transient(err)
    }
}

macro_rules! remote_driver {
    ($name:ident, $kind:expr, $doc:expr) => {
        #[doc = $doc]
        #[derive(Debug)]
        pub struct $name<C: RemoteClient> {
            client: C,
        }

        impl<C: RemoteClient> $name<C> {
            pub fn new(client: C) -> Self {
                Self { client }
            }
        }

        #[async_trait]
        impl<C: RemoteClient> Driver for $name<C> {
            fn kind(&self) -> DataServerKind {
                $kind
            }

            async fn list(&self, path: &str, opts: ListOptions) -> Result<Vec<RemoteEntry>, TaskError> {
                self.client.list_entries(path, opts).await
            }

            async fn read(&self, path: &str) -> Result<Vec<u8>, TaskError> {
                self.client.read_entry(path).await
            }
        }
    };
}

remote_driver!(CloudDrive2Driver, DataServerKind::CloudDrive2, "CloudDrive2 (gRPC source) driver.");
remote_driver!(OpenListDriver, DataServerKind::OpenList, "OpenList (REST source) driver.");
