// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! DataServer: an addressable source a Driver can enumerate (spec §3).

use crate::ids::DataServerId;
use crate::job::StrmMode;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataServerKind {
    Local,
    CloudDrive2,
    OpenList,
}

impl DataServerKind {
    pub fn as_str(self) -> &'static str {
        match self {
            DataServerKind::Local => "local",
            DataServerKind::CloudDrive2 => "clouddrive2",
            DataServerKind::OpenList => "openlist",
        }
    }
}

/// Either an API key or a username/password pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum Credential {
    ApiKey { api_key: String },
    Basic { username: String, password: String },
}

/// Structured per-DataServer options (spec §3).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct DataServerOptions {
    /// Path the engine can read via a local mount, or directly for `local` servers.
    #[serde(default)]
    pub access_path: Option<String>,
    /// Path that appears in emitted `.strm` bodies when in local mode.
    #[serde(default)]
    pub mount_path: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    /// Request timeout in seconds; 0 means "use `app_settings` default" (spec §9).
    #[serde(default)]
    pub timeout_seconds: u64,
    /// DataServer-level default for STRM rendering; overridden by `JobOptions.strm_mode`.
    #[serde(default)]
    pub strm_mode: Option<StrmMode>,
}

/// An addressable source (spec §3). Content-hashed UID is assigned on
/// first persistence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataServer {
    pub id: DataServerId,
    pub name: String,
    pub kind: DataServerKind,
    pub host: String,
    pub port: u16,
    pub credential: Option<Credential>,
    pub enabled: bool,
    pub options: DataServerOptions,
    pub uid: String,
}

impl DataServer {
    /// Content hash of the identity-bearing fields, used as the persisted
    /// `uid` the first time a DataServer row is written.
    pub fn compute_uid(kind: DataServerKind, host: &str, port: u16, name: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(kind.as_str().as_bytes());
        hasher.update(b"|");
        hasher.update(host.as_bytes());
        hasher.update(b"|");
        hasher.update(port.to_be_bytes());
        hasher.update(b"|");
        hasher.update(name.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compute_uid_is_deterministic_and_sensitive_to_each_field() {
        let a = DataServer::compute_uid(DataServerKind::Local, "host", 80, "n");
        let b = DataServer::compute_uid(DataServerKind::Local, "host", 80, "n");
        assert_eq!(a, b);

        let different_port = DataServer::compute_uid(DataServerKind::Local, "host", 81, "n");
        assert_ne!(a, different_port);

        let different_kind = DataServer::compute_uid(DataServerKind::OpenList, "host", 80, "n");
        assert_ne!(a, different_kind);
    }
}
