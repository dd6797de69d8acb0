// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job: a user-defined synchronization spec (spec §3).

use crate::ids::{DataServerId, JobId, MediaServerId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where the Job's source tree lives relative to the DataServer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WatchMode {
    Local,
    Api,
}

/// How metadata sidecars are replicated (spec §4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MetadataMode {
    Copy,
    Download,
    #[default]
    None,
}

/// How `.strm` bodies are rendered (spec §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrmMode {
    Local,
    Url,
}

/// Overall run status tracked on the Job row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    #[default]
    Idle,
    Running,
    Error,
}

/// A single ordered find/replace applied to a rendered `.strm` body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplaceRule {
    pub from: String,
    pub to: String,
}

/// `JobOptions.SyncOpts` (spec §3).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SyncOpts {
    /// Force update + no skip-existing.
    #[serde(default)]
    pub full_resync: bool,
    #[serde(default)]
    pub overwrite_meta: bool,
    #[serde(default)]
    pub skip_meta: bool,
}

/// Structured per-Job options (spec §3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobOptions {
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: u32,
    #[serde(default)]
    pub media_exts: Vec<String>,
    #[serde(default)]
    pub meta_exts: Vec<String>,
    #[serde(default)]
    pub exclude_dirs: Vec<String>,
    /// Minimum file size in MB; converted to bytes via [`JobOptions::min_file_size_bytes`].
    #[serde(default)]
    pub min_file_size_mb: u64,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default)]
    pub force_update: bool,
    #[serde(default)]
    pub skip_existing: bool,
    #[serde(default = "default_mod_time_epsilon")]
    pub mod_time_epsilon_seconds: i64,
    #[serde(default)]
    pub enable_orphan_cleanup: bool,
    #[serde(default)]
    pub orphan_cleanup_dry_run: bool,
    #[serde(default)]
    pub metadata_mode: MetadataMode,
    /// Job-level override; `None` falls back to the DataServer default (spec §9 open question b).
    #[serde(default)]
    pub strm_mode: Option<StrmMode>,
    #[serde(default)]
    pub prefer_remote_list: bool,
    #[serde(default)]
    pub strm_replace_rules: Vec<ReplaceRule>,
    #[serde(default)]
    pub sync_opts: SyncOpts,
}

fn default_max_concurrency() -> u32 {
    4
}

fn default_mod_time_epsilon() -> i64 {
    0
}

impl Default for JobOptions {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            media_exts: Vec::new(),
            meta_exts: Vec::new(),
            exclude_dirs: Vec::new(),
            min_file_size_mb: 0,
            dry_run: false,
            force_update: false,
            skip_existing: false,
            mod_time_epsilon_seconds: default_mod_time_epsilon(),
            enable_orphan_cleanup: false,
            orphan_cleanup_dry_run: false,
            metadata_mode: MetadataMode::None,
            strm_mode: None,
            prefer_remote_list: false,
            strm_replace_rules: Vec::new(),
            sync_opts: SyncOpts::default(),
        }
    }
}

impl JobOptions {
    /// Normalizes `media_exts`/`meta_exts` to lowercase, leading-dot form
    /// (spec §3: "lowercase, leading-dot normalized").
    pub fn normalize(&mut self) {
        self.media_exts = self.media_exts.iter().map(|e| normalize_ext(e)).collect();
        self.meta_exts = self.meta_exts.iter().map(|e| normalize_ext(e)).collect();
        if self.sync_opts.full_resync {
            self.force_update = true;
            self.skip_existing = false;
        }
    }

    pub fn min_file_size_bytes(&self) -> u64 {
        self.min_file_size_mb * 1024 * 1024
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency.max(1) as usize
    }
}

fn normalize_ext(ext: &str) -> String {
    let lower = ext.to_ascii_lowercase();
    if lower.starts_with('.') {
        lower
    } else {
        format!(".{lower}")
    }
}

/// A user-defined synchronization spec (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub name: String,
    pub enabled: bool,
    pub cron: Option<String>,
    pub watch_mode: WatchMode,
    pub source_path: String,
    pub remote_root: Option<String>,
    pub target_path: String,
    pub strm_path: Option<String>,
    pub data_server_id: DataServerId,
    pub media_server_id: Option<MediaServerId>,
    pub options: JobOptions,
    pub last_run_at: Option<DateTime<Utc>>,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Whether this Job should be picked up by the Scheduler (spec §4.7).
    pub fn is_schedulable(&self) -> bool {
        self.enabled && self.cron.as_ref().is_some_and(|c| !c.trim().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_lowercases_and_adds_leading_dot() {
        let mut opts = JobOptions {
            media_exts: vec!["MKV".into(), ".Mp4".into()],
            ..Default::default()
        };
        opts.normalize();
        assert_eq!(opts.media_exts, vec![".mkv".to_string(), ".mp4".to_string()]);
    }

    #[test]
    fn full_resync_forces_update_and_clears_skip_existing() {
        let mut opts = JobOptions {
            skip_existing: true,
            sync_opts: SyncOpts {
                full_resync: true,
                ..Default::default()
            },
            ..Default::default()
        };
        opts.normalize();
        assert!(opts.force_update);
        assert!(!opts.skip_existing);
    }

    #[test]
    fn min_file_size_converts_mb_to_bytes() {
        let opts = JobOptions {
            min_file_size_mb: 5,
            ..Default::default()
        };
        assert_eq!(opts.min_file_size_bytes(), 5 * 1024 * 1024);
    }

    #[test]
    fn is_schedulable_requires_enabled_and_nonblank_cron() {
        let base = Job {
            id: JobId::new("j1"),
            name: "n".into(),
            enabled: true,
            cron: Some("0 * * * * *".into()),
            watch_mode: WatchMode::Local,
            source_path: "/src".into(),
            remote_root: None,
            target_path: "/out".into(),
            strm_path: None,
            data_server_id: DataServerId::new("ds1"),
            media_server_id: None,
            options: JobOptions::default(),
            last_run_at: None,
            status: JobStatus::Idle,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert!(base.is_schedulable());

        let mut disabled = base.clone();
        disabled.enabled = false;
        assert!(!disabled.is_schedulable());

        let mut no_cron = base.clone();
        no_cron.cron = None;
        assert!(!no_cron.is_schedulable());

        let mut blank_cron = base;
        blank_cron.cron = Some("   ".into());
        assert!(!blank_cron.is_schedulable());
    }
}
