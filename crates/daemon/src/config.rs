// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon configuration: a TOML file on disk (paths, pool size, logging)
//! with env var overrides for the database URL and log level (spec §10).
//! Business data — Jobs, DataServers, Settings — lives in SQL, not here.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

const DEFAULT_CONFIG_PATH: &str = "strmsyncd.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {0}: {1}")]
    Read(PathBuf, #[source] std::io::Error),

    #[error("failed to parse config file {0}: {1}")]
    Parse(PathBuf, #[source] toml::de::Error),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// sqlite connection string, e.g. `sqlite:///var/lib/strmsync/strmsync.db`.
    pub database_url: String,
    /// Max sqlite connections handed to `sqlx::SqlitePool`.
    pub max_db_connections: u32,
    /// Number of concurrent WorkerPool workers (spec §4.8).
    pub worker_concurrency: usize,
    /// Directory the rotating daemon log file lives in.
    pub log_dir: PathBuf,
    /// File name of the daemon log within `log_dir`.
    pub log_file: String,
    /// `tracing_subscriber::EnvFilter` directive, e.g. `info` or
    /// `strmsync_engine=debug,info`. Overridden by `RUST_LOG` if set.
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: "sqlite://strmsync.db".into(),
            max_db_connections: 5,
            worker_concurrency: 4,
            log_dir: PathBuf::from("."),
            log_file: "strmsyncd.log".into(),
            log_level: "info".into(),
        }
    }
}

impl Config {
    /// Loads `path` (or `strmsyncd.toml` in the current directory if the
    /// caller passes `None` and that file does not exist, the built-in
    /// defaults apply), then applies env var overrides for the database URL
    /// and log level so operators can tweak those without editing the file.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path.map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));

        let mut config = if path.exists() {
            let raw = std::fs::read_to_string(&path).map_err(|e| ConfigError::Read(path.clone(), e))?;
            toml::from_str(&raw).map_err(|e| ConfigError::Parse(path.clone(), e))?
        } else {
            Config::default()
        };

        if let Ok(url) = std::env::var("STRMSYNC_DATABASE_URL") {
            config.database_url = url;
        }
        if let Ok(level) = std::env::var("RUST_LOG") {
            config.log_level = level;
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_no_file_present() {
        let config = Config::load(Some(Path::new("/nonexistent/strmsyncd.toml"))).unwrap();
        assert_eq!(config.worker_concurrency, 4);
        assert_eq!(config.database_url, "sqlite://strmsync.db");
    }

    #[test]
    fn toml_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("strmsyncd.toml");
        std::fs::write(
            &path,
            "database_url = \"sqlite:///data/strmsync.db\"\nworker_concurrency = 8\n",
        )
        .unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.database_url, "sqlite:///data/strmsync.db");
        assert_eq!(config.worker_concurrency, 8);
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn env_var_overrides_toml_database_url() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("strmsyncd.toml");
        std::fs::write(&path, "database_url = \"sqlite:///data/strmsync.db\"\n").unwrap();

        std::env::set_var("STRMSYNC_DATABASE_URL", "sqlite:///override.db");
        let config = Config::load(Some(&path)).unwrap();
        std::env::remove_var("STRMSYNC_DATABASE_URL");

        assert_eq!(config.database_url, "sqlite:///override.db");
    }
}
