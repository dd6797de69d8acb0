// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `app_settings`: the only Setting keys the core reads (spec §3, §9).
//!
//! Values are override-if-nonzero defaults merged in at Driver construction
//! time when a DataServer leaves the corresponding field at 0.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AppSettings {
    pub default_concurrency: u32,
    pub default_rate_limit_per_sec: u32,
    pub auto_refresh_interval_seconds: u32,
    pub default_driver_timeout_seconds: u64,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            default_concurrency: 4,
            default_rate_limit_per_sec: 0,
            auto_refresh_interval_seconds: 0,
            default_driver_timeout_seconds: 10,
        }
    }
}

impl AppSettings {
    /// Merge this DataServer's configured timeout over the setting default,
    /// per the "override-if-nonzero" rule (spec §9).
    pub fn effective_timeout_seconds(&self, data_server_timeout: u64) -> u64 {
        if data_server_timeout == 0 {
            self.default_driver_timeout_seconds
        } else {
            data_server_timeout
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_timeout_falls_back_to_default() {
        let settings = AppSettings::default();
        assert_eq!(settings.effective_timeout_seconds(0), 10);
        assert_eq!(settings.effective_timeout_seconds(30), 30);
    }
}
