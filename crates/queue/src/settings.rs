// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `app_settings`: a single JSON row holding the process-wide [`AppSettings`]
//! defaults (spec §3, §9).

use crate::error::QueueError;
use sqlx::{Row, SqlitePool};
use strmsync_core::AppSettings;

const KEY: &str = "app_settings";

pub async fn load(pool: &SqlitePool) -> Result<AppSettings, QueueError> {
    let row = sqlx::query("SELECT value FROM app_settings WHERE key = ?")
        .bind(KEY)
        .fetch_optional(pool)
        .await?;
    match row {
        Some(row) => {
            let value: String = row.try_get("value")?;
            serde_json::from_str(&value)
                .map_err(|e| QueueError::Malformed(format!("app_settings: {e}")))
        }
        None => Ok(AppSettings::default()),
    }
}

pub async fn save(pool: &SqlitePool, settings: &AppSettings) -> Result<(), QueueError> {
    let value = serde_json::to_string(settings)
        .map_err(|e| QueueError::Malformed(format!("app_settings: {e}")))?;
    sqlx::query(
        "INSERT INTO app_settings (key, value) VALUES (?, ?) \
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
    )
    .bind(KEY)
    .bind(value)
    .execute(pool)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::connect_in_memory;

    #[tokio::test]
    async fn load_without_a_row_returns_defaults() {
        let pool = connect_in_memory().await.unwrap();
        let settings = load(&pool).await.unwrap();
        assert_eq!(settings, AppSettings::default());
    }

    #[tokio::test]
    async fn save_then_load_roundtrips() {
        let pool = connect_in_memory().await.unwrap();
        let mut settings = AppSettings::default();
        settings.default_concurrency = 8;
        save(&pool, &settings).await.unwrap();

        let loaded = load(&pool).await.unwrap();
        assert_eq!(loaded.default_concurrency, 8);
    }

    #[tokio::test]
    async fn save_twice_overwrites() {
        let pool = connect_in_memory().await.unwrap();
        let mut settings = AppSettings::default();
        save(&pool, &settings).await.unwrap();
        settings.default_rate_limit_per_sec = 5;
        save(&pool, &settings).await.unwrap();

        let loaded = load(&pool).await.unwrap();
        assert_eq!(loaded.default_rate_limit_per_sec, 5);
    }
}
