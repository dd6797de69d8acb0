// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! MediaServer repository: CRUD over the `media_servers` table (spec §6).
//! Informational only — not consumed by the core pipeline (spec §3).

use crate::error::QueueError;
use sqlx::{Row, SqlitePool};
use strmsync_core::{MediaServer, MediaServerKind};

fn kind_from_str(s: &str) -> Result<MediaServerKind, QueueError> {
    match s {
        "emby" => Ok(MediaServerKind::Emby),
        "jellyfin" => Ok(MediaServerKind::Jellyfin),
        "plex" => Ok(MediaServerKind::Plex),
        other => Err(QueueError::Malformed(format!("unknown media server kind {other}"))),
    }
}

fn kind_str(k: MediaServerKind) -> &'static str {
    match k {
        MediaServerKind::Emby => "emby",
        MediaServerKind::Jellyfin => "jellyfin",
        MediaServerKind::Plex => "plex",
    }
}

fn row_to_media_server(row: &sqlx::sqlite::SqliteRow) -> Result<MediaServer, QueueError> {
    Ok(MediaServer {
        id: row.try_get::<String, _>("id")?.into(),
        name: row.try_get("name")?,
        kind: kind_from_str(&row.try_get::<String, _>("kind")?)?,
        base_url: row.try_get("base_url")?,
        api_key: row.try_get("api_key")?,
    })
}

pub async fn insert(pool: &SqlitePool, server: &MediaServer) -> Result<(), QueueError> {
    sqlx::query(
        "INSERT INTO media_servers (id, name, kind, base_url, api_key) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(server.id.as_str())
    .bind(&server.name)
    .bind(kind_str(server.kind))
    .bind(&server.base_url)
    .bind(&server.api_key)
    .execute(pool)
    .await
    .map_err(QueueError::from_insert)?;
    Ok(())
}

pub async fn get(pool: &SqlitePool, id: &str) -> Result<MediaServer, QueueError> {
    let row = sqlx::query("SELECT * FROM media_servers WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(QueueError::NotFound)?;
    row_to_media_server(&row)
}
