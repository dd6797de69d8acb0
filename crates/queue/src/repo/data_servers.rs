// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! DataServer repository: CRUD over the `data_servers` table (spec §6).

use crate::error::QueueError;
use sqlx::{Row, SqlitePool};
use strmsync_core::{Credential, DataServer, DataServerKind, DataServerOptions};

fn kind_from_str(s: &str) -> Result<DataServerKind, QueueError> {
    match s {
        "local" => Ok(DataServerKind::Local),
        "clouddrive2" => Ok(DataServerKind::CloudDrive2),
        "openlist" => Ok(DataServerKind::OpenList),
        other => Err(QueueError::Malformed(format!("unknown data server kind {other}"))),
    }
}

fn row_to_data_server(row: &sqlx::sqlite::SqliteRow) -> Result<DataServer, QueueError> {
    let credential_json: Option<String> = row.try_get("credential")?;
    let credential: Option<Credential> = credential_json
        .map(|s| serde_json::from_str(&s))
        .transpose()
        .map_err(|e| QueueError::Malformed(format!("credential: {e}")))?;
    let options_json: String = row.try_get("options")?;
    let options: DataServerOptions = serde_json::from_str(&options_json)
        .map_err(|e| QueueError::Malformed(format!("data server options: {e}")))?;

    Ok(DataServer {
        id: row.try_get::<String, _>("id")?.into(),
        name: row.try_get("name")?,
        kind: kind_from_str(&row.try_get::<String, _>("kind")?)?,
        host: row.try_get("host")?,
        port: row.try_get::<i64, _>("port")? as u16,
        credential,
        enabled: row.try_get::<i64, _>("enabled")? != 0,
        options,
        uid: row.try_get("uid")?,
    })
}

pub async fn insert(pool: &SqlitePool, server: &DataServer) -> Result<(), QueueError> {
    let credential_json = server
        .credential
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(|e| QueueError::Malformed(format!("credential: {e}")))?;
    let options_json = serde_json::to_string(&server.options)
        .map_err(|e| QueueError::Malformed(format!("data server options: {e}")))?;

    sqlx::query(
        "INSERT INTO data_servers (id, name, kind, host, port, credential, enabled, options, uid) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(server.id.as_str())
    .bind(&server.name)
    .bind(server.kind.as_str())
    .bind(&server.host)
    .bind(server.port as i64)
    .bind(credential_json)
    .bind(server.enabled as i64)
    .bind(options_json)
    .bind(&server.uid)
    .execute(pool)
    .await
    .map_err(QueueError::from_insert)?;
    Ok(())
}

pub async fn get(pool: &SqlitePool, id: &str) -> Result<DataServer, QueueError> {
    let row = sqlx::query("SELECT * FROM data_servers WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(QueueError::NotFound)?;
    row_to_data_server(&row)
}

pub async fn list(pool: &SqlitePool) -> Result<Vec<DataServer>, QueueError> {
    let rows = sqlx::query("SELECT * FROM data_servers ORDER BY name")
        .fetch_all(pool)
        .await?;
    rows.iter().map(row_to_data_server).collect()
}
