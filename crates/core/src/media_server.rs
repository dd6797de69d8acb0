// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! MediaServer: an informational target (Emby/Jellyfin/Plex). Not
//! consumed by the core; kept so Jobs can reference one (spec §3).

use crate::ids::MediaServerId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaServerKind {
    Emby,
    Jellyfin,
    Plex,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaServer {
    pub id: MediaServerId,
    pub name: String,
    pub kind: MediaServerKind,
    pub base_url: String,
    pub api_key: Option<String>,
}
