//! Extended streaming history (`endsong_*.json`) reader
//!
//! Each file is a JSON array of end-song entries. Only the fields the
//! ingestion needs are decoded; the export carries more (platform, IP
//! address, episode data) which are ignored.

use crate::models::PlayRecord;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer};
use spotan_common::{Error, Result};
use std::path::Path;

#[derive(Debug, Deserialize)]
struct EndSongEntry {
    /// When the track stopped playing (UTC)
    #[serde(deserialize_with = "deserialize_utc")]
    ts: DateTime<Utc>,
    #[serde(default)]
    username: String,
    #[serde(default)]
    ms_played: i64,
    master_metadata_track_name: Option<String>,
    master_metadata_album_artist_name: Option<String>,
    spotify_track_uri: Option<String>,
    reason_start: Option<String>,
    reason_end: Option<String>,
    shuffle: Option<bool>,
    incognito_mode: Option<bool>,
}

impl From<EndSongEntry> for PlayRecord {
    fn from(entry: EndSongEntry) -> Self {
        Self {
            stopped_at: entry.ts,
            username: entry.username,
            track_uri: entry.spotify_track_uri,
            ms_played: entry.ms_played,
            shuffle: entry.shuffle.unwrap_or(false),
            incognito_mode: entry.incognito_mode.unwrap_or(false),
            reason_start: entry.reason_start,
            reason_end: entry.reason_end,
            track_name: entry.master_metadata_track_name,
            artist_name: entry.master_metadata_album_artist_name,
        }
    }
}

/// RFC 3339, or a bare `YYYY-MM-DDTHH:MM:SS` taken as UTC
fn deserialize_utc<'de, D>(deserializer: D) -> std::result::Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    if let Ok(ts) = DateTime::parse_from_rfc3339(&raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|e| serde::de::Error::custom(format!("invalid timestamp {:?}: {}", raw, e)))
}

/// Parse one history file's content
pub fn parse_end_songs(content: &str) -> Result<Vec<PlayRecord>> {
    let entries: Vec<EndSongEntry> = serde_json::from_str(content)
        .map_err(|e| Error::InvalidInput(format!("Parse streaming history failed: {}", e)))?;
    Ok(entries.into_iter().map(PlayRecord::from).collect())
}

/// Read and concatenate the given history files, in order
pub fn read_streaming_history<P: AsRef<Path>>(paths: &[P]) -> Result<Vec<PlayRecord>> {
    let mut history = Vec::new();

    for path in paths {
        let path = path.as_ref();
        tracing::info!("Reading [{}] contents", path.display());

        let content = std::fs::read_to_string(path)?;
        tracing::debug!(bytes = content.len(), "Parsing end songs");

        let records = parse_end_songs(&content)
            .map_err(|e| Error::InvalidInput(format!("{}: {}", path.display(), e)))?;
        tracing::info!("Parsed [{}] entries from {}", records.len(), path.display());

        history.extend(records);
    }

    Ok(history)
}
