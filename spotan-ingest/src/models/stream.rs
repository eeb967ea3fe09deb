//! Deduplicated play ("stream")

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Natural key of a stream.
///
/// A user can play the same track many times; the end instant tells the
/// repeats apart.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StreamKey {
    pub username: String,
    pub track_id: String,
    pub end: DateTime<Utc>,
}

/// A deduplicated play
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stream {
    pub username: String,
    /// Provider id of the played track
    pub track_id: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub duration_ms: i64,
    pub reason_start: Option<String>,
    pub reason_end: Option<String>,
    pub shuffle: bool,
    pub incognito_mode: bool,
}

impl Stream {
    pub fn key(&self) -> StreamKey {
        StreamKey {
            username: self.username.clone(),
            track_id: self.track_id.clone(),
            end: self.end,
        }
    }
}
