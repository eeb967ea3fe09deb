//! Raw play record, one per entry of the listening history

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One track play as reported by the listening history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayRecord {
    /// When playback stopped (UTC)
    pub stopped_at: DateTime<Utc>,
    pub username: String,
    /// `scheme:type:id`, absent for podcast episodes and unknown content
    pub track_uri: Option<String>,
    pub ms_played: i64,
    pub shuffle: bool,
    pub incognito_mode: bool,
    pub reason_start: Option<String>,
    pub reason_end: Option<String>,
    /// Display-only metadata used in log messages
    pub track_name: Option<String>,
    pub artist_name: Option<String>,
}

impl PlayRecord {
    /// `stopped_at - ms_played`; `None` if that is not a representable instant
    pub fn start(&self) -> Option<DateTime<Utc>> {
        spotan_common::time::start_from_stop(self.stopped_at, self.ms_played)
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.stopped_at
    }

    /// Track URI, if present and not blank
    pub fn track_reference(&self) -> Option<&str> {
        self.track_uri
            .as_deref()
            .map(str::trim)
            .filter(|uri| !uri.is_empty())
    }

    /// `Track - Artist` for log messages
    pub fn display_name(&self) -> String {
        format!(
            "{} - {}",
            self.track_name.as_deref().unwrap_or("<unknown track>"),
            self.artist_name.as_deref().unwrap_or("<unknown artist>")
        )
    }
}
