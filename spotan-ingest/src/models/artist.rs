//! Artist entity

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Artist as stored and cached
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artist {
    /// Provider id
    pub spotify_id: String,
    pub name: String,
    /// First (largest) image reported by the provider
    pub image_url: Option<String>,
    /// Provider popularity score, 0-100
    pub popularity: u32,
    pub last_refreshed: DateTime<Utc>,
}
