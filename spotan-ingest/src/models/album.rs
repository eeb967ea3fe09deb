//! Album entity

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Album as stored and cached
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Album {
    /// Provider id
    pub spotify_id: String,
    pub name: String,
    pub image_url: Option<String>,
    /// Normalized release date (year/month precision is widened to a day)
    pub release_date: Option<NaiveDate>,
    /// Artist ids in provider credit order
    pub artist_ids: Vec<String>,
    pub last_refreshed: DateTime<Utc>,
}
