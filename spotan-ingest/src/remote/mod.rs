//! Remote metadata service
//!
//! The core only sees the [`MetadataService`] trait and the plain data it
//! returns; [`SpotifyClient`] is the production implementation.

pub mod spotify_client;

pub use spotify_client::SpotifyClient;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Metadata service errors
#[derive(Debug, Clone, Error)]
pub enum RemoteError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// The service asked us to back off for `retry_after`
    #[error("Rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("API error {0}: {1}")]
    Api(u16, String),

    #[error("Parse error: {0}")]
    Parse(String),

    /// Id that cannot name a provider object; never sent upstream
    #[error("Invalid id: {0:?}")]
    InvalidId(String),
}

/// Provider ids are non-empty base62 strings
pub fn is_provider_id(id: &str) -> bool {
    !id.is_empty() && id.bytes().all(|b| b.is_ascii_alphanumeric())
}

/// Image reference; the provider lists the largest first
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteImage {
    pub url: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RemoteTrack {
    pub id: String,
    pub name: String,
    pub duration_ms: i64,
    pub explicit: bool,
    pub preview_url: Option<String>,
    pub album_id: Option<String>,
    pub artist_ids: Vec<String>,
}

/// Raw audio features; `key` and `mode` are the provider's integers
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteAudioFeatures {
    pub acousticness: f32,
    pub danceability: f32,
    pub energy: f32,
    pub instrumentalness: f32,
    pub key: i64,
    pub liveness: f32,
    pub loudness: f32,
    pub mode: i64,
    pub speechiness: f32,
    pub tempo: f32,
    pub time_signature: f32,
    pub valence: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RemoteAlbum {
    pub id: String,
    pub name: String,
    pub images: Vec<RemoteImage>,
    /// `YYYY`, `YYYY-MM` or `YYYY-MM-DD`
    pub release_date: Option<String>,
    pub artist_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RemoteArtist {
    pub id: String,
    pub name: String,
    pub images: Vec<RemoteImage>,
    pub popularity: u32,
}

/// Read operations the ingestion core needs from the metadata service.
///
/// Any call may fail with [`RemoteError::RateLimited`]; callers go through
/// [`crate::services::RateLimitedFetcher`] to absorb it.
#[async_trait]
pub trait MetadataService: Send + Sync {
    async fn get_track(&self, id: &str) -> Result<RemoteTrack, RemoteError>;

    async fn get_audio_features(&self, id: &str) -> Result<RemoteAudioFeatures, RemoteError>;

    async fn get_album(&self, id: &str) -> Result<RemoteAlbum, RemoteError>;

    async fn get_artist(&self, id: &str) -> Result<RemoteArtist, RemoteError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_id_is_base62() {
        assert!(is_provider_id("4uLU6hMCjMI75M1A2tKUQC"));
        assert!(!is_provider_id(""));
        assert!(!is_provider_id("AL1/../tracks"));
        assert!(!is_provider_id("id?market=SE"));
        assert!(!is_provider_id("caf\u{e9}"));
    }
}
