//! Spotify Web API client
//!
//! Client-credentials authentication, a client-side request ceiling, and
//! status mapping onto [`RemoteError`]. HTTP 429 is surfaced as
//! [`RemoteError::RateLimited`] carrying the server's `Retry-After`; the
//! retry loop itself lives in the fetcher, not here.

use super::{
    is_provider_id, MetadataService, RemoteAlbum, RemoteArtist, RemoteAudioFeatures, RemoteError, RemoteImage,
    RemoteTrack,
};
use async_trait::async_trait;
use governor::{Quota, RateLimiter};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::num::NonZeroU32;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

const SPOTIFY_API_BASE_URL: &str = "https://api.spotify.com/v1";
const SPOTIFY_TOKEN_URL: &str = "https://accounts.spotify.com/api/token";
const USER_AGENT: &str = concat!("spotan/", env!("CARGO_PKG_VERSION"));
const DEFAULT_RETRY_AFTER_SECS: u64 = 1;
/// Renew the access token this long before the provider expires it
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

struct AccessToken {
    value: String,
    expires_at: Instant,
}

#[derive(Debug, Deserialize)]
struct SpotifyImage {
    url: String,
    width: Option<u32>,
    height: Option<u32>,
}

/// `{ "id": ... }` reference to a related object; local files have no id
#[derive(Debug, Deserialize)]
struct SpotifyObjectRef {
    id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SpotifyTrack {
    id: String,
    name: String,
    duration_ms: i64,
    #[serde(default)]
    explicit: bool,
    preview_url: Option<String>,
    album: Option<SpotifyObjectRef>,
    #[serde(default)]
    artists: Vec<SpotifyObjectRef>,
}

#[derive(Debug, Deserialize)]
struct SpotifyAudioFeatures {
    acousticness: f32,
    danceability: f32,
    energy: f32,
    instrumentalness: f32,
    key: i64,
    liveness: f32,
    loudness: f32,
    mode: i64,
    speechiness: f32,
    tempo: f32,
    time_signature: f32,
    valence: f32,
}

#[derive(Debug, Deserialize)]
struct SpotifyAlbum {
    id: String,
    name: String,
    #[serde(default)]
    images: Vec<SpotifyImage>,
    release_date: Option<String>,
    #[serde(default)]
    artists: Vec<SpotifyObjectRef>,
}

#[derive(Debug, Deserialize)]
struct SpotifyArtist {
    id: String,
    name: String,
    #[serde(default)]
    images: Vec<SpotifyImage>,
    #[serde(default)]
    popularity: u32,
}

fn ids(refs: Vec<SpotifyObjectRef>) -> Vec<String> {
    refs.into_iter().filter_map(|r| r.id).collect()
}

fn images(images: Vec<SpotifyImage>) -> Vec<RemoteImage> {
    images
        .into_iter()
        .map(|i| RemoteImage {
            url: i.url,
            width: i.width,
            height: i.height,
        })
        .collect()
}

impl From<SpotifyTrack> for RemoteTrack {
    fn from(t: SpotifyTrack) -> Self {
        Self {
            id: t.id,
            name: t.name,
            duration_ms: t.duration_ms,
            explicit: t.explicit,
            preview_url: t.preview_url,
            album_id: t.album.and_then(|a| a.id),
            artist_ids: ids(t.artists),
        }
    }
}

impl From<SpotifyAudioFeatures> for RemoteAudioFeatures {
    fn from(f: SpotifyAudioFeatures) -> Self {
        Self {
            acousticness: f.acousticness,
            danceability: f.danceability,
            energy: f.energy,
            instrumentalness: f.instrumentalness,
            key: f.key,
            liveness: f.liveness,
            loudness: f.loudness,
            mode: f.mode,
            speechiness: f.speechiness,
            tempo: f.tempo,
            time_signature: f.time_signature,
            valence: f.valence,
        }
    }
}

impl From<SpotifyAlbum> for RemoteAlbum {
    fn from(a: SpotifyAlbum) -> Self {
        Self {
            id: a.id,
            name: a.name,
            images: images(a.images),
            release_date: a.release_date,
            artist_ids: ids(a.artists),
        }
    }
}

impl From<SpotifyArtist> for RemoteArtist {
    fn from(a: SpotifyArtist) -> Self {
        Self {
            id: a.id,
            name: a.name,
            images: images(a.images),
            popularity: a.popularity,
        }
    }
}

/// Backoff requested by a 429 response. Only the delta-seconds form is
/// honoured; anything else falls back to one second.
fn parse_retry_after(headers: &HeaderMap) -> Duration {
    let seconds = headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(DEFAULT_RETRY_AFTER_SECS);
    Duration::from_secs(seconds)
}

/// Object URL for a provider id; anything but base62 is refused before it
/// can reach the request path
fn resource_url(base: &str, resource: &str, id: &str) -> Result<String, RemoteError> {
    if !is_provider_id(id) {
        return Err(RemoteError::InvalidId(id.to_string()));
    }
    Ok(format!("{}/{}/{}", base, resource, id))
}

/// Spotify Web API client
pub struct SpotifyClient {
    http_client: reqwest::Client,
    api_base_url: String,
    token_url: String,
    client_id: String,
    client_secret: String,
    token: Mutex<Option<AccessToken>>,
    rate_limiter: RateLimiter<
        governor::state::NotKeyed,
        governor::state::InMemoryState,
        governor::clock::DefaultClock,
    >,
}

impl SpotifyClient {
    pub fn new(
        client_id: String,
        client_secret: String,
        requests_per_second: NonZeroU32,
    ) -> Result<Self, RemoteError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| RemoteError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            api_base_url: SPOTIFY_API_BASE_URL.to_string(),
            token_url: SPOTIFY_TOKEN_URL.to_string(),
            client_id,
            client_secret,
            token: Mutex::new(None),
            rate_limiter: RateLimiter::direct(Quota::per_second(requests_per_second)),
        })
    }

    /// Current access token, requesting a new one when absent or expiring
    async fn access_token(&self) -> Result<String, RemoteError> {
        let mut token = self.token.lock().await;

        if let Some(current) = token.as_ref() {
            if Instant::now() + TOKEN_EXPIRY_MARGIN < current.expires_at {
                return Ok(current.value.clone());
            }
        }

        tracing::debug!("Requesting Spotify access token");

        let response = self
            .http_client
            .post(&self.token_url)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(|e| RemoteError::Network(e.to_string()))?;

        let status = response.status();
        if status == 400 || status == 401 {
            let error_text = response.text().await.unwrap_or_default();
            return Err(RemoteError::Unauthorized(error_text));
        }
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(RemoteError::Api(status.as_u16(), error_text));
        }

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| RemoteError::Parse(e.to_string()))?;

        let value = body.access_token;
        *token = Some(AccessToken {
            value: value.clone(),
            expires_at: Instant::now() + Duration::from_secs(body.expires_in),
        });

        tracing::info!(expires_in = body.expires_in, "Obtained Spotify access token");

        Ok(value)
    }

    /// GET `<base>/<resource>/<id>`
    async fn get_json<T: DeserializeOwned>(
        &self,
        resource: &str,
        id: &str,
    ) -> Result<T, RemoteError> {
        let url = resource_url(&self.api_base_url, resource, id)?;

        self.rate_limiter.until_ready().await;

        let token = self.access_token().await?;

        tracing::debug!(url = %url, "Querying Spotify API");

        let response = self
            .http_client
            .get(&url)
            .bearer_auth(&token)
            .send()
            .await
            .map_err(|e| RemoteError::Network(e.to_string()))?;

        let status = response.status();

        if status == 404 {
            return Err(RemoteError::NotFound(id.to_string()));
        }

        if status == 429 {
            return Err(RemoteError::RateLimited {
                retry_after: parse_retry_after(response.headers()),
            });
        }

        if status == 401 {
            // Force re-authentication on the next call
            self.token.lock().await.take();
            let error_text = response.text().await.unwrap_or_default();
            return Err(RemoteError::Unauthorized(error_text));
        }

        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(RemoteError::Api(status.as_u16(), error_text));
        }

        response
            .json()
            .await
            .map_err(|e| RemoteError::Parse(e.to_string()))
    }
}

#[async_trait]
impl MetadataService for SpotifyClient {
    async fn get_track(&self, id: &str) -> Result<RemoteTrack, RemoteError> {
        let track: SpotifyTrack = self.get_json("tracks", id).await?;
        Ok(track.into())
    }

    async fn get_audio_features(&self, id: &str) -> Result<RemoteAudioFeatures, RemoteError> {
        let features: SpotifyAudioFeatures =
            self.get_json("audio-features", id).await?;
        Ok(features.into())
    }

    async fn get_album(&self, id: &str) -> Result<RemoteAlbum, RemoteError> {
        let album: SpotifyAlbum = self.get_json("albums", id).await?;
        Ok(album.into())
    }

    async fn get_artist(&self, id: &str) -> Result<RemoteArtist, RemoteError> {
        let artist: SpotifyArtist = self.get_json("artists", id).await?;
        Ok(artist.into())
    }
}
