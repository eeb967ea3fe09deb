//! Test doubles shared by the integration tests
//!
//! `FakeMetadataService` serves a scripted catalog and counts calls per
//! endpoint; `MemoryStore` is an in-memory `EntityStore` that counts writes.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use spotan_common::{Error, Result};
use spotan_ingest::db::EntityStore;
use spotan_ingest::models::{Album, Artist, PlayRecord, Stream, StreamKey, Track};
use spotan_ingest::remote::{
    MetadataService, RemoteAlbum, RemoteArtist, RemoteAudioFeatures, RemoteError, RemoteImage,
    RemoteTrack,
};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

pub const TRACK_ID: &str = "ABC123";
pub const ALBUM_ID: &str = "AL1";
pub const ARTIST_1: &str = "AR1";
pub const ARTIST_2: &str = "AR2";

#[derive(Default)]
pub struct FakeMetadataService {
    tracks: Mutex<HashMap<String, RemoteTrack>>,
    features: Mutex<HashMap<String, RemoteAudioFeatures>>,
    albums: Mutex<HashMap<String, RemoteAlbum>>,
    artists: Mutex<HashMap<String, RemoteArtist>>,
    /// Pending 429 responses keyed by `"<endpoint>:<id>"`
    rate_limits: Mutex<HashMap<String, VecDeque<Duration>>>,
    latency: Mutex<Duration>,
    pub track_calls: AtomicUsize,
    pub feature_calls: AtomicUsize,
    pub album_calls: AtomicUsize,
    pub artist_calls: AtomicUsize,
}

pub fn features(key: i64, mode: i64) -> RemoteAudioFeatures {
    RemoteAudioFeatures {
        acousticness: 0.25,
        danceability: 0.5,
        energy: 0.75,
        instrumentalness: 0.0,
        key,
        liveness: 0.125,
        loudness: -6.5,
        mode,
        speechiness: 0.0625,
        tempo: 120.0,
        time_signature: 4.0,
        valence: 0.5,
    }
}

impl FakeMetadataService {
    pub fn new() -> Self {
        Self::default()
    }

    /// One track on one album, credited to two artists
    pub fn catalog() -> Self {
        let service = Self::new();
        service.add_artist(ARTIST_1, "First Artist");
        service.add_artist(ARTIST_2, "Second Artist");
        service.add_album(ALBUM_ID, &[ARTIST_1]);
        service.add_track(TRACK_ID, Some(ALBUM_ID), &[ARTIST_1, ARTIST_2]);
        service
    }

    pub fn add_artist(&self, id: &str, name: &str) {
        self.artists.lock().unwrap().insert(
            id.to_string(),
            RemoteArtist {
                id: id.to_string(),
                name: name.to_string(),
                images: vec![RemoteImage {
                    url: format!("https://img/{}", id),
                    width: Some(640),
                    height: Some(640),
                }],
                popularity: 50,
            },
        );
    }

    pub fn add_album(&self, id: &str, artist_ids: &[&str]) {
        self.albums.lock().unwrap().insert(
            id.to_string(),
            RemoteAlbum {
                id: id.to_string(),
                name: format!("Album {}", id),
                images: vec![],
                release_date: Some("2001-07".to_string()),
                artist_ids: artist_ids.iter().map(|s| s.to_string()).collect(),
            },
        );
    }

    pub fn add_track(&self, id: &str, album_id: Option<&str>, artist_ids: &[&str]) {
        self.tracks.lock().unwrap().insert(
            id.to_string(),
            RemoteTrack {
                id: id.to_string(),
                name: format!("Track {}", id),
                duration_ms: 215_000,
                explicit: false,
                preview_url: None,
                album_id: album_id.map(str::to_string),
                artist_ids: artist_ids.iter().map(|s| s.to_string()).collect(),
            },
        );
        self.features
            .lock()
            .unwrap()
            .insert(id.to_string(), features(5, 1));
    }

    pub fn set_features(&self, id: &str, value: RemoteAudioFeatures) {
        self.features.lock().unwrap().insert(id.to_string(), value);
    }

    /// Answer the next call to `endpoint` for `id` with a 429
    pub fn rate_limit_once(&self, endpoint: &str, id: &str, retry_after: Duration) {
        self.rate_limits
            .lock()
            .unwrap()
            .entry(format!("{}:{}", endpoint, id))
            .or_default()
            .push_back(retry_after);
    }

    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock().unwrap() = latency;
    }

    pub fn total_calls(&self) -> usize {
        self.track_calls.load(Ordering::SeqCst)
            + self.feature_calls.load(Ordering::SeqCst)
            + self.album_calls.load(Ordering::SeqCst)
            + self.artist_calls.load(Ordering::SeqCst)
    }

    async fn respond<T: Clone>(
        &self,
        endpoint: &str,
        id: &str,
        counter: &AtomicUsize,
        catalog: &Mutex<HashMap<String, T>>,
    ) -> std::result::Result<T, RemoteError> {
        counter.fetch_add(1, Ordering::SeqCst);

        let latency = *self.latency.lock().unwrap();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let limited = self
            .rate_limits
            .lock()
            .unwrap()
            .get_mut(&format!("{}:{}", endpoint, id))
            .and_then(VecDeque::pop_front);
        if let Some(retry_after) = limited {
            return Err(RemoteError::RateLimited { retry_after });
        }

        catalog
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| RemoteError::NotFound(id.to_string()))
    }
}

#[async_trait]
impl MetadataService for FakeMetadataService {
    async fn get_track(&self, id: &str) -> std::result::Result<RemoteTrack, RemoteError> {
        self.respond("track", id, &self.track_calls, &self.tracks).await
    }

    async fn get_audio_features(
        &self,
        id: &str,
    ) -> std::result::Result<RemoteAudioFeatures, RemoteError> {
        self.respond("features", id, &self.feature_calls, &self.features)
            .await
    }

    async fn get_album(&self, id: &str) -> std::result::Result<RemoteAlbum, RemoteError> {
        self.respond("album", id, &self.album_calls, &self.albums).await
    }

    async fn get_artist(&self, id: &str) -> std::result::Result<RemoteArtist, RemoteError> {
        self.respond("artist", id, &self.artist_calls, &self.artists)
            .await
    }
}

#[derive(Default)]
pub struct MemoryStore {
    artists: Mutex<HashMap<String, Artist>>,
    albums: Mutex<HashMap<String, Album>>,
    tracks: Mutex<HashMap<String, Track>>,
    streams: Mutex<Vec<Stream>>,
    pub artist_writes: AtomicUsize,
    pub album_writes: AtomicUsize,
    pub track_writes: AtomicUsize,
    pub stream_writes: AtomicUsize,
    fail_stream_inserts: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_artist(&self, artist: Artist) {
        self.artists
            .lock()
            .unwrap()
            .insert(artist.spotify_id.clone(), artist);
    }

    pub fn seed_album(&self, album: Album) {
        self.albums
            .lock()
            .unwrap()
            .insert(album.spotify_id.clone(), album);
    }

    pub fn seed_track(&self, track: Track) {
        self.tracks
            .lock()
            .unwrap()
            .insert(track.spotify_id.clone(), track);
    }

    pub fn seed_stream(&self, stream: Stream) {
        self.streams.lock().unwrap().push(stream);
    }

    pub fn fail_stream_inserts(&self, fail: bool) {
        self.fail_stream_inserts.store(fail, Ordering::SeqCst);
    }

    pub fn total_writes(&self) -> usize {
        self.artist_writes.load(Ordering::SeqCst)
            + self.album_writes.load(Ordering::SeqCst)
            + self.track_writes.load(Ordering::SeqCst)
            + self.stream_writes.load(Ordering::SeqCst)
    }

    pub fn artist(&self, id: &str) -> Option<Artist> {
        self.artists.lock().unwrap().get(id).cloned()
    }

    pub fn album(&self, id: &str) -> Option<Album> {
        self.albums.lock().unwrap().get(id).cloned()
    }

    pub fn track(&self, id: &str) -> Option<Track> {
        self.tracks.lock().unwrap().get(id).cloned()
    }

    pub fn streams(&self) -> Vec<Stream> {
        self.streams.lock().unwrap().clone()
    }
}

#[async_trait]
impl EntityStore for MemoryStore {
    async fn load_artists(&self) -> Result<Vec<Artist>> {
        Ok(self.artists.lock().unwrap().values().cloned().collect())
    }

    async fn load_albums(&self) -> Result<Vec<Album>> {
        Ok(self.albums.lock().unwrap().values().cloned().collect())
    }

    async fn load_tracks(&self) -> Result<Vec<Track>> {
        Ok(self.tracks.lock().unwrap().values().cloned().collect())
    }

    async fn load_streams(&self) -> Result<Vec<Stream>> {
        Ok(self.streams())
    }

    async fn upsert_artists(&self, artists: &[Artist]) -> Result<()> {
        self.artist_writes.fetch_add(1, Ordering::SeqCst);
        for artist in artists {
            self.seed_artist(artist.clone());
        }
        Ok(())
    }

    async fn upsert_albums(&self, albums: &[Album]) -> Result<()> {
        self.album_writes.fetch_add(1, Ordering::SeqCst);
        for album in albums {
            self.seed_album(album.clone());
        }
        Ok(())
    }

    async fn upsert_tracks(&self, tracks: &[Track]) -> Result<()> {
        self.track_writes.fetch_add(1, Ordering::SeqCst);
        for track in tracks {
            self.seed_track(track.clone());
        }
        Ok(())
    }

    async fn insert_streams(&self, streams: &[Stream]) -> Result<()> {
        if self.fail_stream_inserts.load(Ordering::SeqCst) {
            return Err(Error::Internal("disk full".to_string()));
        }
        self.stream_writes.fetch_add(1, Ordering::SeqCst);
        let mut stored = self.streams.lock().unwrap();
        for stream in streams {
            let key: StreamKey = stream.key();
            if !stored.iter().any(|s| s.key() == key) {
                stored.push(stream.clone());
            }
        }
        Ok(())
    }
}

pub fn ts(value: &str) -> DateTime<Utc> {
    value.parse().expect("valid RFC 3339 timestamp")
}

pub fn days_ago(days: i64) -> DateTime<Utc> {
    Utc::now() - ChronoDuration::days(days)
}

pub fn play(username: &str, uri: Option<&str>, stopped_at: &str, ms_played: i64) -> PlayRecord {
    PlayRecord {
        stopped_at: ts(stopped_at),
        username: username.to_string(),
        track_uri: uri.map(str::to_string),
        ms_played,
        shuffle: false,
        incognito_mode: false,
        reason_start: Some("clickrow".to_string()),
        reason_end: Some("trackdone".to_string()),
        track_name: Some("Song".to_string()),
        artist_name: Some("Band".to_string()),
    }
}
