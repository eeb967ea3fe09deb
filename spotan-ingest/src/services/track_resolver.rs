//! Track resolution
//!
//! A track needs two remote calls (track and audio features) plus its
//! album and artists. The two calls run concurrently, and so do the album
//! and artist lookups. A failed dependency fails the track; no partially
//! linked track is ever cached or persisted.

use super::album_resolver::AlbumResolver;
use super::artist_resolver::ArtistResolver;
use super::rate_limited_fetcher::RateLimitedFetcher;
use super::single_flight::{CacheEntry, EntityHandle, SingleFlightCache};
use super::staleness::StalenessPolicy;
use super::unique_ids;
use crate::db::EntityStore;
use crate::error::ResolveError;
use crate::models::{AudioFeatures, Key, Mode, Track};
use crate::remote::{RemoteAudioFeatures, RemoteTrack};
use chrono::{DateTime, Utc};
use spotan_common::time;
use std::sync::Arc;

impl CacheEntry for Track {
    type Key = String;
    const KIND: &'static str = "track";

    fn key(&self) -> String {
        self.spotify_id.clone()
    }

    fn last_refreshed(&self) -> DateTime<Utc> {
        self.last_refreshed
    }
}

fn build_features(id: &str, raw: RemoteAudioFeatures) -> Result<AudioFeatures, ResolveError> {
    let mode = Mode::from_raw(raw.mode).ok_or_else(|| ResolveError::InvalidData {
        entity: Track::KIND,
        id: id.to_string(),
        message: format!("mode {} is neither 0 nor 1", raw.mode),
    })?;

    Ok(AudioFeatures {
        acousticness: raw.acousticness,
        danceability: raw.danceability,
        energy: raw.energy,
        instrumentalness: raw.instrumentalness,
        // -1 means no key detected
        key: Key::from_pitch_class(raw.key),
        liveness: raw.liveness,
        loudness: raw.loudness,
        mode,
        speechiness: raw.speechiness,
        estimated_tempo: raw.tempo,
        time_signature: raw.time_signature,
        valence: raw.valence,
    })
}

pub(crate) fn build_track(
    id: &str,
    remote: RemoteTrack,
    features: RemoteAudioFeatures,
    now: DateTime<Utc>,
) -> Result<Track, ResolveError> {
    Ok(Track {
        spotify_id: id.to_string(),
        name: remote.name,
        length_ms: remote.duration_ms,
        explicit: remote.explicit,
        preview_url: remote.preview_url,
        features: build_features(id, features)?,
        album_id: remote.album_id.filter(|a| !a.is_empty()),
        artist_ids: unique_ids(&remote.artist_ids),
        last_refreshed: now,
    })
}

#[derive(Clone)]
pub struct TrackResolver {
    cache: Arc<SingleFlightCache<Track>>,
    fetcher: RateLimitedFetcher,
    albums: AlbumResolver,
    artists: ArtistResolver,
    store: Arc<dyn EntityStore>,
}

impl TrackResolver {
    pub fn new(
        fetcher: RateLimitedFetcher,
        albums: AlbumResolver,
        artists: ArtistResolver,
        store: Arc<dyn EntityStore>,
        policy: StalenessPolicy,
    ) -> Self {
        Self {
            cache: Arc::new(SingleFlightCache::new(policy)),
            fetcher,
            albums,
            artists,
            store,
        }
    }

    pub fn cache(&self) -> &SingleFlightCache<Track> {
        &self.cache
    }

    pub async fn get(&self, id: &str) -> Result<EntityHandle<Track>, ResolveError> {
        let fetcher = self.fetcher.clone();
        let albums = self.albums.clone();
        let artists = self.artists.clone();
        let store = Arc::clone(&self.store);
        let key = id.to_string();
        let track_id = key.clone();

        self.cache
            .get(&key, move |_previous| async move {
                let (remote, features) = tokio::try_join!(
                    fetcher.get_track(&track_id),
                    fetcher.get_audio_features(&track_id)
                )
                .map_err(|e| ResolveError::remote(Track::KIND, &track_id, e))?;

                let track = build_track(&track_id, remote, features, time::now())?;

                let album = async {
                    match &track.album_id {
                        Some(album_id) => albums.get(album_id).await.map(Some),
                        None => Ok(None),
                    }
                };
                tokio::try_join!(album, artists.get_many(&track.artist_ids))
                    .map_err(|e| ResolveError::dependency(Track::KIND, &track_id, e))?;

                store
                    .upsert_tracks(std::slice::from_ref(&track))
                    .await
                    .map_err(|e| ResolveError::store(Track::KIND, &track_id, e))?;

                Ok(track)
            })
            .await
    }
}
