//! Artist resolution

use super::rate_limited_fetcher::RateLimitedFetcher;
use super::single_flight::{CacheEntry, EntityHandle, SingleFlightCache};
use super::staleness::StalenessPolicy;
use crate::db::EntityStore;
use crate::error::ResolveError;
use crate::models::Artist;
use crate::remote::RemoteArtist;
use chrono::{DateTime, Utc};
use spotan_common::time;
use std::sync::Arc;

impl CacheEntry for Artist {
    type Key = String;
    const KIND: &'static str = "artist";

    fn key(&self) -> String {
        self.spotify_id.clone()
    }

    fn last_refreshed(&self) -> DateTime<Utc> {
        self.last_refreshed
    }
}

/// Artist content from a provider response.
///
/// The requested id is the identity, whatever id the payload echoes.
pub(crate) fn build_artist(id: &str, remote: RemoteArtist, now: DateTime<Utc>) -> Artist {
    Artist {
        spotify_id: id.to_string(),
        name: remote.name,
        image_url: remote.images.into_iter().next().map(|i| i.url),
        popularity: remote.popularity.min(100),
        last_refreshed: now,
    }
}

#[derive(Clone)]
pub struct ArtistResolver {
    cache: Arc<SingleFlightCache<Artist>>,
    fetcher: RateLimitedFetcher,
    store: Arc<dyn EntityStore>,
}

impl ArtistResolver {
    pub fn new(
        fetcher: RateLimitedFetcher,
        store: Arc<dyn EntityStore>,
        policy: StalenessPolicy,
    ) -> Self {
        Self {
            cache: Arc::new(SingleFlightCache::new(policy)),
            fetcher,
            store,
        }
    }

    pub fn cache(&self) -> &SingleFlightCache<Artist> {
        &self.cache
    }

    pub async fn get(&self, id: &str) -> Result<EntityHandle<Artist>, ResolveError> {
        let fetcher = self.fetcher.clone();
        let store = Arc::clone(&self.store);
        let key = id.to_string();
        let artist_id = key.clone();

        self.cache
            .get(&key, move |_previous| async move {
                let remote = fetcher
                    .get_artist(&artist_id)
                    .await
                    .map_err(|e| ResolveError::remote(Artist::KIND, &artist_id, e))?;

                let artist = build_artist(&artist_id, remote, time::now());

                store
                    .upsert_artists(std::slice::from_ref(&artist))
                    .await
                    .map_err(|e| ResolveError::store(Artist::KIND, &artist_id, e))?;

                Ok(artist)
            })
            .await
    }

    /// Resolve several artists concurrently; output keeps input order.
    /// Each id still goes through its own single-flight key.
    pub async fn get_many(&self, ids: &[String]) -> Result<Vec<EntityHandle<Artist>>, ResolveError> {
        futures::future::try_join_all(ids.iter().map(|id| self.get(id))).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::RemoteImage;

    fn image(url: &str) -> RemoteImage {
        RemoteImage {
            url: url.to_string(),
            width: None,
            height: None,
        }
    }

    #[test]
    fn test_build_artist_takes_first_image() {
        let now = Utc::now();
        let remote = RemoteArtist {
            id: "ar1".to_string(),
            name: "Band".to_string(),
            images: vec![image("https://i/640"), image("https://i/320")],
            popularity: 64,
        };

        let artist = build_artist("ar1", remote, now);
        assert_eq!(artist.image_url.as_deref(), Some("https://i/640"));
        assert_eq!(artist.popularity, 64);
        assert_eq!(artist.last_refreshed, now);
    }

    #[test]
    fn test_build_artist_without_images() {
        let remote = RemoteArtist {
            id: "relinked".to_string(),
            name: "Band".to_string(),
            images: vec![],
            popularity: 0,
        };

        let artist = build_artist("ar1", remote, Utc::now());
        assert_eq!(artist.spotify_id, "ar1");
        assert_eq!(artist.image_url, None);
    }
}
