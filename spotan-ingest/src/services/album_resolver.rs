//! Album resolution
//!
//! An album is ready only once every credited artist is resolved. Artists
//! are persisted before the album row that links to them.

use super::artist_resolver::ArtistResolver;
use super::rate_limited_fetcher::RateLimitedFetcher;
use super::single_flight::{CacheEntry, EntityHandle, SingleFlightCache};
use super::staleness::StalenessPolicy;
use super::unique_ids;
use crate::db::EntityStore;
use crate::error::ResolveError;
use crate::models::Album;
use crate::remote::RemoteAlbum;
use chrono::{DateTime, Utc};
use spotan_common::time::{self, parse_partial_date};
use std::sync::Arc;

impl CacheEntry for Album {
    type Key = String;
    const KIND: &'static str = "album";

    fn key(&self) -> String {
        self.spotify_id.clone()
    }

    fn last_refreshed(&self) -> DateTime<Utc> {
        self.last_refreshed
    }
}

pub(crate) fn build_album(id: &str, remote: RemoteAlbum, now: DateTime<Utc>) -> Album {
    let release_date = remote.release_date.as_deref().and_then(|raw| {
        let parsed = parse_partial_date(raw);
        if parsed.is_none() {
            tracing::debug!(album_id = id, release_date = raw, "Unparseable release date");
        }
        parsed
    });

    Album {
        spotify_id: id.to_string(),
        name: remote.name,
        image_url: remote.images.into_iter().next().map(|i| i.url),
        release_date,
        artist_ids: unique_ids(&remote.artist_ids),
        last_refreshed: now,
    }
}

#[derive(Clone)]
pub struct AlbumResolver {
    cache: Arc<SingleFlightCache<Album>>,
    fetcher: RateLimitedFetcher,
    artists: ArtistResolver,
    store: Arc<dyn EntityStore>,
}

impl AlbumResolver {
    pub fn new(
        fetcher: RateLimitedFetcher,
        artists: ArtistResolver,
        store: Arc<dyn EntityStore>,
        policy: StalenessPolicy,
    ) -> Self {
        Self {
            cache: Arc::new(SingleFlightCache::new(policy)),
            fetcher,
            artists,
            store,
        }
    }

    pub fn cache(&self) -> &SingleFlightCache<Album> {
        &self.cache
    }

    pub async fn get(&self, id: &str) -> Result<EntityHandle<Album>, ResolveError> {
        let fetcher = self.fetcher.clone();
        let artists = self.artists.clone();
        let store = Arc::clone(&self.store);
        let key = id.to_string();
        let album_id = key.clone();

        self.cache
            .get(&key, move |_previous| async move {
                let remote = fetcher
                    .get_album(&album_id)
                    .await
                    .map_err(|e| ResolveError::remote(Album::KIND, &album_id, e))?;

                let album = build_album(&album_id, remote, time::now());

                artists
                    .get_many(&album.artist_ids)
                    .await
                    .map_err(|e| ResolveError::dependency(Album::KIND, &album_id, e))?;

                store
                    .upsert_albums(std::slice::from_ref(&album))
                    .await
                    .map_err(|e| ResolveError::store(Album::KIND, &album_id, e))?;

                Ok(album)
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn remote(release_date: Option<&str>, artist_ids: &[&str]) -> RemoteAlbum {
        RemoteAlbum {
            id: "al1".to_string(),
            name: "Album".to_string(),
            images: vec![],
            release_date: release_date.map(str::to_string),
            artist_ids: artist_ids.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_release_date_precision() {
        let now = Utc::now();
        let year = build_album("al1", remote(Some("1997"), &[]), now);
        assert_eq!(year.release_date, NaiveDate::from_ymd_opt(1997, 1, 1));

        let month = build_album("al1", remote(Some("1997-05"), &[]), now);
        assert_eq!(month.release_date, NaiveDate::from_ymd_opt(1997, 5, 1));

        let day = build_album("al1", remote(Some("1997-05-21"), &[]), now);
        assert_eq!(day.release_date, NaiveDate::from_ymd_opt(1997, 5, 21));

        let junk = build_album("al1", remote(Some("1997-13"), &[]), now);
        assert_eq!(junk.release_date, None);
    }

    #[test]
    fn test_artist_credits_keep_order_without_repeats() {
        let album = build_album("al1", remote(None, &["b", "a", "b"]), Utc::now());
        assert_eq!(album.artist_ids, vec!["b".to_string(), "a".to_string()]);
        assert_eq!(album.release_date, None);
    }
}
