//! Durable entity store
//!
//! The ingestion core only needs load-all and bulk upsert per entity type;
//! [`EntityStore`] is that surface and [`SqliteEntityStore`] backs it with
//! the schema created by `spotan_common::db`.

pub mod albums;
pub mod artists;
pub mod streams;
pub mod tracks;

use crate::models::{Album, Artist, Stream, Track};
use crate::utils::db_retry::{retry_on_lock, DEFAULT_MAX_LOCK_WAIT_MS};
use async_trait::async_trait;
use spotan_common::Result;
use sqlx::SqlitePool;

#[async_trait]
pub trait EntityStore: Send + Sync {
    async fn load_artists(&self) -> Result<Vec<Artist>>;

    async fn load_albums(&self) -> Result<Vec<Album>>;

    async fn load_tracks(&self) -> Result<Vec<Track>>;

    async fn load_streams(&self) -> Result<Vec<Stream>>;

    async fn upsert_artists(&self, artists: &[Artist]) -> Result<()>;

    /// Credited artists must already be stored
    async fn upsert_albums(&self, albums: &[Album]) -> Result<()>;

    /// Album and credited artists must already be stored
    async fn upsert_tracks(&self, tracks: &[Track]) -> Result<()>;

    /// Append streams; keys already stored are left as they are
    async fn insert_streams(&self, streams: &[Stream]) -> Result<()>;
}

/// SQLite-backed [`EntityStore`]; each call is one transaction
#[derive(Clone)]
pub struct SqliteEntityStore {
    pool: SqlitePool,
    max_lock_wait_ms: u64,
}

impl SqliteEntityStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            max_lock_wait_ms: DEFAULT_MAX_LOCK_WAIT_MS,
        }
    }

    pub fn with_max_lock_wait_ms(mut self, max_lock_wait_ms: u64) -> Self {
        self.max_lock_wait_ms = max_lock_wait_ms;
        self
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl EntityStore for SqliteEntityStore {
    async fn load_artists(&self) -> Result<Vec<Artist>> {
        artists::load_artists(&self.pool).await
    }

    async fn load_albums(&self) -> Result<Vec<Album>> {
        albums::load_albums(&self.pool).await
    }

    async fn load_tracks(&self) -> Result<Vec<Track>> {
        tracks::load_tracks(&self.pool).await
    }

    async fn load_streams(&self) -> Result<Vec<Stream>> {
        streams::load_streams(&self.pool).await
    }

    async fn upsert_artists(&self, items: &[Artist]) -> Result<()> {
        retry_on_lock("upsert artists", self.max_lock_wait_ms, move || async move {
            let mut tx = self.pool.begin().await?;
            for artist in items {
                artists::upsert_artist(&mut tx, artist).await?;
            }
            tx.commit().await?;
            Ok(())
        })
        .await
    }

    async fn upsert_albums(&self, items: &[Album]) -> Result<()> {
        retry_on_lock("upsert albums", self.max_lock_wait_ms, move || async move {
            let mut tx = self.pool.begin().await?;
            for album in items {
                albums::upsert_album(&mut tx, album).await?;
            }
            tx.commit().await?;
            Ok(())
        })
        .await
    }

    async fn upsert_tracks(&self, items: &[Track]) -> Result<()> {
        retry_on_lock("upsert tracks", self.max_lock_wait_ms, move || async move {
            let mut tx = self.pool.begin().await?;
            for track in items {
                tracks::upsert_track(&mut tx, track).await?;
            }
            tx.commit().await?;
            Ok(())
        })
        .await
    }

    async fn insert_streams(&self, items: &[Stream]) -> Result<()> {
        let inserted = retry_on_lock("insert streams", self.max_lock_wait_ms, move || async move {
            let mut tx = self.pool.begin().await?;
            let inserted = streams::insert_streams(&mut tx, items).await?;
            tx.commit().await?;
            Ok(inserted)
        })
        .await?;

        tracing::debug!(
            requested = items.len(),
            inserted,
            "Stream batch written"
        );
        Ok(())
    }
}
