//! Database initialization
//!
//! Opens (creating when missing) the SQLite database and creates the entity
//! tables. Every statement is idempotent so startup can run it unconditionally.

use crate::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(8)
        .min_connections(1)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    // WAL lets the bulk stream commit proceed while workers still read
    sqlx::query("PRAGMA journal_mode = WAL")
        .execute(&pool)
        .await?;

    configure_connection(&pool).await?;
    create_schema(&pool).await?;

    Ok(pool)
}

/// Single-connection in-memory database with the full schema
///
/// Each SQLite `:memory:` connection is its own database, so the pool is
/// capped at one connection.
pub async fn init_memory_database() -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;

    configure_connection(&pool).await?;
    create_schema(&pool).await?;

    Ok(pool)
}

async fn configure_connection(pool: &SqlitePool) -> Result<()> {
    sqlx::query("PRAGMA foreign_keys = ON")
        .execute(pool)
        .await?;
    sqlx::query("PRAGMA busy_timeout = 5000")
        .execute(pool)
        .await?;
    Ok(())
}

/// Create all entity tables
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    create_artists_table(pool).await?;
    create_albums_table(pool).await?;
    create_album_artists_table(pool).await?;
    create_tracks_table(pool).await?;
    create_track_artists_table(pool).await?;
    create_streams_table(pool).await?;
    Ok(())
}

pub async fn create_artists_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS artists (
            spotify_id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            image_url TEXT,
            popularity INTEGER NOT NULL DEFAULT 0,
            last_refreshed TIMESTAMP NOT NULL,
            CHECK (popularity >= 0 AND popularity <= 100)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn create_albums_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS albums (
            spotify_id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            image_url TEXT,
            release_date TEXT,
            last_refreshed TIMESTAMP NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn create_album_artists_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS album_artists (
            album_id TEXT NOT NULL REFERENCES albums(spotify_id) ON DELETE CASCADE,
            artist_id TEXT NOT NULL REFERENCES artists(spotify_id) ON DELETE CASCADE,
            position INTEGER NOT NULL,
            PRIMARY KEY (album_id, artist_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_album_artists_artist ON album_artists(artist_id)")
        .execute(pool)
        .await?;

    Ok(())
}

pub async fn create_tracks_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tracks (
            spotify_id TEXT PRIMARY KEY,
            album_id TEXT REFERENCES albums(spotify_id),
            name TEXT NOT NULL,
            length_ms INTEGER NOT NULL,
            explicit INTEGER NOT NULL DEFAULT 0,
            preview_url TEXT,
            acousticness REAL NOT NULL,
            danceability REAL NOT NULL,
            energy REAL NOT NULL,
            instrumentalness REAL NOT NULL,
            key INTEGER,
            liveness REAL NOT NULL,
            loudness REAL NOT NULL,
            mode INTEGER NOT NULL,
            speechiness REAL NOT NULL,
            estimated_tempo REAL NOT NULL,
            time_signature REAL NOT NULL,
            valence REAL NOT NULL,
            last_refreshed TIMESTAMP NOT NULL,
            CHECK (key IS NULL OR (key >= 0 AND key <= 11)),
            CHECK (mode IN (0, 1))
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_tracks_album ON tracks(album_id)")
        .execute(pool)
        .await?;

    Ok(())
}

pub async fn create_track_artists_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS track_artists (
            track_id TEXT NOT NULL REFERENCES tracks(spotify_id) ON DELETE CASCADE,
            artist_id TEXT NOT NULL REFERENCES artists(spotify_id) ON DELETE CASCADE,
            position INTEGER NOT NULL,
            PRIMARY KEY (track_id, artist_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_track_artists_artist ON track_artists(artist_id)")
        .execute(pool)
        .await?;

    Ok(())
}

pub async fn create_streams_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS streams (
            username TEXT NOT NULL,
            track_id TEXT NOT NULL REFERENCES tracks(spotify_id),
            end_at TIMESTAMP NOT NULL,
            start_at TIMESTAMP NOT NULL,
            duration_ms INTEGER NOT NULL,
            reason_start TEXT,
            reason_end TEXT,
            shuffle INTEGER NOT NULL DEFAULT 0,
            incognito_mode INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (username, track_id, end_at),
            CHECK (duration_ms >= 0)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_streams_end ON streams(end_at)")
        .execute(pool)
        .await?;

    Ok(())
}
