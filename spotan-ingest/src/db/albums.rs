//! Album persistence
//!
//! Artist credits live in `album_artists`; an upsert rewrites the album's
//! credit list so a refresh that drops an artist drops the link too.

use crate::models::Album;
use spotan_common::Result;
use sqlx::{Row, SqliteConnection, SqlitePool};
use std::collections::HashMap;

pub async fn upsert_album(conn: &mut SqliteConnection, album: &Album) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO albums (spotify_id, name, image_url, release_date, last_refreshed)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT(spotify_id) DO UPDATE SET
            name = excluded.name,
            image_url = excluded.image_url,
            release_date = excluded.release_date,
            last_refreshed = excluded.last_refreshed
        "#,
    )
    .bind(&album.spotify_id)
    .bind(&album.name)
    .bind(&album.image_url)
    .bind(album.release_date)
    .bind(album.last_refreshed)
    .execute(&mut *conn)
    .await?;

    sqlx::query("DELETE FROM album_artists WHERE album_id = ?")
        .bind(&album.spotify_id)
        .execute(&mut *conn)
        .await?;

    for (position, artist_id) in album.artist_ids.iter().enumerate() {
        sqlx::query(
            "INSERT INTO album_artists (album_id, artist_id, position) VALUES (?, ?, ?)",
        )
        .bind(&album.spotify_id)
        .bind(artist_id)
        .bind(position as i64)
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}

pub async fn load_albums(pool: &SqlitePool) -> Result<Vec<Album>> {
    let link_rows = sqlx::query(
        "SELECT album_id, artist_id FROM album_artists ORDER BY album_id, position",
    )
    .fetch_all(pool)
    .await?;

    let mut credits: HashMap<String, Vec<String>> = HashMap::new();
    for row in link_rows {
        credits
            .entry(row.get("album_id"))
            .or_default()
            .push(row.get("artist_id"));
    }

    let rows = sqlx::query(
        r#"
        SELECT spotify_id, name, image_url, release_date, last_refreshed
        FROM albums
        "#,
    )
    .fetch_all(pool)
    .await?;

    let albums = rows
        .into_iter()
        .map(|row| {
            let spotify_id: String = row.get("spotify_id");
            let artist_ids = credits.remove(&spotify_id).unwrap_or_default();
            Album {
                spotify_id,
                name: row.get("name"),
                image_url: row.get("image_url"),
                release_date: row.get("release_date"),
                artist_ids,
                last_refreshed: row.get("last_refreshed"),
            }
        })
        .collect();

    Ok(albums)
}
