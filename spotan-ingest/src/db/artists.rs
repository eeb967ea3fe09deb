//! Artist persistence

use crate::models::Artist;
use spotan_common::Result;
use sqlx::{Row, SqliteConnection, SqlitePool};

/// Insert or update one artist
pub async fn upsert_artist(conn: &mut SqliteConnection, artist: &Artist) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO artists (spotify_id, name, image_url, popularity, last_refreshed)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT(spotify_id) DO UPDATE SET
            name = excluded.name,
            image_url = excluded.image_url,
            popularity = excluded.popularity,
            last_refreshed = excluded.last_refreshed
        "#,
    )
    .bind(&artist.spotify_id)
    .bind(&artist.name)
    .bind(&artist.image_url)
    .bind(i64::from(artist.popularity))
    .bind(artist.last_refreshed)
    .execute(conn)
    .await?;

    Ok(())
}

pub async fn load_artists(pool: &SqlitePool) -> Result<Vec<Artist>> {
    let rows = sqlx::query(
        r#"
        SELECT spotify_id, name, image_url, popularity, last_refreshed
        FROM artists
        "#,
    )
    .fetch_all(pool)
    .await?;

    let artists = rows
        .into_iter()
        .map(|row| {
            let popularity: i64 = row.get("popularity");
            Artist {
                spotify_id: row.get("spotify_id"),
                name: row.get("name"),
                image_url: row.get("image_url"),
                popularity: u32::try_from(popularity).unwrap_or(0),
                last_refreshed: row.get("last_refreshed"),
            }
        })
        .collect();

    Ok(artists)
}
