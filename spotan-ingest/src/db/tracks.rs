//! Track persistence

use crate::models::{AudioFeatures, Key, Mode, Track};
use spotan_common::{Error, Result};
use sqlx::{sqlite::SqliteRow, Row, SqliteConnection, SqlitePool};
use std::collections::HashMap;

pub async fn upsert_track(conn: &mut SqliteConnection, track: &Track) -> Result<()> {
    let f = &track.features;

    sqlx::query(
        r#"
        INSERT INTO tracks (
            spotify_id, album_id, name, length_ms, explicit, preview_url,
            acousticness, danceability, energy, instrumentalness, key, liveness,
            loudness, mode, speechiness, estimated_tempo, time_signature, valence,
            last_refreshed
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(spotify_id) DO UPDATE SET
            album_id = excluded.album_id,
            name = excluded.name,
            length_ms = excluded.length_ms,
            explicit = excluded.explicit,
            preview_url = excluded.preview_url,
            acousticness = excluded.acousticness,
            danceability = excluded.danceability,
            energy = excluded.energy,
            instrumentalness = excluded.instrumentalness,
            key = excluded.key,
            liveness = excluded.liveness,
            loudness = excluded.loudness,
            mode = excluded.mode,
            speechiness = excluded.speechiness,
            estimated_tempo = excluded.estimated_tempo,
            time_signature = excluded.time_signature,
            valence = excluded.valence,
            last_refreshed = excluded.last_refreshed
        "#,
    )
    .bind(&track.spotify_id)
    .bind(&track.album_id)
    .bind(&track.name)
    .bind(track.length_ms)
    .bind(track.explicit)
    .bind(&track.preview_url)
    .bind(f64::from(f.acousticness))
    .bind(f64::from(f.danceability))
    .bind(f64::from(f.energy))
    .bind(f64::from(f.instrumentalness))
    .bind(f.key.map(Key::pitch_class))
    .bind(f64::from(f.liveness))
    .bind(f64::from(f.loudness))
    .bind(f.mode.raw())
    .bind(f64::from(f.speechiness))
    .bind(f64::from(f.estimated_tempo))
    .bind(f64::from(f.time_signature))
    .bind(f64::from(f.valence))
    .bind(track.last_refreshed)
    .execute(&mut *conn)
    .await?;

    sqlx::query("DELETE FROM track_artists WHERE track_id = ?")
        .bind(&track.spotify_id)
        .execute(&mut *conn)
        .await?;

    for (position, artist_id) in track.artist_ids.iter().enumerate() {
        sqlx::query(
            "INSERT INTO track_artists (track_id, artist_id, position) VALUES (?, ?, ?)",
        )
        .bind(&track.spotify_id)
        .bind(artist_id)
        .bind(position as i64)
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}

fn real(row: &SqliteRow, column: &str) -> f32 {
    row.get::<f64, _>(column) as f32
}

fn track_from_row(row: &SqliteRow, artist_ids: Vec<String>) -> Result<Track> {
    let spotify_id: String = row.get("spotify_id");
    let raw_key: Option<i64> = row.get("key");
    let raw_mode: i64 = row.get("mode");

    let mode = Mode::from_raw(raw_mode).ok_or_else(|| {
        Error::Internal(format!("track {} has invalid mode {}", spotify_id, raw_mode))
    })?;

    let features = AudioFeatures {
        acousticness: real(row, "acousticness"),
        danceability: real(row, "danceability"),
        energy: real(row, "energy"),
        instrumentalness: real(row, "instrumentalness"),
        key: raw_key.and_then(Key::from_pitch_class),
        liveness: real(row, "liveness"),
        loudness: real(row, "loudness"),
        mode,
        speechiness: real(row, "speechiness"),
        estimated_tempo: real(row, "estimated_tempo"),
        time_signature: real(row, "time_signature"),
        valence: real(row, "valence"),
    };

    Ok(Track {
        name: row.get("name"),
        length_ms: row.get("length_ms"),
        explicit: row.get("explicit"),
        preview_url: row.get("preview_url"),
        features,
        album_id: row.get("album_id"),
        artist_ids,
        last_refreshed: row.get("last_refreshed"),
        spotify_id,
    })
}

pub async fn load_tracks(pool: &SqlitePool) -> Result<Vec<Track>> {
    let link_rows = sqlx::query(
        "SELECT track_id, artist_id FROM track_artists ORDER BY track_id, position",
    )
    .fetch_all(pool)
    .await?;

    let mut credits: HashMap<String, Vec<String>> = HashMap::new();
    for row in link_rows {
        credits
            .entry(row.get("track_id"))
            .or_default()
            .push(row.get("artist_id"));
    }

    let rows = sqlx::query(
        r#"
        SELECT spotify_id, album_id, name, length_ms, explicit, preview_url,
               acousticness, danceability, energy, instrumentalness, key, liveness,
               loudness, mode, speechiness, estimated_tempo, time_signature, valence,
               last_refreshed
        FROM tracks
        "#,
    )
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| {
            let id: String = row.get("spotify_id");
            let artist_ids = credits.remove(&id).unwrap_or_default();
            track_from_row(row, artist_ids)
        })
        .collect()
}
