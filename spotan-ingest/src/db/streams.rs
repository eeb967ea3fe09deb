//! Stream persistence
//!
//! Streams are append-only: a key already in the table is left untouched.

use crate::models::Stream;
use spotan_common::Result;
use sqlx::{Row, SqliteConnection, SqlitePool};

/// Insert streams, ignoring keys already present. Returns rows written.
pub async fn insert_streams(conn: &mut SqliteConnection, streams: &[Stream]) -> Result<u64> {
    let mut inserted = 0;

    for stream in streams {
        let result = sqlx::query(
            r#"
            INSERT INTO streams (
                username, track_id, end_at, start_at, duration_ms,
                reason_start, reason_end, shuffle, incognito_mode
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(username, track_id, end_at) DO NOTHING
            "#,
        )
        .bind(&stream.username)
        .bind(&stream.track_id)
        .bind(stream.end)
        .bind(stream.start)
        .bind(stream.duration_ms)
        .bind(&stream.reason_start)
        .bind(&stream.reason_end)
        .bind(stream.shuffle)
        .bind(stream.incognito_mode)
        .execute(&mut *conn)
        .await?;

        inserted += result.rows_affected();
    }

    Ok(inserted)
}

pub async fn load_streams(pool: &SqlitePool) -> Result<Vec<Stream>> {
    let rows = sqlx::query(
        r#"
        SELECT username, track_id, end_at, start_at, duration_ms,
               reason_start, reason_end, shuffle, incognito_mode
        FROM streams
        "#,
    )
    .fetch_all(pool)
    .await?;

    let streams = rows
        .into_iter()
        .map(|row| Stream {
            username: row.get("username"),
            track_id: row.get("track_id"),
            start: row.get("start_at"),
            end: row.get("end_at"),
            duration_ms: row.get("duration_ms"),
            reason_start: row.get("reason_start"),
            reason_end: row.get("reason_end"),
            shuffle: row.get("shuffle"),
            incognito_mode: row.get("incognito_mode"),
        })
        .collect();

    Ok(streams)
}
