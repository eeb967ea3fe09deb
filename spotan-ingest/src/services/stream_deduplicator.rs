//! Stream deduplication
//!
//! Keeps every known stream keyed by `(username, track_id, end)`. Plays
//! already in the durable store are preloaded and never written again; new
//! ones are held until [`StreamDeduplicator::commit`] writes them in one
//! batch.

use super::track_resolver::TrackResolver;
use crate::db::EntityStore;
use crate::error::{IngestError, IngestResult};
use crate::remote::is_provider_id;
use crate::models::{PlayRecord, Stream, StreamKey};
use chrono::{DateTime, Utc};
use spotan_common::{Error, Result};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// What [`StreamDeduplicator::process`] did with a record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// A new stream was recorded
    Added,
    /// The key was already known (preloaded, or seen earlier in the run)
    Duplicate,
}

struct StreamSlot {
    stream: Stream,
    persisted: bool,
}

/// Provider track id from a `scheme:type:id` URI
pub fn parse_track_id(uri: &str) -> IngestResult<String> {
    let parts: Vec<&str> = uri.split(':').collect();
    match parts.as_slice() {
        [_, _, id] if is_provider_id(id) => Ok(id.to_string()),
        _ => Err(IngestError::MalformedInput(format!(
            "track URI {:?} is not in scheme:type:id form",
            uri
        ))),
    }
}

/// Start instant of a play, rejecting durations no real play can have
fn play_start(record: &PlayRecord) -> IngestResult<DateTime<Utc>> {
    if record.ms_played < 0 {
        return Err(IngestError::MalformedInput(format!(
            "{} has negative ms_played {}",
            record.display_name(),
            record.ms_played
        )));
    }
    record.start().ok_or_else(|| {
        IngestError::MalformedInput(format!(
            "{} has out-of-range ms_played {}",
            record.display_name(),
            record.ms_played
        ))
    })
}

pub struct StreamDeduplicator {
    streams: Mutex<HashMap<StreamKey, StreamSlot>>,
    tracks: TrackResolver,
    store: Arc<dyn EntityStore>,
}

impl StreamDeduplicator {
    pub fn new(tracks: TrackResolver, store: Arc<dyn EntityStore>) -> Self {
        Self {
            streams: Mutex::new(HashMap::new()),
            tracks,
            store,
        }
    }

    fn lock_streams(&self) -> MutexGuard<'_, HashMap<StreamKey, StreamSlot>> {
        self.streams.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Seed with streams already in the durable store
    pub fn preload(&self, streams: Vec<Stream>) -> Result<usize> {
        let mut slots = self.lock_streams();
        let count = streams.len();
        for stream in streams {
            match slots.entry(stream.key()) {
                Entry::Occupied(occupied) => {
                    let key = occupied.key();
                    return Err(Error::DuplicateKey(format!(
                        "stream ({}, {}, {})",
                        key.username,
                        key.track_id,
                        key.end.to_rfc3339()
                    )));
                }
                Entry::Vacant(vacant) => {
                    vacant.insert(StreamSlot {
                        stream,
                        persisted: true,
                    });
                }
            }
        }
        Ok(count)
    }

    /// Absorb one play.
    ///
    /// A play with a malformed URI or an impossible duration fails on its
    /// own and never reaches the commit batch. A known key is skipped
    /// without touching the metadata service. The
    /// final insert is insert-if-absent under the map lock, so two workers
    /// racing on the same key produce one stream.
    pub async fn process(&self, record: &PlayRecord) -> IngestResult<ProcessOutcome> {
        let uri = record.track_reference().ok_or_else(|| {
            IngestError::MalformedInput(format!("{} has no track URI", record.display_name()))
        })?;
        let track_id = parse_track_id(uri)?;
        let start = play_start(record)?;

        let key = StreamKey {
            username: record.username.clone(),
            track_id,
            end: record.end(),
        };

        if self.lock_streams().contains_key(&key) {
            tracing::debug!(
                username = %key.username,
                track_id = %key.track_id,
                end = %key.end,
                "Stream already recorded, skipping"
            );
            return Ok(ProcessOutcome::Duplicate);
        }

        self.tracks
            .get(&key.track_id)
            .await
            .map_err(|source| IngestError::Resolve {
                track_id: key.track_id.clone(),
                source,
            })?;

        let stream = Stream {
            username: key.username.clone(),
            track_id: key.track_id.clone(),
            start,
            end: key.end,
            duration_ms: record.ms_played,
            reason_start: record.reason_start.clone(),
            reason_end: record.reason_end.clone(),
            shuffle: record.shuffle,
            incognito_mode: record.incognito_mode,
        };

        match self.lock_streams().entry(key) {
            Entry::Occupied(occupied) => {
                tracing::debug!(
                    username = %occupied.key().username,
                    track_id = %occupied.key().track_id,
                    "Stream recorded concurrently by another worker, skipping"
                );
                Ok(ProcessOutcome::Duplicate)
            }
            Entry::Vacant(vacant) => {
                vacant.insert(StreamSlot {
                    stream,
                    persisted: false,
                });
                Ok(ProcessOutcome::Added)
            }
        }
    }

    /// Write every stream not yet in the durable store, in one batch.
    /// Returns how many were written.
    pub async fn commit(&self) -> IngestResult<usize> {
        let batch: Vec<Stream> = self
            .lock_streams()
            .values()
            .filter(|slot| !slot.persisted)
            .map(|slot| slot.stream.clone())
            .collect();

        if batch.is_empty() {
            tracing::info!("No new streams to commit");
            return Ok(0);
        }

        self.store.insert_streams(&batch).await?;

        let mut slots = self.lock_streams();
        for stream in &batch {
            if let Some(slot) = slots.get_mut(&stream.key()) {
                slot.persisted = true;
            }
        }

        tracing::info!(count = batch.len(), "Committed new streams");
        Ok(batch.len())
    }

    /// Streams known so far, persisted or not
    pub fn len(&self) -> usize {
        self.lock_streams().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, key: &StreamKey) -> Option<Stream> {
        self.lock_streams().get(key).map(|slot| slot.stream.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_track_id() {
        assert_eq!(parse_track_id("spotify:track:ABC123").unwrap(), "ABC123");
    }

    #[test]
    fn test_parse_track_id_rejects_other_shapes() {
        for uri in [
            "not:valid",
            "ABC123",
            "spotify:track:ABC:123",
            "spotify:track:",
            "",
            "spotify:track:../albums/AL1",
            "spotify:track:AB C",
        ] {
            let err = parse_track_id(uri).unwrap_err();
            assert!(matches!(err, IngestError::MalformedInput(_)), "{}", uri);
        }
    }
}
