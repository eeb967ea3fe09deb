//! Ingestion run
//!
//! **Idle → Running → Committed.** One orchestrator handles one batch: it
//! fans the records out to a bounded pool of concurrent workers, then
//! commits new streams exactly once after every worker has finished.
//!
//! Cancellation is cooperative. Once the token fires no further record is
//! started; records already in flight finish, and whatever they produced is
//! still committed.

use super::album_resolver::AlbumResolver;
use super::artist_resolver::ArtistResolver;
use super::rate_limited_fetcher::RateLimitedFetcher;
use super::staleness::StalenessPolicy;
use super::stream_deduplicator::{ProcessOutcome, StreamDeduplicator};
use super::track_resolver::TrackResolver;
use crate::db::EntityStore;
use crate::error::{IngestError, IngestResult};
use crate::models::PlayRecord;
use crate::remote::MetadataService;
use futures::stream::{self, StreamExt};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// Log progress every this many records
const PROGRESS_LOG_INTERVAL: usize = 100;

pub use spotan_common::config::DEFAULT_CONCURRENCY;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running,
    Committed,
}

#[derive(Debug, Clone, Copy)]
pub struct IngestionSettings {
    /// Worker bound; keeps fan-out from swamping the remote rate limit
    pub concurrency: usize,
    pub staleness: StalenessPolicy,
}

impl Default for IngestionSettings {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            staleness: StalenessPolicy::default(),
        }
    }
}

/// Counts reported at the end of a run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestionSummary {
    /// Records in the batch
    pub total: usize,
    /// Records handed to a worker (equals `total` unless cancelled)
    pub processed: usize,
    /// Records without a track URI
    pub skipped: usize,
    pub streams_added: usize,
    pub duplicates: usize,
    /// Records that failed (malformed URI or duration, or unresolvable track)
    pub failures: usize,
    /// Streams written by the final commit
    pub committed: usize,
    pub cancelled: bool,
}

enum RecordOutcome {
    Skipped,
    Processed(ProcessOutcome),
    Failed,
}

pub struct IngestionOrchestrator {
    artists: ArtistResolver,
    albums: AlbumResolver,
    tracks: TrackResolver,
    streams: StreamDeduplicator,
    settings: IngestionSettings,
    state: Mutex<RunState>,
    progress: Arc<AtomicUsize>,
    cancel_token: CancellationToken,
}

impl IngestionOrchestrator {
    /// Wire the resolvers with empty caches
    pub fn new(
        store: Arc<dyn EntityStore>,
        service: Arc<dyn MetadataService>,
        settings: IngestionSettings,
    ) -> Self {
        let fetcher = RateLimitedFetcher::new(service);
        let artists = ArtistResolver::new(fetcher.clone(), Arc::clone(&store), settings.staleness);
        let albums = AlbumResolver::new(
            fetcher.clone(),
            artists.clone(),
            Arc::clone(&store),
            settings.staleness,
        );
        let tracks = TrackResolver::new(
            fetcher,
            albums.clone(),
            artists.clone(),
            Arc::clone(&store),
            settings.staleness,
        );
        let streams = StreamDeduplicator::new(tracks.clone(), store);

        Self {
            artists,
            albums,
            tracks,
            streams,
            settings,
            state: Mutex::new(RunState::Idle),
            progress: Arc::new(AtomicUsize::new(0)),
            cancel_token: CancellationToken::new(),
        }
    }

    /// Build an orchestrator and preload every cache from the durable store.
    ///
    /// Any store failure here, including a duplicate id, aborts startup.
    pub async fn load(
        store: Arc<dyn EntityStore>,
        service: Arc<dyn MetadataService>,
        settings: IngestionSettings,
    ) -> IngestResult<Self> {
        let orchestrator = Self::new(Arc::clone(&store), service, settings);

        let count = orchestrator.artists.cache().preload(store.load_artists().await?)?;
        tracing::info!("Loaded {} Artists from the existing database cache", count);

        let count = orchestrator.albums.cache().preload(store.load_albums().await?)?;
        tracing::info!("Loaded {} Albums from the existing database cache", count);

        let count = orchestrator.tracks.cache().preload(store.load_tracks().await?)?;
        tracing::info!("Loaded {} Tracks from the existing database cache", count);

        let count = orchestrator.streams.preload(store.load_streams().await?)?;
        tracing::info!("Loaded {} Streams from the existing database cache", count);

        Ok(orchestrator)
    }

    pub fn state(&self) -> RunState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records processed so far in the current run
    pub fn progress(&self) -> usize {
        self.progress.load(Ordering::SeqCst)
    }

    /// Token that stops the run from starting further records
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    pub fn artists(&self) -> &ArtistResolver {
        &self.artists
    }

    pub fn albums(&self) -> &AlbumResolver {
        &self.albums
    }

    pub fn tracks(&self) -> &TrackResolver {
        &self.tracks
    }

    pub fn streams(&self) -> &StreamDeduplicator {
        &self.streams
    }

    fn transition(&self, from: RunState, to: RunState) -> IngestResult<()> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if *state != from {
            return Err(IngestError::InvalidState(format!(
                "cannot move to {:?} while {:?}",
                to, *state
            )));
        }
        tracing::debug!(old_state = ?from, new_state = ?to, "Ingestion state transition");
        *state = to;
        Ok(())
    }

    /// Ingest one batch of play records.
    ///
    /// A failing record is logged and counted, never fatal to the batch.
    /// Only the final commit can fail the run; the orchestrator then stays
    /// in `Running` and the whole run is meant to be retried by the caller.
    pub async fn run(&self, batch: Vec<PlayRecord>) -> IngestResult<IngestionSummary> {
        self.transition(RunState::Idle, RunState::Running)?;

        let total = batch.len();
        let start_time = Instant::now();
        let concurrency = self.settings.concurrency.max(1);

        tracing::info!(total, concurrency, "Starting ingestion run");

        let cancel_token = self.cancel_token.clone();
        let progress = Arc::clone(&self.progress);
        let streams = &self.streams;

        let outcomes: Vec<RecordOutcome> = stream::iter(batch)
            .take_while(move |_| futures::future::ready(!cancel_token.is_cancelled()))
            .map(|record| {
                let progress = Arc::clone(&progress);
                async move {
                    let outcome = if record.track_reference().is_none() {
                        tracing::debug!(
                            record = %record.display_name(),
                            "Play has no track URI, skipping"
                        );
                        RecordOutcome::Skipped
                    } else {
                        match streams.process(&record).await {
                            Ok(outcome) => RecordOutcome::Processed(outcome),
                            Err(e) => {
                                tracing::error!(
                                    record = %record.display_name(),
                                    username = %record.username,
                                    error = %e,
                                    "Failed to ingest play"
                                );
                                RecordOutcome::Failed
                            }
                        }
                    };

                    let current = progress.fetch_add(1, Ordering::SeqCst) + 1;
                    if current % PROGRESS_LOG_INTERVAL == 0 || current == total {
                        let percent = current as f64 * 100.0 / total as f64;
                        tracing::info!(
                            "[{}/{} - {:.1}%] {}",
                            current,
                            total,
                            percent,
                            record.display_name()
                        );
                    }

                    outcome
                }
            })
            .buffer_unordered(concurrency)
            .collect()
            .await;

        let mut summary = IngestionSummary {
            total,
            processed: outcomes.len(),
            cancelled: self.cancel_token.is_cancelled(),
            ..Default::default()
        };
        for outcome in &outcomes {
            match outcome {
                RecordOutcome::Skipped => summary.skipped += 1,
                RecordOutcome::Processed(ProcessOutcome::Added) => summary.streams_added += 1,
                RecordOutcome::Processed(ProcessOutcome::Duplicate) => summary.duplicates += 1,
                RecordOutcome::Failed => summary.failures += 1,
            }
        }

        if summary.cancelled {
            tracing::warn!(
                processed = summary.processed,
                total,
                "Ingestion cancelled, committing what was processed"
            );
        }

        summary.committed = self.streams.commit().await?;
        self.transition(RunState::Running, RunState::Committed)?;

        tracing::info!(
            total = summary.total,
            processed = summary.processed,
            skipped = summary.skipped,
            added = summary.streams_added,
            duplicates = summary.duplicates,
            failures = summary.failures,
            committed = summary.committed,
            elapsed_ms = start_time.elapsed().as_millis(),
            "Ingestion run completed"
        );

        Ok(summary)
    }
}
