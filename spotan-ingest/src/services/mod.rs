//! Ingestion core
//!
//! Resolvers layer a [`SingleFlightCache`] over the [`RateLimitedFetcher`]:
//! tracks depend on albums and artists, albums depend on artists. The
//! [`StreamDeduplicator`] and [`IngestionOrchestrator`] sit on top.

pub mod album_resolver;
pub mod artist_resolver;
pub mod ingestion_orchestrator;
pub mod rate_limited_fetcher;
pub mod single_flight;
pub mod staleness;
pub mod stream_deduplicator;
pub mod track_resolver;

pub use album_resolver::AlbumResolver;
pub use artist_resolver::ArtistResolver;
pub use ingestion_orchestrator::{
    IngestionOrchestrator, IngestionSettings, IngestionSummary, RunState,
};
pub use rate_limited_fetcher::RateLimitedFetcher;
pub use single_flight::{read_entry, CacheEntry, EntityHandle, SingleFlightCache};
pub use staleness::StalenessPolicy;
pub use stream_deduplicator::{parse_track_id, ProcessOutcome, StreamDeduplicator};
pub use track_resolver::TrackResolver;

/// Ids in first-seen order with repeats dropped (link tables key on the pair)
fn unique_ids(ids: &[String]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    ids.iter()
        .filter(|id| !id.is_empty() && seen.insert(id.as_str()))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unique_ids_keeps_first_occurrence() {
        let ids: Vec<String> = ["b", "a", "", "b", "c"].iter().map(|s| s.to_string()).collect();
        assert_eq!(unique_ids(&ids), vec!["b", "a", "c"]);
    }
}
