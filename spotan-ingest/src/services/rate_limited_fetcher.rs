//! Rate-limit absorbing wrapper around the metadata service
//!
//! A rate-limit response is never surfaced: the call sleeps for the
//! server-specified delay and is issued again, with no attempt cap. Every
//! other error is returned on the first occurrence.

use crate::remote::{
    MetadataService, RemoteAlbum, RemoteArtist, RemoteAudioFeatures, RemoteError, RemoteTrack,
};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

#[derive(Clone)]
pub struct RateLimitedFetcher {
    service: Arc<dyn MetadataService>,
    backoffs: Arc<AtomicU64>,
}

impl RateLimitedFetcher {
    pub fn new(service: Arc<dyn MetadataService>) -> Self {
        Self {
            service,
            backoffs: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Total rate-limit sleeps taken by this fetcher and its clones
    pub fn backoff_count(&self) -> u64 {
        self.backoffs.load(Ordering::Relaxed)
    }

    pub async fn get_track(&self, id: &str) -> Result<RemoteTrack, RemoteError> {
        self.call("track", id, || self.service.get_track(id)).await
    }

    pub async fn get_audio_features(&self, id: &str) -> Result<RemoteAudioFeatures, RemoteError> {
        self.call("audio features", id, || self.service.get_audio_features(id))
            .await
    }

    pub async fn get_album(&self, id: &str) -> Result<RemoteAlbum, RemoteError> {
        self.call("album", id, || self.service.get_album(id)).await
    }

    pub async fn get_artist(&self, id: &str) -> Result<RemoteArtist, RemoteError> {
        self.call("artist", id, || self.service.get_artist(id)).await
    }

    async fn call<F, Fut, T>(&self, operation: &str, id: &str, mut request: F) -> Result<T, RemoteError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RemoteError>>,
    {
        let start_time = Instant::now();
        let mut attempt = 0u32;

        loop {
            attempt += 1;

            match request().await {
                Ok(value) => {
                    if attempt > 1 {
                        tracing::debug!(
                            operation,
                            id,
                            attempt,
                            elapsed_ms = start_time.elapsed().as_millis(),
                            "Request succeeded after rate-limit backoff"
                        );
                    }
                    return Ok(value);
                }
                Err(RemoteError::RateLimited { retry_after }) => {
                    self.backoffs.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(
                        operation,
                        id,
                        attempt,
                        retry_after_secs = retry_after.as_secs_f64(),
                        "Rate limited by metadata service, backing off"
                    );
                    tokio::time::sleep(retry_after).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Replays scripted artist responses, then succeeds
    struct Scripted {
        responses: Mutex<Vec<Result<RemoteArtist, RemoteError>>>,
        calls: AtomicU64,
    }

    impl Scripted {
        fn new(mut responses: Vec<Result<RemoteArtist, RemoteError>>) -> Self {
            responses.reverse();
            Self {
                responses: Mutex::new(responses),
                calls: AtomicU64::new(0),
            }
        }
    }

    fn artist() -> RemoteArtist {
        RemoteArtist {
            id: "ar1".to_string(),
            name: "Band".to_string(),
            images: vec![],
            popularity: 50,
        }
    }

    #[async_trait]
    impl MetadataService for Scripted {
        async fn get_track(&self, id: &str) -> Result<RemoteTrack, RemoteError> {
            Err(RemoteError::NotFound(id.to_string()))
        }

        async fn get_audio_features(&self, id: &str) -> Result<RemoteAudioFeatures, RemoteError> {
            Err(RemoteError::NotFound(id.to_string()))
        }

        async fn get_album(&self, id: &str) -> Result<RemoteAlbum, RemoteError> {
            Err(RemoteError::NotFound(id.to_string()))
        }

        async fn get_artist(&self, _id: &str) -> Result<RemoteArtist, RemoteError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.responses
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Ok(artist()))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_retry_after_then_succeeds() {
        let service = Arc::new(Scripted::new(vec![Err(RemoteError::RateLimited {
            retry_after: Duration::from_secs(2),
        })]));
        let fetcher = RateLimitedFetcher::new(service.clone());

        let started = tokio::time::Instant::now();
        let result = fetcher.get_artist("ar1").await.expect("should succeed");

        assert!(started.elapsed() >= Duration::from_secs(2));
        assert_eq!(result, artist());
        assert_eq!(service.calls.load(Ordering::SeqCst), 2);
        assert_eq!(fetcher.backoff_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_without_cap() {
        let limited = (0..25)
            .map(|_| {
                Err(RemoteError::RateLimited {
                    retry_after: Duration::from_secs(1),
                })
            })
            .collect();
        let service = Arc::new(Scripted::new(limited));
        let fetcher = RateLimitedFetcher::new(service.clone());

        assert!(fetcher.get_artist("ar1").await.is_ok());
        assert_eq!(service.calls.load(Ordering::SeqCst), 26);
    }

    #[tokio::test]
    async fn test_other_errors_are_not_retried() {
        let service = Arc::new(Scripted::new(vec![Err(RemoteError::Network(
            "connection reset".to_string(),
        ))]));
        let fetcher = RateLimitedFetcher::new(service.clone());

        let err = fetcher.get_artist("ar1").await.unwrap_err();
        assert!(matches!(err, RemoteError::Network(_)));
        assert_eq!(service.calls.load(Ordering::SeqCst), 1);
    }
}
