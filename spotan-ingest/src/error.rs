//! Error types for spotan-ingest
//!
//! Three layers, innermost first: [`RemoteError`] from the metadata
//! service, [`ResolveError`] from the entity resolvers, and [`IngestError`]
//! from the deduplicator and orchestrator.

use crate::remote::RemoteError;
use thiserror::Error;

/// Failure to produce an artist, album or track.
///
/// Cloneable: one in-flight fetch may have many waiters and each of them
/// receives the same failure.
#[derive(Debug, Clone, Error)]
pub enum ResolveError {
    /// The remote lookup itself failed
    #[error("Fetching {entity} {id} failed: {source}")]
    Remote {
        entity: &'static str,
        id: String,
        #[source]
        source: RemoteError,
    },

    /// A related entity (album or artist) could not be resolved
    #[error("Resolving {entity} {id} failed: {source}")]
    Dependency {
        entity: &'static str,
        id: String,
        #[source]
        source: Box<ResolveError>,
    },

    /// The provider returned data that cannot be mapped
    #[error("Invalid {entity} {id} from provider: {message}")]
    InvalidData {
        entity: &'static str,
        id: String,
        message: String,
    },

    /// Persisting the built entity failed
    #[error("Persisting {entity} {id} failed: {message}")]
    Store {
        entity: &'static str,
        id: String,
        message: String,
    },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ResolveError {
    pub fn remote(entity: &'static str, id: &str, source: RemoteError) -> Self {
        Self::Remote {
            entity,
            id: id.to_string(),
            source,
        }
    }

    pub fn dependency(entity: &'static str, id: &str, source: ResolveError) -> Self {
        Self::Dependency {
            entity,
            id: id.to_string(),
            source: Box::new(source),
        }
    }

    pub fn store(entity: &'static str, id: &str, source: spotan_common::Error) -> Self {
        Self::Store {
            entity,
            id: id.to_string(),
            message: source.to_string(),
        }
    }

    /// Innermost remote failure, if the chain ends in one
    pub fn remote_cause(&self) -> Option<&RemoteError> {
        match self {
            Self::Remote { source, .. } => Some(source),
            Self::Dependency { source, .. } => source.remote_cause(),
            _ => None,
        }
    }

    /// True when the chain ends in an upstream "not found"
    pub fn is_not_found(&self) -> bool {
        matches!(self.remote_cause(), Some(RemoteError::NotFound(_)))
    }
}

/// Errors raised while ingesting play records
#[derive(Debug, Error)]
pub enum IngestError {
    /// Track URI not in `scheme:type:id` form (fatal to that record only)
    #[error("Malformed input: {0}")]
    MalformedInput(String),

    /// The referenced track (or one of its dependencies) could not be resolved
    #[error("Track {track_id} could not be resolved: {source}")]
    Resolve {
        track_id: String,
        #[source]
        source: ResolveError,
    },

    /// Durable store failure (preload or commit)
    #[error(transparent)]
    Store(#[from] spotan_common::Error),

    /// Operation not allowed in the current orchestrator state
    #[error("Invalid state: {0}")]
    InvalidState(String),
}

/// Result type for ingestion operations
pub type IngestResult<T> = Result<T, IngestError>;
