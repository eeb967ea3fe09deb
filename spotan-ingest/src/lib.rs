//! spotan-ingest: listening history ingestion
//!
//! Resolves every played track (with its album and artists) against the
//! Spotify Web API through single-flight caches and stores deduplicated
//! streams in SQLite.

pub mod config;
pub mod db;
pub mod error;
pub mod input;
pub mod models;
pub mod remote;
pub mod services;
pub mod utils;

pub use error::{IngestError, IngestResult, ResolveError};
