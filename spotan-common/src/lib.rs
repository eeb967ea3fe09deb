//! # Spotan Common Library
//!
//! Shared code for the spotan tools including:
//! - Common error type
//! - Bootstrap configuration loading (TOML, root folder resolution)
//! - SQLite database initialization and schema
//! - Timestamp helpers

pub mod config;
pub mod db;
pub mod error;
pub mod time;

pub use error::{Error, Result};
