//! Listening history input

pub mod end_song;

pub use end_song::{parse_end_songs, read_streaming_history};
