//! Entity models
//!
//! Artists, albums and tracks reference each other by provider id; the
//! owning cache is the single source of truth for each entity's content.

pub mod album;
pub mod artist;
pub mod play_record;
pub mod stream;
pub mod track;

pub use album::Album;
pub use artist::Artist;
pub use play_record::PlayRecord;
pub use stream::{Stream, StreamKey};
pub use track::{AudioFeatures, Key, Mode, Track};
