//! Track entity and its audio-feature enums

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Pitch class of a track's estimated key.
///
/// Discriminants equal the provider's integer pitch class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Key {
    C = 0,
    CSharp = 1,
    D = 2,
    DSharp = 3,
    E = 4,
    F = 5,
    FSharp = 6,
    G = 7,
    GSharp = 8,
    A = 9,
    ASharp = 10,
    B = 11,
}

impl Key {
    const ALL: [Key; 12] = [
        Key::C,
        Key::CSharp,
        Key::D,
        Key::DSharp,
        Key::E,
        Key::F,
        Key::FSharp,
        Key::G,
        Key::GSharp,
        Key::A,
        Key::ASharp,
        Key::B,
    ];

    /// Map a provider pitch class. `None` outside 0-11 (the provider sends -1
    /// when no key was detected).
    pub fn from_pitch_class(value: i64) -> Option<Key> {
        usize::try_from(value).ok().and_then(|i| Self::ALL.get(i).copied())
    }

    pub fn pitch_class(self) -> i64 {
        self as i64
    }
}

/// Modality of a track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Mode {
    Minor = 0,
    Major = 1,
}

impl Mode {
    pub fn from_raw(value: i64) -> Option<Mode> {
        match value {
            0 => Some(Mode::Minor),
            1 => Some(Mode::Major),
            _ => None,
        }
    }

    pub fn raw(self) -> i64 {
        self as i64
    }
}

/// Audio-feature scalars of a track
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AudioFeatures {
    pub acousticness: f32,
    pub danceability: f32,
    pub energy: f32,
    pub instrumentalness: f32,
    pub key: Option<Key>,
    pub liveness: f32,
    pub loudness: f32,
    pub mode: Mode,
    pub speechiness: f32,
    pub estimated_tempo: f32,
    pub time_signature: f32,
    pub valence: f32,
}

/// Track as stored and cached
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    /// Provider id
    pub spotify_id: String,
    pub name: String,
    pub length_ms: i64,
    pub explicit: bool,
    pub preview_url: Option<String>,
    pub features: AudioFeatures,
    pub album_id: Option<String>,
    /// Artist ids in provider credit order
    pub artist_ids: Vec<String>,
    pub last_refreshed: DateTime<Utc>,
}
