//! Lyrics resolution and synchronization
//!
//! This module provides:
//! - LRCLIB API client for fetching lyrics
//! - Synced lyrics codec and current-line lookup
//! - Title normalization for better match odds
//! - The tiered resolver that fills the lyric cache

pub mod lrclib;
pub mod normalize;
pub mod parser;
pub mod resolver;

pub use lrclib::LrclibClient;
pub use parser::LyricDocument;
pub use resolver::Resolver;

/// Display metadata of a track as reported by the playback source.
///
/// Track changes are detected by the provider's track id, not by this struct.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct TrackIdentity {
    pub title: String,
    pub artist: String,
    pub album: String,
}

impl TrackIdentity {
    pub fn new(title: impl Into<String>, artist: impl Into<String>, album: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            artist: artist.into(),
            album: album.into(),
        }
    }

    /// "Artist - Title", shown when no lyrics are available.
    pub fn label(&self) -> String {
        format!("{} - {}", self.artist, self.title)
    }
}
