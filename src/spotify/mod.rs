//! Spotify collaborators: playback polling, token exchange and the session file.

pub mod api;
pub mod auth;
pub mod models;

use async_trait::async_trait;

use crate::error::FetchError;
use crate::lyrics::TrackIdentity;
use models::TokenGrant;

pub use api::SpotifyApi;
pub use auth::{SessionStore, SpotifyAuth};

/// What one poll of the player endpoint said.
#[derive(Debug)]
pub enum PlaybackPoll {
    /// Nothing loaded in the player (204, or a body without an item).
    Inactive,
    Active(Playback),
    AuthExpired,
    Error(FetchError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Playback {
    /// Provider track id, used for change detection.
    pub track_id: String,
    pub identity: TrackIdentity,
    pub is_playing: bool,
    pub progress_ms: u64,
}

#[async_trait]
pub trait PlaybackSource: Send + Sync {
    async fn playback(&self, access_token: &str) -> PlaybackPoll;
}

#[async_trait]
pub trait TokenService: Send + Sync {
    /// Where the user grants access; the redirect carries the authorization code.
    fn authorize_url(&self) -> String;

    async fn exchange_code(&self, code: &str) -> Result<TokenGrant, FetchError>;

    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, FetchError>;
}
