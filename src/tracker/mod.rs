//! The playback polling loop.
//!
//! The tracker is the only writer of the published status snapshot. It polls
//! the playback source, detects track changes by provider id, and looks up the
//! current lyric line in its in-memory buffer. Lyric resolution runs elsewhere:
//! on a cache miss the tracker fires a [`ResolveTrigger`] and then simply
//! re-reads the cache store every tick until a document shows up there.

pub mod status;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::TrackerConfig;
use crate::error::FetchError;
use crate::lyrics::{LyricDocument, Resolver, TrackIdentity};
use crate::spotify::models::Session;
use crate::spotify::{Playback, PlaybackPoll, PlaybackSource, SessionStore, TokenService};
use crate::storage::CacheStore;
pub use status::{AuthStatus, StatusHandle, StatusPublisher};

pub const PAUSED_TEXT: &str = "Paused";
pub const SEARCHING_TEXT: &str = "Searching...";
/// Shown while lyrics are loaded but no line has started yet.
pub const GAP_TEXT: &str = "...";

/// Kicks off background resolution for a track. Must not block.
pub trait ResolveTrigger: Send + Sync {
    fn trigger(&self, identity: &TrackIdentity);
}

impl ResolveTrigger for Resolver {
    fn trigger(&self, identity: &TrackIdentity) {
        self.spawn(identity.clone());
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    NoSession,
    Authorizing,
    Active(Activity),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activity {
    IdleNoTrack,
    Tracking,
}

pub struct Tracker {
    playback: Arc<dyn PlaybackSource>,
    tokens: Arc<dyn TokenService>,
    resolver: Arc<dyn ResolveTrigger>,
    cache: CacheStore,
    sessions: SessionStore,
    session: Option<Session>,
    phase: Phase,
    status: StatusPublisher,
    cfg: TrackerConfig,
    last_track_id: Option<String>,
    buffer: LyricDocument,
}

impl Tracker {
    pub fn new(
        playback: Arc<dyn PlaybackSource>,
        tokens: Arc<dyn TokenService>,
        resolver: Arc<dyn ResolveTrigger>,
        cache: CacheStore,
        sessions: SessionStore,
        cfg: TrackerConfig,
    ) -> Self {
        let session = sessions.load();
        let status = StatusPublisher::new();
        let phase = if session.is_some() {
            status.update(|s| s.auth_status = AuthStatus::Ok);
            Phase::Active(Activity::IdleNoTrack)
        } else {
            Phase::NoSession
        };
        Self {
            playback,
            tokens,
            resolver,
            cache,
            sessions,
            session,
            phase,
            status,
            cfg,
            last_track_id: None,
            buffer: LyricDocument::default(),
        }
    }

    pub fn status_handle(&self) -> StatusHandle {
        self.status.handle()
    }

    /// Wait up to the configured timeout for an authorization code. Returns
    /// whether a session is available afterwards.
    pub async fn authorize(&mut self, codes: &mut mpsc::Receiver<String>) -> bool {
        if self.session.is_some() {
            return true;
        }

        self.phase = Phase::Authorizing;
        self.status.update(|s| s.auth_status = AuthStatus::Missing);
        let wait = Duration::from_secs(self.cfg.auth_timeout_secs);
        info!("authorize in a browser (or paste the redirect URL here):");
        info!("{}", self.tokens.authorize_url());
        info!("waiting {}s for authorization", wait.as_secs());

        let deadline = tokio::time::Instant::now() + wait;
        loop {
            match tokio::time::timeout_at(deadline, codes.recv()).await {
                Ok(Some(code)) => {
                    if self.accept_code(&code).await {
                        return true;
                    }
                }
                Ok(None) => {
                    debug!("authorization code channel closed");
                    break;
                }
                Err(_) => break,
            }
        }

        warn!("authorization timed out, continuing without sync");
        self.phase = Phase::NoSession;
        self.status.update(|s| s.auth_status = AuthStatus::Timeout);
        false
    }

    /// Exchange a code for tokens and adopt the resulting session.
    pub async fn accept_code(&mut self, code: &str) -> bool {
        let grant = match self.tokens.exchange_code(code).await {
            Ok(grant) => grant,
            Err(e) => {
                warn!("authorization code rejected: {e}");
                return false;
            }
        };
        if let Some(secs) = grant.expires_in {
            debug!("access token valid for {secs}s");
        }

        let session = Session::from_grant(grant);
        if let Err(e) = self.sessions.save(&session) {
            warn!("failed to save session: {e:#}");
        }
        self.session = Some(session);
        self.phase = Phase::Active(Activity::IdleNoTrack);
        self.status.update(|s| s.auth_status = AuthStatus::Ok);
        info!("authorization successful");
        true
    }

    /// One poll of the playback source. Returns how long to sleep before the next one.
    pub async fn tick(&mut self) -> Duration {
        let token = match (self.phase, &self.session) {
            (Phase::Active(_), Some(session)) => session.access_token.clone(),
            _ => return self.delay(self.cfg.no_session_tick_ms),
        };

        match self.playback.playback(&token).await {
            PlaybackPoll::Inactive => {
                self.phase = Phase::Active(Activity::IdleNoTrack);
                self.status.update(|s| {
                    s.is_playing = false;
                    s.current_lyric = PAUSED_TEXT.to_string();
                });
                self.delay(self.cfg.idle_tick_ms)
            }
            PlaybackPoll::Active(playback) => {
                self.phase = Phase::Active(Activity::Tracking);
                self.observe(playback);
                self.delay(self.cfg.tick_ms)
            }
            PlaybackPoll::AuthExpired => self.refresh_session().await,
            PlaybackPoll::Error(e) => {
                debug!("playback poll failed: {e}");
                self.delay(self.cfg.error_backoff_ms)
            }
        }
    }

    /// Fold one active playback sample into the buffer and the published status.
    pub fn observe(&mut self, playback: Playback) {
        let Playback {
            track_id,
            identity,
            is_playing,
            progress_ms,
        } = playback;

        if self.last_track_id.as_deref() != Some(track_id.as_str()) {
            info!("now playing {}", identity.label());
            self.last_track_id = Some(track_id);
            self.buffer = LyricDocument::default();
            self.status.update(|s| s.current_lyric = SEARCHING_TEXT.to_string());

            match self.cache.read(&identity) {
                Some(doc) => self.buffer = doc,
                None => self.resolver.trigger(&identity),
            }
        } else if self.buffer.is_empty() {
            if let Some(doc) = self.cache.read(&identity) {
                if !doc.is_empty() {
                    debug!("picked up {} cached lines for {}", doc.len(), identity.label());
                }
                self.buffer = doc;
            }
        }

        let lyric = if self.buffer.is_empty() {
            identity.label()
        } else {
            let at = progress_ms as f64 / 1000.0 + self.cfg.latency_offset_secs;
            match self.buffer.current_line(at) {
                "" => GAP_TEXT.to_string(),
                line => line.to_string(),
            }
        };

        self.status.update(|s| {
            s.is_playing = is_playing;
            s.track = identity.title;
            s.artist = identity.artist;
            s.album = identity.album;
            s.progress_ms = progress_ms;
            s.current_lyric = lyric;
        });
    }

    async fn refresh_session(&mut self) -> Duration {
        let Some(session) = self.session.clone() else {
            return self.delay(self.cfg.no_session_tick_ms);
        };
        let Some(refresh_token) = session.refresh_token.as_deref() else {
            warn!("access token expired and there is no refresh token; authorize again:");
            info!("{}", self.tokens.authorize_url());
            self.session = None;
            self.phase = Phase::NoSession;
            self.status.update(|s| s.auth_status = AuthStatus::Expired);
            return self.delay(self.cfg.no_session_tick_ms);
        };

        match self.tokens.refresh(refresh_token).await {
            Ok(grant) => {
                let next = session.refreshed(grant);
                if let Err(e) = self.sessions.save(&next) {
                    warn!("failed to save refreshed session: {e:#}");
                }
                self.session = Some(next);
                self.status.update(|s| s.auth_status = AuthStatus::Ok);
                debug!("access token refreshed");
                Duration::ZERO
            }
            Err(e) => {
                if matches!(e, FetchError::AuthExpired) {
                    warn!("refresh token rejected");
                } else {
                    warn!("token refresh failed: {e}");
                }
                self.status.update(|s| s.auth_status = AuthStatus::Expired);
                self.delay(self.cfg.error_backoff_ms)
            }
        }
    }

    fn delay(&self, ms: u64) -> Duration {
        Duration::from_millis(ms)
    }

    /// Poll forever. Codes arriving on `codes` are exchanged whenever they show
    /// up, including after the authorization window closed.
    pub async fn run(mut self, mut codes: mpsc::Receiver<String>) {
        if !self.authorize(&mut codes).await {
            debug!("no session yet, polling will start once a code arrives");
        }

        loop {
            let delay = self.tick().await;

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                Some(code) = codes.recv() => {
                    self.accept_code(&code).await;
                }
            }
        }
    }
}
