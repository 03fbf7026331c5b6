use anyhow::Context;
use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use tracing::debug;

use super::models::PlayerResponse;
use super::{PlaybackPoll, PlaybackSource};
use crate::config::SpotifyConfig;
use crate::error::FetchError;
use crate::retry::RetryPolicy;

/// Spotify Web API client for the player endpoint.
#[derive(Debug, Clone)]
pub struct SpotifyApi {
    http: reqwest::Client,
    api_base: String,
    retry: RetryPolicy,
}

impl SpotifyApi {
    pub fn new(cfg: &SpotifyConfig, retry: RetryPolicy) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(6))
            .build()
            .context("build spotify client")?;
        Ok(Self {
            http,
            api_base: cfg.api_base.trim_end_matches('/').to_string(),
            retry,
        })
    }
}

#[async_trait]
impl PlaybackSource for SpotifyApi {
    async fn playback(&self, access_token: &str) -> PlaybackPoll {
        let url = format!("{}/me/player", self.api_base);
        let bearer = format!("Bearer {access_token}");
        let http = &self.http;
        let (url, bearer) = (url.as_str(), bearer.as_str());

        let result = self
            .retry
            .run(move || async move {
                let response = http.get(url).header(AUTHORIZATION, bearer).send().await?;
                let status = response.status().as_u16();
                let body = response.text().await?;
                Ok((status, body))
            })
            .await;

        match result {
            Ok((status, body)) => classify(status, &body),
            Err(e) => PlaybackPoll::Error(e),
        }
    }
}

/// Map a player endpoint response onto a [`PlaybackPoll`].
pub fn classify(status: u16, body: &str) -> PlaybackPoll {
    match status {
        204 => PlaybackPoll::Inactive,
        401 => PlaybackPoll::AuthExpired,
        200 => match serde_json::from_str::<PlayerResponse>(body) {
            Ok(resp) => match resp.into_playback() {
                Some(playback) => PlaybackPoll::Active(playback),
                None => PlaybackPoll::Inactive,
            },
            Err(e) => {
                debug!("unreadable player response: {e}");
                PlaybackPoll::Error(FetchError::MalformedData(e.to_string()))
            }
        },
        other => PlaybackPoll::Error(FetchError::Status(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_statuses() {
        assert!(matches!(classify(204, ""), PlaybackPoll::Inactive));
        assert!(matches!(classify(401, "{}"), PlaybackPoll::AuthExpired));
        assert!(matches!(
            classify(429, ""),
            PlaybackPoll::Error(FetchError::Status(429))
        ));
        assert!(matches!(
            classify(200, "<html>"),
            PlaybackPoll::Error(FetchError::MalformedData(_))
        ));
    }

    #[test]
    fn test_classify_body() {
        assert!(matches!(
            classify(200, r#"{"is_playing": false, "item": null}"#),
            PlaybackPoll::Inactive
        ));

        let body = r#"{"is_playing": true, "progress_ms": 1500,
            "item": {"id": "t1", "name": "Song", "artists": [{"name": "Artist"}], "album": {"name": "LP"}}}"#;
        match classify(200, body) {
            PlaybackPoll::Active(p) => {
                assert_eq!(p.track_id, "t1");
                assert_eq!(p.identity.artist, "Artist");
                assert_eq!(p.progress_ms, 1500);
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
