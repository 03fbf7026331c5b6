use serde::{Deserialize, Serialize};

use super::Playback;
use crate::lyrics::TrackIdentity;

/// `GET /me/player` body, reduced to what the tracker needs.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct PlayerResponse {
    pub is_playing: bool,
    pub progress_ms: Option<u64>,
    pub item: Option<PlayerItem>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct PlayerItem {
    /// Null for local files.
    pub id: Option<String>,
    pub uri: Option<String>,
    pub name: String,
    pub artists: Vec<Named>,
    pub album: Option<Named>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Named {
    pub name: String,
}

impl PlayerResponse {
    pub fn into_playback(self) -> Option<Playback> {
        let item = self.item?;
        let artist = item.artists.into_iter().next().map(|a| a.name).unwrap_or_default();
        let album = item.album.map(|a| a.name).unwrap_or_default();
        let track_id = item
            .id
            .or(item.uri)
            .unwrap_or_else(|| format!("local:{artist}:{}", item.name));
        Some(Playback {
            track_id,
            identity: TrackIdentity::new(item.name, artist, album),
            is_playing: self.is_playing,
            progress_ms: self.progress_ms.unwrap_or(0),
        })
    }
}

/// Token endpoint response.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    /// Present on code exchange; a refresh may or may not rotate it.
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
}

/// Persisted tokens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub saved_at: i64,
}

impl Session {
    pub fn from_grant(grant: TokenGrant) -> Self {
        Self {
            access_token: grant.access_token,
            refresh_token: grant.refresh_token,
            saved_at: now_unix(),
        }
    }

    /// Apply a refresh grant, keeping the old refresh token unless a new one came back.
    pub fn refreshed(&self, grant: TokenGrant) -> Self {
        Self {
            access_token: grant.access_token,
            refresh_token: grant.refresh_token.or_else(|| self.refresh_token.clone()),
            saved_at: now_unix(),
        }
    }
}

fn now_unix() -> i64 {
    time::OffsetDateTime::now_utc().unix_timestamp()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_player_response_to_playback() {
        let raw = r#"{
            "is_playing": true,
            "progress_ms": 61234,
            "item": {
                "id": "4uLU6hMCjMI75M1A2tKUQC",
                "name": "Song",
                "artists": [{"name": "First"}, {"name": "Second"}],
                "album": {"name": "Album"}
            }
        }"#;
        let resp: PlayerResponse = serde_json::from_str(raw).unwrap();
        let playback = resp.into_playback().unwrap();
        assert_eq!(playback.track_id, "4uLU6hMCjMI75M1A2tKUQC");
        assert_eq!(playback.identity, TrackIdentity::new("Song", "First", "Album"));
        assert!(playback.is_playing);
        assert_eq!(playback.progress_ms, 61234);
    }

    #[test]
    fn test_local_file_gets_synthetic_id() {
        let raw = r#"{"is_playing": false, "item": {"id": null, "name": "Demo", "artists": [{"name": "Me"}]}}"#;
        let resp: PlayerResponse = serde_json::from_str(raw).unwrap();
        let playback = resp.into_playback().unwrap();
        assert_eq!(playback.track_id, "local:Me:Demo");
        assert_eq!(playback.identity.album, "");
        assert_eq!(playback.progress_ms, 0);
    }

    #[test]
    fn test_no_item_is_no_playback() {
        let resp: PlayerResponse = serde_json::from_str(r#"{"is_playing": false, "item": null}"#).unwrap();
        assert!(resp.into_playback().is_none());
    }

    #[test]
    fn test_refresh_keeps_refresh_token() {
        let session = Session {
            access_token: "old".into(),
            refresh_token: Some("r1".into()),
            saved_at: 0,
        };
        let grant = TokenGrant {
            access_token: "new".into(),
            refresh_token: None,
            expires_in: Some(3600),
        };
        let next = session.refreshed(grant);
        assert_eq!(next.access_token, "new");
        assert_eq!(next.refresh_token.as_deref(), Some("r1"));
        assert!(next.saved_at > 0);

        let rotated = session.refreshed(TokenGrant {
            access_token: "newer".into(),
            refresh_token: Some("r2".into()),
            expires_in: None,
        });
        assert_eq!(rotated.refresh_token.as_deref(), Some("r2"));
    }
}
