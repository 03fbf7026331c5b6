use anyhow::Context;
use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::Rng;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::TokenService;
use super::models::{Session, TokenGrant};
use crate::config::SpotifyConfig;
use crate::error::FetchError;
use crate::retry::RetryPolicy;

/// PKCE verifier and its S256 challenge.
#[derive(Debug, Clone)]
pub struct Pkce {
    pub verifier: String,
    pub challenge: String,
}

impl Pkce {
    pub fn generate() -> Self {
        let mut bytes = [0u8; 64];
        rand::rng().fill(&mut bytes[..]);
        let verifier = URL_SAFE_NO_PAD.encode(bytes);
        let challenge = challenge_for(&verifier);
        Self {
            verifier,
            challenge,
        }
    }
}

pub fn challenge_for(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

/// Pull an authorization code out of pasted input: either the bare code or the
/// whole redirect URL.
pub fn extract_code(input: &str) -> Option<String> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }
    if input.contains("://") {
        let url = reqwest::Url::parse(input).ok()?;
        return url
            .query_pairs()
            .find(|(k, _)| k == "code")
            .map(|(_, v)| v.into_owned())
            .filter(|v| !v.is_empty());
    }
    if let Some(code) = input.strip_prefix("code=") {
        return Some(code.to_string()).filter(|c| !c.is_empty());
    }
    if input.chars().any(char::is_whitespace) {
        return None;
    }
    Some(input.to_string())
}

/// Token endpoint client (authorization code with PKCE, refresh).
#[derive(Debug, Clone)]
pub struct SpotifyAuth {
    http: reqwest::Client,
    cfg: SpotifyConfig,
    pkce: Pkce,
    retry: RetryPolicy,
}

impl SpotifyAuth {
    pub fn new(cfg: &SpotifyConfig, retry: RetryPolicy) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(6))
            .build()
            .context("build spotify accounts client")?;
        Ok(Self {
            http,
            cfg: cfg.clone(),
            pkce: Pkce::generate(),
            retry,
        })
    }

    fn token_url(&self) -> String {
        format!("{}/api/token", self.cfg.accounts_base.trim_end_matches('/'))
    }

    async fn post_token(&self, form: &[(&str, &str)]) -> Result<TokenGrant, FetchError> {
        let http = &self.http;
        let url = self.token_url();
        let url = url.as_str();

        let (status, body) = self
            .retry
            .run(move || async move {
                let response = http.post(url).form(form).send().await?;
                let status = response.status();
                let body = response.text().await?;
                if status.is_server_error() {
                    return Err(FetchError::NetworkTransient(format!("token endpoint {status}")));
                }
                Ok((status, body))
            })
            .await?;

        match status.as_u16() {
            200 => Ok(serde_json::from_str(&body)?),
            // invalid_grant and friends: the code or refresh token is no longer usable
            400 | 401 => {
                debug!("token endpoint rejected grant: {body}");
                Err(FetchError::AuthExpired)
            }
            other => Err(FetchError::Status(other)),
        }
    }
}

#[async_trait]
impl TokenService for SpotifyAuth {
    fn authorize_url(&self) -> String {
        format!(
            "{}/authorize?client_id={}&response_type=code&redirect_uri={}&scope={}&code_challenge_method=S256&code_challenge={}",
            self.cfg.accounts_base.trim_end_matches('/'),
            urlencoding::encode(&self.cfg.client_id),
            urlencoding::encode(&self.cfg.redirect_uri),
            urlencoding::encode(&self.cfg.scopes),
            self.pkce.challenge
        )
    }

    async fn exchange_code(&self, code: &str) -> Result<TokenGrant, FetchError> {
        self.post_token(&[
            ("client_id", self.cfg.client_id.as_str()),
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.cfg.redirect_uri.as_str()),
            ("code_verifier", self.pkce.verifier.as_str()),
        ])
        .await
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, FetchError> {
        self.post_token(&[
            ("client_id", self.cfg.client_id.as_str()),
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ])
        .await
    }
}

/// The session file on disk.
#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `None` when the file is missing or unreadable.
    pub fn load(&self) -> Option<Session> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!("read {}: {e}", self.path.display());
                return None;
            }
        };
        match serde_json::from_str::<Session>(&raw) {
            Ok(session) if !session.access_token.is_empty() => Some(session),
            Ok(_) => None,
            Err(e) => {
                warn!("ignoring corrupt session file {}: {e}", self.path.display());
                None
            }
        }
    }

    pub fn save(&self, session: &Session) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create dir {}", parent.display()))?;
        }
        let raw = serde_json::to_string(session).context("serialize session")?;
        std::fs::write(&self.path, raw).with_context(|| format!("write {}", self.path.display()))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let _ = std::fs::set_permissions(&self.path, std::fs::Permissions::from_mode(0o600));
        }
        Ok(())
    }

    /// Returns whether a session file was removed.
    pub fn clear(&self) -> anyhow::Result<bool> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e).with_context(|| format!("remove {}", self.path.display())),
        }
    }
}
