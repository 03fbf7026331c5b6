//! LRCLIB API client
//!
//! LRCLIB is a free lyrics API that provides synchronized (LRC format) lyrics.
//! API Documentation: https://lrclib.net/docs

use anyhow::Context;
use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::config::LrclibConfig;
use crate::error::FetchError;
use crate::retry::RetryPolicy;

/// One LRCLIB lyrics record, as returned by `/get` and inside `/search` results
#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct LrclibRecord {
    pub id: i64,
    pub track_name: String,
    pub artist_name: String,
    pub instrumental: bool,
    pub synced_lyrics: Option<String>,
    /// Older mirrors expose the synced text under this name.
    pub lrc: Option<String>,
}

impl LrclibRecord {
    /// First non-blank synced lyrics field.
    pub fn synced_text(&self) -> Option<&str> {
        [self.synced_lyrics.as_deref(), self.lrc.as_deref()]
            .into_iter()
            .flatten()
            .find(|s| !s.trim().is_empty())
    }

    pub fn has_synced(&self) -> bool {
        self.synced_text().is_some()
    }
}

/// A free-text search hit. Lives only while candidates are being ranked.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchCandidate {
    pub id: i64,
    pub track_name: String,
    pub artist_name: String,
    pub raw: LrclibRecord,
}

impl From<LrclibRecord> for SearchCandidate {
    fn from(raw: LrclibRecord) -> Self {
        Self {
            id: raw.id,
            track_name: raw.track_name.clone(),
            artist_name: raw.artist_name.clone(),
            raw,
        }
    }
}

/// The lyric database as seen by the resolver.
#[async_trait]
pub trait LyricsProvider: Send + Sync {
    /// Exact lookup by track and artist name. `Ok(None)` when nothing matches.
    async fn get(
        &self,
        track_name: &str,
        artist_name: &str,
    ) -> Result<Option<LrclibRecord>, FetchError>;

    /// Free-text search.
    async fn search(&self, query: &str) -> Result<Vec<SearchCandidate>, FetchError>;
}

/// LRCLIB API client
#[derive(Debug, Clone)]
pub struct LrclibClient {
    client: reqwest::Client,
    base_url: String,
    retry: RetryPolicy,
}

impl LrclibClient {
    pub fn new(cfg: &LrclibConfig, retry: RetryPolicy) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(cfg.user_agent.as_str())
            .timeout(std::time::Duration::from_secs(cfg.timeout_secs))
            .build()
            .context("build lrclib client")?;
        Ok(Self {
            client,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            retry,
        })
    }

    fn get_url(&self, track_name: &str, artist_name: &str) -> String {
        format!(
            "{}/get?track_name={}&artist_name={}",
            self.base_url,
            urlencoding::encode(track_name),
            urlencoding::encode(artist_name)
        )
    }

    fn search_url(&self, query: &str) -> String {
        format!("{}/search?q={}", self.base_url, urlencoding::encode(query))
    }

    async fn fetch_json<T>(&self, url: &str) -> Result<T, FetchError>
    where
        T: serde::de::DeserializeOwned,
    {
        let client = &self.client;
        self.retry
            .run(move || async move {
                let response = client.get(url).send().await?;
                let status = response.status();
                if status == reqwest::StatusCode::NOT_FOUND {
                    return Err(FetchError::NotFound);
                }
                if status.is_server_error() {
                    return Err(FetchError::NetworkTransient(format!("LRCLIB {status}")));
                }
                if !status.is_success() {
                    return Err(FetchError::Status(status.as_u16()));
                }
                let body = response.text().await?;
                Ok(serde_json::from_str(&body)?)
            })
            .await
    }
}

#[async_trait]
impl LyricsProvider for LrclibClient {
    async fn get(
        &self,
        track_name: &str,
        artist_name: &str,
    ) -> Result<Option<LrclibRecord>, FetchError> {
        let url = self.get_url(track_name, artist_name);
        debug!("LRCLIB get: {url}");
        match self.fetch_json::<LrclibRecord>(&url).await {
            Ok(record) => Ok(Some(record)),
            Err(FetchError::NotFound) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn search(&self, query: &str) -> Result<Vec<SearchCandidate>, FetchError> {
        let url = self.search_url(query);
        debug!("LRCLIB search: {url}");
        match self.fetch_json::<Vec<LrclibRecord>>(&url).await {
            Ok(records) => Ok(records.into_iter().map(SearchCandidate::from).collect()),
            Err(FetchError::NotFound) => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }
}
