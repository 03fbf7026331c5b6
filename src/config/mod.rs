use anyhow::Context;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::retry::RetryPolicy;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub paths: PathsConfig,
    pub spotify: SpotifyConfig,
    pub lrclib: LrclibConfig,
    pub tracker: TrackerConfig,
    pub retry: RetryConfig,
    pub resolver: ResolverConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub data_dir: PathBuf,
}

impl PathsConfig {
    /// One JSON file per track lives here.
    pub fn lyrics_dir(&self) -> PathBuf {
        self.data_dir.join("lyrics_cache")
    }

    pub fn session_file(&self) -> PathBuf {
        self.data_dir.join("spotify_session.json")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpotifyConfig {
    /// Public client id of the registered Spotify application (PKCE, no secret).
    pub client_id: String,
    pub redirect_uri: String,
    pub scopes: String,
    pub api_base: String,
    pub accounts_base: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LrclibConfig {
    pub base_url: String,
    pub user_agent: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Poll period while a track is playing.
    pub tick_ms: u64,
    /// Poll period while paused or nothing is playing.
    pub idle_tick_ms: u64,
    /// Sleep after a failed tick or a network error.
    pub error_backoff_ms: u64,
    /// Sleep while there is no usable session.
    pub no_session_tick_ms: u64,
    /// Added to the reported progress to compensate for output latency.
    pub latency_offset_secs: f64,
    pub auth_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub delay_ms: u64,
    pub backoff: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Minimum fuzzy score (0-100) a search candidate needs to be accepted.
    pub fuzzy_cutoff: u8,
    /// Decoded documents kept in memory by the cache store.
    pub memo_capacity: usize,
}

impl Default for PathsConfig {
    fn default() -> Self {
        let proj = ProjectDirs::from("dev", "lyricwatch", "lyricwatch");
        let data_dir = proj
            .as_ref()
            .map(|p| p.data_dir().to_path_buf())
            .unwrap_or_else(|| std::env::temp_dir().join("lyricwatch"));
        Self { data_dir }
    }
}

impl Default for SpotifyConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            redirect_uri: "http://127.0.0.1:8888/callback".to_string(),
            scopes: "user-read-playback-state".to_string(),
            api_base: "https://api.spotify.com/v1".to_string(),
            accounts_base: "https://accounts.spotify.com".to_string(),
        }
    }
}

impl Default for LrclibConfig {
    fn default() -> Self {
        Self {
            base_url: "https://lrclib.net/api".to_string(),
            user_agent: concat!("lyricwatch/", env!("CARGO_PKG_VERSION")).to_string(),
            timeout_secs: 6,
        }
    }
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            tick_ms: 150,
            idle_tick_ms: 1000,
            error_backoff_ms: 1000,
            no_session_tick_ms: 2000,
            latency_offset_secs: 0.2,
            auth_timeout_secs: 60,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            delay_ms: 1000,
            backoff: 1.0,
        }
    }
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            fuzzy_cutoff: 50,
            memo_capacity: 64,
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts, Duration::from_millis(self.delay_ms))
            .with_backoff(self.backoff)
    }
}

pub fn save(cfg: &Config, override_path: Option<&Path>) -> anyhow::Result<()> {
    let path = match override_path {
        Some(p) => p.to_path_buf(),
        None => default_config_path()?,
    };
    write_config(cfg, &path)
}

pub fn default_config_path() -> anyhow::Result<PathBuf> {
    let proj = ProjectDirs::from("dev", "lyricwatch", "lyricwatch")
        .context("ProjectDirs unavailable")?;
    Ok(proj.config_dir().join("config.toml"))
}

pub fn load(override_path: Option<&Path>) -> anyhow::Result<Config> {
    let path = match override_path {
        Some(p) => p.to_path_buf(),
        None => default_config_path()?,
    };

    if !path.exists() {
        let cfg = Config::default();
        write_config(&cfg, &path)?;
        return Ok(cfg);
    }

    let raw = fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))?;
    let cfg =
        toml::from_str::<Config>(&raw).with_context(|| format!("parse {}", path.display()))?;
    Ok(cfg)
}

fn write_config(cfg: &Config, path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("create dir {}", parent.display()))?;
    }
    let raw = toml::to_string_pretty(cfg).context("serialize config")?;
    fs::write(path, raw).with_context(|| format!("write {}", path.display()))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let _ = fs::set_permissions(path, fs::Permissions::from_mode(0o600));
    }
    Ok(())
}
