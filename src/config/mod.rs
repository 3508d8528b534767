use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

pub mod defaults;
pub mod duration_serde;

use defaults::*;
use duration_serde::duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub playlist_filter: PlaylistFilterConfig,
    #[serde(default)]
    pub proxy: ProxyConfig,
    #[serde(default)]
    pub playback: PlaybackConfig,
    #[serde(default)]
    pub live: LiveConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Settings for the ad-filtering playlist rewriter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaylistFilterConfig {
    /// Per-request timeout for playlist and variant fetches
    #[serde(default = "default_fetch_timeout", with = "duration")]
    pub fetch_timeout: Duration,
    /// Directory holding rewritten `.m3u8` files
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,
    /// Upper bound on bytes read from a playlist body
    #[serde(default = "default_max_playlist_bytes")]
    pub max_playlist_bytes: usize,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

/// Backend proxy used to build filtered candidate URLs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// Base URL of the backend, e.g. `https://tv.example.com`. No proxy candidates without it.
    #[serde(default)]
    pub backend_url: Option<String>,
    #[serde(default = "default_modern_proxy_path")]
    pub modern_path: String,
    #[serde(default = "default_legacy_proxy_path")]
    pub legacy_path: String,
    #[serde(default = "default_ad_block_enabled")]
    pub ad_block_enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybackConfig {
    /// Minimum spacing between throttled resume-record saves
    #[serde(default = "default_resume_save_interval", with = "duration")]
    pub resume_save_interval: Duration,
    /// Progress fraction at which the "play next" prompt appears
    #[serde(default = "default_play_next_threshold")]
    pub play_next_threshold: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiveConfig {
    /// How long a live stream may take to report playing before falling back
    #[serde(default = "default_live_fallback_timeout", with = "duration")]
    pub fallback_timeout: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// JSON file backing resume records, settings and favorites
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
}

fn default_fetch_timeout() -> Duration {
    DEFAULT_PLAYLIST_FETCH_TIMEOUT
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from(DEFAULT_PLAYLIST_CACHE_DIR)
}

fn default_max_playlist_bytes() -> usize {
    DEFAULT_MAX_PLAYLIST_BYTES
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}

fn default_modern_proxy_path() -> String {
    DEFAULT_MODERN_PROXY_PATH.to_string()
}

fn default_legacy_proxy_path() -> String {
    DEFAULT_LEGACY_PROXY_PATH.to_string()
}

fn default_ad_block_enabled() -> bool {
    DEFAULT_AD_BLOCK_ENABLED
}

fn default_resume_save_interval() -> Duration {
    DEFAULT_RESUME_SAVE_INTERVAL
}

fn default_play_next_threshold() -> f64 {
    DEFAULT_PLAY_NEXT_THRESHOLD
}

fn default_live_fallback_timeout() -> Duration {
    DEFAULT_LIVE_FALLBACK_TIMEOUT
}

fn default_store_path() -> PathBuf {
    PathBuf::from(DEFAULT_STORE_PATH)
}

impl Default for PlaylistFilterConfig {
    fn default() -> Self {
        Self {
            fetch_timeout: default_fetch_timeout(),
            cache_dir: default_cache_dir(),
            max_playlist_bytes: default_max_playlist_bytes(),
            user_agent: default_user_agent(),
        }
    }
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            backend_url: None,
            modern_path: default_modern_proxy_path(),
            legacy_path: default_legacy_proxy_path(),
            ad_block_enabled: default_ad_block_enabled(),
        }
    }
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            resume_save_interval: default_resume_save_interval(),
            play_next_threshold: default_play_next_threshold(),
        }
    }
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            fallback_timeout: default_live_fallback_timeout(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_file =
            std::env::var("CONFIG_FILE").unwrap_or_else(|_| "config.toml".to_string());
        Self::load_from_file(&config_file)
    }

    pub fn load_from_file(config_file: &str) -> Result<Self> {
        if std::path::Path::new(&config_file).exists() {
            let contents = std::fs::read_to_string(config_file)?;
            Ok(toml::from_str(&contents)?)
        } else {
            let default_config = Self::default();
            let contents = toml::to_string_pretty(&default_config)?;
            std::fs::write(config_file, contents)?;
            info!("Created default config file: {}", config_file);
            Ok(default_config)
        }
    }
}
