/// Configuration default values
///
/// This module contains all the default values for configuration options,
/// making them easily changeable in one central location.
use std::time::Duration;

// Playlist filter defaults
pub const DEFAULT_PLAYLIST_FETCH_TIMEOUT: Duration = Duration::from_secs(12);
pub const DEFAULT_PLAYLIST_CACHE_DIR: &str = "./data/playlists";
pub const DEFAULT_MAX_PLAYLIST_BYTES: usize = 2 * 1024 * 1024; // 2MB
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

// Proxy candidate defaults
pub const DEFAULT_MODERN_PROXY_PATH: &str = "/api/proxy/m3u8";
pub const DEFAULT_LEGACY_PROXY_PATH: &str = "/api/proxy-m3u8";
pub const DEFAULT_AD_BLOCK_ENABLED: bool = true;

// Playback session defaults
pub const DEFAULT_RESUME_SAVE_INTERVAL: Duration = Duration::from_secs(10);
pub const DEFAULT_PLAY_NEXT_THRESHOLD: f64 = 0.95;
pub const DEFAULT_PLAYBACK_RATE: f32 = 1.0;

// Live surface defaults
pub const DEFAULT_LIVE_FALLBACK_TIMEOUT: Duration = Duration::from_secs(15);

// Storage defaults
pub const DEFAULT_STORE_PATH: &str = "./data/playback.json";
