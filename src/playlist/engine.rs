use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::PlaylistFilterConfig;
use crate::errors::{AppResult, PlaylistError, PlaylistResult};
use crate::playlist::parser::{
    filter_and_normalize_media_playlist, has_segments, is_master_playlist, parse_master_variants,
};
use crate::utils::hash::stable_hash_hex;
use crate::utils::http_client::{FetchedText, PlaylistFetcher, ReqwestPlaylistFetcher};
use crate::utils::url::UrlUtils;

/// A rewritten playlist stored in the local cache directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilteredPlaylist {
    pub original_url: String,
    pub local_path: PathBuf,
    /// `file://` URL of `local_path`, playable as a candidate.
    pub file_url: String,
}

/// Fetches HLS playlists, strips ad markers and caches the result on disk.
///
/// The in-memory map only short-cuts lookups; a cache entry is valid exactly
/// while its file exists.
pub struct PlaylistFilterEngine {
    fetcher: Arc<dyn PlaylistFetcher>,
    cache_dir: PathBuf,
    fetch_timeout: Duration,
    cache: RwLock<HashMap<String, PathBuf>>,
}

impl std::fmt::Debug for PlaylistFilterEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaylistFilterEngine")
            .field("cache_dir", &self.cache_dir)
            .field("fetch_timeout", &self.fetch_timeout)
            .finish_non_exhaustive()
    }
}

impl PlaylistFilterEngine {
    pub fn new(fetcher: Arc<dyn PlaylistFetcher>, config: &PlaylistFilterConfig) -> Self {
        Self {
            fetcher,
            cache_dir: config.cache_dir.clone(),
            fetch_timeout: config.fetch_timeout,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Build an engine backed by a reqwest fetcher.
    pub fn from_config(config: &PlaylistFilterConfig) -> AppResult<Self> {
        let fetcher = ReqwestPlaylistFetcher::new(&config.user_agent, config.max_playlist_bytes)?;
        Ok(Self::new(Arc::new(fetcher), config))
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Deterministic cache location for `original_url`.
    pub fn cache_path_for(&self, original_url: &str) -> PathBuf {
        self.cache_dir.join(format!("{}.m3u8", stable_hash_hex(original_url)))
    }

    /// Fetch `url` and, for a master playlist, follow the highest-bandwidth
    /// variant that actually lists segments.
    pub async fn resolve_to_media_playlist(&self, url: &str) -> PlaylistResult<FetchedText> {
        self.resolve_inner(url, None).await
    }

    /// Produce (or reuse) a filtered local copy of `original_url`.
    ///
    /// Best-effort: every failure is logged and reported as `None`.
    pub async fn create_discontinuity_filtered_playlist(
        &self,
        original_url: &str,
    ) -> Option<FilteredPlaylist> {
        self.create_filtered(original_url, None).await
    }

    /// As [`Self::create_discontinuity_filtered_playlist`], abandoning the work
    /// once `superseded` is cancelled. In-flight fetches still run to their timeout.
    pub async fn create_discontinuity_filtered_playlist_cancellable(
        &self,
        original_url: &str,
        superseded: &CancellationToken,
    ) -> Option<FilteredPlaylist> {
        self.create_filtered(original_url, Some(superseded)).await
    }

    async fn create_filtered(
        &self,
        original_url: &str,
        superseded: Option<&CancellationToken>,
    ) -> Option<FilteredPlaylist> {
        let safe_url = UrlUtils::obfuscate_credentials(original_url);
        match self.try_create(original_url, superseded).await {
            Ok(filtered) => Some(filtered),
            Err(PlaylistError::UnsupportedUrl { .. }) => {
                debug!(
                    target = "playlist.filter",
                    url = %safe_url,
                    "not an HTTP(S) HLS playlist, skipping"
                );
                None
            }
            Err(PlaylistError::Superseded) => {
                debug!(target = "playlist.filter", url = %safe_url, "filtering superseded");
                None
            }
            Err(e) => {
                warn!(target = "playlist.filter", url = %safe_url, error = %e, "ad filtering unavailable");
                None
            }
        }
    }

    async fn try_create(
        &self,
        original_url: &str,
        superseded: Option<&CancellationToken>,
    ) -> PlaylistResult<FilteredPlaylist> {
        if !UrlUtils::is_http_hls_playlist(original_url) {
            return Err(PlaylistError::UnsupportedUrl {
                url: UrlUtils::obfuscate_credentials(original_url),
            });
        }

        if let Some(local_path) = self.cached_path(original_url).await {
            debug!(target = "playlist.filter", path = %local_path.display(), "filtered playlist cache hit");
            return Ok(Self::to_filtered(original_url, local_path));
        }

        let resolved = self.resolve_inner(original_url, superseded).await?;
        check_superseded(superseded)?;

        let filtered = filter_and_normalize_media_playlist(&resolved.text, &resolved.final_url);
        if !has_segments(&filtered) {
            return Err(PlaylistError::NoSegments);
        }

        let local_path = self.cache_path_for(original_url);
        tokio::fs::create_dir_all(&self.cache_dir).await?;
        check_superseded(superseded)?;
        write_atomically(&local_path, filtered.as_bytes()).await?;

        self.cache
            .write()
            .await
            .insert(original_url.to_string(), local_path.clone());

        info!(
            target = "playlist.filter",
            url = %UrlUtils::obfuscate_credentials(original_url),
            path = %local_path.display(),
            "filtered playlist written"
        );
        Ok(Self::to_filtered(original_url, local_path))
    }

    /// Mapped or deterministic path, if the file is still on disk.
    async fn cached_path(&self, original_url: &str) -> Option<PathBuf> {
        let mapped = self.cache.read().await.get(original_url).cloned();
        let candidate = mapped
            .clone()
            .unwrap_or_else(|| self.cache_path_for(original_url));

        if tokio::fs::try_exists(&candidate).await.unwrap_or(false) {
            if mapped.is_none() {
                self.cache
                    .write()
                    .await
                    .insert(original_url.to_string(), candidate.clone());
            }
            return Some(candidate);
        }

        if mapped.is_some() {
            self.cache.write().await.remove(original_url);
        }
        None
    }

    async fn resolve_inner(
        &self,
        url: &str,
        superseded: Option<&CancellationToken>,
    ) -> PlaylistResult<FetchedText> {
        let first = self.fetcher.fetch_text(url, self.fetch_timeout).await?;
        check_superseded(superseded)?;

        if !is_master_playlist(&first.text) {
            return Ok(first);
        }

        let mut variants = parse_master_variants(&first.text);
        variants.sort_by(|a, b| b.bandwidth.cmp(&a.bandwidth));

        for variant in variants {
            let variant_url = UrlUtils::absolutize(&first.final_url, &variant.uri);
            let fetched = self.fetcher.fetch_text(&variant_url, self.fetch_timeout).await;
            check_superseded(superseded)?;
            match fetched {
                Ok(media) if has_segments(&media.text) => {
                    debug!(
                        target = "playlist.filter",
                        bandwidth = variant.bandwidth,
                        url = %UrlUtils::obfuscate_credentials(&media.final_url),
                        "selected media playlist variant"
                    );
                    return Ok(media);
                }
                Ok(_) => {
                    debug!(
                        target = "playlist.filter",
                        bandwidth = variant.bandwidth,
                        "variant has no segments, skipping"
                    );
                }
                Err(e) => {
                    debug!(
                        target = "playlist.filter",
                        bandwidth = variant.bandwidth,
                        error = %e,
                        "variant fetch failed, skipping"
                    );
                }
            }
        }

        Ok(first)
    }

    fn to_filtered(original_url: &str, local_path: PathBuf) -> FilteredPlaylist {
        let file_url = std::path::absolute(&local_path)
            .ok()
            .and_then(|abs| url::Url::from_file_path(abs).ok())
            .map(|u| u.to_string())
            .unwrap_or_else(|| local_path.display().to_string());
        FilteredPlaylist {
            original_url: original_url.to_string(),
            local_path,
            file_url,
        }
    }
}

/// Write through a uniquely named sibling and rename it into place, so a
/// concurrent cache lookup never sees a partially written playlist.
async fn write_atomically(path: &Path, contents: &[u8]) -> PlaylistResult<()> {
    static STAGING_SEQ: AtomicU64 = AtomicU64::new(0);
    let seq = STAGING_SEQ.fetch_add(1, Ordering::Relaxed);
    let mut staging = path.as_os_str().to_owned();
    staging.push(format!(".{}-{seq}.tmp", std::process::id()));
    let staging = PathBuf::from(staging);

    tokio::fs::write(&staging, contents).await?;
    if let Err(e) = tokio::fs::rename(&staging, path).await {
        let _ = tokio::fs::remove_file(&staging).await;
        return Err(e.into());
    }
    Ok(())
}

fn check_superseded(superseded: Option<&CancellationToken>) -> PlaylistResult<()> {
    match superseded {
        Some(token) if token.is_cancelled() => Err(PlaylistError::Superseded),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Serves canned playlists and records every requested URL.
    #[derive(Default)]
    struct CannedFetcher {
        responses: HashMap<String, FetchedText>,
        oversized: Vec<String>,
        requests: Mutex<Vec<String>>,
    }

    impl CannedFetcher {
        fn with(mut self, url: &str, text: &str) -> Self {
            self.responses.insert(
                url.to_string(),
                FetchedText {
                    text: text.to_string(),
                    final_url: url.to_string(),
                },
            );
            self
        }

        fn redirected(mut self, url: &str, final_url: &str, text: &str) -> Self {
            self.responses.insert(
                url.to_string(),
                FetchedText {
                    text: text.to_string(),
                    final_url: final_url.to_string(),
                },
            );
            self
        }

        fn oversized(mut self, url: &str) -> Self {
            self.oversized.push(url.to_string());
            self
        }

        fn request_count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl PlaylistFetcher for CannedFetcher {
        async fn fetch_text(&self, url: &str, _timeout: Duration) -> PlaylistResult<FetchedText> {
            self.requests.lock().unwrap().push(url.to_string());
            if self.oversized.iter().any(|u| u == url) {
                return Err(PlaylistError::TooLarge {
                    limit: 1000,
                    url: url.to_string(),
                });
            }
            self.responses
                .get(url)
                .cloned()
                .ok_or_else(|| PlaylistError::Status {
                    status: 404,
                    url: url.to_string(),
                })
        }
    }

    const MASTER_URL: &str = "https://cdn.example.com/live/master.m3u8";
    const MEDIA: &str = "#EXTM3U\n#EXT-X-TARGETDURATION:4\n#EXTINF:4,\nseg1.ts\n#EXT-X-DISCONTINUITY\n#EXTINF:4,\nseg2.ts\n";

    fn engine(fetcher: Arc<CannedFetcher>, dir: &Path) -> PlaylistFilterEngine {
        let config = PlaylistFilterConfig {
            cache_dir: dir.to_path_buf(),
            ..Default::default()
        };
        PlaylistFilterEngine::new(fetcher, &config)
    }

    #[tokio::test]
    async fn master_resolves_to_highest_bandwidth_variant_with_segments() {
        let master = "#EXTM3U\n\
#EXT-X-STREAM-INF:BANDWIDTH=800000\nlow.m3u8\n\
#EXT-X-STREAM-INF:BANDWIDTH=5000000\nbroken.m3u8\n\
#EXT-X-STREAM-INF:BANDWIDTH=2000000\nmid.m3u8\n";
        let fetcher = Arc::new(
            CannedFetcher::default()
                .with(MASTER_URL, master)
                .with("https://cdn.example.com/live/low.m3u8", MEDIA)
                .with("https://cdn.example.com/live/mid.m3u8", MEDIA)
                .with("https://cdn.example.com/live/broken.m3u8", "#EXTM3U\n"),
        );
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(fetcher.clone(), dir.path());

        let resolved = engine.resolve_to_media_playlist(MASTER_URL).await.unwrap();
        assert_eq!(resolved.final_url, "https://cdn.example.com/live/mid.m3u8");
        assert_eq!(
            *fetcher.requests.lock().unwrap(),
            vec![
                MASTER_URL.to_string(),
                "https://cdn.example.com/live/broken.m3u8".to_string(),
                "https://cdn.example.com/live/mid.m3u8".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn master_without_usable_variant_falls_back_to_original() {
        let master = "#EXTM3U\n#EXT-X-STREAM-INF:BANDWIDTH=1\nmissing.m3u8\n";
        let fetcher = Arc::new(CannedFetcher::default().with(MASTER_URL, master));
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(fetcher, dir.path());

        let resolved = engine.resolve_to_media_playlist(MASTER_URL).await.unwrap();
        assert_eq!(resolved.final_url, MASTER_URL);
        assert_eq!(resolved.text, master);
    }

    #[tokio::test]
    async fn creates_filtered_file_against_redirected_base() {
        let url = "https://origin.example.com/vod/a.m3u8";
        let fetcher = Arc::new(CannedFetcher::default().redirected(
            url,
            "https://edge.example.com/cache/a.m3u8",
            MEDIA,
        ));
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(fetcher, dir.path());

        let filtered = engine
            .create_discontinuity_filtered_playlist(url)
            .await
            .expect("filtered playlist");
        assert_eq!(filtered.local_path, engine.cache_path_for(url));
        assert!(filtered.file_url.starts_with("file://"));

        let written = std::fs::read_to_string(&filtered.local_path).unwrap();
        assert!(written.starts_with("#EXTM3U\n"));
        assert!(!written.contains("#EXT-X-DISCONTINUITY"));
        assert!(written.contains("https://edge.example.com/cache/seg1.ts"));
    }

    #[tokio::test]
    async fn reuses_cached_file_until_it_disappears() {
        let url = "https://origin.example.com/vod/b.m3u8";
        let fetcher = Arc::new(CannedFetcher::default().with(url, MEDIA));
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(fetcher.clone(), dir.path());

        let first = engine.create_discontinuity_filtered_playlist(url).await.unwrap();
        let second = engine.create_discontinuity_filtered_playlist(url).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(fetcher.request_count(), 1);

        std::fs::remove_file(&first.local_path).unwrap();
        let third = engine.create_discontinuity_filtered_playlist(url).await.unwrap();
        assert_eq!(third.local_path, first.local_path);
        assert_eq!(fetcher.request_count(), 2);
    }

    #[tokio::test]
    async fn failures_yield_none() {
        let no_segments = "https://origin.example.com/empty.m3u8";
        let fetcher = Arc::new(CannedFetcher::default().with(no_segments, "#EXTM3U\n#EXT-X-ENDLIST\n"));
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(fetcher.clone(), dir.path());

        assert!(engine.create_discontinuity_filtered_playlist(no_segments).await.is_none());
        assert!(engine
            .create_discontinuity_filtered_playlist("https://origin.example.com/404.m3u8")
            .await
            .is_none());
        assert!(engine
            .create_discontinuity_filtered_playlist("https://origin.example.com/movie.mp4")
            .await
            .is_none());
        assert!(engine
            .create_discontinuity_filtered_playlist("file:///tmp/a.m3u8")
            .await
            .is_none());
        // Non-HLS URLs are rejected before any network access
        assert_eq!(fetcher.request_count(), 2);
        assert!(!engine.cache_path_for(no_segments).exists());
    }

    #[tokio::test]
    async fn superseded_run_writes_nothing() {
        let url = "https://origin.example.com/vod/c.m3u8";
        let fetcher = Arc::new(CannedFetcher::default().with(url, MEDIA));
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(fetcher, dir.path());

        let token = CancellationToken::new();
        token.cancel();
        let result = engine
            .create_discontinuity_filtered_playlist_cancellable(url, &token)
            .await;
        assert!(result.is_none());
        assert!(!engine.cache_path_for(url).exists());
    }

    #[tokio::test]
    async fn oversized_playlist_is_not_cached() {
        let url = "https://origin.example.com/vod/long.m3u8";
        let fetcher = Arc::new(CannedFetcher::default().oversized(url));
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(fetcher.clone(), dir.path());

        assert!(engine.create_discontinuity_filtered_playlist(url).await.is_none());
        assert_eq!(fetcher.request_count(), 1);
        assert!(!engine.cache_path_for(url).exists());
    }

    #[tokio::test]
    async fn concurrent_creation_leaves_only_the_complete_file() {
        let url = "https://origin.example.com/vod/d.m3u8";
        let fetcher = Arc::new(CannedFetcher::default().with(url, MEDIA));
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(fetcher, dir.path());

        let (a, b) = tokio::join!(
            engine.create_discontinuity_filtered_playlist(url),
            engine.create_discontinuity_filtered_playlist(url),
        );
        let (a, b) = (a.unwrap(), b.unwrap());
        assert_eq!(a.local_path, b.local_path);

        let entries: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        assert_eq!(entries, vec![a.local_path.clone()]);
        let written = std::fs::read_to_string(&a.local_path).unwrap();
        assert!(written.starts_with("#EXTM3U\n"));
        assert!(written.contains("https://origin.example.com/vod/seg2.ts"));
    }
}
