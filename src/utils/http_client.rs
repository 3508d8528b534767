use std::time::Duration;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use reqwest::Client;
use tracing::debug;

use crate::errors::{AppError, AppResult, PlaylistError, PlaylistResult};
use crate::utils::url::UrlUtils;

/// Playlist text plus the URL it was ultimately served from (after redirects).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedText {
    pub text: String,
    pub final_url: String,
}

/// Text fetcher used by the playlist filter engine
#[async_trait]
pub trait PlaylistFetcher: Send + Sync {
    /// Fetch `url` as text, giving up after `timeout`.
    async fn fetch_text(&self, url: &str, timeout: Duration) -> PlaylistResult<FetchedText>;
}

/// reqwest-backed fetcher with a bounded body size
#[derive(Debug, Clone)]
pub struct ReqwestPlaylistFetcher {
    client: Client,
    max_bytes: usize,
}

impl ReqwestPlaylistFetcher {
    pub fn new(user_agent: &str, max_bytes: usize) -> AppResult<Self> {
        let client = Client::builder()
            .user_agent(user_agent)
            .build()
            .map_err(|e| AppError::configuration(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self::with_client(client, max_bytes))
    }

    /// Wrap an existing client (shared connection pool).
    pub fn with_client(client: Client, max_bytes: usize) -> Self {
        Self { client, max_bytes }
    }
}

#[async_trait]
impl PlaylistFetcher for ReqwestPlaylistFetcher {
    async fn fetch_text(&self, url: &str, timeout: Duration) -> PlaylistResult<FetchedText> {
        debug!(
            target = "playlist.fetch",
            url = %UrlUtils::obfuscate_credentials(url),
            "fetching playlist"
        );

        let resp = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    PlaylistError::timeout(UrlUtils::obfuscate_credentials(url))
                } else {
                    PlaylistError::http(UrlUtils::obfuscate_credentials(&e.to_string()))
                }
            })?;

        if !resp.status().is_success() {
            return Err(PlaylistError::Status {
                status: resp.status().as_u16(),
                url: UrlUtils::obfuscate_credentials(url),
            });
        }

        let final_url = resp.url().to_string();

        let collected = read_bounded(resp.bytes_stream(), self.max_bytes, url).await?;

        Ok(FetchedText {
            text: String::from_utf8_lossy(&collected).into_owned(),
            final_url,
        })
    }
}

/// Collect a body stream, failing once it grows past `max_bytes`.
///
/// A truncated playlist would still parse, so an over-limit body is an error
/// rather than a prefix.
async fn read_bounded<S, B>(mut body: S, max_bytes: usize, url: &str) -> PlaylistResult<Vec<u8>>
where
    S: Stream<Item = reqwest::Result<B>> + Unpin,
    B: AsRef<[u8]>,
{
    let mut collected: Vec<u8> = Vec::with_capacity(8192);
    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(|e| {
            if e.is_timeout() {
                PlaylistError::timeout(UrlUtils::obfuscate_credentials(url))
            } else {
                PlaylistError::http(e.to_string())
            }
        })?;
        let chunk = chunk.as_ref();
        if collected.len() + chunk.len() > max_bytes {
            debug!(target = "playlist.fetch", limit = max_bytes, "playlist body over limit");
            return Err(PlaylistError::TooLarge {
                limit: max_bytes,
                url: UrlUtils::obfuscate_credentials(url),
            });
        }
        collected.extend_from_slice(chunk);
    }
    Ok(collected)
}
