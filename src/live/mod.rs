//! Live Fallback Controller
//!
//! The live surface plays one channel at a time: the ad-filtered (proxy) route
//! first, and the direct URL exactly once if that route stalls or errors.

pub mod controller;

pub use controller::{LiveFailure, LiveFallbackController, LiveInput, LiveNotice, LiveState};

use crate::candidates::CandidateResolver;
use crate::catalog::Channel;
use crate::errors::StorageResult;
use crate::storage::PlaybackStore;

/// Composite identity of a favorite channel: `source+tvg_id`, or
/// `source+channel_id` when the channel carries no (non-empty) tvg id.
pub fn favorite_key(source: &str, tvg_id: Option<&str>, channel_id: &str) -> String {
    let id = tvg_id
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .unwrap_or(channel_id);
    format!("{source}+{id}")
}

pub fn channel_favorite_key(source: &str, channel: &Channel) -> String {
    favorite_key(source, channel.tvg_id.as_deref(), &channel.id)
}

pub async fn is_favorite(
    store: &dyn PlaybackStore,
    source: &str,
    channel: &Channel,
) -> StorageResult<bool> {
    store.is_favorite(&channel_favorite_key(source, channel)).await
}

/// Flip the favorite flag of `channel`, returning the new value.
pub async fn toggle_favorite(
    store: &dyn PlaybackStore,
    source: &str,
    channel: &Channel,
) -> StorageResult<bool> {
    store
        .toggle_favorite(&channel_favorite_key(source, channel))
        .await
}

/// Primary and fallback URLs for a channel. The primary is the first
/// ad-blocking candidate; the fallback is the direct URL when it differs.
pub fn channel_stream(
    resolver: &CandidateResolver,
    channel: &Channel,
    backend: Option<&str>,
    source_key: &str,
) -> Option<(String, Option<String>)> {
    let candidates =
        resolver.get_playback_url_candidates(&channel.url, backend, Some(source_key), true);
    let primary = candidates.first()?.clone();
    let direct = channel.url.trim();
    let fallback = (primary != direct).then(|| direct.to_string());
    Some((primary, fallback))
}
