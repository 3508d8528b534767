//! Candidate Resolver
//!
//! Computes the ordered, de-duplicated list of URLs the render engine should
//! try for one episode or channel, and models the playable unit that tracks
//! which candidate is active.

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::ProxyConfig;
use crate::utils::url::UrlUtils;

/// Identity of an episode or channel as delivered by the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpisodeRef {
    pub raw_url: String,
    pub title: String,
}

impl EpisodeRef {
    pub fn new<U: Into<String>, T: Into<String>>(raw_url: U, title: T) -> Self {
        Self {
            raw_url: raw_url.into(),
            title: title.into(),
        }
    }
}

/// An episode/channel with its candidate URLs.
///
/// `url == url_candidates[current_candidate_index]` holds for every value built
/// through this type's constructors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayableUnit {
    pub url: String,
    pub raw_url: String,
    pub title: String,
    pub url_candidates: Vec<String>,
    pub current_candidate_index: usize,
}

impl PlayableUnit {
    /// Build a unit starting at the first candidate. An empty candidate list
    /// falls back to the raw URL so the unit is never without an active URL.
    pub fn new(episode: &EpisodeRef, mut url_candidates: Vec<String>) -> Self {
        if url_candidates.is_empty() {
            url_candidates.push(episode.raw_url.clone());
        }
        Self {
            url: url_candidates[0].clone(),
            raw_url: episode.raw_url.clone(),
            title: episode.title.clone(),
            url_candidates,
            current_candidate_index: 0,
        }
    }

    pub fn has_next_candidate(&self) -> bool {
        self.current_candidate_index + 1 < self.url_candidates.len()
    }

    /// Copy of this unit pointed at the next candidate, or `None` when exhausted.
    pub fn advanced(&self) -> Option<Self> {
        if !self.has_next_candidate() {
            return None;
        }
        let index = self.current_candidate_index + 1;
        Some(Self {
            url: self.url_candidates[index].clone(),
            current_candidate_index: index,
            ..self.clone()
        })
    }

    /// Copy of this unit with `candidate` prepended and made active.
    pub fn with_prepended(&self, candidate: &str) -> Self {
        let mut url_candidates = Vec::with_capacity(self.url_candidates.len() + 1);
        url_candidates.push(candidate.to_string());
        url_candidates.extend(
            self.url_candidates
                .iter()
                .filter(|c| c.as_str() != candidate)
                .cloned(),
        );
        Self {
            url: candidate.to_string(),
            url_candidates,
            current_candidate_index: 0,
            ..self.clone()
        }
    }

    pub fn episode_ref(&self) -> EpisodeRef {
        EpisodeRef::new(self.raw_url.clone(), self.title.clone())
    }
}

/// Shared, copy-on-write collection of units for the current source.
pub type PlayableUnits = Arc<[PlayableUnit]>;

/// Replace one unit, producing a new collection.
pub fn replace_unit(units: &PlayableUnits, index: usize, unit: PlayableUnit) -> PlayableUnits {
    let mut next: Vec<PlayableUnit> = units.to_vec();
    if let Some(slot) = next.get_mut(index) {
        *slot = unit;
    }
    next.into()
}

/// Prepend a freshly computed candidate to the unit at `index`.
///
/// Returns `None` (nothing to apply) when the unit no longer belongs to
/// `for_raw_url` or when `candidate` is already the active URL.
pub fn inject_filtered_candidate(
    units: &PlayableUnits,
    index: usize,
    for_raw_url: &str,
    candidate: &str,
) -> Option<PlayableUnits> {
    let unit = units.get(index)?;
    if unit.raw_url != for_raw_url {
        debug!(target = "candidates", "stale filtered candidate discarded");
        return None;
    }
    if unit.url == candidate {
        return None;
    }
    Some(replace_unit(units, index, unit.with_prepended(candidate)))
}

/// Builds candidate URL lists from the backend proxy settings.
#[derive(Debug, Clone)]
pub struct CandidateResolver {
    modern_path: String,
    legacy_path: String,
}

impl CandidateResolver {
    pub fn new(config: &ProxyConfig) -> Self {
        Self {
            modern_path: config.modern_path.clone(),
            legacy_path: config.legacy_path.clone(),
        }
    }

    /// Backend-proxy forms of `url`, legacy path first. Empty unless `url` is an
    /// HTTP(S) HLS playlist and both `backend` and `source_key` are non-empty.
    pub fn build_proxy_candidates(
        &self,
        url: &str,
        backend: Option<&str>,
        source_key: Option<&str>,
    ) -> Vec<String> {
        let (Some(backend), Some(source_key)) = (
            backend.map(str::trim).filter(|b| !b.is_empty()),
            source_key.map(str::trim).filter(|k| !k.is_empty()),
        ) else {
            return Vec::new();
        };
        if !UrlUtils::is_http_hls_playlist(url) {
            return Vec::new();
        }

        let backend = backend.trim_end_matches('/');
        let query = format!(
            "url={}&source={}",
            urlencoding::encode(url),
            urlencoding::encode(source_key)
        );
        vec![
            format!("{backend}{}?{query}", self.legacy_path),
            format!("{backend}{}?{query}", self.modern_path),
        ]
    }

    /// Ordered playback candidates for `url`.
    ///
    /// With ad-blocking the proxy forms come first and the raw URL last; without
    /// it the raw URL leads and the proxy forms follow as a fallback tail.
    pub fn get_playback_url_candidates(
        &self,
        url: &str,
        backend: Option<&str>,
        source_key: Option<&str>,
        ad_block_enabled: bool,
    ) -> Vec<String> {
        let url = url.trim();
        if url.is_empty() {
            return Vec::new();
        }
        let proxies = self.build_proxy_candidates(url, backend, source_key);

        let ordered: Vec<String> = if ad_block_enabled {
            proxies.into_iter().chain(std::iter::once(url.to_string())).collect()
        } else {
            std::iter::once(url.to_string()).chain(proxies).collect()
        };

        let mut seen = HashSet::new();
        ordered
            .into_iter()
            .filter(|candidate| seen.insert(candidate.clone()))
            .collect()
    }

    /// Compute candidates once for every episode; each starts at index 0.
    pub fn map_episodes_for_playback(
        &self,
        episodes: &[EpisodeRef],
        backend: Option<&str>,
        source_key: Option<&str>,
        ad_block_enabled: bool,
    ) -> PlayableUnits {
        episodes
            .iter()
            .map(|episode| {
                let candidates = self.get_playback_url_candidates(
                    &episode.raw_url,
                    backend,
                    source_key,
                    ad_block_enabled,
                );
                PlayableUnit::new(episode, candidates)
            })
            .collect()
    }
}

impl Default for CandidateResolver {
    fn default() -> Self {
        Self::new(&ProxyConfig::default())
    }
}
