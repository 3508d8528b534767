//! Catalog collaborator contract
//!
//! The remote catalog is a black box returning sources, channels and episode
//! lists. It also owns the per-session "failed source" record: sources marked
//! failed are excluded from [`CatalogClient::next_available_source`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::candidates::EpisodeRef;
use crate::errors::CatalogResult;

/// A content provider offering its own catalog of the same titles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceInfo {
    pub key: String,
    pub name: String,
    /// Backend base URL used to build proxy candidates for this source.
    #[serde(default)]
    pub api: Option<String>,
}

/// Live channel as listed by a source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub id: String,
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default)]
    pub tvg_id: Option<String>,
}

/// Episode list of one title on one source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetailRecord {
    pub source: String,
    pub source_name: String,
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub year: Option<String>,
    #[serde(default)]
    pub poster: Option<String>,
    pub episodes: Vec<EpisodeRef>,
}

impl DetailRecord {
    pub fn has_episodes(&self) -> bool {
        !self.episodes.is_empty()
    }

    /// Whether this detail can serve `episode_index`.
    pub fn covers_episode(&self, episode_index: usize) -> bool {
        episode_index < self.episodes.len()
    }
}

#[async_trait]
pub trait CatalogClient: Send + Sync {
    async fn list_sources(&self) -> CatalogResult<Vec<SourceInfo>>;

    async fn list_channels(&self, source_key: &str) -> CatalogResult<Vec<Channel>>;

    async fn list_episodes(
        &self,
        title: &str,
        source_key: &str,
        id: &str,
    ) -> CatalogResult<DetailRecord>;

    /// Exclude `source_key` from later [`Self::next_available_source`] answers.
    async fn mark_source_failed(&self, source_key: &str, reason: &str);

    /// Another source whose detail covers `episode_index`, skipping
    /// `excluding_key` and every source marked failed.
    async fn next_available_source(
        &self,
        excluding_key: &str,
        episode_index: usize,
    ) -> CatalogResult<Option<DetailRecord>>;
}
