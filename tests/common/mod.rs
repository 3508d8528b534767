#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use playback_resilience::candidates::EpisodeRef;
use playback_resilience::catalog::{CatalogClient, Channel, DetailRecord, SourceInfo};
use playback_resilience::errors::{CatalogError, CatalogResult, PlaylistError, PlaylistResult};
use playback_resilience::player::MediaRenderer;
use playback_resilience::utils::{FetchedText, PlaylistFetcher};

pub fn episode_url(source: &str, index: usize) -> String {
    format!("https://{source}.example.com/show/ep{index}/index.m3u8")
}

/// Detail record for "Show" on `source` with `episodes` episodes.
pub fn detail(source: &str, episodes: usize) -> DetailRecord {
    DetailRecord {
        source: source.to_string(),
        source_name: source.to_uppercase(),
        id: format!("{source}-42"),
        title: "Show".to_string(),
        year: Some("2024".to_string()),
        poster: None,
        episodes: (0..episodes)
            .map(|i| EpisodeRef::new(episode_url(source, i), format!("Episode {}", i + 1)))
            .collect(),
    }
}

/// Catalog serving fixed details in source order, with a failed-source set.
pub struct FakeCatalog {
    order: Vec<String>,
    details: HashMap<String, DetailRecord>,
    apis: HashMap<String, String>,
    failed: Mutex<Vec<(String, String)>>,
    list_episodes_calls: AtomicUsize,
}

impl FakeCatalog {
    pub fn new(details: Vec<DetailRecord>) -> Self {
        Self {
            order: details.iter().map(|d| d.source.clone()).collect(),
            details: details.into_iter().map(|d| (d.source.clone(), d)).collect(),
            apis: HashMap::new(),
            failed: Mutex::new(Vec::new()),
            list_episodes_calls: AtomicUsize::new(0),
        }
    }

    /// Advertise `api` as the proxy backend of `source`.
    pub fn with_api(mut self, source: &str, api: &str) -> Self {
        self.apis.insert(source.to_string(), api.to_string());
        self
    }

    pub fn failed_sources(&self) -> Vec<String> {
        self.failed.lock().unwrap().iter().map(|(s, _)| s.clone()).collect()
    }

    pub fn failure_reason(&self, source: &str) -> Option<String> {
        self.failed
            .lock()
            .unwrap()
            .iter()
            .find(|(s, _)| s == source)
            .map(|(_, r)| r.clone())
    }

    pub fn list_episodes_calls(&self) -> usize {
        self.list_episodes_calls.load(Ordering::SeqCst)
    }

    fn is_failed(&self, source: &str) -> bool {
        self.failed.lock().unwrap().iter().any(|(s, _)| s == source)
    }
}

#[async_trait]
impl CatalogClient for FakeCatalog {
    async fn list_sources(&self) -> CatalogResult<Vec<SourceInfo>> {
        Ok(self
            .order
            .iter()
            .map(|key| SourceInfo {
                key: key.clone(),
                name: key.to_uppercase(),
                api: self.apis.get(key).cloned(),
            })
            .collect())
    }

    async fn list_channels(&self, _source_key: &str) -> CatalogResult<Vec<Channel>> {
        Ok(Vec::new())
    }

    async fn list_episodes(
        &self,
        _title: &str,
        source_key: &str,
        _id: &str,
    ) -> CatalogResult<DetailRecord> {
        self.list_episodes_calls.fetch_add(1, Ordering::SeqCst);
        self.details
            .get(source_key)
            .cloned()
            .ok_or_else(|| CatalogError::UnknownSource {
                source_key: source_key.to_string(),
            })
    }

    async fn mark_source_failed(&self, source_key: &str, reason: &str) {
        self.failed
            .lock()
            .unwrap()
            .push((source_key.to_string(), reason.to_string()));
    }

    async fn next_available_source(
        &self,
        excluding_key: &str,
        episode_index: usize,
    ) -> CatalogResult<Option<DetailRecord>> {
        Ok(self
            .order
            .iter()
            .filter(|key| key.as_str() != excluding_key && !self.is_failed(key))
            .filter_map(|key| self.details.get(key))
            .find(|d| d.covers_episode(episode_index))
            .cloned())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RenderCommand {
    Load { url: String, position_millis: u64 },
    Play,
    Pause,
    Seek(u64),
    SetRate(f32),
    Reload,
}

/// Render engine double that records every command.
#[derive(Default)]
pub struct RecordingRenderer {
    commands: Mutex<Vec<RenderCommand>>,
}

impl RecordingRenderer {
    pub fn commands(&self) -> Vec<RenderCommand> {
        self.commands.lock().unwrap().clone()
    }

    /// Every `(url, position)` passed to `load`, in order.
    pub fn loads(&self) -> Vec<(String, u64)> {
        self.commands()
            .into_iter()
            .filter_map(|c| match c {
                RenderCommand::Load {
                    url,
                    position_millis,
                } => Some((url, position_millis)),
                _ => None,
            })
            .collect()
    }

    pub fn last_loaded_url(&self) -> Option<String> {
        self.loads().pop().map(|(url, _)| url)
    }

    fn record(&self, command: RenderCommand) {
        self.commands.lock().unwrap().push(command);
    }
}

impl MediaRenderer for RecordingRenderer {
    fn load(&self, url: &str, start_position_millis: u64) {
        self.record(RenderCommand::Load {
            url: url.to_string(),
            position_millis: start_position_millis,
        });
    }

    fn play(&self) {
        self.record(RenderCommand::Play);
    }

    fn pause(&self) {
        self.record(RenderCommand::Pause);
    }

    fn seek(&self, position_millis: u64) {
        self.record(RenderCommand::Seek(position_millis));
    }

    fn set_rate(&self, rate: f32) {
        self.record(RenderCommand::SetRate(rate));
    }

    fn reload(&self) {
        self.record(RenderCommand::Reload);
    }
}

/// Fetcher returning canned playlist text per URL, 404 otherwise.
#[derive(Default)]
pub struct CannedFetcher {
    responses: HashMap<String, String>,
}

impl CannedFetcher {
    pub fn with(mut self, url: &str, text: &str) -> Self {
        self.responses.insert(url.to_string(), text.to_string());
        self
    }
}

#[async_trait]
impl PlaylistFetcher for CannedFetcher {
    async fn fetch_text(&self, url: &str, _timeout: Duration) -> PlaylistResult<FetchedText> {
        self.responses
            .get(url)
            .map(|text| FetchedText {
                text: text.clone(),
                final_url: url.to_string(),
            })
            .ok_or_else(|| PlaylistError::Status {
                status: 404,
                url: url.to_string(),
            })
    }
}
