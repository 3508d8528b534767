//! Persisted key-value storage contract
//!
//! Resume records and playback settings are keyed by `(source, id)`; favorites
//! by a composite string key (see [`crate::live::favorite_key`]). Two stores are
//! provided: an in-memory one and a JSON file that is rewritten on every save.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;

use crate::config::StorageConfig;
use crate::errors::StorageResult;

/// Where the viewer left off in a title.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResumeRecord {
    pub title: String,
    pub source_name: String,
    /// Episode index
    pub index: usize,
    pub total_episodes: usize,
    /// Seconds
    pub play_time: f64,
    /// Seconds
    pub total_time: f64,
    pub save_time: DateTime<Utc>,
    /// Milliseconds from the start of the episode
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intro_end_time: Option<u64>,
    /// Milliseconds before the end of the episode
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outro_start_time: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlaybackSettings {
    pub playback_rate: f32,
}

fn record_key(source: &str, id: &str) -> String {
    format!("{source}+{id}")
}

#[async_trait]
pub trait PlaybackStore: Send + Sync {
    async fn get_resume_record(&self, source: &str, id: &str) -> StorageResult<Option<ResumeRecord>>;

    async fn save_resume_record(
        &self,
        source: &str,
        id: &str,
        record: &ResumeRecord,
    ) -> StorageResult<()>;

    async fn get_playback_settings(
        &self,
        source: &str,
        id: &str,
    ) -> StorageResult<Option<PlaybackSettings>>;

    async fn save_playback_settings(
        &self,
        source: &str,
        id: &str,
        settings: &PlaybackSettings,
    ) -> StorageResult<()>;

    async fn is_favorite(&self, key: &str) -> StorageResult<bool>;

    async fn set_favorite(&self, key: &str, favorite: bool) -> StorageResult<()>;

    /// Flip the favorite flag and return the new value.
    async fn toggle_favorite(&self, key: &str) -> StorageResult<bool> {
        let next = !self.is_favorite(key).await?;
        self.set_favorite(key, next).await?;
        Ok(next)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoreData {
    #[serde(default)]
    resume_records: HashMap<String, ResumeRecord>,
    #[serde(default)]
    playback_settings: HashMap<String, PlaybackSettings>,
    #[serde(default)]
    favorites: HashMap<String, bool>,
}

impl StoreData {
    fn set_favorite(&mut self, key: &str, favorite: bool) {
        if favorite {
            self.favorites.insert(key.to_string(), true);
        } else {
            self.favorites.remove(key);
        }
    }
}

/// Process-local store
#[derive(Debug, Default)]
pub struct MemoryPlaybackStore {
    data: RwLock<StoreData>,
}

impl MemoryPlaybackStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PlaybackStore for MemoryPlaybackStore {
    async fn get_resume_record(&self, source: &str, id: &str) -> StorageResult<Option<ResumeRecord>> {
        Ok(self.data.read().await.resume_records.get(&record_key(source, id)).cloned())
    }

    async fn save_resume_record(
        &self,
        source: &str,
        id: &str,
        record: &ResumeRecord,
    ) -> StorageResult<()> {
        self.data
            .write()
            .await
            .resume_records
            .insert(record_key(source, id), record.clone());
        Ok(())
    }

    async fn get_playback_settings(
        &self,
        source: &str,
        id: &str,
    ) -> StorageResult<Option<PlaybackSettings>> {
        Ok(self.data.read().await.playback_settings.get(&record_key(source, id)).copied())
    }

    async fn save_playback_settings(
        &self,
        source: &str,
        id: &str,
        settings: &PlaybackSettings,
    ) -> StorageResult<()> {
        self.data
            .write()
            .await
            .playback_settings
            .insert(record_key(source, id), *settings);
        Ok(())
    }

    async fn is_favorite(&self, key: &str) -> StorageResult<bool> {
        Ok(self.data.read().await.favorites.contains_key(key))
    }

    async fn set_favorite(&self, key: &str, favorite: bool) -> StorageResult<()> {
        self.data.write().await.set_favorite(key, favorite);
        Ok(())
    }
}

/// JSON file store; the whole document is rewritten after each change.
#[derive(Debug)]
pub struct JsonFilePlaybackStore {
    path: PathBuf,
    data: RwLock<StoreData>,
}

impl JsonFilePlaybackStore {
    /// Open `path`, starting empty if it does not exist yet.
    pub async fn open<P: AsRef<Path>>(path: P) -> StorageResult<Self> {
        let path = path.as_ref().to_path_buf();
        let data = if tokio::fs::try_exists(&path).await? {
            let contents = tokio::fs::read(&path).await?;
            serde_json::from_slice(&contents)?
        } else {
            StoreData::default()
        };
        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    /// Open the store file named by the `[storage]` config section.
    pub async fn from_config(config: &StorageConfig) -> StorageResult<Self> {
        Self::open(&config.path).await
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, data: &StoreData) -> StorageResult<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }
        let contents = serde_json::to_vec_pretty(data)?;
        tokio::fs::write(&self.path, contents).await?;
        debug!(target = "storage", path = %self.path.display(), "playback store persisted");
        Ok(())
    }
}

#[async_trait]
impl PlaybackStore for JsonFilePlaybackStore {
    async fn get_resume_record(&self, source: &str, id: &str) -> StorageResult<Option<ResumeRecord>> {
        Ok(self.data.read().await.resume_records.get(&record_key(source, id)).cloned())
    }

    async fn save_resume_record(
        &self,
        source: &str,
        id: &str,
        record: &ResumeRecord,
    ) -> StorageResult<()> {
        let mut data = self.data.write().await;
        data.resume_records.insert(record_key(source, id), record.clone());
        self.persist(&data).await
    }

    async fn get_playback_settings(
        &self,
        source: &str,
        id: &str,
    ) -> StorageResult<Option<PlaybackSettings>> {
        Ok(self.data.read().await.playback_settings.get(&record_key(source, id)).copied())
    }

    async fn save_playback_settings(
        &self,
        source: &str,
        id: &str,
        settings: &PlaybackSettings,
    ) -> StorageResult<()> {
        let mut data = self.data.write().await;
        data.playback_settings.insert(record_key(source, id), *settings);
        self.persist(&data).await
    }

    async fn is_favorite(&self, key: &str) -> StorageResult<bool> {
        Ok(self.data.read().await.favorites.contains_key(key))
    }

    async fn set_favorite(&self, key: &str, favorite: bool) -> StorageResult<()> {
        let mut data = self.data.write().await;
        data.set_favorite(key, favorite);
        self.persist(&data).await
    }
}
