//! Playback session controller
//!
//! Owns the active title, its playable units and the episode cursor. Render
//! engine status and errors flow in through `&mut self` methods; background
//! playlist filtering reports back over an internal channel. Every transition
//! republishes a [`SessionSnapshot`].

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::state::{
    LoadRequest, PlaybackErrorKind, SessionInput, SessionNotice, SessionSnapshot, SessionState,
};
use crate::candidates::{
    CandidateResolver, PlayableUnit, PlayableUnits, inject_filtered_candidate, replace_unit,
};
use crate::catalog::{CatalogClient, DetailRecord};
use crate::config::Config;
use crate::config::defaults::DEFAULT_PLAYBACK_RATE;
use crate::player::{MediaRenderer, PlaybackStatus};
use crate::playlist::{FilteredPlaylist, PlaylistFilterEngine};
use crate::storage::{PlaybackSettings, PlaybackStore, ResumeRecord};
use crate::utils::UrlUtils;

const NOTICE_CAPACITY: usize = 64;

/// Result of one background filtering attempt.
#[derive(Debug, Clone)]
pub struct FilterOutcome {
    pub episode_index: usize,
    pub raw_url: String,
    pub filtered: Option<FilteredPlaylist>,
}

pub struct PlaybackSession {
    catalog: Arc<dyn CatalogClient>,
    store: Arc<dyn PlaybackStore>,
    renderer: Arc<dyn MediaRenderer>,
    filter_engine: Option<Arc<PlaylistFilterEngine>>,
    resolver: CandidateResolver,
    backend_url: Option<String>,
    ad_block_enabled: bool,
    resume_save_interval: Duration,
    play_next_threshold: f64,

    state: SessionState,
    detail: Option<DetailRecord>,
    units: PlayableUnits,
    episode_index: usize,
    position_millis: u64,
    duration_millis: Option<u64>,
    progress: f64,
    playback_rate: f32,
    intro_end_millis: Option<u64>,
    outro_offset_millis: Option<u64>,
    show_next_prompt: bool,
    /// Set once the outro of the current tail has been acted on; cleared when
    /// playback is seen outside the tail again.
    tail_handled: bool,
    last_resume_save: Option<Instant>,

    filter_token: Option<CancellationToken>,
    filter_tx: mpsc::UnboundedSender<FilterOutcome>,
    filter_rx: mpsc::UnboundedReceiver<FilterOutcome>,
    snapshot_tx: watch::Sender<SessionSnapshot>,
    notice_tx: broadcast::Sender<SessionNotice>,
}

impl std::fmt::Debug for PlaybackSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackSession")
            .field("state", &self.state)
            .field("episode_index", &self.episode_index)
            .field("units", &self.units.len())
            .finish_non_exhaustive()
    }
}

impl PlaybackSession {
    pub fn new(
        catalog: Arc<dyn CatalogClient>,
        store: Arc<dyn PlaybackStore>,
        renderer: Arc<dyn MediaRenderer>,
        filter_engine: Option<Arc<PlaylistFilterEngine>>,
        config: &Config,
    ) -> Self {
        let (filter_tx, filter_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, _) = watch::channel(SessionSnapshot::default());
        let (notice_tx, _) = broadcast::channel(NOTICE_CAPACITY);

        Self {
            catalog,
            store,
            renderer,
            filter_engine,
            resolver: CandidateResolver::new(&config.proxy),
            backend_url: config.proxy.backend_url.clone(),
            ad_block_enabled: config.proxy.ad_block_enabled,
            resume_save_interval: config.playback.resume_save_interval,
            play_next_threshold: config.playback.play_next_threshold,
            state: SessionState::Idle,
            detail: None,
            units: Arc::from(Vec::new()),
            episode_index: 0,
            position_millis: 0,
            duration_millis: None,
            progress: 0.0,
            playback_rate: DEFAULT_PLAYBACK_RATE,
            intro_end_millis: None,
            outro_offset_millis: None,
            show_next_prompt: false,
            tail_handled: false,
            last_resume_save: None,
            filter_token: None,
            filter_tx,
            filter_rx,
            snapshot_tx,
            notice_tx,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot_tx.subscribe()
    }

    pub fn notices(&self) -> broadcast::Receiver<SessionNotice> {
        self.notice_tx.subscribe()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn units(&self) -> &PlayableUnits {
        &self.units
    }

    pub fn active_unit(&self) -> Option<&PlayableUnit> {
        self.units.get(self.episode_index)
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let unit = self.active_unit();
        SessionSnapshot {
            state: self.state,
            source: self.detail.as_ref().map(|d| d.source.clone()),
            source_name: self.detail.as_ref().map(|d| d.source_name.clone()),
            id: self.detail.as_ref().map(|d| d.id.clone()),
            title: self.detail.as_ref().map(|d| d.title.clone()),
            episode_index: self.episode_index,
            total_episodes: self.units.len(),
            active_url: unit.map(|u| u.url.clone()),
            candidate_index: unit.map_or(0, |u| u.current_candidate_index),
            progress: self.progress,
            position_millis: self.position_millis,
            duration_millis: self.duration_millis,
            playback_rate: self.playback_rate,
            intro_end_millis: self.intro_end_millis,
            outro_offset_millis: self.outro_offset_millis,
            show_next_prompt: self.show_next_prompt,
        }
    }

    /// Resolve episodes for `request` and start loading the requested episode.
    pub async fn load(&mut self, request: LoadRequest) {
        self.cancel_filter();
        self.state = SessionState::Loading;
        self.publish();

        let cached = self
            .detail
            .take()
            .filter(|d| d.has_episodes() && d.title == request.title);
        let detail = match cached {
            Some(detail) => {
                debug!(target = "session", source = %detail.source, "reusing cached episode list");
                Some(detail)
            }
            None => self.fetch_detail(&request).await,
        };

        let Some(detail) = detail else {
            self.fail_load(format!("no playable episodes found for '{}'", request.title));
            return;
        };

        let episode_index = request.episode_index.min(detail.episodes.len() - 1);
        let record = self.read_resume_record(&detail.source, &detail.id).await;
        let settings = self.read_playback_settings(&detail.source, &detail.id).await;

        let position = request.position_millis.unwrap_or_else(|| {
            record
                .as_ref()
                .filter(|r| r.index == episode_index)
                .map(|r| (r.play_time.max(0.0) * 1000.0) as u64)
                .unwrap_or(0)
        });
        self.intro_end_millis = record.as_ref().and_then(|r| r.intro_end_time);
        self.outro_offset_millis = record.as_ref().and_then(|r| r.outro_start_time);
        self.playback_rate = settings.map_or(DEFAULT_PLAYBACK_RATE, |s| s.playback_rate);

        let backend = self.backend_for(&detail.source).await;
        self.units = self.resolver.map_episodes_for_playback(
            &detail.episodes,
            backend.as_deref(),
            Some(&detail.source),
            self.ad_block_enabled,
        );
        info!(
            target = "session",
            source = %detail.source,
            title = %detail.title,
            episodes = detail.episodes.len(),
            episode_index,
            "title loaded"
        );
        self.detail = Some(detail);
        self.tail_handled = false;
        self.start_episode(episode_index, position);
    }

    async fn fetch_detail(&self, request: &LoadRequest) -> Option<DetailRecord> {
        match self
            .catalog
            .list_episodes(&request.title, &request.source, &request.id)
            .await
        {
            Ok(detail) if detail.has_episodes() => return Some(detail),
            Ok(_) => {
                warn!(target = "session", source = %request.source, title = %request.title, "source returned no episodes");
            }
            Err(e) => {
                warn!(target = "session", source = %request.source, error = %e, "episode lookup failed");
            }
        }
        self.catalog
            .mark_source_failed(&request.source, "no episodes")
            .await;

        let attempts = match self.catalog.list_sources().await {
            Ok(sources) => sources.len().max(1),
            Err(e) => {
                warn!(target = "session", error = %e, "could not list sources");
                1
            }
        };

        let mut excluding = request.source.clone();
        for _ in 0..attempts {
            match self
                .catalog
                .next_available_source(&excluding, request.episode_index)
                .await
            {
                Ok(Some(detail)) if detail.has_episodes() => {
                    info!(target = "session", source = %detail.source, "loading from alternate source");
                    return Some(detail);
                }
                Ok(Some(detail)) => {
                    self.catalog
                        .mark_source_failed(&detail.source, "no episodes")
                        .await;
                    excluding = detail.source;
                }
                Ok(None) => break,
                Err(e) => {
                    warn!(target = "session", error = %e, "alternate source lookup failed");
                    break;
                }
            }
        }
        None
    }

    fn fail_load(&mut self, message: String) {
        warn!(target = "session", %message, "load failed");
        self.detail = None;
        self.units = Arc::from(Vec::new());
        self.state = SessionState::LoadFailed;
        self.notify(SessionNotice::LoadFailed { message });
        self.publish();
    }

    /// Point the renderer at episode `index` and kick off ad filtering for it.
    fn start_episode(&mut self, index: usize, position_millis: u64) {
        self.cancel_filter();
        self.episode_index = index;
        self.position_millis = position_millis;
        self.duration_millis = None;
        self.progress = 0.0;
        self.show_next_prompt = false;
        self.last_resume_save = None;
        self.state = SessionState::Loading;

        if let Some(unit) = self.active_unit() {
            let url = unit.url.clone();
            debug!(target = "session", episode = index, url = %UrlUtils::obfuscate_credentials(&url), "loading episode");
            self.renderer.load(&url, position_millis);
            self.renderer.set_rate(self.playback_rate);
        }
        self.request_filtered_candidate();
        self.publish();
    }

    /// Apply one render engine status report.
    pub async fn handle_status(&mut self, status: PlaybackStatus) {
        if !self.state.is_active() {
            return;
        }
        if let Some(message) = status.error.clone() {
            if let Some(url) = self.active_unit().map(|u| u.url.clone()) {
                self.handle_render_error(&url, &message).await;
            }
            return;
        }

        self.position_millis = status.position_millis;
        if status.duration_millis.is_some() {
            self.duration_millis = status.duration_millis;
        }
        self.progress = status.progress();
        if status.is_loaded {
            self.state = if status.is_buffering {
                SessionState::Buffering
            } else {
                SessionState::Playing
            };
        }

        if status.did_just_finish {
            self.save_resume_record().await;
            if !self.advance_episode().await {
                info!(target = "session", "last episode finished");
                self.state = SessionState::Ended;
                self.publish();
            }
            return;
        }

        if let (Some(outro), Some(remaining)) = (self.outro_offset_millis, status.remaining_millis())
        {
            if remaining > outro {
                self.tail_handled = false;
            } else if !self.tail_handled && self.has_next_episode() {
                self.tail_handled = true;
                debug!(target = "session", episode = self.episode_index, "outro reached, skipping ahead");
                self.save_resume_record().await;
                self.advance_episode().await;
                return;
            }
        }

        if self.outro_offset_millis.is_none()
            && self.has_next_episode()
            && self.progress >= self.play_next_threshold
        {
            self.show_next_prompt = true;
        }

        let due = self
            .last_resume_save
            .is_none_or(|at| at.elapsed() >= self.resume_save_interval);
        if due {
            self.save_resume_record().await;
        }
        self.publish();
    }

    /// The render engine failed on `failing_url`.
    pub async fn handle_render_error(&mut self, failing_url: &str, message: &str) {
        if !self.state.is_active() {
            debug!(target = "session", state = ?self.state, "render error ignored outside playback");
            return;
        }
        let Some(unit) = self.active_unit().cloned() else {
            return;
        };
        if unit.url != failing_url {
            debug!(
                target = "session",
                url = %UrlUtils::obfuscate_credentials(failing_url),
                "stale render error discarded"
            );
            return;
        }

        match unit.advanced() {
            Some(next) => {
                warn!(
                    target = "session",
                    episode = self.episode_index,
                    candidate = next.current_candidate_index,
                    error = %message,
                    "candidate failed, trying backup route"
                );
                self.renderer.load(&next.url, self.position_millis);
                self.renderer.set_rate(self.playback_rate);
                let candidate_index = next.current_candidate_index;
                self.units = replace_unit(&self.units, self.episode_index, next);
                self.state = SessionState::Loading;
                self.notify(SessionNotice::SwitchedToBackupRoute {
                    episode_index: self.episode_index,
                    candidate_index,
                });
                self.publish();
            }
            None => self.fall_back_to_next_source(message).await,
        }
    }

    async fn fall_back_to_next_source(&mut self, message: &str) {
        let kind = PlaybackErrorKind::classify(message);
        let Some(failed_source) = self.detail.as_ref().map(|d| d.source.clone()) else {
            self.fail_playback(kind, message);
            return;
        };

        let reason = format!("{}: {message}", kind.as_str());
        self.catalog.mark_source_failed(&failed_source, &reason).await;

        let next = match self
            .catalog
            .next_available_source(&failed_source, self.episode_index)
            .await
        {
            Ok(next) => next.filter(|d| d.covers_episode(self.episode_index)),
            Err(e) => {
                warn!(target = "session", error = %e, "alternate source lookup failed");
                None
            }
        };

        let Some(next) = next else {
            self.fail_playback(kind, message);
            return;
        };

        warn!(
            target = "session",
            from = %failed_source,
            to = %next.source,
            kind = kind.as_str(),
            "all candidates failed, switching source"
        );
        let backend = self.backend_for(&next.source).await;
        self.units = self.resolver.map_episodes_for_playback(
            &next.episodes,
            backend.as_deref(),
            Some(&next.source),
            self.ad_block_enabled,
        );
        self.notify(SessionNotice::SwitchedSource {
            from_source: failed_source,
            to_source: next.source.clone(),
            source_name: next.source_name.clone(),
            kind,
        });
        self.detail = Some(next);
        let position = self.position_millis;
        self.start_episode(self.episode_index, position);
    }

    fn fail_playback(&mut self, kind: PlaybackErrorKind, message: &str) {
        warn!(target = "session", kind = kind.as_str(), error = %message, "no playable source left");
        self.cancel_filter();
        self.state = SessionState::PlaybackFailed;
        self.notify(SessionNotice::PlaybackFailed {
            kind,
            message: kind.user_message().to_string(),
        });
        self.publish();
    }

    pub fn has_next_episode(&self) -> bool {
        self.episode_index + 1 < self.units.len()
    }

    async fn advance_episode(&mut self) -> bool {
        if !self.has_next_episode() {
            return false;
        }
        let next = self.episode_index + 1;
        self.start_episode(next, 0);
        self.notify(SessionNotice::EpisodeAdvanced {
            episode_index: next,
        });
        self.save_resume_record().await;
        true
    }

    /// Switch to episode `index`. Returns false when out of range or nothing is loaded.
    pub async fn play_episode(&mut self, index: usize) -> bool {
        if index >= self.units.len() || self.detail.is_none() {
            return false;
        }
        if self.state.is_active() {
            self.save_resume_record().await;
        }
        self.tail_handled = false;
        self.start_episode(index, 0);
        self.notify(SessionNotice::EpisodeAdvanced {
            episode_index: index,
        });
        self.save_resume_record().await;
        true
    }

    pub async fn play_next(&mut self) -> bool {
        if !self.has_next_episode() {
            return false;
        }
        self.play_episode(self.episode_index + 1).await
    }

    /// Set the intro end at the current position, or clear it. Returns the new value.
    pub async fn toggle_intro_marker(&mut self) -> Option<u64> {
        self.intro_end_millis = match self.intro_end_millis {
            Some(_) => None,
            None => Some(self.position_millis),
        };
        self.save_resume_record().await;
        self.publish();
        self.intro_end_millis
    }

    /// Mark the outro as starting here (stored as an offset from the end), or
    /// clear it. Needs a known duration to set. Returns the new value.
    pub async fn toggle_outro_marker(&mut self) -> Option<u64> {
        self.outro_offset_millis = match (self.outro_offset_millis, self.duration_millis) {
            (Some(_), _) => None,
            (None, Some(duration)) => Some(duration.saturating_sub(self.position_millis)),
            (None, None) => {
                debug!(target = "session", "outro marker needs a known duration");
                None
            }
        };
        if self.outro_offset_millis.is_some() {
            self.show_next_prompt = false;
            self.tail_handled = true;
        }
        self.save_resume_record().await;
        self.publish();
        self.outro_offset_millis
    }

    pub async fn set_playback_rate(&mut self, rate: f32) {
        if !rate.is_finite() || rate <= 0.0 {
            warn!(target = "session", rate, "ignoring invalid playback rate");
            return;
        }
        self.playback_rate = rate;
        self.renderer.set_rate(rate);
        if let Some(detail) = &self.detail {
            let settings = PlaybackSettings {
                playback_rate: rate,
            };
            if let Err(e) = self
                .store
                .save_playback_settings(&detail.source, &detail.id, &settings)
                .await
            {
                warn!(target = "session", error = %e, "failed to save playback settings");
            }
        }
        self.publish();
    }

    /// Start background ad filtering for the active unit, superseding any
    /// filtering still in flight.
    pub fn request_filtered_candidate(&mut self) {
        self.cancel_filter();
        if !self.ad_block_enabled {
            return;
        }
        let Some(engine) = self.filter_engine.clone() else {
            return;
        };
        let Some(raw_url) = self.active_unit().map(|u| u.raw_url.clone()) else {
            return;
        };
        if !UrlUtils::is_http_hls_playlist(&raw_url) {
            return;
        }

        let token = CancellationToken::new();
        self.filter_token = Some(token.clone());
        let tx = self.filter_tx.clone();
        let episode_index = self.episode_index;

        tokio::spawn(async move {
            let filtered = engine
                .create_discontinuity_filtered_playlist_cancellable(&raw_url, &token)
                .await;
            if token.is_cancelled() {
                return;
            }
            let _ = tx.send(FilterOutcome {
                episode_index,
                raw_url,
                filtered,
            });
        });
    }

    /// Make a finished filter result the active candidate, unless it is stale.
    pub fn apply_filter_result(&mut self, outcome: FilterOutcome) {
        if !self.state.is_active() || outcome.episode_index != self.episode_index {
            debug!(target = "session", episode = outcome.episode_index, "stale filter result discarded");
            return;
        }
        let Some(filtered) = outcome.filtered else {
            return;
        };
        let Some(units) = inject_filtered_candidate(
            &self.units,
            self.episode_index,
            &outcome.raw_url,
            &filtered.file_url,
        ) else {
            return;
        };

        info!(target = "session", episode = self.episode_index, path = %filtered.local_path.display(), "ad-filtered route active");
        self.units = units;
        self.renderer.load(&filtered.file_url, self.position_millis);
        self.renderer.set_rate(self.playback_rate);
        self.state = SessionState::Loading;
        self.notify(SessionNotice::FilteredRouteActivated {
            episode_index: self.episode_index,
        });
        self.publish();
    }

    /// Wait for the next background filter result, if any is pending.
    pub async fn next_filter_result(&mut self) -> Option<FilterOutcome> {
        self.filter_rx.recv().await
    }

    /// Return to `Idle`, dropping the title and any in-flight filtering.
    pub fn reset(&mut self) {
        self.cancel_filter();
        while self.filter_rx.try_recv().is_ok() {}
        self.state = SessionState::Idle;
        self.detail = None;
        self.units = Arc::from(Vec::new());
        self.episode_index = 0;
        self.position_millis = 0;
        self.duration_millis = None;
        self.progress = 0.0;
        self.playback_rate = DEFAULT_PLAYBACK_RATE;
        self.intro_end_millis = None;
        self.outro_offset_millis = None;
        self.show_next_prompt = false;
        self.tail_handled = false;
        self.last_resume_save = None;
        self.publish();
    }

    pub async fn handle_input(&mut self, input: SessionInput) {
        match input {
            SessionInput::Load(request) => self.load(request).await,
            SessionInput::Status(status) => self.handle_status(status).await,
            SessionInput::RenderError { url, message } => {
                self.handle_render_error(&url, &message).await
            }
            SessionInput::PlayEpisode(index) => {
                self.play_episode(index).await;
            }
            SessionInput::PlayNext => {
                self.play_next().await;
            }
            SessionInput::ToggleIntroMarker => {
                self.toggle_intro_marker().await;
            }
            SessionInput::ToggleOutroMarker => {
                self.toggle_outro_marker().await;
            }
            SessionInput::SetPlaybackRate(rate) => self.set_playback_rate(rate).await,
            SessionInput::Reset => self.reset(),
        }
    }

    /// Drive the session until `inputs` closes, then reset.
    pub async fn run(mut self, mut inputs: mpsc::Receiver<SessionInput>) {
        loop {
            tokio::select! {
                input = inputs.recv() => match input {
                    Some(input) => self.handle_input(input).await,
                    None => break,
                },
                Some(outcome) = self.filter_rx.recv() => self.apply_filter_result(outcome),
            }
        }
        debug!(target = "session", "input channel closed, session stopping");
        self.reset();
    }

    /// Proxy backend for `source_key`: the source's own `api` when the catalog
    /// lists one, otherwise the configured backend.
    async fn backend_for(&self, source_key: &str) -> Option<String> {
        match self.catalog.list_sources().await {
            Ok(sources) => {
                let api = sources
                    .into_iter()
                    .find(|s| s.key == source_key)
                    .and_then(|s| s.api)
                    .filter(|api| !api.trim().is_empty());
                if api.is_some() {
                    return api;
                }
            }
            Err(e) => {
                warn!(
                    target = "session",
                    source = %source_key,
                    error = %e,
                    "could not list sources, using configured backend"
                );
            }
        }
        self.backend_url.clone()
    }

    async fn read_resume_record(&self, source: &str, id: &str) -> Option<ResumeRecord> {
        self.store
            .get_resume_record(source, id)
            .await
            .unwrap_or_else(|e| {
                warn!(target = "session", error = %e, "failed to read resume record");
                None
            })
    }

    async fn read_playback_settings(&self, source: &str, id: &str) -> Option<PlaybackSettings> {
        self.store
            .get_playback_settings(source, id)
            .await
            .unwrap_or_else(|e| {
                warn!(target = "session", error = %e, "failed to read playback settings");
                None
            })
    }

    async fn save_resume_record(&mut self) {
        let Some(detail) = &self.detail else {
            return;
        };
        let record = ResumeRecord {
            title: detail.title.clone(),
            source_name: detail.source_name.clone(),
            index: self.episode_index,
            total_episodes: self.units.len(),
            play_time: self.position_millis as f64 / 1000.0,
            total_time: self.duration_millis.unwrap_or(0) as f64 / 1000.0,
            save_time: Utc::now(),
            intro_end_time: self.intro_end_millis,
            outro_start_time: self.outro_offset_millis,
        };
        if let Err(e) = self
            .store
            .save_resume_record(&detail.source, &detail.id, &record)
            .await
        {
            warn!(target = "session", error = %e, "failed to save resume record");
        }
        self.last_resume_save = Some(Instant::now());
    }

    fn cancel_filter(&mut self) {
        if let Some(token) = self.filter_token.take() {
            token.cancel();
        }
    }

    fn notify(&self, notice: SessionNotice) {
        let _ = self.notice_tx.send(notice);
    }

    fn publish(&self) {
        self.snapshot_tx.send_replace(self.snapshot());
    }
}

impl Drop for PlaybackSession {
    fn drop(&mut self) {
        self.cancel_filter();
    }
}
