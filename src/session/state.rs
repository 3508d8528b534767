use serde::{Deserialize, Serialize};

use crate::player::PlaybackStatus;

/// Lifecycle of a playback session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    #[default]
    Idle,
    Loading,
    Playing,
    Buffering,
    /// Last episode finished
    Ended,
    /// No episodes could be resolved from any source
    LoadFailed,
    /// Every candidate of every available source failed
    PlaybackFailed,
}

impl SessionState {
    /// States in which render events for the active unit are meaningful.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Loading | Self::Playing | Self::Buffering)
    }
}

/// What the caller asks to watch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadRequest {
    pub source: String,
    pub id: String,
    pub title: String,
    pub episode_index: usize,
    #[serde(default)]
    pub position_millis: Option<u64>,
}

/// Coarse error class, used for user messaging only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackErrorKind {
    Certificate,
    Network,
    Other,
}

impl PlaybackErrorKind {
    pub fn classify(message: &str) -> Self {
        let lower = message.to_ascii_lowercase();
        if ["certificate", "ssl", "tls", "cert_", "handshake"]
            .iter()
            .any(|needle| lower.contains(needle))
        {
            Self::Certificate
        } else if [
            "network",
            "timeout",
            "timed out",
            "connection",
            "unreachable",
            "dns",
            "offline",
        ]
        .iter()
        .any(|needle| lower.contains(needle))
        {
            Self::Network
        } else {
            Self::Other
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Certificate => "certificate",
            Self::Network => "network",
            Self::Other => "other",
        }
    }

    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Certificate => "The video source has a certificate problem",
            Self::Network => "The video source could not be reached",
            Self::Other => "The video could not be played",
        }
    }
}

/// Transient, user-facing notifications.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionNotice {
    /// Same episode, next candidate URL
    SwitchedToBackupRoute {
        episode_index: usize,
        candidate_index: usize,
    },
    /// Candidates exhausted, continuing on another provider
    SwitchedSource {
        from_source: String,
        to_source: String,
        source_name: String,
        kind: PlaybackErrorKind,
    },
    EpisodeAdvanced {
        episode_index: usize,
    },
    /// An ad-filtered route became available and is now active
    FilteredRouteActivated {
        episode_index: usize,
    },
    PlaybackFailed {
        kind: PlaybackErrorKind,
        message: String,
    },
    LoadFailed {
        message: String,
    },
}

/// Read-only view published to observers after every transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub source: Option<String>,
    pub source_name: Option<String>,
    pub id: Option<String>,
    pub title: Option<String>,
    pub episode_index: usize,
    pub total_episodes: usize,
    pub active_url: Option<String>,
    pub candidate_index: usize,
    pub progress: f64,
    pub position_millis: u64,
    pub duration_millis: Option<u64>,
    pub playback_rate: f32,
    pub intro_end_millis: Option<u64>,
    pub outro_offset_millis: Option<u64>,
    pub show_next_prompt: bool,
}

impl Default for SessionSnapshot {
    fn default() -> Self {
        Self {
            state: SessionState::Idle,
            source: None,
            source_name: None,
            id: None,
            title: None,
            episode_index: 0,
            total_episodes: 0,
            active_url: None,
            candidate_index: 0,
            progress: 0.0,
            position_millis: 0,
            duration_millis: None,
            playback_rate: crate::config::defaults::DEFAULT_PLAYBACK_RATE,
            intro_end_millis: None,
            outro_offset_millis: None,
            show_next_prompt: false,
        }
    }
}

/// Commands accepted by [`super::PlaybackSession::run`].
#[derive(Debug, Clone)]
pub enum SessionInput {
    Load(LoadRequest),
    Status(PlaybackStatus),
    RenderError { url: String, message: String },
    PlayEpisode(usize),
    PlayNext,
    ToggleIntroMarker,
    ToggleOutroMarker,
    SetPlaybackRate(f32),
    Reset,
}
