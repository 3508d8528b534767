use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, info, warn};

use crate::config::LiveConfig;
use crate::player::MediaRenderer;
use crate::timer::CancellableTimer;
use crate::utils::UrlUtils;

const NOTICE_CAPACITY: usize = 16;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LiveState {
    #[default]
    Idle,
    /// Waiting for the first playing report, timer armed
    Connecting,
    Playing,
    /// Terminal until the next `set_stream`
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LiveFailure {
    Timeout,
    Error { message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LiveNotice {
    SwitchedToFallback { cause: LiveFailure },
    Failed { cause: LiveFailure },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LiveInput {
    SetStream {
        url: String,
        fallback: Option<String>,
    },
    Playing,
    /// The renderer reported an error while playing `url`.
    Error { url: String, message: String },
    Stop,
}

/// Plays one live stream at a time, switching at most once to a fallback URL
/// when the primary stalls past the timeout or errors.
pub struct LiveFallbackController {
    renderer: Arc<dyn MediaRenderer>,
    timeout: Duration,
    timer: CancellableTimer,
    timer_rx: mpsc::UnboundedReceiver<u64>,
    state: LiveState,
    current_url: Option<String>,
    fallback_url: Option<String>,
    fallback_used: bool,
    state_tx: watch::Sender<LiveState>,
    notice_tx: broadcast::Sender<LiveNotice>,
}

impl std::fmt::Debug for LiveFallbackController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveFallbackController")
            .field("state", &self.state)
            .field("fallback_used", &self.fallback_used)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl LiveFallbackController {
    pub fn new(renderer: Arc<dyn MediaRenderer>, config: &LiveConfig) -> Self {
        let (timer, timer_rx) = CancellableTimer::new();
        let (state_tx, _) = watch::channel(LiveState::Idle);
        let (notice_tx, _) = broadcast::channel(NOTICE_CAPACITY);
        Self {
            renderer,
            timeout: config.fallback_timeout,
            timer,
            timer_rx,
            state: LiveState::Idle,
            current_url: None,
            fallback_url: None,
            fallback_used: false,
            state_tx,
            notice_tx,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<LiveState> {
        self.state_tx.subscribe()
    }

    pub fn notices(&self) -> broadcast::Receiver<LiveNotice> {
        self.notice_tx.subscribe()
    }

    pub fn state(&self) -> LiveState {
        self.state
    }

    pub fn current_url(&self) -> Option<&str> {
        self.current_url.as_deref()
    }

    pub fn fallback_used(&self) -> bool {
        self.fallback_used
    }

    /// Timer generation currently armed, if any.
    pub fn armed_generation(&self) -> Option<u64> {
        self.timer.is_armed().then(|| self.timer.generation())
    }

    /// Start playing `url`. Fully resets the fallback state of the previous stream.
    pub fn set_stream(&mut self, url: &str, fallback: Option<&str>) {
        self.timer.disarm();
        self.fallback_used = false;
        self.fallback_url = fallback
            .map(str::trim)
            .filter(|f| !f.is_empty() && *f != url)
            .map(str::to_string);
        self.current_url = Some(url.to_string());

        info!(
            target = "live",
            url = %UrlUtils::obfuscate_credentials(url),
            has_fallback = self.fallback_url.is_some(),
            "live stream selected"
        );
        self.renderer.load(url, 0);
        self.connect();
    }

    pub fn on_playing(&mut self) {
        if self.state != LiveState::Connecting {
            return;
        }
        self.timer.disarm();
        self.set_state(LiveState::Playing);
    }

    /// A timer fire for `generation`. Superseded generations are ignored.
    pub fn on_timeout(&mut self, generation: u64) {
        if !self.timer.accept(generation) {
            debug!(target = "live", generation, "stale fallback timer ignored");
            return;
        }
        warn!(target = "live", timeout = ?self.timeout, "live stream did not start in time");
        self.escalate(LiveFailure::Timeout);
    }

    /// An error reported for `url`. Errors for a URL that is no longer the
    /// current one are late events from a replaced stream and are ignored.
    pub fn on_error(&mut self, url: &str, message: &str) {
        if !matches!(self.state, LiveState::Connecting | LiveState::Playing) {
            return;
        }
        if self.current_url.as_deref() != Some(url) {
            debug!(
                target = "live",
                url = %UrlUtils::obfuscate_credentials(url),
                "error for a replaced stream ignored"
            );
            return;
        }
        warn!(target = "live", error = %message, "live stream error");
        self.timer.disarm();
        self.escalate(LiveFailure::Error {
            message: message.to_string(),
        });
    }

    pub fn stop(&mut self) {
        self.timer.disarm();
        self.current_url = None;
        self.fallback_url = None;
        self.fallback_used = false;
        self.set_state(LiveState::Idle);
    }

    fn escalate(&mut self, cause: LiveFailure) {
        let fallback = if self.fallback_used {
            None
        } else {
            self.fallback_url.clone()
        };

        match fallback {
            Some(url) => {
                self.fallback_used = true;
                info!(target = "live", url = %UrlUtils::obfuscate_credentials(&url), "switching to direct stream");
                self.renderer.load(&url, 0);
                self.current_url = Some(url);
                let _ = self.notice_tx.send(LiveNotice::SwitchedToFallback { cause });
                self.connect();
            }
            None => {
                self.timer.disarm();
                warn!(target = "live", "live stream failed, no fallback left");
                self.set_state(LiveState::Failed);
                let _ = self.notice_tx.send(LiveNotice::Failed { cause });
            }
        }
    }

    fn connect(&mut self) {
        self.timer.arm(self.timeout);
        self.set_state(LiveState::Connecting);
    }

    fn set_state(&mut self, state: LiveState) {
        self.state = state;
        self.state_tx.send_replace(state);
    }

    pub fn handle_input(&mut self, input: LiveInput) {
        match input {
            LiveInput::SetStream { url, fallback } => self.set_stream(&url, fallback.as_deref()),
            LiveInput::Playing => self.on_playing(),
            LiveInput::Error { url, message } => self.on_error(&url, &message),
            LiveInput::Stop => self.stop(),
        }
    }

    /// Drive the controller from `inputs` and its own timer until `inputs` closes.
    pub async fn run(mut self, mut inputs: mpsc::Receiver<LiveInput>) {
        loop {
            tokio::select! {
                input = inputs.recv() => match input {
                    Some(input) => self.handle_input(input),
                    None => break,
                },
                Some(generation) = self.timer_rx.recv() => self.on_timeout(generation),
            }
        }
        self.stop();
    }

    /// Wait for the next timer fire notification.
    pub async fn next_timer_fire(&mut self) -> Option<u64> {
        self.timer_rx.recv().await
    }
}
