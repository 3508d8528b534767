//! Render engine contract
//!
//! The decode/render engine accepts a URL, reports status events and exposes
//! imperative controls. Commands are fire-and-forget; outcomes arrive later as
//! [`PlaybackStatus`] events or render errors.

use serde::{Deserialize, Serialize};

/// One status report from the render engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlaybackStatus {
    pub is_loaded: bool,
    pub is_playing: bool,
    pub is_buffering: bool,
    pub position_millis: u64,
    pub duration_millis: Option<u64>,
    pub did_just_finish: bool,
    #[serde(default)]
    pub error: Option<String>,
}

impl PlaybackStatus {
    /// Position as a fraction of the duration, 0 when the duration is unknown.
    pub fn progress(&self) -> f64 {
        match self.duration_millis {
            Some(duration) if duration > 0 => {
                (self.position_millis as f64 / duration as f64).clamp(0.0, 1.0)
            }
            _ => 0.0,
        }
    }

    /// Milliseconds left, when the duration is known.
    pub fn remaining_millis(&self) -> Option<u64> {
        self.duration_millis
            .filter(|d| *d > 0)
            .map(|d| d.saturating_sub(self.position_millis))
    }
}

pub trait MediaRenderer: Send + Sync {
    /// Start loading `url`, seeking to `start_position_millis` once loaded.
    fn load(&self, url: &str, start_position_millis: u64);

    fn play(&self);

    fn pause(&self);

    fn seek(&self, position_millis: u64);

    fn set_rate(&self, rate: f32);

    /// Reload the current source from scratch.
    fn reload(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_is_zero_without_duration() {
        let status = PlaybackStatus {
            position_millis: 5_000,
            ..Default::default()
        };
        assert_eq!(status.progress(), 0.0);
        assert_eq!(status.remaining_millis(), None);
    }

    #[test]
    fn progress_and_remaining_follow_position() {
        let status = PlaybackStatus {
            position_millis: 30_000,
            duration_millis: Some(120_000),
            ..Default::default()
        };
        assert_eq!(status.progress(), 0.25);
        assert_eq!(status.remaining_millis(), Some(90_000));
    }
}
