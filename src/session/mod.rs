//! Playback Session State Machine
//!
//! One [`PlaybackSession`] per watched title. It resolves the episode list
//! (falling back across sources when a lookup comes back empty), walks the
//! candidate URLs of the active episode on render errors, switches provider
//! once every candidate is exhausted, and keeps the resume record current.
//!
//! Observers read state through a `watch` snapshot and transient notices
//! through a `broadcast` channel.

pub mod controller;
pub mod state;

pub use controller::{FilterOutcome, PlaybackSession};
pub use state::{
    LoadRequest, PlaybackErrorKind, SessionInput, SessionNotice, SessionSnapshot, SessionState,
};
